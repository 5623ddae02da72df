// src/passes/store_elimination.rs
//! Dead-store removal via memory SSA.
//!
//! A store is dead when a later store completely overwrites its location on
//! every path with no aliasing read in between; the clobber query of the
//! memory SSA encodes exactly that. Runs over both address spaces.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind, LocationKind};
use crate::error::CompileError;
use crate::ir::{InstId, IrFunction};

#[derive(Debug, Default)]
pub struct StoreElimination;

impl StoreElimination {
    pub fn new() -> Self {
        StoreElimination
    }

    fn eliminate(
        &self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
        kind: LocationKind,
    ) -> Result<bool, CompileError> {
        let ssa = cache.request_mem_ssa(function, kind)?;

        let mut dead: Vec<InstId> = Vec::new();
        for def_id in ssa.def_ids() {
            let def = ssa.def(def_id);
            // only the plain store opcode is removable; calls and copies
            // have effects beyond their write location
            if def.is_volatile {
                continue;
            }
            if ssa.get_clobbering_memory_access(def_id).is_some() {
                dead.push(def.inst);
            }
        }

        if dead.is_empty() {
            return Ok(false);
        }
        for id in dead {
            let block = function.inst(id).parent;
            function.block_mut(block).mark_for_removal(id);
        }
        function.drain_dead_instructions();
        cache.invalidate(AnalysisKind::Dfg);
        cache.invalidate(AnalysisKind::MemSsa);
        cache.invalidate(AnalysisKind::StorageSsa);
        Ok(true)
    }
}

impl Pass for StoreElimination {
    fn name(&self) -> &'static str {
        "store-elimination"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let mut changed = false;
        changed |= self.eliminate(function, cache, LocationKind::Memory)?;
        changed |= self.eliminate(function, cache, LocationKind::Storage)?;
        Ok(changed)
    }
}
