// src/passes/redundant_load_elimination.rs
//! Redundant-load elimination via memory SSA.
//!
//! Every `mload` from a literal offset is resolved to its effective
//! reaching state: the nearest aliasing store, the memory phi where
//! disagreeing arms meet, or live-on-entry. A load whose effective state is
//! a store of exactly the same bytes is forwarded the stored value. The
//! remaining loads are grouped by (state, offset); each group with more
//! than one member reads memory once, right after the state it observes,
//! and every member becomes a register copy of that read.

use super::Pass;
use crate::analysis::mem_ssa::MemUseId;
use crate::analysis::{AnalysisCache, AnalysisKind, LocationKind, MemoryAccess};
use crate::error::CompileError;
use crate::ir::{BlockId, InstId, IrFunction, IrInstruction, Opcode, Operand};
use indexmap::IndexMap;
use num_bigint::BigUint;

const ANNOTATION: &str = "[redundant load elimination]";

#[derive(Debug, Default)]
pub struct RedundantLoadElimination;

impl RedundantLoadElimination {
    pub fn new() -> Self {
        RedundantLoadElimination
    }

    /// Where the canonical load for a group goes: right after a store, at
    /// the head of a phi's block, or at function entry; always after any
    /// leading pseudo instructions.
    fn insertion_point(
        &self,
        function: &IrFunction,
        access: MemoryAccess,
        ssa: &crate::analysis::MemSsa,
    ) -> (BlockId, usize) {
        match access {
            MemoryAccess::Def(def) => {
                let inst = ssa.def(def).inst;
                let block = function.inst(inst).parent;
                let index = function
                    .inst_ids_of(block)
                    .iter()
                    .position(|&i| i == inst)
                    .expect("store not in its parent block");
                (block, index + 1)
            }
            MemoryAccess::Phi(phi) => {
                let block = ssa.phi(phi).block;
                (block, leading_pseudo_count(function, block))
            }
            MemoryAccess::LiveOnEntry => {
                let block = function.entry();
                (block, leading_pseudo_count(function, block))
            }
        }
    }
}

fn leading_pseudo_count(function: &IrFunction, block: BlockId) -> usize {
    function
        .inst_ids_of(block)
        .iter()
        .take_while(|&&id| function.inst(id).is_pseudo())
        .count()
}

impl Pass for RedundantLoadElimination {
    fn name(&self) -> &'static str {
        "redundant-load-elimination"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let ssa = cache.request_mem_ssa(function, LocationKind::Memory)?;
        let mut changed = false;

        let mut groups: IndexMap<(MemoryAccess, u64), Vec<MemUseId>> = IndexMap::new();
        for use_id in ssa.use_ids() {
            let mem_use = ssa.mem_use(use_id);
            if mem_use.is_volatile {
                continue;
            }
            let Some(offset) = mem_use.loc.offset() else { continue };

            let effective = ssa.effective_reaching_access(use_id);

            // store-to-load forwarding when the store wrote exactly the
            // bytes this load reads
            if let MemoryAccess::Def(def_id) = effective {
                let def = ssa.def(def_id);
                if !def.is_volatile && def.loc == mem_use.loc {
                    let value = function.inst(def.inst).operands[0].clone();
                    let load = function.inst_mut(mem_use.inst);
                    load.opcode = Opcode::Store;
                    load.operands = vec![value];
                    load.annotation = Some(ANNOTATION.to_owned());
                    changed = true;
                    continue;
                }
            }

            groups.entry((effective, offset)).or_default().push(use_id);
        }

        for ((access, offset), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let (block, index) = self.insertion_point(function, access, &ssa);
            let loaded = function.get_next_variable();
            let canonical =
                IrInstruction::new(Opcode::Mload, vec![Operand::Literal(BigUint::from(offset))])
                    .with_output(loaded.clone());
            function.insert_instruction(block, index, canonical);

            let member_insts: Vec<InstId> =
                members.iter().map(|&use_id| ssa.mem_use(use_id).inst).collect();
            for inst in member_insts {
                let load = function.inst_mut(inst);
                load.opcode = Opcode::Store;
                load.operands = vec![Operand::Variable(loaded.clone())];
                load.annotation = Some(ANNOTATION.to_owned());
            }
            changed = true;
        }

        if changed {
            cache.invalidate(AnalysisKind::Dfg);
            cache.invalidate(AnalysisKind::MemSsa);
        }
        Ok(changed)
    }
}
