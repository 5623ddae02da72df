// src/passes/dft.rs
//! Data-flow topological scheduling within each block.
//!
//! Instructions are re-emitted so that every producer lands right before
//! its first consumer, which lets the stack scheduler keep values on top of
//! the stack instead of shuffling. Volatile instructions carve the block
//! into fence regions; nothing moves across a fence or a block boundary,
//! phis stay first and the terminator stays last.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind, DfgAnalysis};
use crate::error::CompileError;
use crate::ir::{BlockId, InstId, IrFunction};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct DftPass;

impl DftPass {
    pub fn new() -> Self {
        DftPass
    }
}

impl Pass for DftPass {
    fn name(&self) -> &'static str {
        "dft"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let dfg = cache.request_dfg(function)?;
        let mut changed = false;

        for &block in &function.body().to_vec() {
            let original = function.inst_ids_of(block).to_vec();

            let mut fences: HashMap<InstId, u32> = HashMap::new();
            let mut fence = 0;
            for &id in &original {
                fences.insert(id, fence);
                if function.inst(id).is_volatile() {
                    fence += 1;
                }
            }

            let mut scheduler = Scheduler {
                function,
                dfg: &dfg,
                fences: &fences,
                block,
                visited: HashSet::new(),
                order: Vec::new(),
            };
            for &id in &original {
                scheduler.process(id);
            }
            let order = scheduler.order;

            if order != original {
                changed = true;
            }
            function.block_mut(block).insts = order;
        }

        if changed {
            cache.invalidate(AnalysisKind::Liveness);
            cache.invalidate(AnalysisKind::MemSsa);
            cache.invalidate(AnalysisKind::StorageSsa);
        }
        Ok(changed)
    }
}

struct Scheduler<'a> {
    function: &'a IrFunction,
    dfg: &'a DfgAnalysis,
    fences: &'a HashMap<InstId, u32>,
    block: BlockId,
    visited: HashSet<InstId>,
    order: Vec<InstId>,
}

impl Scheduler<'_> {
    /// Whether `other` may be emitted as part of scheduling `inst`: both in
    /// this block and fence region, and never a phi or terminator (those
    /// have fixed positions).
    fn can_reorder(&self, other: InstId, inst: InstId) -> bool {
        let target = self.function.inst(other);
        target.parent == self.block
            && !target.is_phi()
            && !target.is_bb_terminator()
            && self.fences.get(&other) == self.fences.get(&inst)
    }

    fn process(&mut self, id: InstId) {
        // visit consumers first: the recursion back into this instruction
        // places it immediately before its first consumer
        if let Some(output) = &self.function.inst(id).output {
            for &user in self.dfg.uses(output) {
                if self.can_reorder(user, id) {
                    self.process(user);
                }
            }
        }

        if !self.visited.insert(id) {
            return;
        }

        if self.function.inst(id).is_phi() {
            self.order.push(id);
            return;
        }

        for var in self.function.inst(id).input_variables() {
            if let Some(producer) = self.dfg.producing_instruction(var)
                && self.can_reorder(producer, id)
            {
                self.process(producer);
            }
        }

        self.order.push(id);
    }
}
