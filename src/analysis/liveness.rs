// src/analysis/liveness.rs
//! Backward liveness data-flow.
//!
//! `live_out(B) = ∪ input_vars_from(B, succ)`; within a block the live set
//! shrinks by each instruction's output and grows by its variable inputs.
//! Phi operands are not ordinary uses: each operand is live only on the
//! edge from its predecessor, which `input_vars_from` accounts for. The
//! per-block result is written into `out_vars`; per-instruction live-in
//! sets stay in a side table.

use super::cfg::CfgAnalysis;
use crate::ir::{BlockId, InstId, IrFunction, IrVariable};
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::LazyLock;

static NO_VARS: LazyLock<IndexSet<IrVariable>> = LazyLock::new(IndexSet::new);

#[derive(Debug)]
pub struct LivenessAnalysis {
    pub(super) generation: u64,
    live_in: HashMap<InstId, IndexSet<IrVariable>>,
    block_live_in: HashMap<BlockId, IndexSet<IrVariable>>,
}

impl LivenessAnalysis {
    pub fn analyze(function: &mut IrFunction, cfg: &CfgAnalysis) -> Self {
        let mut analysis = LivenessAnalysis {
            generation: 0,
            live_in: HashMap::new(),
            block_live_in: HashMap::new(),
        };

        // post-order visits successors first, so most blocks settle in one
        // round; loops need the outer fixpoint
        let mut changed = true;
        while changed {
            changed = false;
            for &block in cfg.post_order() {
                changed |= analysis.calculate_block(function, block);
            }
        }
        analysis
    }

    fn calculate_block(&mut self, function: &mut IrFunction, block: BlockId) -> bool {
        let mut out_vars: IndexSet<IrVariable> = IndexSet::new();
        for succ in function.block(block).cfg_out.clone() {
            out_vars.extend(self.input_vars_from(function, block, succ));
        }

        let mut live = out_vars.clone();
        function.block_mut(block).out_vars = out_vars;

        for &id in function.block(block).insts.clone().iter().rev() {
            let inst = function.inst(id);
            if let Some(output) = &inst.output {
                live.shift_remove(output);
            }
            if !inst.is_phi() {
                for var in inst.input_variables() {
                    live.insert(var.clone());
                }
            }
            self.live_in.insert(id, live.clone());
        }

        let changed = self.block_live_in.get(&block) != Some(&live);
        self.block_live_in.insert(block, live);
        changed
    }

    /// The variables `target` expects on the stack when entered from
    /// `source`: the target's live-in set with each phi output replaced by
    /// the operand flowing along this edge.
    pub fn input_vars_from(
        &self,
        function: &IrFunction,
        source: BlockId,
        target: BlockId,
    ) -> IndexSet<IrVariable> {
        let mut vars = self.block_live_in.get(&target).cloned().unwrap_or_default();
        let source_label = function.block(source).label.clone();
        for &phi in &function.phi_ids_of(target) {
            let inst = function.inst(phi);
            if let Some(output) = &inst.output {
                vars.shift_remove(output);
            }
            for (label, operand) in inst.phi_operands() {
                if label == &source_label
                    && let Some(var) = operand.as_variable()
                {
                    vars.insert(var.clone());
                }
            }
        }
        vars
    }

    /// Live variables immediately before an instruction executes.
    pub fn live_in(&self, inst: InstId) -> &IndexSet<IrVariable> {
        self.live_in.get(&inst).unwrap_or(&NO_VARS)
    }

    /// Live variables on entry to a block.
    pub fn block_live_in(&self, block: BlockId) -> &IndexSet<IrVariable> {
        self.block_live_in.get(&block).unwrap_or(&NO_VARS)
    }
}
