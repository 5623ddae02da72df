// src/ir/basic_block.rs
use super::{BlockId, InstId, IrLabel, IrVariable};
use indexmap::IndexSet;
use std::collections::HashSet;

/// A basic block: a label and an ordered run of instructions ending in a
/// terminator.
///
/// The block stores instruction ids into the owning function's arena, not
/// the instructions themselves; all content-dependent helpers live on
/// [`super::IrFunction`]. `cfg_in`/`cfg_out` are maintained by the CFG
/// analysis and kept in deterministic insertion order.
#[derive(Debug, Clone)]
pub struct IrBasicBlock {
    pub label: IrLabel,
    pub insts: Vec<InstId>,
    /// Blocks which can jump to this block.
    pub cfg_in: IndexSet<BlockId>,
    /// Blocks this block can jump to.
    pub cfg_out: IndexSet<BlockId>,
    /// Stack items this block leaves for its successors.
    pub out_vars: IndexSet<IrVariable>,
    /// Instructions queued for batch removal.
    garbage: HashSet<InstId>,
}

impl IrBasicBlock {
    pub fn new(label: IrLabel) -> Self {
        IrBasicBlock {
            label,
            insts: Vec::new(),
            cfg_in: IndexSet::new(),
            cfg_out: IndexSet::new(),
            out_vars: IndexSet::new(),
            garbage: HashSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn add_cfg_in(&mut self, pred: BlockId) {
        self.cfg_in.insert(pred);
    }

    pub fn remove_cfg_in(&mut self, pred: BlockId) {
        self.cfg_in.shift_remove(&pred);
    }

    pub fn add_cfg_out(&mut self, succ: BlockId) {
        self.cfg_out.insert(succ);
    }

    pub fn remove_cfg_out(&mut self, succ: BlockId) {
        self.cfg_out.shift_remove(&succ);
    }

    pub fn clear_cfg(&mut self) {
        self.cfg_in.clear();
        self.cfg_out.clear();
        self.out_vars.clear();
    }

    /// Queues an instruction for removal; it stays in place until
    /// [`Self::drain_dead_instructions`].
    pub fn mark_for_removal(&mut self, inst: InstId) {
        self.garbage.insert(inst);
    }

    pub fn has_garbage(&self) -> bool {
        !self.garbage.is_empty()
    }

    /// Drops all queued instructions from the block, returning how many were
    /// removed.
    pub fn drain_dead_instructions(&mut self) -> usize {
        if self.garbage.is_empty() {
            return 0;
        }
        let before = self.insts.len();
        let garbage = std::mem::take(&mut self.garbage);
        self.insts.retain(|id| !garbage.contains(id));
        before - self.insts.len()
    }
}
