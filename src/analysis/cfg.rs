// src/analysis/cfg.rs
use crate::error::CompileError;
use crate::ir::{BlockId, IrFunction};
use indexmap::IndexSet;

/// Control-flow analysis: rebuilds `cfg_in`/`cfg_out` on every block from
/// the label operands of CFG-altering instructions, and records the
/// depth-first orderings passes iterate in.
#[derive(Debug)]
pub struct CfgAnalysis {
    pub(super) generation: u64,
    /// Blocks reachable from entry, in DFS pre-order.
    pre_order: Vec<BlockId>,
    /// Blocks reachable from entry, in DFS post-order.
    post_order: Vec<BlockId>,
}

impl CfgAnalysis {
    pub fn analyze(function: &mut IrFunction) -> Result<Self, CompileError> {
        for &block in &function.body().to_vec() {
            function.block_mut(block).clear_cfg();
        }

        for &block in &function.body().to_vec() {
            if function.block(block).is_empty() {
                return Err(CompileError::structure(format!(
                    "basic block {} is empty",
                    function.block(block).label
                )));
            }
            if !function.is_terminated(block) {
                return Err(CompileError::structure(format!(
                    "basic block {} is not terminated",
                    function.block(block).label
                )));
            }

            let mut successors = Vec::new();
            for inst in function.instructions_of(block) {
                if !inst.opcode.is_cfg_altering() {
                    continue;
                }
                for label in inst.label_operands() {
                    let target = function.block_by_label(label).ok_or_else(|| {
                        CompileError::structure(format!(
                            "block {} jumps to unknown label {label}",
                            function.block(block).label
                        ))
                    })?;
                    successors.push(target);
                }
            }
            for target in successors {
                function.block_mut(target).add_cfg_in(block);
                function.block_mut(block).add_cfg_out(target);
            }
        }

        let (pre_order, post_order) = dfs_orders(function);
        Ok(CfgAnalysis { generation: 0, pre_order, post_order })
    }

    pub fn pre_order(&self) -> &[BlockId] {
        &self.pre_order
    }

    pub fn post_order(&self) -> &[BlockId] {
        &self.post_order
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.pre_order.contains(&block)
    }
}

/// Iterative DFS from the entry block along `cfg_out` edges.
fn dfs_orders(function: &IrFunction) -> (Vec<BlockId>, Vec<BlockId>) {
    let mut pre_order = Vec::new();
    let mut post_order = Vec::new();
    let mut visited: IndexSet<BlockId> = IndexSet::new();
    // (block, next successor index to visit)
    let mut stack: Vec<(BlockId, usize)> = vec![(function.entry(), 0)];
    visited.insert(function.entry());
    pre_order.push(function.entry());

    while let Some(&mut (block, ref mut next)) = stack.last_mut() {
        let succs = &function.block(block).cfg_out;
        if *next < succs.len() {
            let succ = succs[*next];
            *next += 1;
            if visited.insert(succ) {
                pre_order.push(succ);
                stack.push((succ, 0));
            }
        } else {
            post_order.push(block);
            stack.pop();
        }
    }
    (pre_order, post_order)
}
