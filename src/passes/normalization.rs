// src/passes/normalization.rs
//! Edge splitting ahead of assembly emission.
//!
//! The stack scheduler requires that a block with several predecessors is
//! only ever entered through unconditional jumps, and that no terminator
//! names the same target twice. Offending edges get an intermediate block
//! holding a single `jmp`.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind};
use crate::error::CompileError;
use crate::ir::{BlockId, IrFunction, IrLabel, Opcode, Operand};

#[derive(Debug, Default)]
pub struct Normalization;

impl Normalization {
    pub fn new() -> Self {
        Normalization
    }

    /// Finds one edge to split: either a duplicated `jnz` target or a
    /// conditional edge into a join block.
    fn find_offending_edge(&self, function: &IrFunction) -> Option<(BlockId, BlockId)> {
        for &block in function.body() {
            let Some(terminator) = function.terminator_of(block) else { continue };
            let labels: Vec<&IrLabel> =
                function.inst(terminator).label_operands().collect();
            for (i, label) in labels.iter().enumerate() {
                if labels[..i].contains(label) {
                    let target = function.block_by_label(label)?;
                    return Some((block, target));
                }
            }
        }

        for &block in function.body() {
            if function.block(block).cfg_in.len() < 2 {
                continue;
            }
            for &pred in &function.block(block).cfg_in {
                if function.block(pred).cfg_out.len() > 1 {
                    return Some((pred, block));
                }
            }
        }
        None
    }

    fn split_edge(&self, function: &mut IrFunction, source: BlockId, target: BlockId) {
        let source_label = function.block(source).label.clone();
        let target_label = function.block(target).label.clone();
        let mut split_label =
            IrLabel::new(format!("{target_label}_split_{source_label}"));
        if function.block_by_label(&split_label).is_some() {
            split_label = function.get_next_label("split");
        }

        let split = function.append_basic_block(split_label.clone());
        function.append_instruction(split, Opcode::Jmp, vec![Operand::Label(target_label.clone())]);

        // redirect exactly one occurrence in the source terminator
        if let Some(terminator) = function.terminator_of(source) {
            let inst = function.inst_mut(terminator);
            for operand in &mut inst.operands {
                if let Operand::Label(label) = operand
                    && label == &target_label
                {
                    *operand = Operand::Label(split_label.clone());
                    break;
                }
            }
        }

        // the split block takes over the source's slot in the target's phis
        for &phi in &function.phi_ids_of(target) {
            let inst = function.inst_mut(phi);
            for operand in &mut inst.operands {
                if let Operand::Label(label) = operand
                    && label == &source_label
                {
                    *operand = Operand::Label(split_label.clone());
                    break;
                }
            }
        }
    }
}

impl Pass for Normalization {
    fn name(&self) -> &'static str {
        "normalization"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let mut changed = false;
        loop {
            cache.request_cfg(function)?;
            let Some((source, target)) = self.find_offending_edge(function) else { break };
            self.split_edge(function, source, target);
            cache.invalidate(AnalysisKind::Cfg);
            changed = true;
        }
        Ok(changed)
    }
}
