// src/passes/simplify_cfg.rs
//! CFG cleanup: drops unreachable blocks, collapses jump-only blocks, and
//! merges single-predecessor/single-successor chains. Phis in surviving
//! blocks are trimmed to the new predecessor sets, and user-visible
//! (symbol) labels are kept alive by moving them onto the surviving block.
//!
//! The pass also keeps the no-duplicate-successor invariant: a terminator
//! naming the same block twice has one edge routed through a fresh
//! jump-only block, and no collapse is allowed to create such a duplicate.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind};
use crate::error::CompileError;
use crate::ir::{BlockId, IrFunction, IrLabel, Opcode, Operand};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SimplifyCfg;

impl SimplifyCfg {
    pub fn new() -> Self {
        SimplifyCfg
    }

    /// Splits one duplicated terminator target (`jnz %c, @x, @x`): the
    /// second edge goes through a fresh block holding a single `jmp`, and
    /// any phi in the target gains a matching pair for the new
    /// predecessor.
    fn split_duplicate_targets(
        &self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        cache.request_cfg(function)?;

        for &block in &function.body().to_vec() {
            let Some(terminator) = function.terminator_of(block) else { continue };
            let labels: Vec<IrLabel> =
                function.inst(terminator).label_operands().cloned().collect();
            let duplicate = labels
                .iter()
                .enumerate()
                .find(|(i, label)| labels[..*i].contains(*label))
                .map(|(_, label)| label.clone());
            let Some(target_label) = duplicate else { continue };
            let Some(target) = function.block_by_label(&target_label) else { continue };

            let source_label = function.block(block).label.clone();
            let mut split_label = IrLabel::new(format!("{target_label}_split_{source_label}"));
            if function.block_by_label(&split_label).is_some() {
                split_label = function.get_next_label("split");
            }
            let split = function.append_basic_block(split_label.clone());
            function.append_instruction(
                split,
                Opcode::Jmp,
                vec![Operand::Label(target_label.clone())],
            );

            // redirect the second occurrence only
            let inst = function.inst_mut(terminator);
            let mut seen_first = false;
            for operand in &mut inst.operands {
                if let Operand::Label(label) = operand
                    && label == &target_label
                {
                    if seen_first {
                        *operand = Operand::Label(split_label.clone());
                        break;
                    }
                    seen_first = true;
                }
            }

            // the new predecessor carries the same incoming value as the
            // duplicated edge
            for &phi in &function.phi_ids_of(target) {
                let value = function
                    .inst(phi)
                    .phi_operands()
                    .find(|(label, _)| *label == &source_label)
                    .map(|(_, value)| value.clone());
                if let Some(value) = value {
                    let inst = function.inst_mut(phi);
                    inst.operands.push(Operand::Label(split_label.clone()));
                    inst.operands.push(value);
                }
            }

            cache.invalidate(AnalysisKind::Cfg);
            return Ok(true);
        }
        Ok(false)
    }

    fn remove_unreachable(
        &self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let cfg = cache.request_cfg(function)?;
        let dead: Vec<BlockId> =
            function.body().iter().copied().filter(|&b| !cfg.is_reachable(b)).collect();
        if dead.is_empty() {
            return Ok(false);
        }

        for &block in &dead {
            for succ in function.block(block).cfg_out.clone() {
                function.block_mut(succ).remove_cfg_in(block);
                function.fix_phi_instructions(succ);
            }
            function.remove_basic_block(block);
        }
        cache.invalidate(AnalysisKind::Cfg);
        Ok(true)
    }

    /// Collapses a block containing nothing but `jmp @succ` by redirecting
    /// every reference to it straight to the successor. When the collapsed
    /// block carries a symbol label and the successor does not, the label
    /// migrates to the successor.
    fn collapse_jump_only(
        &self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        cache.request_cfg(function)?;
        let entry = function.entry();

        for &block in &function.body().to_vec() {
            if block == entry {
                continue;
            }
            let insts = function.inst_ids_of(block);
            if insts.len() != 1 {
                continue;
            }
            let only = function.inst(insts[0]);
            if only.opcode != Opcode::Jmp {
                continue;
            }
            let succ = function.block(block).cfg_out.first().copied();
            let Some(succ) = succ else { continue };
            if succ == block || !function.phi_ids_of(succ).is_empty() {
                continue;
            }

            let removed_label = function.block(block).label.clone();
            let succ_label = function.block(succ).label.clone();
            // redirecting must not leave a predecessor naming the
            // successor twice
            let creates_duplicate = function.block(block).cfg_in.iter().any(|&pred| {
                function.terminator_of(pred).is_some_and(|t| {
                    function.inst(t).label_operands().any(|label| label == &succ_label)
                })
            });
            if creates_duplicate {
                continue;
            }
            let mut replacements = HashMap::new();
            function.remove_basic_block(block);
            if removed_label.is_symbol() && !succ_label.is_symbol() {
                function.relabel_basic_block(succ, removed_label);
                replacements.insert(succ_label, function.block(succ).label.clone());
            } else {
                replacements.insert(removed_label, succ_label);
            }
            function.replace_label_operands(&replacements);
            cache.invalidate(AnalysisKind::Cfg);
            return Ok(true);
        }
        Ok(false)
    }

    /// Merges `succ` into `pred` when the edge is the only way in and out
    /// and the successor has no phis.
    fn merge_chains(
        &self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        cache.request_cfg(function)?;
        let entry = function.entry();

        for &pred in &function.body().to_vec() {
            if function.block(pred).cfg_out.len() != 1 {
                continue;
            }
            let succ = function.block(pred).cfg_out[0];
            if succ == entry || succ == pred {
                continue;
            }
            if function.block(succ).cfg_in.len() != 1 {
                continue;
            }
            if !function.phi_ids_of(succ).is_empty() {
                continue;
            }
            let Some(terminator) = function.terminator_of(pred) else { continue };
            if function.inst(terminator).opcode != Opcode::Jmp {
                continue;
            }

            function.remove_instruction(terminator);
            let moved = std::mem::take(&mut function.block_mut(succ).insts);
            for &id in &moved {
                function.inst_mut(id).parent = pred;
            }
            function.block_mut(pred).insts.extend(moved);

            let succ_label = function.block(succ).label.clone();
            let pred_label = function.block(pred).label.clone();
            function.remove_basic_block(succ);
            // phis in the successor's successors still name the old block
            let mut replacements = HashMap::new();
            replacements.insert(succ_label, pred_label);
            function.replace_label_operands(&replacements);

            cache.invalidate(AnalysisKind::Cfg);
            return Ok(true);
        }
        Ok(false)
    }
}

impl Pass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let mut changed = false;
        loop {
            if self.remove_unreachable(function, cache)? {
                changed = true;
                continue;
            }
            if self.split_duplicate_targets(function, cache)? {
                changed = true;
                continue;
            }
            if self.collapse_jump_only(function, cache)? {
                changed = true;
                continue;
            }
            if self.merge_chains(function, cache)? {
                changed = true;
                continue;
            }
            break;
        }
        Ok(changed)
    }
}
