// src/passes/make_ssa.rs
//! Scalar SSA construction.
//!
//! Phis are inserted at the iterated dominance frontier of every variable's
//! defining blocks (pruned by liveness), then a dominator-tree walk renames
//! every definition to a fresh version and every use to the reaching one.
//! Phi operands are laid out as `(label, value)` pairs, one per predecessor
//! in the predecessor order at phi creation time.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind, DominatorTreeAnalysis};
use crate::error::CompileError;
use crate::ir::{BlockId, IrFunction, IrInstruction, IrLabel, IrVariable, Opcode, Operand};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct MakeSsa;

impl MakeSsa {
    pub fn new() -> Self {
        MakeSsa
    }
}

impl Pass for MakeSsa {
    fn name(&self) -> &'static str {
        "make-ssa"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let cfg = cache.request_cfg(function)?;
        let dom = cache.request_dominators(function)?;
        let liveness = cache.request_liveness(function)?;

        // defining blocks per variable base name, in first-definition order
        let mut defs: IndexMap<Arc<str>, IndexSet<BlockId>> = IndexMap::new();
        for &block in cfg.pre_order() {
            for inst in function.instructions_of(block) {
                if let Some(output) = &inst.output {
                    defs.entry(Arc::from(output.name())).or_default().insert(block);
                }
            }
        }

        for (name, def_blocks) in &defs {
            let var = IrVariable::new(name.as_ref());
            let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
            let mut placed: IndexSet<BlockId> = IndexSet::new();
            while let Some(block) = worklist.pop() {
                let Some(frontier) = dom.dominance_frontier(block) else { continue };
                for &join in frontier {
                    if !placed.insert(join) {
                        continue;
                    }
                    // pruned form: a phi is only useful where the variable
                    // is live into the join
                    if liveness.block_live_in(join).iter().any(|v| v.name() == name.as_ref()) {
                        let mut operands = Vec::new();
                        for &pred in &function.block(join).cfg_in {
                            operands.push(Operand::Label(function.block(pred).label.clone()));
                            operands.push(Operand::Variable(var.clone()));
                        }
                        let phi =
                            IrInstruction::new(Opcode::Phi, operands).with_output(var.clone());
                        function.insert_instruction(join, 0, phi);
                        // the phi is itself a definition
                        worklist.push(join);
                    }
                }
            }
        }

        let mut renamer = Renamer {
            function,
            dom: &dom,
            stacks: HashMap::new(),
            counters: HashMap::new(),
        };
        renamer.rename_block(dom.entry());

        cache.invalidate(AnalysisKind::Dfg);
        cache.invalidate(AnalysisKind::Liveness);
        Ok(true)
    }
}

struct Renamer<'a> {
    function: &'a mut IrFunction,
    dom: &'a DominatorTreeAnalysis,
    /// Version stack per variable base name.
    stacks: HashMap<Arc<str>, Vec<u32>>,
    counters: HashMap<Arc<str>, u32>,
}

impl Renamer<'_> {
    fn current_version(&self, name: &str) -> Option<u32> {
        self.stacks.get(name).and_then(|stack| stack.last().copied())
    }

    fn rename_block(&mut self, block: BlockId) {
        // names pushed in this block, to pop on the way out
        let mut pushed: Vec<Arc<str>> = Vec::new();

        for &id in &self.function.block(block).insts.clone() {
            if !self.function.inst(id).is_phi() {
                let mut updates: Vec<(usize, Operand)> = Vec::new();
                for (i, operand) in self.function.inst(id).operands.iter().enumerate() {
                    if let Operand::Variable(var) = operand
                        && let Some(version) = self.current_version(var.name())
                    {
                        updates.push((i, Operand::Variable(var.with_version(version))));
                    }
                }
                let inst = self.function.inst_mut(id);
                for (i, operand) in updates {
                    inst.operands[i] = operand;
                }
            }

            let output_name: Option<Arc<str>> =
                self.function.inst(id).output.as_ref().map(|output| Arc::from(output.name()));
            if let Some(name) = output_name {
                let counter = self.counters.entry(Arc::clone(&name)).or_insert(0);
                *counter += 1;
                let version = *counter;
                self.stacks.entry(Arc::clone(&name)).or_default().push(version);
                pushed.push(name);
                let inst = self.function.inst_mut(id);
                if let Some(output) = inst.output.take() {
                    inst.output = Some(output.with_version(version));
                }
            }
        }

        // feed the just-computed versions into successor phis
        let label = self.function.block(block).label.clone();
        for succ in self.function.block(block).cfg_out.clone() {
            for &phi in &self.function.phi_ids_of(succ) {
                self.rename_phi_operand(phi, &label);
            }
        }

        for &child in self.dom.dominator_tree_children(block) {
            self.rename_block(child);
        }

        for name in pushed {
            if let Some(stack) = self.stacks.get_mut(&name) {
                stack.pop();
            }
        }
    }

    /// Replaces the value slot for `label` in a phi with the version live
    /// at the end of that predecessor.
    fn rename_phi_operand(&mut self, phi: crate::ir::InstId, label: &IrLabel) {
        let mut replacement: Option<(usize, Operand)> = None;
        {
            let inst = self.function.inst(phi);
            for i in (0..inst.operands.len()).step_by(2) {
                if inst.operands[i].as_label() != Some(label) {
                    continue;
                }
                if let Operand::Variable(var) = &inst.operands[i + 1]
                    && let Some(version) = self.current_version(var.name())
                {
                    replacement = Some((i + 1, Operand::Variable(var.with_version(version))));
                }
            }
        }
        if let Some((index, operand)) = replacement {
            self.function.inst_mut(phi).operands[index] = operand;
        }
    }
}
