// src/passes/remove_unused_variables.rs
use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind};
use crate::error::CompileError;
use crate::ir::{InstId, IrFunction, IrVariable};
use indexmap::IndexSet;
use std::collections::HashMap;

/// Removes non-volatile instructions whose outputs are never used, to a
/// fixpoint: deleting an instruction frees its operands' producers for the
/// next round.
#[derive(Debug, Default)]
pub struct RemoveUnusedVariables;

impl RemoveUnusedVariables {
    pub fn new() -> Self {
        RemoveUnusedVariables
    }
}

impl Pass for RemoveUnusedVariables {
    fn name(&self) -> &'static str {
        "remove-unused-variables"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        let dfg = cache.request_dfg(function)?;

        // local, mutable mirror of the use sets that shrinks as we delete
        let mut uses: HashMap<IrVariable, IndexSet<InstId>> = HashMap::new();
        for (var, users) in dfg.all_uses() {
            uses.insert(var.clone(), users.clone());
        }
        let mut worklist: Vec<InstId> = Vec::new();
        for &block in function.body() {
            worklist.extend(function.inst_ids_of(block).iter().copied());
        }

        let mut removed: IndexSet<InstId> = IndexSet::new();
        while let Some(id) = worklist.pop() {
            if removed.contains(&id) {
                continue;
            }
            let inst = function.inst(id);
            if inst.is_volatile() {
                continue;
            }
            let Some(output) = inst.output.clone() else { continue };
            // a phi feeding only itself around a loop is still dead
            let alive = uses.get(&output).is_some_and(|users| {
                users.iter().any(|user| *user != id && !removed.contains(user))
            });
            if alive {
                continue;
            }

            for var in function.inst(id).input_variables().cloned().collect::<Vec<_>>() {
                if let Some(users) = uses.get_mut(&var) {
                    users.shift_remove(&id);
                }
                if let Some(p) = dfg.producing_instruction(&var) {
                    worklist.push(p);
                }
            }
            removed.insert(id);
        }

        if removed.is_empty() {
            return Ok(false);
        }
        for &id in &removed {
            let block = function.inst(id).parent;
            function.block_mut(block).mark_for_removal(id);
        }
        function.drain_dead_instructions();
        cache.invalidate(AnalysisKind::Dfg);
        Ok(true)
    }
}
