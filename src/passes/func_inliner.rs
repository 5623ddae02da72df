// src/passes/func_inliner.rs
//! Inlining of single-call-site functions.
//!
//! Runs on the whole context before SSA construction, so spliced code
//! contains no phis. A callee with exactly one `invoke` site is cloned into
//! the caller with a fresh prefix on labels and variable names: `param`
//! instructions become copies of the caller's actuals, `ret` becomes a jump
//! to the split-off continuation block, and the callee is dropped from the
//! context.
//!
//! Calling convention: the callee's first `param` receives the return
//! address pushed by `invoke`; the remaining params receive the arguments
//! top-of-stack first. A callee whose params do not line up with the call
//! site is left alone.

use crate::analysis::FcgAnalysis;
use crate::error::CompileError;
use crate::ir::{
    BlockId, InstId, IrContext, IrFunction, IrInstruction, IrLabel, IrVariable, Opcode, Operand,
};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct FuncInliner {
    inlined: usize,
}

impl FuncInliner {
    pub fn new() -> Self {
        FuncInliner::default()
    }

    pub fn run_on_context(&mut self, ctx: &mut IrContext) -> Result<bool, CompileError> {
        let mut changed = false;
        let mut rejected: HashSet<IrLabel> = HashSet::new();
        loop {
            let fcg = FcgAnalysis::analyze(ctx);
            let candidate = ctx.function_names().into_iter().find_map(|name| {
                if rejected.contains(&name) {
                    return None;
                }
                let sites = fcg.invoke_sites(&name);
                match sites {
                    [(caller, inst)] if caller != &name => {
                        Some((name.clone(), caller.clone(), *inst))
                    }
                    _ => None,
                }
            });
            let Some((callee, caller, invoke)) = candidate else { break };

            if self.inline_call_site(ctx, &callee, &caller, invoke)? {
                ctx.remove_function(&callee);
                changed = true;
            } else {
                rejected.insert(callee);
            }
        }
        Ok(changed)
    }

    fn inline_call_site(
        &mut self,
        ctx: &mut IrContext,
        callee_name: &IrLabel,
        caller_name: &IrLabel,
        invoke: InstId,
    ) -> Result<bool, CompileError> {
        let callee = ctx.expect_function(callee_name)?.clone();
        let params = leading_params(&callee);
        let invoke_args = ctx
            .expect_function(caller_name)?
            .inst(invoke)
            .operands
            .len()
            .saturating_sub(1);
        // first param is the return address; the rest must match the site
        if params.len() != invoke_args + 1 {
            return Ok(false);
        }

        let prefix = format!("inl{}_", self.inlined);
        self.inlined += 1;

        let caller = ctx
            .get_function_mut(caller_name)
            .ok_or_else(|| CompileError::bug(format!("caller {caller_name} disappeared")))?;
        let invoke_inst = caller.inst(invoke).clone();
        let call_block = invoke_inst.parent;

        // split off the continuation: everything after the invoke
        let continuation_label = caller.get_next_label("inline_cont");
        let continuation = caller.append_basic_block(continuation_label.clone());
        let call_index = caller
            .inst_ids_of(call_block)
            .iter()
            .position(|&id| id == invoke)
            .ok_or_else(|| CompileError::bug("invoke not in its parent block".to_owned()))?;
        let tail: Vec<InstId> =
            caller.block_mut(call_block).insts.split_off(call_index + 1);
        caller.block_mut(call_block).insts.pop(); // the invoke itself
        for &id in &tail {
            caller.inst_mut(id).parent = continuation;
        }
        caller.block_mut(continuation).insts = tail;

        // clone the callee body under fresh labels
        let mut label_map: HashMap<IrLabel, IrLabel> = HashMap::new();
        for &block in callee.body() {
            let old = callee.block(block).label.clone();
            label_map.insert(
                old.clone(),
                IrLabel::new(format!("{prefix}{}", old.name())),
            );
        }

        let mut entry_label = None;
        let mut cloned_blocks: Vec<BlockId> = Vec::new();
        for &block in callee.body() {
            let old_label = callee.block(block).label.clone();
            let new_label = label_map[&old_label].clone();
            if block == callee.entry() {
                entry_label = Some(new_label.clone());
            }
            let new_block = caller.append_basic_block(new_label);
            cloned_blocks.push(new_block);

            for inst in callee.instructions_of(block) {
                let mut inst = inst.clone();
                rename_variables(&mut inst, &prefix);
                inst.replace_label_operands(&label_map);
                caller.insert_instruction(new_block, caller.inst_ids_of(new_block).len(), inst);
            }
        }

        let entry_label = entry_label
            .ok_or_else(|| CompileError::bug(format!("callee {callee_name} has no entry")))?;

        // rewrite params: the first receives nothing (return address is not
        // materialized when inlining); the rest copy the actuals, where the
        // last invoke operand feeds the first argument param
        let entry_block = caller
            .block_by_label(&entry_label)
            .ok_or_else(|| CompileError::bug("cloned entry vanished".to_owned()))?;
        let cloned_params: Vec<InstId> = caller
            .inst_ids_of(entry_block)
            .iter()
            .copied()
            .filter(|&id| caller.inst(id).is_param())
            .collect();
        for (index, &id) in cloned_params.iter().enumerate() {
            let inst = caller.inst_mut(id);
            if index == 0 {
                inst.opcode = Opcode::Store;
                inst.operands = vec![Operand::literal(0)];
            } else {
                let actual = invoke_inst.operands[invoke_inst.operands.len() - index].clone();
                inst.opcode = Opcode::Store;
                inst.operands = vec![actual];
            }
        }

        // rewrite every cloned `ret` into a jump to the continuation,
        // forwarding the returned value into the invoke's output
        for block in cloned_blocks {
            let Some(terminator) = caller.terminator_of(block) else { continue };
            if caller.inst(terminator).opcode != Opcode::Ret {
                continue;
            }
            let ret_operands = caller.inst(terminator).operands.clone();
            if let (Some(output), 2) = (invoke_inst.output.clone(), ret_operands.len()) {
                let inst = caller.inst_mut(terminator);
                inst.opcode = Opcode::Store;
                inst.operands = vec![ret_operands[0].clone()];
                inst.output = Some(output);
                caller.append_instruction_ret(
                    block,
                    Opcode::Jmp,
                    vec![Operand::Label(continuation_label.clone())],
                    None,
                );
            } else {
                let inst = caller.inst_mut(terminator);
                inst.opcode = Opcode::Jmp;
                inst.operands = vec![Operand::Label(continuation_label.clone())];
                inst.output = None;
            }
        }

        // the call block now falls through to the cloned entry
        caller.append_instruction_ret(
            call_block,
            Opcode::Jmp,
            vec![Operand::Label(entry_label)],
            None,
        );

        Ok(true)
    }
}

/// The leading run of `param` outputs in the entry block.
fn leading_params(function: &IrFunction) -> Vec<IrVariable> {
    let mut params = Vec::new();
    for inst in function.instructions_of(function.entry()) {
        if inst.is_param() {
            if let Some(output) = &inst.output {
                params.push(output.clone());
            }
        } else {
            break;
        }
    }
    params
}

fn rename_variables(inst: &mut IrInstruction, prefix: &str) {
    for operand in &mut inst.operands {
        if let Operand::Variable(var) = operand {
            *operand = Operand::Variable(prefixed(var, prefix));
        }
    }
    if let Some(output) = inst.output.take() {
        inst.output = Some(prefixed(&output, prefix));
    }
}

fn prefixed(var: &IrVariable, prefix: &str) -> IrVariable {
    IrVariable::versioned(
        format!("{prefix}{}", var.name().trim_start_matches('%')),
        var.version(),
    )
}
