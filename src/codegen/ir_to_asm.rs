// src/codegen/ir_to_asm.rs
//! The stack scheduler: linearizes each function into stack-machine
//! assembly.
//!
//! Blocks are emitted in CFG depth-first order. A [`StackModel`] tracks
//! what the operand stack holds; instruction inputs are materialized on
//! demand (literals and labels are pushed, variables recurse into their
//! producer within the same block and fence region), values still needed
//! later are `DUP`ed, and operands are `SWAP`-shuffled so the rightmost
//! ends on top. At every jump the stack is reconciled with the layout the
//! successor expects, which is also where phi operands are routed.
//!
//! Emission requires a normalized CFG: a join block is only entered through
//! unconditional jumps.

use super::asm::{AsmItem, push_word};
use super::stack::StackModel;
use crate::analysis::{AnalysisCache, DfgAnalysis, LivenessAnalysis};
use crate::error::CompileError;
use crate::ir::{BlockId, InstId, IrContext, IrFunction, IrVariable, Opcode, Operand, Word};
use crate::passes::{Normalization, run_pass_everywhere};
use num_traits::Zero;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Compiles a whole context to assembly. `optimize` enables the final
/// peephole cleanup on the emitted items; everything heavier belongs to the
/// linker stage.
pub fn generate_assembly(
    ctx: &mut IrContext,
    optimize: bool,
) -> Result<Vec<AsmItem>, CompileError> {
    run_pass_everywhere(ctx, &mut Normalization::new())?;

    let mut asm: Vec<AsmItem> = Vec::new();
    let mut label_counter = 0usize;

    for name in ctx.function_names() {
        let Some(function) = ctx.get_function_mut(&name) else { continue };
        let mut cache = AnalysisCache::new();
        let liveness = cache.request_liveness(function)?;
        let dfg = cache.request_dfg(function)?;

        let mut emitter = FunctionEmitter::new(function, liveness, dfg, &mut label_counter);
        emitter.emit(&mut asm)?;
    }

    // shared revert target for asserts
    asm.push(AsmItem::Symbol("_sym___revert".to_owned()));
    asm.push(AsmItem::op("JUMPDEST"));
    asm.push(AsmItem::op("PUSH0"));
    asm.push(AsmItem::op("DUP1"));
    asm.push(AsmItem::op("REVERT"));

    for inst in &ctx.data_segment {
        if let Some(label) = inst.operands.first().and_then(Operand::as_label) {
            match inst.opcode {
                Opcode::Dbname => asm.push(AsmItem::Symbol(format!("_data_{}", label.name()))),
                _ => asm.push(AsmItem::symbol(label.name())),
            }
        }
    }

    if optimize {
        peephole(&mut asm);
    }
    Ok(asm)
}

/// The deliberately small local cleanup: adjacent self-inverse swaps and
/// truthiness-preserving `ISZERO ISZERO` before `JUMPI`. Real assembly
/// optimization happens after linking.
fn peephole(asm: &mut Vec<AsmItem>) {
    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i + 1 < asm.len() {
            let drop_pair = match (&asm[i], &asm[i + 1]) {
                (AsmItem::Op(a), AsmItem::Op(b)) => {
                    (a == b && a.starts_with("SWAP"))
                        || (a == "ISZERO"
                            && b == "ISZERO"
                            && matches!(asm.get(i + 2), Some(AsmItem::Op(op)) if op == "JUMPI"))
                }
                _ => false,
            };
            if drop_pair {
                asm.drain(i..i + 2);
                changed = true;
            } else {
                i += 1;
            }
        }
    }
}

struct FunctionEmitter<'a> {
    function: &'a IrFunction,
    liveness: Rc<LivenessAnalysis>,
    dfg: Rc<DfgAnalysis>,
    /// Remaining consumptions per variable (phi operands excluded; edges
    /// route those).
    remaining_uses: HashMap<IrVariable, usize>,
    fences: HashMap<InstId, u32>,
    visited_blocks: HashSet<BlockId>,
    visited_insts: HashSet<InstId>,
    label_counter: &'a mut usize,
}

impl<'a> FunctionEmitter<'a> {
    fn new(
        function: &'a IrFunction,
        liveness: Rc<LivenessAnalysis>,
        dfg: Rc<DfgAnalysis>,
        label_counter: &'a mut usize,
    ) -> Self {
        let mut remaining_uses: HashMap<IrVariable, usize> = HashMap::new();
        let mut fences: HashMap<InstId, u32> = HashMap::new();
        for &block in function.body() {
            let mut fence = 0;
            for &id in function.inst_ids_of(block) {
                let inst = function.inst(id);
                fences.insert(id, fence);
                if inst.is_volatile() {
                    fence += 1;
                }
                if inst.is_phi() {
                    continue;
                }
                for var in inst.input_variables() {
                    *remaining_uses.entry(var.clone()).or_insert(0) += 1;
                }
            }
        }

        FunctionEmitter {
            function,
            liveness,
            dfg,
            remaining_uses,
            fences,
            visited_blocks: HashSet::new(),
            visited_insts: HashSet::new(),
            label_counter,
        }
    }

    fn emit(&mut self, asm: &mut Vec<AsmItem>) -> Result<(), CompileError> {
        // the caller pushed the arguments and the return address; params
        // pop top-down, so the first param's value sits on top
        let mut stack = StackModel::new();
        let entry = self.function.entry();
        let params: Vec<IrVariable> = self
            .function
            .instructions_of(entry)
            .take_while(|inst| inst.is_param())
            .filter_map(|inst| inst.output.clone())
            .collect();
        for param in params.iter().rev() {
            stack.push(Operand::Variable(param.clone()));
        }

        self.emit_block(entry, stack, asm)
    }

    fn emit_block(
        &mut self,
        block: BlockId,
        mut stack: StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        if !self.visited_blocks.insert(block) {
            return Ok(());
        }

        asm.push(AsmItem::symbol(&self.function.block(block).label));
        asm.push(AsmItem::op("JUMPDEST"));

        // route phi operands: the predecessor left the incoming value on
        // the stack; it becomes the phi output by renaming in the model
        for &phi in &self.function.phi_ids_of(block) {
            let inst = self.function.inst(phi);
            let Some(output) = inst.output.clone() else { continue };
            let slot = inst.phi_operands().find_map(|(_, operand)| stack.depth_of(operand));
            match slot {
                Some(depth) => stack.poke(depth, Operand::Variable(output)),
                None => {
                    return Err(CompileError::bug(format!(
                        "no incoming value on the stack for phi {output} in block {}",
                        self.function.block(block).label
                    )));
                }
            }
            self.visited_insts.insert(phi);
        }

        // drop inherited values that are dead here; the reference point is
        // the first real instruction, after phi outputs and params exist
        let live = self
            .function
            .inst_ids_of(block)
            .iter()
            .copied()
            .find(|&id| !self.function.inst(id).is_pseudo())
            .map_or_else(
                || self.liveness.block_live_in(block).clone(),
                |id| self.liveness.live_in(id).clone(),
            );
        loop {
            let surplus = stack.items().iter().rev().position(|item| match item {
                Operand::Variable(var) => !live.contains(var),
                _ => true,
            });
            let Some(depth) = surplus else { break };
            stack.swap(asm, depth)?;
            stack.pop_top(asm);
        }

        for &id in self.function.inst_ids_of(block) {
            self.emit_inst(id, &mut stack, asm)?;
        }

        for &succ in &self.function.block(block).cfg_out {
            self.emit_block(succ, stack.clone(), asm)?;
        }
        Ok(())
    }

    fn emit_inst(
        &mut self,
        id: InstId,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        if !self.visited_insts.insert(id) {
            return Ok(());
        }

        match self.function.inst(id).opcode {
            Opcode::Phi | Opcode::Param | Opcode::Nop => Ok(()),
            Opcode::Alloca => {
                // the buffer address is the value
                let offset =
                    self.function.inst(id).operands.get(1).cloned().unwrap_or(Operand::literal(0));
                self.push_operand(&offset, asm);
                if let Some(output) = self.function.inst(id).output.clone() {
                    stack.push(Operand::Variable(output));
                } else {
                    stack.push(offset);
                }
                Ok(())
            }
            Opcode::Store => {
                let operand = self.function.inst(id).operands[0].clone();
                self.bring_to_top(&operand, id, stack, asm)?;
                stack.pop(1);
                if let Some(output) = self.function.inst(id).output.clone() {
                    stack.push(Operand::Variable(output));
                }
                Ok(())
            }
            Opcode::Jmp => {
                let target = self.jump_target(id, 0)?;
                self.arrange_for_successor(id, target, stack, asm)?;
                asm.push(AsmItem::symbol(&self.function.block(target).label));
                asm.push(AsmItem::op("JUMP"));
                Ok(())
            }
            Opcode::Jnz => {
                let cond = self.function.inst(id).operands[0].clone();
                self.bring_to_top(&cond, id, stack, asm)?;
                stack.pop(1);
                let then_target = self.jump_target(id, 1)?;
                let else_target = self.jump_target(id, 2)?;
                asm.push(AsmItem::symbol(&self.function.block(then_target).label));
                asm.push(AsmItem::op("JUMPI"));
                asm.push(AsmItem::symbol(&self.function.block(else_target).label));
                asm.push(AsmItem::op("JUMP"));
                Ok(())
            }
            Opcode::Djmp => {
                let selector = self.function.inst(id).operands[0].clone();
                self.bring_to_top(&selector, id, stack, asm)?;
                stack.pop(1);
                asm.push(AsmItem::op("JUMP"));
                Ok(())
            }
            Opcode::Invoke => self.emit_invoke(id, stack, asm),
            Opcode::Deploy => {
                self.emit_deploy(id, asm);
                Ok(())
            }
            _ => self.emit_generic(id, stack, asm),
        }
    }

    /// The shared emission path: materialize, duplicate, shuffle, account,
    /// then produce the mnemonic or expansion.
    fn emit_generic(
        &mut self,
        id: InstId,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        let operands = self.function.inst(id).operands.clone();

        for operand in &operands {
            self.materialize(operand, id, stack, asm)?;
        }
        for operand in &operands {
            self.prepare_consumption(operand, stack, asm)?;
        }
        self.shuffle(&operands, stack, asm)?;

        stack.pop(operands.len());
        if let Some(output) = self.function.inst(id).output.clone() {
            stack.push(Operand::Variable(output));
        }

        self.emit_opcode(id, asm);
        Ok(())
    }

    /// Materializes one operand, duplicates it when later uses remain, and
    /// swaps it to the top of the stack.
    fn bring_to_top(
        &mut self,
        operand: &Operand,
        consumer: InstId,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        self.materialize(operand, consumer, stack, asm)?;
        self.prepare_consumption(operand, stack, asm)?;
        let depth = stack
            .depth_of(operand)
            .ok_or_else(|| CompileError::bug(format!("{operand} not on stack")))?;
        stack.swap(asm, depth)
    }

    /// Ensures an operand is somewhere on the stack: pushes literals and
    /// labels, recurses into producers for variables defined later in the
    /// same fence region.
    fn materialize(
        &mut self,
        operand: &Operand,
        consumer: InstId,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        match operand {
            Operand::Literal(_) | Operand::Label(_) => {
                self.push_operand(operand, asm);
                stack.push(operand.clone());
                Ok(())
            }
            Operand::Variable(var) => {
                if stack.depth_of(operand).is_some() {
                    return Ok(());
                }
                let producer = self
                    .dfg
                    .producing_instruction(var)
                    .ok_or_else(|| CompileError::bug(format!("variable {var} has no producer")))?;
                let same_region = self.function.inst(producer).parent
                    == self.function.inst(consumer).parent
                    && self.fences.get(&producer) == self.fences.get(&consumer);
                if !same_region || self.visited_insts.contains(&producer) {
                    return Err(CompileError::bug(format!(
                        "variable {var} is not available on the stack"
                    )));
                }
                self.emit_inst(producer, stack, asm)?;
                if stack.depth_of(operand).is_none() {
                    return Err(CompileError::bug(format!(
                        "producer of {var} did not leave it on the stack"
                    )));
                }
                Ok(())
            }
        }
    }

    fn push_operand(&mut self, operand: &Operand, asm: &mut Vec<AsmItem>) {
        match operand {
            Operand::Literal(value) => push_word(asm, value),
            Operand::Label(label) => asm.push(AsmItem::symbol(label)),
            Operand::Variable(_) => unreachable!("variables are materialized via producers"),
        }
    }

    /// Accounts one consumption of an operand: a variable still needed
    /// afterwards is `DUP`ed so this instruction eats the copy.
    fn prepare_consumption(
        &mut self,
        operand: &Operand,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        let Operand::Variable(var) = operand else { return Ok(()) };
        let remaining = self.remaining_uses.get(var).copied().unwrap_or(0);
        if remaining > 1 {
            let depth = stack
                .depth_of(operand)
                .ok_or_else(|| CompileError::bug(format!("{operand} not on stack")))?;
            stack.dup(asm, depth)?;
        }
        if let Some(count) = self.remaining_uses.get_mut(var) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    /// Swaps operands into opcode order: `operands[i]` must end at depth
    /// `n-1-i`, so the rightmost operand is on top.
    fn shuffle(
        &mut self,
        operands: &[Operand],
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        let n = operands.len();
        for (i, operand) in operands.iter().enumerate() {
            let final_depth = n - 1 - i;
            if stack.peek(final_depth) == Some(operand) {
                continue;
            }
            let depth = stack
                .depth_of(operand)
                .ok_or_else(|| CompileError::bug(format!("{operand} not on stack")))?;
            if final_depth == 0 {
                stack.swap(asm, depth)?;
            } else if depth == 0 {
                stack.swap(asm, final_depth)?;
            } else {
                stack.swap(asm, depth)?;
                stack.swap(asm, final_depth)?;
            }
        }
        Ok(())
    }

    fn jump_target(&self, id: InstId, operand: usize) -> Result<BlockId, CompileError> {
        let inst = self.function.inst(id);
        let label = inst.operands.get(operand).and_then(Operand::as_label).ok_or_else(|| {
            CompileError::bug(format!("{} without a label operand {operand}", inst.opcode))
        })?;
        self.function
            .block_by_label(label)
            .ok_or_else(|| CompileError::structure(format!("jump to unknown label {label}")))
    }

    /// Brings the stack to the exact layout `target` expects on the edge
    /// leaving `id`'s block: the target's live-in set with each phi slot
    /// carrying this edge's incoming operand.
    fn arrange_for_successor(
        &mut self,
        id: InstId,
        target: BlockId,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        let source = self.function.inst(id).parent;
        let source_label = self.function.block(source).label.clone();

        let mut desired: Vec<Operand> = Vec::new();
        let mut phi_outputs: HashSet<IrVariable> = HashSet::new();
        let mut edge_operands: Vec<Operand> = Vec::new();
        for &phi in &self.function.phi_ids_of(target) {
            let inst = self.function.inst(phi);
            if let Some(output) = &inst.output {
                phi_outputs.insert(output.clone());
            }
            for (label, operand) in inst.phi_operands() {
                if label == &source_label {
                    edge_operands.push(operand.clone());
                }
            }
        }
        for var in self.liveness.block_live_in(target) {
            if !phi_outputs.contains(var) {
                desired.push(Operand::Variable(var.clone()));
            }
        }
        desired.extend(edge_operands);

        // multiset of what the edge needs
        let mut needed: HashMap<Operand, usize> = HashMap::new();
        for operand in &desired {
            *needed.entry(operand.clone()).or_insert(0) += 1;
        }

        // drop surplus values
        loop {
            let mut counts: HashMap<Operand, usize> = HashMap::new();
            let mut surplus_depth = None;
            for (depth, item) in stack.items().iter().rev().enumerate() {
                let seen = counts.entry(item.clone()).or_insert(0);
                *seen += 1;
                if *seen > needed.get(item).copied().unwrap_or(0) {
                    surplus_depth = Some(depth);
                    break;
                }
            }
            let Some(depth) = surplus_depth else { break };
            stack.swap(asm, depth)?;
            stack.pop_top(asm);
        }

        // materialize what is missing: literals are pushed, variables are
        // duplicated from their existing copy
        for operand in &desired {
            let have = stack.count_of(operand);
            let need = needed[operand];
            for _ in have..need {
                match operand {
                    Operand::Literal(_) | Operand::Label(_) => {
                        self.push_operand(operand, asm);
                        stack.push(operand.clone());
                    }
                    Operand::Variable(_) => {
                        let depth = stack.depth_of(operand).ok_or_else(|| {
                            CompileError::bug(format!(
                                "{operand} needed by {} but not on the stack",
                                self.function.block(target).label
                            ))
                        })?;
                        stack.dup(asm, depth)?;
                    }
                }
            }
        }

        self.shuffle(&desired, stack, asm)?;
        Ok(())
    }

    fn emit_invoke(
        &mut self,
        id: InstId,
        stack: &mut StackModel,
        asm: &mut Vec<AsmItem>,
    ) -> Result<(), CompileError> {
        let inst = self.function.inst(id);
        let callee = inst.operands[0]
            .as_label()
            .ok_or_else(|| CompileError::bug("invoke of a non-label".to_owned()))?
            .clone();
        let args: Vec<Operand> = inst.operands[1..].to_vec();

        for operand in &args {
            self.materialize(operand, id, stack, asm)?;
        }
        for operand in &args {
            self.prepare_consumption(operand, stack, asm)?;
        }
        self.shuffle(&args, stack, asm)?;

        let ret_label = format!("_sym_label_ret_{}", self.label_counter);
        *self.label_counter += 1;
        asm.push(AsmItem::Symbol(ret_label.clone()));
        asm.push(AsmItem::symbol(&callee));
        asm.push(AsmItem::op("JUMP"));
        asm.push(AsmItem::Symbol(ret_label));
        asm.push(AsmItem::op("JUMPDEST"));

        stack.pop(args.len());
        if let Some(output) = self.function.inst(id).output.clone() {
            stack.push(Operand::Variable(output));
        }
        Ok(())
    }

    fn emit_deploy(&mut self, id: InstId, asm: &mut Vec<AsmItem>) {
        let inst = self.function.inst(id);
        let padding: Word = inst
            .operands
            .get(1)
            .and_then(Operand::as_literal)
            .cloned()
            .unwrap_or_else(Word::zero);

        asm.push(AsmItem::Symbol("_sym_subcode_size".to_owned()));
        asm.push(AsmItem::Symbol("_sym_runtime_begin".to_owned()));
        asm.push(AsmItem::Symbol("_mem_deploy_start".to_owned()));
        asm.push(AsmItem::op("CODECOPY"));
        asm.push(AsmItem::Symbol("_sym_subcode_size".to_owned()));
        if !padding.is_zero() {
            push_word(asm, &padding);
            asm.push(AsmItem::op("ADD"));
        }
        asm.push(AsmItem::Symbol("_mem_deploy_start".to_owned()));
        asm.push(AsmItem::op("RETURN"));
    }

    /// The mnemonic or fixed expansion for an already-scheduled opcode.
    fn emit_opcode(&mut self, id: InstId, asm: &mut Vec<AsmItem>) {
        let opcode = self.function.inst(id).opcode;
        match opcode {
            Opcode::Assert | Opcode::AssertUnreachable => {
                asm.push(AsmItem::op("ISZERO"));
                asm.push(AsmItem::Symbol("_sym___revert".to_owned()));
                asm.push(AsmItem::op("JUMPI"));
            }
            Opcode::Sha3_64 => {
                push_word(asm, &Word::from(32u32));
                asm.push(AsmItem::op("MSTORE"));
                asm.push(AsmItem::op("PUSH0"));
                asm.push(AsmItem::op("MSTORE"));
                push_word(asm, &Word::from(64u32));
                asm.push(AsmItem::op("PUSH0"));
                asm.push(AsmItem::op("SHA3"));
            }
            Opcode::Ret => {
                asm.push(AsmItem::op("JUMP"));
            }
            Opcode::Exit => {
                asm.push(AsmItem::op("STOP"));
            }
            Opcode::Iload => {
                asm.push(AsmItem::Symbol("_sym_code_end".to_owned()));
                asm.push(AsmItem::op("ADD"));
                asm.push(AsmItem::op("MLOAD"));
            }
            Opcode::Istore => {
                asm.push(AsmItem::Symbol("_sym_code_end".to_owned()));
                asm.push(AsmItem::op("ADD"));
                asm.push(AsmItem::op("MSTORE"));
            }
            Opcode::Dload => {
                asm.push(AsmItem::Symbol("_sym_code_end".to_owned()));
                asm.push(AsmItem::op("ADD"));
                push_word(asm, &Word::from(32u32));
                asm.push(AsmItem::op("SWAP1"));
                asm.push(AsmItem::op("PUSH0"));
                asm.push(AsmItem::op("CODECOPY"));
                asm.push(AsmItem::op("PUSH0"));
                asm.push(AsmItem::op("MLOAD"));
            }
            Opcode::Dloadbytes => {
                asm.push(AsmItem::op("SWAP1"));
                asm.push(AsmItem::Symbol("_sym_code_end".to_owned()));
                asm.push(AsmItem::op("ADD"));
                asm.push(AsmItem::op("SWAP1"));
                asm.push(AsmItem::op("CODECOPY"));
            }
            _ => {
                asm.push(AsmItem::Op(opcode.as_str().to_uppercase()));
            }
        }
    }
}
