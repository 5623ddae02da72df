// src/codegen/stack.rs
use super::asm::AsmItem;
use crate::error::CompileError;
use crate::ir::Operand;

/// EVM reach limit for DUP/SWAP.
const MAX_STACK_REACH: usize = 16;

/// The virtual operand stack maintained during emission. The last element
/// is the top of the physical stack; every `DUP`/`SWAP`/`POP` the emitter
/// produces goes through here so model and machine stay in lockstep.
#[derive(Debug, Clone, Default)]
pub struct StackModel {
    items: Vec<Operand>,
}

impl StackModel {
    pub fn new() -> Self {
        StackModel::default()
    }

    pub fn height(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Operand] {
        &self.items
    }

    /// Distance from the top of the topmost occurrence (0 = top).
    pub fn depth_of(&self, operand: &Operand) -> Option<usize> {
        self.items.iter().rev().position(|item| item == operand)
    }

    pub fn count_of(&self, operand: &Operand) -> usize {
        self.items.iter().filter(|item| *item == operand).count()
    }

    pub fn peek(&self, depth: usize) -> Option<&Operand> {
        let len = self.items.len();
        if depth < len { Some(&self.items[len - 1 - depth]) } else { None }
    }

    /// Overwrites the item at `depth` without touching the machine stack;
    /// used to rename a phi operand to the phi output.
    pub fn poke(&mut self, depth: usize, operand: Operand) {
        let len = self.items.len();
        debug_assert!(depth < len);
        self.items[len - 1 - depth] = operand;
    }

    pub fn push(&mut self, operand: Operand) {
        self.items.push(operand);
    }

    pub fn pop(&mut self, count: usize) {
        let len = self.items.len();
        debug_assert!(count <= len);
        self.items.truncate(len - count);
    }

    /// Emits `POP`, discarding the top item.
    pub fn pop_top(&mut self, asm: &mut Vec<AsmItem>) {
        self.items.pop();
        asm.push(AsmItem::op("POP"));
    }

    /// Emits `SWAPn`, exchanging the top with the item at `depth`.
    pub fn swap(&mut self, asm: &mut Vec<AsmItem>, depth: usize) -> Result<(), CompileError> {
        if depth == 0 {
            return Ok(());
        }
        if depth > MAX_STACK_REACH {
            return Err(CompileError::bug(format!("stack too deep: SWAP{depth}")));
        }
        let len = self.items.len();
        self.items.swap(len - 1, len - 1 - depth);
        asm.push(AsmItem::Op(format!("SWAP{depth}")));
        Ok(())
    }

    /// Emits `DUPn`, copying the item at `depth` onto the top.
    pub fn dup(&mut self, asm: &mut Vec<AsmItem>, depth: usize) -> Result<(), CompileError> {
        if depth >= MAX_STACK_REACH {
            return Err(CompileError::bug(format!("stack too deep: DUP{}", depth + 1)));
        }
        let item = self
            .peek(depth)
            .ok_or_else(|| CompileError::bug(format!("DUP past stack bottom: {depth}")))?
            .clone();
        self.items.push(item);
        asm.push(AsmItem::Op(format!("DUP{}", depth + 1)));
        Ok(())
    }
}
