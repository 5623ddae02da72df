// src/passes/mem2var.rs
//! Promotes stack-allocated scalars to virtual registers.
//!
//! An `alloca` whose address is only ever consumed by `mload`, `mstore` and
//! `return` is promoted: loads and stores of the buffer become plain
//! register copies, and a `return` of the buffer writes the promoted value
//! back to memory right before returning. Any other use pins the buffer.
//! The promoted register is multiply-assigned, so SSA construction must run
//! again afterwards.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind};
use crate::error::CompileError;
use crate::ir::{InstId, IrFunction, IrInstruction, IrVariable, Opcode, Operand};

#[derive(Debug, Default)]
pub struct Mem2Var {
    promoted: usize,
}

impl Mem2Var {
    pub fn new() -> Self {
        Mem2Var::default()
    }

    fn promote(&mut self, function: &mut IrFunction, uses: &[InstId]) {
        let register = IrVariable::new(format!("addr_{}", self.promoted));
        self.promoted += 1;

        for &id in uses {
            match function.inst(id).opcode {
                Opcode::Mload => {
                    let inst = function.inst_mut(id);
                    inst.opcode = Opcode::Store;
                    inst.operands = vec![Operand::Variable(register.clone())];
                }
                Opcode::Mstore => {
                    let inst = function.inst_mut(id);
                    inst.opcode = Opcode::Store;
                    inst.operands = vec![inst.operands[0].clone()];
                    inst.output = Some(register.clone());
                }
                Opcode::Return => {
                    // re-materialize the buffer: write the promoted value
                    // back through a fresh pointer just before returning
                    let block = function.inst(id).parent;
                    let pointer = function.inst(id).operands[1].clone();
                    let fresh = function.get_next_variable();
                    let index = function
                        .inst_ids_of(block)
                        .iter()
                        .position(|&i| i == id)
                        .expect("return instruction not in its parent block");
                    let copy = IrInstruction::new(Opcode::Store, vec![pointer])
                        .with_output(fresh.clone());
                    function.insert_instruction(block, index, copy);
                    let write = IrInstruction::new(
                        Opcode::Mstore,
                        vec![Operand::Variable(register.clone()), Operand::Variable(fresh.clone())],
                    );
                    function.insert_instruction(block, index + 1, write);
                    function.inst_mut(id).operands[1] = Operand::Variable(fresh);
                }
                _ => unreachable!("disqualified use survived candidate filter"),
            }
        }
    }
}

impl Pass for Mem2Var {
    fn name(&self) -> &'static str {
        "mem2var"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        cache.request_cfg(function)?;
        let dfg = cache.request_dfg(function)?;

        let mut candidates: Vec<Vec<InstId>> = Vec::new();
        for var in dfg.variables() {
            let Some(producer) = dfg.producing_instruction(var) else { continue };
            if function.inst(producer).opcode != Opcode::Alloca {
                continue;
            }
            let uses: Vec<InstId> = dfg.uses(var).iter().copied().collect();
            // loads of a never-written buffer and stores never read back
            // are left for dead-code removal
            if uses.iter().all(|&id| function.inst(id).opcode == Opcode::Mload) {
                continue;
            }
            if uses.iter().all(|&id| function.inst(id).opcode == Opcode::Mstore) {
                continue;
            }
            if uses.iter().all(|&id| {
                matches!(
                    function.inst(id).opcode,
                    Opcode::Mload | Opcode::Mstore | Opcode::Return
                )
            }) {
                candidates.push(uses);
            }
        }

        let changed = !candidates.is_empty();
        for uses in candidates {
            self.promote(function, &uses);
        }

        if changed {
            cache.invalidate(AnalysisKind::Dfg);
        }
        Ok(changed)
    }
}
