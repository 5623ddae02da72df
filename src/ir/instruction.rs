// src/ir/instruction.rs
use super::{BlockId, IrLabel, IrVariable, Opcode, Operand};
use std::collections::HashMap;
use std::fmt;

/// A single IR instruction: an opcode, an ordered operand list, and an
/// optional output variable.
///
/// Convention: the rightmost operand is the top of the operand stack at
/// emission time. `parent` is a non-owning handle to the block currently
/// holding this instruction; splicing passes must keep it current.
#[derive(Debug, Clone, PartialEq)]
pub struct IrInstruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub output: Option<IrVariable>,
    pub parent: BlockId,
    pub annotation: Option<String>,
    pub error_msg: Option<String>,
}

impl IrInstruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        IrInstruction {
            opcode,
            operands,
            output: None,
            parent: BlockId::INVALID,
            annotation: None,
            error_msg: None,
        }
    }

    pub fn with_output(mut self, output: IrVariable) -> Self {
        self.output = Some(output);
        self
    }

    pub fn is_volatile(&self) -> bool {
        self.opcode.is_volatile()
    }

    pub fn is_commutative(&self) -> bool {
        self.opcode.is_commutative()
    }

    pub fn is_comparator(&self) -> bool {
        self.opcode.is_comparator()
    }

    pub fn flippable(&self) -> bool {
        self.is_commutative() || self.is_comparator()
    }

    pub fn is_bb_terminator(&self) -> bool {
        self.opcode.is_bb_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.opcode == Opcode::Phi
    }

    pub fn is_param(&self) -> bool {
        self.opcode == Opcode::Param
    }

    /// Pseudo instructions exist only in the IR (`phi`, `param`); they emit
    /// no machine code of their own.
    pub fn is_pseudo(&self) -> bool {
        self.is_phi() || self.is_param()
    }

    pub fn label_operands(&self) -> impl Iterator<Item = &IrLabel> {
        self.operands.iter().filter_map(Operand::as_label)
    }

    pub fn non_label_operands(&self) -> impl Iterator<Item = &Operand> {
        self.operands.iter().filter(|op| !op.is_label())
    }

    pub fn input_variables(&self) -> impl Iterator<Item = &IrVariable> {
        self.operands.iter().filter_map(Operand::as_variable)
    }

    /// Phi operands as `(incoming label, value)` pairs.
    pub fn phi_operands(&self) -> impl Iterator<Item = (&IrLabel, &Operand)> {
        debug_assert!(self.is_phi(), "phi_operands on {}", self.opcode);
        self.operands.chunks_exact(2).map(|pair| {
            let label = pair[0].as_label().expect("phi operand pair must start with a label");
            (label, &pair[1])
        })
    }

    /// Drops the `(label, value)` pair for one predecessor.
    pub fn remove_phi_operand(&mut self, label: &IrLabel) {
        debug_assert!(self.is_phi());
        for i in (0..self.operands.len()).step_by(2) {
            if self.operands[i].as_label() == Some(label) {
                self.operands.drain(i..i + 2);
                return;
            }
        }
    }

    pub fn make_nop(&mut self) {
        self.opcode = Opcode::Nop;
        self.output = None;
        self.operands.clear();
        self.annotation = None;
    }

    /// Flips the operands of a commutative or comparator instruction; for
    /// comparators the opcode mirrors (`gt` <-> `lt`, `sgt` <-> `slt`).
    pub fn flip(&mut self) {
        debug_assert!(self.flippable());
        self.operands.reverse();
        self.opcode = match self.opcode {
            Opcode::Gt => Opcode::Lt,
            Opcode::Lt => Opcode::Gt,
            Opcode::Sgt => Opcode::Slt,
            Opcode::Slt => Opcode::Sgt,
            other => other,
        };
    }

    pub fn replace_operands(&mut self, replacements: &HashMap<Operand, Operand>) {
        for operand in &mut self.operands {
            if let Some(replacement) = replacements.get(operand) {
                *operand = replacement.clone();
            }
        }
    }

    pub fn replace_label_operands(&mut self, replacements: &HashMap<IrLabel, IrLabel>) {
        for operand in &mut self.operands {
            if let Operand::Label(label) = operand
                && let Some(replacement) = replacements.get(label)
            {
                *operand = Operand::Label(replacement.clone());
            }
        }
    }
}

impl fmt::Display for IrInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(output) = &self.output {
            write!(f, "{output} = ")?;
        }
        // `store` prints as a bare assignment
        if self.opcode != Opcode::Store {
            write!(f, "{}", self.opcode)?;
            if !self.operands.is_empty() {
                f.write_str(" ")?;
            }
        }

        // operands print in stack order (top first) except for control flow
        // and pseudo opcodes, whose textual order is positional
        let positional = matches!(
            self.opcode,
            Opcode::Jmp | Opcode::Jnz | Opcode::Djmp | Opcode::Phi | Opcode::Param
        );
        if self.opcode == Opcode::Invoke {
            let (callee, args) = self.operands.split_first().expect("invoke without callee");
            render_operands(f, &mut std::iter::once(callee).chain(args.iter().rev()))?;
        } else if positional {
            render_operands(f, &mut self.operands.iter())?;
        } else {
            render_operands(f, &mut self.operands.iter().rev())?;
        }

        if let Some(annotation) = &self.annotation {
            write!(f, " ; {annotation}")?;
        }
        Ok(())
    }
}

fn render_operands(
    f: &mut fmt::Formatter<'_>,
    operands: &mut dyn Iterator<Item = &Operand>,
) -> fmt::Result {
    for (i, operand) in operands.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{operand}")?;
    }
    Ok(())
}
