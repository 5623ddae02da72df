// src/ir/context.rs
use super::{IrFunction, IrInstruction, IrLabel, Opcode, Operand};
use crate::error::CompileError;
use std::fmt;

/// A compilation unit: the set of functions produced by one lowering, the
/// shared data segment, and the deploy-time parameters recorded by the
/// lowering.
#[derive(Debug, Clone, Default)]
pub struct IrContext {
    functions: Vec<IrFunction>,
    pub ctor_mem_size: Option<u64>,
    pub immutables_len: Option<u64>,
    pub data_segment: Vec<IrInstruction>,
    last_label: u32,
}

impl IrContext {
    pub fn new() -> Self {
        IrContext::default()
    }

    /// Creates (or returns the existing) function for a source-level name.
    /// The function label is a symbol so optimization passes preserve it.
    pub fn create_function(&mut self, name: &str) -> &mut IrFunction {
        let label = IrLabel::symbol(name);
        if let Some(index) = self.functions.iter().position(|f| f.name == label) {
            return &mut self.functions[index];
        }
        self.functions.push(IrFunction::new(label));
        self.functions.last_mut().expect("just pushed")
    }

    pub fn add_function(&mut self, function: IrFunction) {
        debug_assert!(self.get_function(&function.name).is_none());
        self.functions.push(function);
    }

    pub fn remove_function(&mut self, name: &IrLabel) {
        self.functions.retain(|f| &f.name != name);
    }

    pub fn get_function(&self, name: &IrLabel) -> Option<&IrFunction> {
        self.functions.iter().find(|f| &f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &IrLabel) -> Option<&mut IrFunction> {
        self.functions.iter_mut().find(|f| &f.name == name)
    }

    pub fn expect_function(&self, name: &IrLabel) -> Result<&IrFunction, CompileError> {
        self.get_function(name)
            .ok_or_else(|| CompileError::bug(format!("function {name} not found in context")))
    }

    /// Functions in creation order (deploy function first, when present).
    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.iter()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut IrFunction> {
        self.functions.iter_mut()
    }

    pub fn function_names(&self) -> Vec<IrLabel> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn get_next_label(&mut self, suffix: &str) -> IrLabel {
        self.last_label += 1;
        if suffix.is_empty() {
            IrLabel::new(self.last_label.to_string())
        } else {
            IrLabel::new(format!("{}_{suffix}", self.last_label))
        }
    }

    /// Appends a directive (`dbname` or `db`) to the data segment.
    pub fn append_data(&mut self, opcode: Opcode, operands: Vec<Operand>) {
        debug_assert!(matches!(opcode, Opcode::Db | Opcode::Dbname));
        self.data_segment.push(IrInstruction::new(opcode, operands));
    }
}

impl fmt::Display for IrContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            write!(f, "{function}")?;
        }
        if !self.data_segment.is_empty() {
            writeln!(f, "data {{")?;
            for inst in &self.data_segment {
                writeln!(f, "  {inst}")?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
