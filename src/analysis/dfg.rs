// src/analysis/dfg.rs
use crate::ir::{InstId, IrFunction, IrVariable};
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::LazyLock;

static NO_USES: LazyLock<IndexSet<InstId>> = LazyLock::new(IndexSet::new);

/// Data-flow graph: for every variable, the unique producing instruction
/// and the set of instructions using it.
///
/// Variables without a producer (function arguments reaching phis) simply
/// have no `outputs` entry.
#[derive(Debug, Clone)]
pub struct DfgAnalysis {
    pub(super) generation: u64,
    outputs: HashMap<IrVariable, InstId>,
    uses: HashMap<IrVariable, IndexSet<InstId>>,
}

impl DfgAnalysis {
    pub fn analyze(function: &IrFunction) -> Self {
        let mut outputs = HashMap::new();
        let mut uses: HashMap<IrVariable, IndexSet<InstId>> = HashMap::new();

        for &block in function.body() {
            for &id in function.inst_ids_of(block) {
                let inst = function.inst(id);
                for var in inst.input_variables() {
                    uses.entry(var.clone()).or_default().insert(id);
                }
                if let Some(output) = &inst.output {
                    outputs.insert(output.clone(), id);
                }
            }
        }

        DfgAnalysis { generation: 0, outputs, uses }
    }

    pub fn producing_instruction(&self, var: &IrVariable) -> Option<InstId> {
        self.outputs.get(var).copied()
    }

    pub fn uses(&self, var: &IrVariable) -> &IndexSet<InstId> {
        self.uses.get(var).unwrap_or(&NO_USES)
    }

    pub fn variables(&self) -> impl Iterator<Item = &IrVariable> {
        self.outputs.keys()
    }

    /// Every used variable with its users, including variables that have no
    /// producing instruction.
    pub fn all_uses(&self) -> impl Iterator<Item = (&IrVariable, &IndexSet<InstId>)> {
        self.uses.iter()
    }
}
