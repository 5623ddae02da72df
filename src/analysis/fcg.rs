// src/analysis/fcg.rs
use crate::ir::{InstId, IrContext, IrLabel, Opcode};
use indexmap::IndexSet;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// The function call graph of a context: caller/callee edges built from
/// `invoke` instructions, plus an index from callee to its invoke sites.
#[derive(Debug)]
pub struct FcgAnalysis {
    pub(super) generation: u64,
    graph: DiGraph<IrLabel, ()>,
    nodes: HashMap<IrLabel, NodeIndex>,
    /// callee -> (caller, invoke instruction) in discovery order
    invoke_sites: HashMap<IrLabel, Vec<(IrLabel, InstId)>>,
}

impl FcgAnalysis {
    pub fn analyze(ctx: &IrContext) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        let mut invoke_sites: HashMap<IrLabel, Vec<(IrLabel, InstId)>> = HashMap::new();

        for function in ctx.functions() {
            let node = graph.add_node(function.name.clone());
            nodes.insert(function.name.clone(), node);
            invoke_sites.insert(function.name.clone(), Vec::new());
        }

        for function in ctx.functions() {
            for &block in function.body() {
                for &id in function.inst_ids_of(block) {
                    let inst = function.inst(id);
                    if inst.opcode != Opcode::Invoke {
                        continue;
                    }
                    let callee = inst.operands[0]
                        .as_label()
                        .expect("invoke callee must be a label")
                        .clone();
                    if let Some(&callee_node) = nodes.get(&callee) {
                        graph.update_edge(nodes[&function.name], callee_node, ());
                        invoke_sites
                            .entry(callee)
                            .or_default()
                            .push((function.name.clone(), id));
                    }
                }
            }
        }

        FcgAnalysis { generation: 0, graph, nodes, invoke_sites }
    }

    pub fn callees(&self, function: &IrLabel) -> IndexSet<IrLabel> {
        self.neighbors(function, Direction::Outgoing)
    }

    pub fn callers(&self, function: &IrLabel) -> IndexSet<IrLabel> {
        self.neighbors(function, Direction::Incoming)
    }

    fn neighbors(&self, function: &IrLabel, direction: Direction) -> IndexSet<IrLabel> {
        let Some(&node) = self.nodes.get(function) else {
            return IndexSet::new();
        };
        self.graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// All `invoke` instructions targeting a function, as
    /// `(caller, instruction)` pairs.
    pub fn invoke_sites(&self, callee: &IrLabel) -> &[(IrLabel, InstId)] {
        self.invoke_sites.get(callee).map_or(&[], Vec::as_slice)
    }
}
