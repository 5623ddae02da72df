// src/analysis/dominators.rs
//! Dominator-tree analysis over the block CFG.
//!
//! Immediate dominators come from petgraph's `simple_fast` (the
//! Cooper–Harvey–Kennedy algorithm); the dominator tree, dominance
//! frontiers and tree orderings are derived here. Unreachable blocks carry
//! no dominance information.

use super::cfg::CfgAnalysis;
use crate::ir::{BlockId, IrFunction};
use indexmap::IndexSet;
use petgraph::algo::dominators;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

#[derive(Debug)]
pub struct DominatorTreeAnalysis {
    pub(super) generation: u64,
    entry: BlockId,
    /// Immediate dominator of every reachable block except entry.
    idom: HashMap<BlockId, BlockId>,
    /// Dominator-tree children, in reverse-post-order of the CFG.
    children: HashMap<BlockId, Vec<BlockId>>,
    /// Dominance frontier of every reachable block.
    frontiers: HashMap<BlockId, IndexSet<BlockId>>,
    /// Dominator-tree DFS pre-order; the renaming order for SSA
    /// construction.
    pre_order: Vec<BlockId>,
    /// Dominator-tree DFS post-order.
    post_order: Vec<BlockId>,
}

impl DominatorTreeAnalysis {
    pub fn analyze(function: &IrFunction, cfg: &CfgAnalysis) -> Self {
        let entry = function.entry();

        let mut graph: DiGraph<BlockId, ()> = DiGraph::new();
        let mut nodes: HashMap<BlockId, NodeIndex> = HashMap::new();
        for &block in cfg.pre_order() {
            nodes.insert(block, graph.add_node(block));
        }
        for &block in cfg.pre_order() {
            for &succ in &function.block(block).cfg_out {
                if let (Some(&from), Some(&to)) = (nodes.get(&block), nodes.get(&succ)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let result = dominators::simple_fast(&graph, nodes[&entry]);

        let mut idom = HashMap::new();
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &block in cfg.pre_order() {
            if block == entry {
                continue;
            }
            if let Some(dominator) = result.immediate_dominator(nodes[&block]) {
                let dominator = graph[dominator];
                idom.insert(block, dominator);
                children.entry(dominator).or_default().push(block);
            }
        }

        let mut analysis = DominatorTreeAnalysis {
            generation: 0,
            entry,
            idom,
            children,
            frontiers: HashMap::new(),
            pre_order: Vec::new(),
            post_order: Vec::new(),
        };
        analysis.compute_tree_orders();
        analysis.compute_frontiers(function, cfg);
        analysis
    }

    /// Standard frontier computation: for every join point, walk each
    /// predecessor up the dominator tree until the join's immediate
    /// dominator, adding the join to every frontier on the way.
    fn compute_frontiers(&mut self, function: &IrFunction, cfg: &CfgAnalysis) {
        for &block in cfg.pre_order() {
            self.frontiers.insert(block, IndexSet::new());
        }
        for &block in cfg.pre_order() {
            let preds: Vec<BlockId> = function
                .block(block)
                .cfg_in
                .iter()
                .copied()
                .filter(|&p| cfg.is_reachable(p))
                .collect();
            if preds.len() < 2 {
                continue;
            }
            let stop = self.idom.get(&block).copied();
            for pred in preds {
                let mut runner = pred;
                while Some(runner) != stop {
                    self.frontiers.entry(runner).or_default().insert(block);
                    match self.idom.get(&runner) {
                        Some(&up) => runner = up,
                        None => break,
                    }
                }
            }
        }
    }

    fn compute_tree_orders(&mut self) {
        let mut stack = vec![(self.entry, false)];
        while let Some((block, expanded)) = stack.pop() {
            if expanded {
                self.post_order.push(block);
                continue;
            }
            self.pre_order.push(block);
            stack.push((block, true));
            if let Some(children) = self.children.get(&block) {
                for &child in children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn dominator_tree_children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn dominance_frontier(&self, block: BlockId) -> Option<&IndexSet<BlockId>> {
        self.frontiers.get(&block)
    }

    /// Dominator-tree DFS pre-order over reachable blocks.
    pub fn dom_pre_order(&self) -> &[BlockId] {
        &self.pre_order
    }

    /// Dominator-tree DFS post-order over reachable blocks.
    pub fn dom_post_order(&self) -> &[BlockId] {
        &self.post_order
    }

    /// True iff `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom.get(&current) {
                Some(&up) => current = up,
                None => return false,
            }
        }
    }
}
