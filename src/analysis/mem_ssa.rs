// src/analysis/mem_ssa.rs
//! SSA over memory state.
//!
//! Instead of versioning scalar registers, this analysis versions one
//! address space (memory or storage, chosen by [`LocationKind`]). Every
//! instruction that writes the space creates a [`MemoryDef`]; every reader
//! creates a [`MemoryUse`]; control-flow joins whose incoming memory states
//! differ get a [`MemoryPhi`]. The state before the function starts is the
//! `LiveOnEntry` sentinel.
//!
//! Construction mirrors scalar SSA: phis are placed at the iterated
//! dominance frontier of defining blocks, then a dominator-tree walk wires
//! every access to the closest dominating definition.

use super::alias::{LocationKind, MemoryLocation, read_location, write_location};
use super::cfg::CfgAnalysis;
use super::dominators::DominatorTreeAnalysis;
use crate::ir::{BlockId, InstId, IrFunction};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemDefId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemUseId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemPhiId(usize);

/// A reference to a point in the memory SSA graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryAccess {
    /// The state of the address space before the function begins.
    LiveOnEntry,
    Def(MemDefId),
    Phi(MemPhiId),
}

impl MemoryAccess {
    pub fn is_live_on_entry(self) -> bool {
        matches!(self, MemoryAccess::LiveOnEntry)
    }
}

/// A write to the address space.
#[derive(Debug)]
pub struct MemoryDef {
    pub version: u32,
    pub inst: InstId,
    pub loc: MemoryLocation,
    /// The memory state this write clobbers.
    pub prior: MemoryAccess,
    /// True for defs created by clobbering opcodes (calls, copies) rather
    /// than the plain store opcode.
    pub is_volatile: bool,
}

/// A read of the address space.
#[derive(Debug)]
pub struct MemoryUse {
    pub version: u32,
    pub inst: InstId,
    pub loc: MemoryLocation,
    pub reaching_def: MemoryAccess,
    /// True for reads by opcodes other than the plain load (returns,
    /// hashes, calls); such uses pin memory but cannot be forwarded.
    pub is_volatile: bool,
}

/// A join of memory states at a block with multiple predecessors.
#[derive(Debug)]
pub struct MemoryPhi {
    pub version: u32,
    pub block: BlockId,
    /// One `(incoming state, predecessor)` pair per predecessor edge.
    pub operands: Vec<(MemoryAccess, BlockId)>,
}

#[derive(Debug)]
pub struct MemSsa {
    pub(super) generation: u64,
    kind: LocationKind,
    defs: Vec<MemoryDef>,
    uses: Vec<MemoryUse>,
    phis: Vec<MemoryPhi>,
    live_phis: IndexSet<MemPhiId>,
    block_defs: HashMap<BlockId, Vec<MemDefId>>,
    block_uses: HashMap<BlockId, Vec<MemUseId>>,
    block_phi: HashMap<BlockId, MemPhiId>,
    inst_def: HashMap<InstId, MemDefId>,
    inst_use: HashMap<InstId, MemUseId>,
    /// access -> accesses whose prior state (or phi operand) it is
    successors: HashMap<MemoryAccess, Vec<MemoryAccess>>,
    /// access -> uses it reaches directly
    reached_uses: HashMap<MemoryAccess, Vec<MemUseId>>,
}

impl MemSsa {
    pub fn analyze(
        function: &IrFunction,
        cfg: &CfgAnalysis,
        dom: &DominatorTreeAnalysis,
        kind: LocationKind,
    ) -> Self {
        let mut ssa = MemSsa {
            generation: 0,
            kind,
            defs: Vec::new(),
            uses: Vec::new(),
            phis: Vec::new(),
            live_phis: IndexSet::new(),
            block_defs: HashMap::new(),
            block_uses: HashMap::new(),
            block_phi: HashMap::new(),
            inst_def: HashMap::new(),
            inst_use: HashMap::new(),
            successors: HashMap::new(),
            reached_uses: HashMap::new(),
        };
        let mut next_version = 1;
        ssa.insert_phi_nodes(function, cfg, dom, &mut next_version);
        ssa.wire_accesses(function, cfg, dom, &mut next_version);
        ssa.sort_phi_operands(function);
        ssa.remove_trivial_phis();
        ssa.index_successors();
        ssa
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    /// Phi placement at the iterated dominance frontier of every block
    /// containing a def.
    fn insert_phi_nodes(
        &mut self,
        function: &IrFunction,
        cfg: &CfgAnalysis,
        dom: &DominatorTreeAnalysis,
        next_version: &mut u32,
    ) {
        let mut worklist: Vec<BlockId> = cfg
            .pre_order()
            .iter()
            .copied()
            .filter(|&block| {
                function
                    .instructions_of(block)
                    .any(|inst| !write_location(inst, self.kind).is_empty())
            })
            .collect();

        while let Some(block) = worklist.pop() {
            let Some(frontier) = dom.dominance_frontier(block) else { continue };
            for &join in frontier {
                if self.block_phi.contains_key(&join) {
                    continue;
                }
                let id = MemPhiId(self.phis.len());
                self.phis.push(MemoryPhi {
                    version: *next_version,
                    block: join,
                    operands: Vec::new(),
                });
                *next_version += 1;
                self.live_phis.insert(id);
                self.block_phi.insert(join, id);
                worklist.push(join);
            }
        }
    }

    /// Dominator-tree walk creating defs and uses in program order and
    /// wiring each to the closest dominating state.
    fn wire_accesses(
        &mut self,
        function: &IrFunction,
        cfg: &CfgAnalysis,
        dom: &DominatorTreeAnalysis,
        next_version: &mut u32,
    ) {
        let mut stack: Vec<(BlockId, MemoryAccess)> = vec![(dom.entry(), MemoryAccess::LiveOnEntry)];

        while let Some((block, mut current)) = stack.pop() {
            if let Some(&phi) = self.block_phi.get(&block) {
                current = MemoryAccess::Phi(phi);
            }

            for &id in function.inst_ids_of(block) {
                let inst = function.inst(id);

                let read = read_location(inst, self.kind);
                if !read.is_empty() {
                    let use_id = MemUseId(self.uses.len());
                    self.uses.push(MemoryUse {
                        version: *next_version,
                        inst: id,
                        loc: read,
                        reaching_def: current,
                        is_volatile: inst.opcode != self.kind.load_op(),
                    });
                    *next_version += 1;
                    self.block_uses.entry(block).or_default().push(use_id);
                    self.inst_use.insert(id, use_id);
                }

                let write = write_location(inst, self.kind);
                if !write.is_empty() {
                    let def_id = MemDefId(self.defs.len());
                    self.defs.push(MemoryDef {
                        version: *next_version,
                        inst: id,
                        loc: write,
                        prior: current,
                        is_volatile: inst.opcode != self.kind.store_op(),
                    });
                    *next_version += 1;
                    self.block_defs.entry(block).or_default().push(def_id);
                    self.inst_def.insert(id, def_id);
                    current = MemoryAccess::Def(def_id);
                }
            }

            for &succ in &function.block(block).cfg_out {
                if !cfg.is_reachable(succ) {
                    continue;
                }
                if let Some(&phi) = self.block_phi.get(&succ) {
                    self.phis[phi.0].operands.push((current, block));
                }
            }

            for &child in dom.dominator_tree_children(block) {
                stack.push((child, current));
            }
        }
    }

    /// Phi operands in `cfg_in` order, matching scalar phi layout.
    fn sort_phi_operands(&mut self, function: &IrFunction) {
        for phi in &mut self.phis {
            let order = &function.block(phi.block).cfg_in;
            phi.operands
                .sort_by_key(|(_, pred)| order.get_index_of(pred).unwrap_or(usize::MAX));
        }
    }

    /// Drops phis whose operands all carry the same state (counting a
    /// self-reference as "same"), rewiring every reference to that state.
    fn remove_trivial_phis(&mut self) {
        loop {
            let mut replaced: Option<(MemPhiId, MemoryAccess)> = None;
            for &id in &self.live_phis {
                let this = MemoryAccess::Phi(id);
                let mut distinct: Option<MemoryAccess> = None;
                let mut trivial = true;
                for &(operand, _) in &self.phis[id.0].operands {
                    if operand == this {
                        continue;
                    }
                    match distinct {
                        None => distinct = Some(operand),
                        Some(seen) if seen == operand => {}
                        Some(_) => {
                            trivial = false;
                            break;
                        }
                    }
                }
                if trivial {
                    replaced = Some((id, distinct.unwrap_or(MemoryAccess::LiveOnEntry)));
                    break;
                }
            }

            let Some((dead, replacement)) = replaced else { break };
            let dead_access = MemoryAccess::Phi(dead);
            for def in &mut self.defs {
                if def.prior == dead_access {
                    def.prior = replacement;
                }
            }
            for mem_use in &mut self.uses {
                if mem_use.reaching_def == dead_access {
                    mem_use.reaching_def = replacement;
                }
            }
            for phi in &mut self.phis {
                for (operand, _) in &mut phi.operands {
                    if *operand == dead_access {
                        *operand = replacement;
                    }
                }
            }
            self.live_phis.shift_remove(&dead);
            self.block_phi.retain(|_, &mut id| id != dead);
        }
    }

    fn index_successors(&mut self) {
        for (index, def) in self.defs.iter().enumerate() {
            self.successors
                .entry(def.prior)
                .or_default()
                .push(MemoryAccess::Def(MemDefId(index)));
        }
        for &phi in &self.live_phis {
            let incoming: IndexSet<MemoryAccess> =
                self.phis[phi.0].operands.iter().map(|&(operand, _)| operand).collect();
            for operand in incoming {
                if operand != MemoryAccess::Phi(phi) {
                    self.successors.entry(operand).or_default().push(MemoryAccess::Phi(phi));
                }
            }
        }
        for (index, mem_use) in self.uses.iter().enumerate() {
            self.reached_uses
                .entry(mem_use.reaching_def)
                .or_default()
                .push(MemUseId(index));
        }
    }

    pub fn get_memory_def(&self, inst: InstId) -> Option<&MemoryDef> {
        self.inst_def.get(&inst).map(|&id| &self.defs[id.0])
    }

    pub fn get_memory_def_id(&self, inst: InstId) -> Option<MemDefId> {
        self.inst_def.get(&inst).copied()
    }

    pub fn get_memory_use(&self, inst: InstId) -> Option<&MemoryUse> {
        self.inst_use.get(&inst).map(|&id| &self.uses[id.0])
    }

    pub fn get_memory_use_id(&self, inst: InstId) -> Option<MemUseId> {
        self.inst_use.get(&inst).copied()
    }

    pub fn def(&self, id: MemDefId) -> &MemoryDef {
        &self.defs[id.0]
    }

    pub fn mem_use(&self, id: MemUseId) -> &MemoryUse {
        &self.uses[id.0]
    }

    pub fn phi(&self, id: MemPhiId) -> &MemoryPhi {
        &self.phis[id.0]
    }

    pub fn memory_phi_of(&self, block: BlockId) -> Option<&MemoryPhi> {
        self.block_phi.get(&block).map(|&id| &self.phis[id.0])
    }

    pub fn defs_of(&self, block: BlockId) -> &[MemDefId] {
        self.block_defs.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn uses_of(&self, block: BlockId) -> &[MemUseId] {
        self.block_uses.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn def_ids(&self) -> impl Iterator<Item = MemDefId> {
        (0..self.defs.len()).map(MemDefId)
    }

    pub fn use_ids(&self) -> impl Iterator<Item = MemUseId> {
        (0..self.uses.len()).map(MemUseId)
    }

    /// The definition that overwrites `def` on every path, or `None`.
    ///
    /// Walks forward along the memory state chain starting at `def`. The
    /// walk fails (returns `None`) on any aliasing use, on a state consumed
    /// by more than one successor, and on a partial overlap; it succeeds on
    /// the first following def whose write completely covers `def`'s
    /// location.
    pub fn get_clobbering_memory_access(&self, def: MemDefId) -> Option<MemDefId> {
        let loc = self.defs[def.0].loc;
        let mut current = MemoryAccess::Def(def);
        let mut visited: HashSet<MemoryAccess> = HashSet::new();

        loop {
            if !visited.insert(current) {
                return None;
            }
            if self
                .reached_uses
                .get(&current)
                .is_some_and(|uses| uses.iter().any(|&u| self.uses[u.0].loc.may_alias(&loc)))
            {
                return None;
            }
            let successors = self.successors.get(&current).map_or(&[][..], Vec::as_slice);
            let [successor] = successors else { return None };
            match *successor {
                MemoryAccess::Def(next) => {
                    let next_loc = &self.defs[next.0].loc;
                    if next_loc.completely_overlaps(&loc) {
                        return Some(next);
                    }
                    if next_loc.may_alias(&loc) {
                        // partial overlaps do not clobber
                        return None;
                    }
                    current = MemoryAccess::Def(next);
                }
                MemoryAccess::Phi(phi) => current = MemoryAccess::Phi(phi),
                MemoryAccess::LiveOnEntry => return None,
            }
        }
    }

    /// The nearest definition that may alias `mem_use`, walking backwards
    /// through phis, or `LiveOnEntry` when the location is untouched since
    /// function entry.
    pub fn get_clobbered_memory_access(&self, mem_use: MemUseId) -> MemoryAccess {
        let loc = self.uses[mem_use.0].loc;
        let mut visited = HashSet::new();
        self.walk_back(self.uses[mem_use.0].reaching_def, &loc, &mut visited)
            .unwrap_or(MemoryAccess::LiveOnEntry)
    }

    fn walk_back(
        &self,
        access: MemoryAccess,
        loc: &MemoryLocation,
        visited: &mut HashSet<MemoryAccess>,
    ) -> Option<MemoryAccess> {
        if !visited.insert(access) {
            return None;
        }
        match access {
            MemoryAccess::LiveOnEntry => Some(MemoryAccess::LiveOnEntry),
            MemoryAccess::Def(id) => {
                if self.defs[id.0].loc.may_alias(loc) {
                    Some(MemoryAccess::Def(id))
                } else {
                    self.walk_back(self.defs[id.0].prior, loc, visited)
                }
            }
            MemoryAccess::Phi(id) => {
                for &(operand, _) in &self.phis[id.0].operands {
                    if let Some(found) = self.walk_back(operand, loc, visited)
                        && !found.is_live_on_entry()
                    {
                        return Some(found);
                    }
                }
                Some(MemoryAccess::LiveOnEntry)
            }
        }
    }

    /// The effective reaching state of a use for load elimination: skips
    /// non-aliasing defs, resolves phis whose arms agree, and otherwise
    /// stops at the phi itself. Every returned access dominates the use.
    pub fn effective_reaching_access(&self, mem_use: MemUseId) -> MemoryAccess {
        let loc = self.uses[mem_use.0].loc;
        let mut visited = HashSet::new();
        self.resolve_effective(self.uses[mem_use.0].reaching_def, &loc, &mut visited)
            .unwrap_or(MemoryAccess::LiveOnEntry)
    }

    fn resolve_effective(
        &self,
        access: MemoryAccess,
        loc: &MemoryLocation,
        visited: &mut HashSet<MemoryAccess>,
    ) -> Option<MemoryAccess> {
        if !visited.insert(access) {
            return None;
        }
        match access {
            MemoryAccess::LiveOnEntry => Some(MemoryAccess::LiveOnEntry),
            MemoryAccess::Def(id) => {
                if self.defs[id.0].loc.may_alias(loc) {
                    Some(MemoryAccess::Def(id))
                } else {
                    self.resolve_effective(self.defs[id.0].prior, loc, visited)
                }
            }
            MemoryAccess::Phi(id) => {
                let mut resolved: Option<MemoryAccess> = None;
                for &(operand, _) in &self.phis[id.0].operands {
                    match self.resolve_effective(operand, loc, &mut visited.clone()) {
                        // a cycle back into this phi constrains nothing
                        None => {}
                        Some(value) => match resolved {
                            None => resolved = Some(value),
                            Some(seen) if seen == value => {}
                            Some(_) => return Some(MemoryAccess::Phi(id)),
                        },
                    }
                }
                Some(resolved.unwrap_or(MemoryAccess::Phi(id)))
            }
        }
    }

    /// Debug annotation for an instruction's memory accesses.
    pub fn annotate_inst(&self, inst: InstId) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(mem_use) = self.get_memory_use(inst) {
            parts.push(format!("use: {} (reaching {})", mem_use.version, self.describe(mem_use.reaching_def)));
        }
        if let Some(def) = self.get_memory_def(inst) {
            parts.push(format!("def: {} (prior {})", def.version, self.describe(def.prior)));
        }
        if parts.is_empty() { None } else { Some(parts.join(", ")) }
    }

    fn describe(&self, access: MemoryAccess) -> String {
        match access {
            MemoryAccess::LiveOnEntry => "live_on_entry".to_owned(),
            MemoryAccess::Def(id) => self.defs[id.0].version.to_string(),
            MemoryAccess::Phi(id) => format!("phi {}", self.phis[id.0].version),
        }
    }
}
