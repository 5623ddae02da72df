// src/ir/function.rs
use super::{BlockId, InstId, IrBasicBlock, IrInstruction, IrLabel, IrVariable, Opcode, Operand};
use crate::error::CompileError;
use std::collections::HashMap;
use std::fmt;

/// A function: an entry block plus the blocks reachable from it, all owned
/// by two arenas.
///
/// Instructions live in `insts` keyed by [`InstId`]; blocks live in `blocks`
/// keyed by [`BlockId`]. `body` lists the live blocks in layout order, entry
/// first. Removing a block drops it from `body` but leaves the arena slot in
/// place, so stale ids cannot alias a different block.
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: IrLabel,
    insts: Vec<IrInstruction>,
    blocks: Vec<IrBasicBlock>,
    body: Vec<BlockId>,
    label_index: HashMap<IrLabel, BlockId>,
    last_variable: u32,
    last_label: u32,
}

impl IrFunction {
    /// Creates a function with a single (still empty) entry block labeled
    /// with the function name.
    pub fn new(name: IrLabel) -> Self {
        let mut function = IrFunction {
            name: name.clone(),
            insts: Vec::new(),
            blocks: Vec::new(),
            body: Vec::new(),
            label_index: HashMap::new(),
            last_variable: 0,
            last_label: 0,
        };
        function.append_basic_block(name);
        function
    }

    pub fn entry(&self) -> BlockId {
        self.body[0]
    }

    /// Live blocks in layout order.
    pub fn body(&self) -> &[BlockId] {
        &self.body
    }

    pub fn num_basic_blocks(&self) -> usize {
        self.body.len()
    }

    pub fn block(&self, id: BlockId) -> &IrBasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut IrBasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &IrInstruction {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut IrInstruction {
        &mut self.insts[id.index()]
    }

    pub fn block_by_label(&self, label: &IrLabel) -> Option<BlockId> {
        self.label_index.get(label).copied()
    }

    pub fn append_basic_block(&mut self, label: IrLabel) -> BlockId {
        assert!(
            !self.label_index.contains_key(&label),
            "duplicate basic block label {label} in function {}",
            self.name
        );
        let id = BlockId::new(self.blocks.len());
        self.label_index.insert(label.clone(), id);
        self.blocks.push(IrBasicBlock::new(label));
        self.body.push(id);
        id
    }

    /// Unlinks a block from the function body. The arena slot stays behind;
    /// CFG edges and phis referring to the block must already be gone.
    pub fn remove_basic_block(&mut self, id: BlockId) {
        let label = self.blocks[id.index()].label.clone();
        self.label_index.remove(&label);
        self.body.retain(|&b| b != id);
    }

    /// Re-keys a block under a new label, updating the label index.
    pub fn relabel_basic_block(&mut self, id: BlockId, label: IrLabel) {
        let old = self.blocks[id.index()].label.clone();
        self.label_index.remove(&old);
        assert!(
            !self.label_index.contains_key(&label),
            "duplicate basic block label {label} in function {}",
            self.name
        );
        self.label_index.insert(label.clone(), id);
        self.blocks[id.index()].label = label;
    }

    pub fn get_next_variable(&mut self) -> IrVariable {
        self.last_variable += 1;
        IrVariable::new(self.last_variable.to_string())
    }

    /// Keeps the fresh-variable counter ahead of an externally introduced
    /// numeric variable name (used by the textual parser).
    pub fn reserve_variable(&mut self, n: u32) {
        self.last_variable = self.last_variable.max(n);
    }

    /// Keeps the fresh-label counter ahead of an externally introduced
    /// numeric label (used by the textual parser).
    pub fn reserve_label(&mut self, n: u32) {
        self.last_label = self.last_label.max(n);
    }

    pub fn get_next_label(&mut self, suffix: &str) -> IrLabel {
        self.last_label += 1;
        if suffix.is_empty() {
            IrLabel::new(self.last_label.to_string())
        } else {
            IrLabel::new(format!("{}_{suffix}", self.last_label))
        }
    }

    /// Appends an instruction, allocating a fresh output variable when the
    /// opcode produces one. Returns that output.
    pub fn append_instruction(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        operands: Vec<Operand>,
    ) -> Option<IrVariable> {
        let output = opcode.has_output().then(|| self.get_next_variable());
        self.append_instruction_ret(block, opcode, operands, output.clone());
        output
    }

    /// Appends an instruction with an explicit (possibly absent) output.
    pub fn append_instruction_ret(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        operands: Vec<Operand>,
        output: Option<IrVariable>,
    ) -> InstId {
        assert!(!self.is_terminated(block), "appending to terminated block {}", self.block(block).label);
        let mut inst = IrInstruction::new(opcode, operands);
        inst.output = output;
        inst.parent = block;
        let id = self.alloc_instruction(inst);
        self.blocks[block.index()].insts.push(id);
        id
    }

    /// Appends an internal call. The first operand must be the callee label;
    /// an output variable is allocated iff the callee returns a value.
    pub fn append_invoke_instruction(
        &mut self,
        block: BlockId,
        operands: Vec<Operand>,
        returns: bool,
    ) -> Option<IrVariable> {
        assert!(operands.first().is_some_and(Operand::is_label), "invoked a non-label");
        let output = returns.then(|| self.get_next_variable());
        let mut inst = IrInstruction::new(Opcode::Invoke, operands);
        inst.output = output.clone();
        inst.parent = block;
        let id = self.alloc_instruction(inst);
        self.blocks[block.index()].insts.push(id);
        output
    }

    /// Inserts an already-built instruction at `index` within a block.
    pub fn insert_instruction(
        &mut self,
        block: BlockId,
        index: usize,
        mut inst: IrInstruction,
    ) -> InstId {
        inst.parent = block;
        let id = self.alloc_instruction(inst);
        self.blocks[block.index()].insts.insert(index, id);
        id
    }

    /// Allocates an instruction in the arena without linking it to a block.
    pub fn alloc_instruction(&mut self, inst: IrInstruction) -> InstId {
        let id = InstId::new(self.insts.len());
        self.insts.push(inst);
        id
    }

    /// Unlinks an instruction from its owning block.
    pub fn remove_instruction(&mut self, id: InstId) {
        let parent = self.insts[id.index()].parent;
        self.blocks[parent.index()].insts.retain(|&i| i != id);
    }

    pub fn drain_dead_instructions(&mut self) -> usize {
        let mut removed = 0;
        for &block in &self.body.clone() {
            removed += self.blocks[block.index()].drain_dead_instructions();
        }
        removed
    }

    pub fn inst_ids_of(&self, block: BlockId) -> &[InstId] {
        &self.block(block).insts
    }

    pub fn instructions_of(&self, block: BlockId) -> impl Iterator<Item = &IrInstruction> {
        self.block(block).insts.iter().map(|&id| self.inst(id))
    }

    /// Ids of the leading run of phi instructions of a block.
    pub fn phi_ids_of(&self, block: BlockId) -> Vec<InstId> {
        let mut phis = Vec::new();
        for &id in &self.block(block).insts {
            if self.inst(id).is_phi() {
                phis.push(id);
            } else {
                break;
            }
        }
        phis
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.block(block).insts.last().is_some_and(|&id| self.inst(id).is_bb_terminator())
    }

    pub fn terminator_of(&self, block: BlockId) -> Option<InstId> {
        self.block(block)
            .insts
            .last()
            .copied()
            .filter(|&id| self.inst(id).is_bb_terminator())
    }

    /// Trims phi operands of a block down to its current predecessors.
    /// A phi left with a single pair degenerates to a `store`, one with no
    /// pairs to a `nop`. Phis are re-sorted to the block head afterwards.
    pub fn fix_phi_instructions(&mut self, block: BlockId) {
        let cfg_in_labels: Vec<IrLabel> = self
            .block(block)
            .cfg_in
            .iter()
            .map(|&pred| self.block(pred).label.clone())
            .collect();

        let mut changed = false;
        for &id in &self.block(block).insts.clone() {
            if !self.inst(id).is_phi() {
                continue;
            }
            let stale: Vec<IrLabel> = self
                .inst(id)
                .phi_operands()
                .map(|(label, _)| label.clone())
                .filter(|label| !cfg_in_labels.contains(label))
                .collect();
            for label in stale {
                changed = true;
                self.inst_mut(id).remove_phi_operand(&label);
            }

            let inst = self.inst_mut(id);
            match inst.operands.len() {
                2 => {
                    inst.opcode = Opcode::Store;
                    inst.operands = vec![inst.operands[1].clone()];
                }
                0 => inst.make_nop(),
                _ => {}
            }
        }

        if changed {
            // degenerated phis must not stay interleaved with live ones
            let insts = &mut self.blocks[block.index()].insts;
            let arena = &self.insts;
            insts.sort_by_key(|&id| !arena[id.index()].is_phi());
        }
    }

    /// Applies operand replacements to every instruction in the function.
    pub fn replace_operands(&mut self, replacements: &HashMap<Operand, Operand>) {
        for inst in &mut self.insts {
            inst.replace_operands(replacements);
        }
    }

    /// Applies label replacements to every instruction in the function.
    pub fn replace_label_operands(&mut self, replacements: &HashMap<IrLabel, IrLabel>) {
        for inst in &mut self.insts {
            inst.replace_label_operands(replacements);
        }
    }

    /// Checks the structural invariants every pass must preserve: all body
    /// blocks terminated, phis in leading position with well-formed operand
    /// lists, and terminator targets resolving to live blocks.
    pub fn check_structure(&self) -> Result<(), CompileError> {
        for &block in &self.body {
            let bb = self.block(block);
            if !self.is_terminated(block) {
                return Err(CompileError::structure(format!(
                    "block {} of function {} is not terminated",
                    bb.label, self.name
                )));
            }

            let mut seen_body = false;
            for inst in self.instructions_of(block) {
                if inst.is_phi() {
                    if seen_body {
                        return Err(CompileError::structure(format!(
                            "phi after non-phi instruction in block {}",
                            bb.label
                        )));
                    }
                    if inst.operands.len() % 2 != 0 {
                        return Err(CompileError::bug(format!(
                            "phi with odd operand count in block {}",
                            bb.label
                        )));
                    }
                } else {
                    seen_body = true;
                }

                if inst.opcode.is_cfg_altering() {
                    for label in inst.label_operands() {
                        if self.block_by_label(label).is_none() {
                            return Err(CompileError::structure(format!(
                                "block {} jumps to unknown label {label}",
                                bb.label
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} {{", self.name)?;
        for &block in &self.body {
            let bb = self.block(block);
            writeln!(f, "  {}:", bb.label)?;
            for inst in self.instructions_of(block) {
                writeln!(f, "      {inst}")?;
            }
        }
        writeln!(f, "}}")
    }
}
