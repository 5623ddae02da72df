// src/passes/sccp.rs
//! Sparse conditional constant propagation.
//!
//! Each SSA variable carries a lattice value `Top ⊐ Const(c) ⊐ Bottom`
//! (unvisited ⊐ proven constant ⊐ runtime-varying). Two worklists drive the
//! fixpoint: CFG edges discovered executable and variables whose lattice
//! value moved. A `jnz` on a proven constant marks only the taken edge
//! executable. Finalization replaces constant operands with literals and
//! rewrites constant-condition `jnz` into `jmp`.

use super::Pass;
use crate::analysis::{AnalysisCache, AnalysisKind};
use crate::error::CompileError;
use crate::ir::word::{self, Word};
use crate::ir::{BlockId, InstId, IrFunction, IrVariable, Opcode, Operand};
use indexmap::IndexSet;
use num_traits::Zero;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatticeValue {
    /// Not yet proven anything (optimistic initial state).
    Top,
    /// Proven to always evaluate to this constant.
    Const(Word),
    /// Proven to vary at runtime.
    Bottom,
}

impl LatticeValue {
    /// The lattice meet; used when joining phi operands.
    pub fn meet(&self, other: &LatticeValue) -> LatticeValue {
        match (self, other) {
            (LatticeValue::Top, x) | (x, LatticeValue::Top) => x.clone(),
            (LatticeValue::Bottom, _) | (_, LatticeValue::Bottom) => LatticeValue::Bottom,
            (LatticeValue::Const(a), LatticeValue::Const(b)) => {
                if a == b {
                    LatticeValue::Const(a.clone())
                } else {
                    LatticeValue::Bottom
                }
            }
        }
    }

    pub fn as_const(&self) -> Option<&Word> {
        match self {
            LatticeValue::Const(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Sccp {
    lattice: HashMap<IrVariable, LatticeValue>,
    executable_edges: HashSet<(Option<BlockId>, BlockId)>,
    reachable: IndexSet<BlockId>,
    flow_worklist: Vec<(Option<BlockId>, BlockId)>,
    ssa_worklist: Vec<IrVariable>,
}

impl Sccp {
    pub fn new() -> Self {
        Sccp::default()
    }

    /// The lattice value of a variable after the fixpoint; exposed for
    /// testing.
    pub fn lattice_of(&self, var: &IrVariable) -> LatticeValue {
        self.lattice.get(var).cloned().unwrap_or(LatticeValue::Top)
    }

    fn operand_value(&self, operand: &Operand) -> LatticeValue {
        match operand {
            Operand::Literal(value) => LatticeValue::Const(value.clone()),
            Operand::Variable(var) => self.lattice_of(var),
            Operand::Label(_) => LatticeValue::Bottom,
        }
    }

    fn set_lattice(&mut self, var: &IrVariable, value: LatticeValue) {
        let old = self.lattice_of(var);
        if old == value {
            return;
        }
        // values may only descend; diverging constants become Bottom
        let next = match (&old, &value) {
            (LatticeValue::Top, _) => value,
            (LatticeValue::Const(_), LatticeValue::Bottom) => LatticeValue::Bottom,
            (LatticeValue::Const(_), _) => LatticeValue::Bottom,
            (LatticeValue::Bottom, _) => return,
        };
        self.lattice.insert(var.clone(), next);
        self.ssa_worklist.push(var.clone());
    }

    fn solve(&mut self, function: &IrFunction, uses: &HashMap<IrVariable, Vec<InstId>>) {
        self.flow_worklist.push((None, function.entry()));

        loop {
            if let Some((source, target)) = self.flow_worklist.pop() {
                if !self.executable_edges.insert((source, target)) {
                    continue;
                }
                let first_visit = self.reachable.insert(target);
                if first_visit {
                    for &id in function.inst_ids_of(target) {
                        self.visit_inst(function, id);
                    }
                } else {
                    for &id in &function.phi_ids_of(target) {
                        self.visit_inst(function, id);
                    }
                }
                continue;
            }

            if let Some(var) = self.ssa_worklist.pop() {
                if let Some(user_ids) = uses.get(&var) {
                    for &id in user_ids {
                        if self.reachable.contains(&function.inst(id).parent) {
                            self.visit_inst(function, id);
                        }
                    }
                }
                continue;
            }

            break;
        }
    }

    fn visit_inst(&mut self, function: &IrFunction, id: InstId) {
        let inst = function.inst(id);
        let block = inst.parent;

        match inst.opcode {
            Opcode::Phi => {
                let mut value = LatticeValue::Top;
                for (label, operand) in inst.phi_operands() {
                    let Some(pred) = function.block_by_label(label) else { continue };
                    if self.executable_edges.contains(&(Some(pred), block)) {
                        value = value.meet(&self.operand_value(operand));
                    }
                }
                if let Some(output) = &inst.output {
                    let output = output.clone();
                    self.set_lattice(&output, value);
                }
            }
            Opcode::Store => {
                let value = self.operand_value(&inst.operands[0]);
                if let Some(output) = &inst.output {
                    let output = output.clone();
                    self.set_lattice(&output, value);
                }
            }
            Opcode::Jmp => {
                if let Some(target) = inst.operands.first().and_then(Operand::as_label)
                    && let Some(target) = function.block_by_label(target)
                {
                    self.flow_worklist.push((Some(block), target));
                }
            }
            Opcode::Djmp => {
                for label in inst.label_operands() {
                    if let Some(target) = function.block_by_label(label) {
                        self.flow_worklist.push((Some(block), target));
                    }
                }
            }
            Opcode::Jnz => {
                let cond = self.operand_value(&inst.operands[0]);
                let targets: Vec<BlockId> = inst
                    .label_operands()
                    .filter_map(|label| function.block_by_label(label))
                    .collect();
                match cond {
                    LatticeValue::Top => {}
                    LatticeValue::Const(value) => {
                        let taken = usize::from(value.is_zero());
                        if let Some(&target) = targets.get(taken) {
                            self.flow_worklist.push((Some(block), target));
                        }
                    }
                    LatticeValue::Bottom => {
                        for target in targets {
                            self.flow_worklist.push((Some(block), target));
                        }
                    }
                }
            }
            _ => {
                let Some(output) = inst.output.clone() else { return };
                let value = self.evaluate(inst.opcode, &inst.operands);
                self.set_lattice(&output, value);
            }
        }
    }

    /// Pure evaluation over 256-bit words; arguments are taken in stack
    /// order (last operand on top).
    fn evaluate(&self, opcode: Opcode, operands: &[Operand]) -> LatticeValue {
        let Some(arity) = pure_arity(opcode) else { return LatticeValue::Bottom };
        if operands.len() != arity {
            return LatticeValue::Bottom;
        }

        let mut args: Vec<Word> = Vec::with_capacity(arity);
        for operand in operands.iter().rev() {
            match self.operand_value(operand) {
                LatticeValue::Const(value) => args.push(value),
                LatticeValue::Top => return LatticeValue::Top,
                LatticeValue::Bottom => return LatticeValue::Bottom,
            }
        }

        let value = match opcode {
            Opcode::Add => word::add(&args[0], &args[1]),
            Opcode::Sub => word::sub(&args[0], &args[1]),
            Opcode::Mul => word::mul(&args[0], &args[1]),
            Opcode::Div => word::div(&args[0], &args[1]),
            Opcode::Sdiv => word::sdiv(&args[0], &args[1]),
            Opcode::Mod => word::rem(&args[0], &args[1]),
            Opcode::Smod => word::srem(&args[0], &args[1]),
            Opcode::Exp => word::exp(&args[0], &args[1]),
            Opcode::Addmod => word::addmod(&args[0], &args[1], &args[2]),
            Opcode::Mulmod => word::mulmod(&args[0], &args[1], &args[2]),
            Opcode::And => &args[0] & &args[1],
            Opcode::Or => &args[0] | &args[1],
            Opcode::Xor => &args[0] ^ &args[1],
            Opcode::Not => word::not(&args[0]),
            Opcode::Shl => word::shl(&args[0], &args[1]),
            Opcode::Shr => word::shr(&args[0], &args[1]),
            Opcode::Sar => word::sar(&args[0], &args[1]),
            Opcode::Signextend => word::signextend(&args[0], &args[1]),
            Opcode::Lt => word::lt(&args[0], &args[1]),
            Opcode::Gt => word::gt(&args[0], &args[1]),
            Opcode::Slt => word::slt(&args[0], &args[1]),
            Opcode::Sgt => word::sgt(&args[0], &args[1]),
            Opcode::Eq => word::eq(&args[0], &args[1]),
            Opcode::Iszero => word::iszero(&args[0]),
            _ => return LatticeValue::Bottom,
        };
        LatticeValue::Const(value)
    }

    /// Rewrites the function with the solved lattice: constant variable
    /// operands become literals and constant-condition `jnz` becomes `jmp`.
    fn finalize(&self, function: &mut IrFunction) -> (bool, bool) {
        let mut changed = false;
        let mut cfg_changed = false;

        for &block in &function.body().to_vec() {
            for &id in &function.block(block).insts.clone() {
                let mut updates: Vec<(usize, Operand)> = Vec::new();
                for (i, operand) in function.inst(id).operands.iter().enumerate() {
                    if let Operand::Variable(var) = operand
                        && let Some(value) = self.lattice_of(var).as_const()
                    {
                        updates.push((i, Operand::Literal(value.clone())));
                    }
                }
                if !updates.is_empty() {
                    changed = true;
                    let inst = function.inst_mut(id);
                    for (i, operand) in updates {
                        inst.operands[i] = operand;
                    }
                }

                let inst = function.inst_mut(id);
                if inst.opcode == Opcode::Jnz
                    && let Some(cond) = inst.operands[0].as_literal().cloned()
                {
                    let taken = if cond.is_zero() { 2 } else { 1 };
                    let target = inst.operands[taken].clone();
                    inst.opcode = Opcode::Jmp;
                    inst.operands = vec![target];
                    changed = true;
                    cfg_changed = true;
                }
            }
        }
        (changed, cfg_changed)
    }
}

fn pure_arity(opcode: Opcode) -> Option<usize> {
    let arity = match opcode {
        Opcode::Not | Opcode::Iszero => 1,
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Sdiv
        | Opcode::Mod
        | Opcode::Smod
        | Opcode::Exp
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Shr
        | Opcode::Sar
        | Opcode::Signextend
        | Opcode::Lt
        | Opcode::Gt
        | Opcode::Slt
        | Opcode::Sgt
        | Opcode::Eq => 2,
        Opcode::Addmod | Opcode::Mulmod => 3,
        _ => return None,
    };
    Some(arity)
}

impl Pass for Sccp {
    fn name(&self) -> &'static str {
        "sccp"
    }

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError> {
        cache.request_cfg(function)?;
        let dfg = cache.request_dfg(function)?;

        // the solver owns a plain use index so lattice updates can walk it
        let mut uses: HashMap<IrVariable, Vec<InstId>> = HashMap::new();
        for (var, users) in dfg.all_uses() {
            uses.insert(var.clone(), users.iter().copied().collect());
        }

        self.lattice.clear();
        self.executable_edges.clear();
        self.reachable.clear();
        self.solve(function, &uses);

        let (changed, cfg_changed) = self.finalize(function);
        if cfg_changed {
            cache.invalidate(AnalysisKind::Cfg);
        }
        if changed {
            cache.invalidate(AnalysisKind::Dfg);
        }
        Ok(changed)
    }
}
