// src/lowering/lower.rs
//! Lowering of the legacy expression tree into the basic-block IR.
//!
//! The entry contract: the root node is `deploy` with three children:
//! constructor memory size, the runtime subtree, and the immutables
//! length. Lowering yields a context with one deploy function and one
//! runtime function. The walk is a mechanical recursion; `seq` produces
//! the value of its last child, `if` joins its arms through a shared
//! register, `with` scopes a named binding. All state threads through the
//! lowerer explicitly.

use super::legacy::{LegacyNode, LegacyValue};
use crate::error::CompileError;
use crate::ir::word::to_u64;
use crate::ir::{BlockId, IrContext, IrFunction, Opcode, Operand};

pub const DEPLOY_FUNCTION: &str = "_deploy";
pub const RUNTIME_FUNCTION: &str = "_global";

/// Lowers a legacy tree rooted at a `deploy` node.
pub fn lower_legacy(root: &LegacyNode) -> Result<IrContext, CompileError> {
    if root.name_str() != Some("deploy") || root.args.len() != 3 {
        return Err(CompileError::structure(
            "legacy root must be `deploy` with three children".to_owned(),
        ));
    }
    let ctor_mem_size = root.args[0]
        .as_literal()
        .and_then(to_u64)
        .ok_or_else(|| CompileError::structure("constructor memory size must be a literal".to_owned()))?;
    let immutables_len = root.args[2]
        .as_literal()
        .and_then(to_u64)
        .ok_or_else(|| CompileError::structure("immutables length must be a literal".to_owned()))?;

    let mut ctx = IrContext::new();
    ctx.ctor_mem_size = Some(ctor_mem_size);
    ctx.immutables_len = Some(immutables_len);

    {
        let deploy = ctx.create_function(DEPLOY_FUNCTION);
        let entry = deploy.entry();
        deploy.append_instruction(
            entry,
            Opcode::Deploy,
            vec![Operand::literal(ctor_mem_size), Operand::literal(immutables_len)],
        );
        deploy.append_instruction(entry, Opcode::Stop, vec![]);
    }

    {
        let runtime = ctx.create_function(RUNTIME_FUNCTION);
        let entry = runtime.entry();
        let mut lowerer = Lowerer { function: runtime, current: entry, bindings: Vec::new() };
        lowerer.lower(&root.args[1])?;
        let last = lowerer.current;
        if !lowerer.function.is_terminated(last) {
            lowerer.function.append_instruction(last, Opcode::Stop, vec![]);
        }
    }

    Ok(ctx)
}

/// Lowers one expression subtree into a fresh function (used by tests and
/// by front-ends that compile free-standing routines).
pub fn lower_expression(ctx: &mut IrContext, name: &str, node: &LegacyNode) -> Result<(), CompileError> {
    let function = ctx.create_function(name);
    let entry = function.entry();
    let mut lowerer = Lowerer { function, current: entry, bindings: Vec::new() };
    lowerer.lower(node)?;
    let last = lowerer.current;
    if !lowerer.function.is_terminated(last) {
        lowerer.function.append_instruction(last, Opcode::Stop, vec![]);
    }
    Ok(())
}

struct Lowerer<'a> {
    function: &'a mut IrFunction,
    current: BlockId,
    /// `with` bindings, innermost last.
    bindings: Vec<(String, Operand)>,
}

impl Lowerer<'_> {
    fn lower(&mut self, node: &LegacyNode) -> Result<Option<Operand>, CompileError> {
        match &node.value {
            LegacyValue::Literal(value) => Ok(Some(Operand::Literal(value.clone()))),
            LegacyValue::Name(name) => match name.as_str() {
                "seq" => {
                    let mut value = None;
                    for child in &node.args {
                        value = self.lower(child)?;
                    }
                    Ok(value)
                }
                "if" => self.lower_if(node),
                "with" => self.lower_with(node),
                "pass" => Ok(None),
                _ => {
                    if let Some((_, operand)) =
                        self.bindings.iter().rev().find(|(bound, _)| bound == name)
                    {
                        return Ok(Some(operand.clone()));
                    }
                    self.lower_opcode(name, node)
                }
            },
        }
    }

    fn lower_if(&mut self, node: &LegacyNode) -> Result<Option<Operand>, CompileError> {
        if node.args.len() < 2 || node.args.len() > 3 {
            return Err(CompileError::structure("`if` takes two or three children".to_owned()));
        }
        let cond = self.lower_value(&node.args[0])?;

        let then_label = self.function.get_next_label("then");
        let else_label = self.function.get_next_label("else");
        let exit_label = self.function.get_next_label("if_exit");
        let then_block = self.function.append_basic_block(then_label.clone());
        let else_block = self.function.append_basic_block(else_label.clone());

        self.append(
            Opcode::Jnz,
            vec![cond, Operand::Label(then_label), Operand::Label(else_label)],
        );

        // both arms write the join register; SSA construction rebuilds the
        // phi later
        let result = self.function.get_next_variable();
        let mut arm_values = 0;

        self.current = then_block;
        if let Some(value) = self.lower(&node.args[1])? {
            self.function.append_instruction_ret(
                self.current,
                Opcode::Store,
                vec![value],
                Some(result.clone()),
            );
            arm_values += 1;
        }
        let then_end = self.current;
        if !self.function.is_terminated(then_end) {
            self.function.append_instruction(
                then_end,
                Opcode::Jmp,
                vec![Operand::Label(exit_label.clone())],
            );
        }

        self.current = else_block;
        if let Some(else_node) = node.args.get(2)
            && let Some(value) = self.lower(else_node)?
        {
            self.function.append_instruction_ret(
                self.current,
                Opcode::Store,
                vec![value],
                Some(result.clone()),
            );
            arm_values += 1;
        }
        let else_end = self.current;
        if !self.function.is_terminated(else_end) {
            self.function.append_instruction(
                else_end,
                Opcode::Jmp,
                vec![Operand::Label(exit_label.clone())],
            );
        }

        let exit_block = self.function.append_basic_block(exit_label);
        self.current = exit_block;
        Ok((arm_values == 2).then(|| Operand::Variable(result)))
    }

    fn lower_with(&mut self, node: &LegacyNode) -> Result<Option<Operand>, CompileError> {
        if node.args.len() != 3 {
            return Err(CompileError::structure("`with` takes three children".to_owned()));
        }
        let name = node.args[0]
            .name_str()
            .ok_or_else(|| CompileError::structure("`with` binding must be a name".to_owned()))?
            .to_owned();
        let value = self.lower_value(&node.args[1])?;
        self.bindings.push((name, value));
        let result = self.lower(&node.args[2]);
        self.bindings.pop();
        result
    }

    fn lower_opcode(
        &mut self,
        name: &str,
        node: &LegacyNode,
    ) -> Result<Option<Operand>, CompileError> {
        let opcode: Opcode = name
            .parse()
            .map_err(|()| CompileError::UnsupportedOpcode { opcode: name.to_owned() })?;

        let mut operands = Vec::with_capacity(node.args.len());
        for child in &node.args {
            operands.push(self.lower_value(child)?);
        }
        // legacy children are in machine order; storage is stack order
        operands.reverse();

        let output = self.append(opcode, operands);
        if opcode.is_bb_terminator() {
            // anything lowered after a terminator lands in a fresh
            // (unreachable) block and is cleaned up by the CFG passes
            let label = self.function.get_next_label("dead");
            self.current = self.function.append_basic_block(label);
        }
        Ok(output.map(Operand::Variable))
    }

    /// Lowers a child and forces a usable operand out of it.
    fn lower_value(&mut self, node: &LegacyNode) -> Result<Operand, CompileError> {
        self.lower(node)?.ok_or_else(|| {
            CompileError::structure(format!("expression `{node}` produces no value"))
        })
    }

    fn append(&mut self, opcode: Opcode, operands: Vec<Operand>) -> Option<crate::ir::IrVariable> {
        self.function.append_instruction(self.current, opcode, operands)
    }
}
