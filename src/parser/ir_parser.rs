// src/parser/ir_parser.rs
//! Recursive-descent parser for the textual IR.
//!
//! The grammar is line-oriented and mirrors the printer exactly: parsing the
//! output of `IrContext::to_string` reproduces the same instructions. The
//! printer emits operands in stack order (top first) for ordinary opcodes,
//! so the parser reverses them back into storage order.

use super::lexer::{TokenKind, tokenize};
use crate::error::CompileError;
use crate::ir::{BlockId, IrContext, IrFunction, IrInstruction, IrLabel, IrVariable, Opcode, Operand, Word};
use num_bigint::BigUint;

/// Parses a textual IR program into a context.
pub fn parse_ir(source: &str) -> Result<IrContext, CompileError> {
    Parser::new(source)?.parse_program()
}

struct Parser {
    tokens: Vec<(TokenKind, usize)>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, CompileError> {
        let tokens = tokenize(source).map_err(|line| CompileError::ParseError {
            message: "unrecognized character".into(),
            line,
        })?;
        Ok(Parser { tokens, pos: 0 })
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).or_else(|| self.tokens.last()).map_or(1, |(_, line)| *line)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::ParseError { message: message.into(), line: self.line() }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &TokenKind, what: &str) -> Result<(), CompileError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&TokenKind::Newline) {
            self.pos += 1;
        }
    }

    fn parse_program(&mut self) -> Result<IrContext, CompileError> {
        let mut ctx = IrContext::new();
        self.skip_newlines();
        while let Some(token) = self.peek() {
            match token {
                TokenKind::Function => self.parse_function(&mut ctx)?,
                TokenKind::Data => self.parse_data(&mut ctx)?,
                _ => return Err(self.error("expected `function` or `data`")),
            }
            self.skip_newlines();
        }
        Ok(ctx)
    }

    fn parse_function(&mut self, ctx: &mut IrContext) -> Result<(), CompileError> {
        self.expect(&TokenKind::Function, "`function`")?;
        let name = self.parse_name("function name")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        self.skip_newlines();

        let mut function = IrFunction::new(IrLabel::symbol(&name));
        let mut current: Option<BlockId> = None;
        let mut first_block = true;

        loop {
            match self.peek() {
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated function body")),
                _ => {}
            }

            if self.at_block_label() {
                let label = self.parse_name("block label")?;
                self.expect(&TokenKind::Colon, "`:`")?;
                self.skip_newlines();
                current = Some(self.begin_block(&mut function, &label, first_block)?);
                first_block = false;
            } else {
                let Some(block) = current else {
                    return Err(self.error("instruction before first block label"));
                };
                self.parse_instruction(&mut function, block)?;
                self.skip_newlines();
            }
        }

        ctx.add_function(function);
        Ok(())
    }

    /// A block label line looks ahead as `name :`.
    fn at_block_label(&self) -> bool {
        matches!(self.peek(), Some(TokenKind::Word(_) | TokenKind::Quoted(_)))
            && matches!(self.tokens.get(self.pos + 1), Some((TokenKind::Colon, _)))
    }

    fn begin_block(
        &mut self,
        function: &mut IrFunction,
        label: &str,
        first: bool,
    ) -> Result<BlockId, CompileError> {
        self.reserve_label_counter(function, label);
        let label = if label == function.name.name() {
            function.name.clone()
        } else {
            IrLabel::new(label)
        };
        if first {
            let entry = function.entry();
            if function.block(entry).label != label {
                function.relabel_basic_block(entry, label);
            }
            Ok(entry)
        } else {
            if function.block_by_label(&label).is_some() {
                return Err(self.error(format!("duplicate block label {label}")));
            }
            Ok(function.append_basic_block(label))
        }
    }

    fn parse_instruction(
        &mut self,
        function: &mut IrFunction,
        block: BlockId,
    ) -> Result<(), CompileError> {
        if function.is_terminated(block) {
            return Err(self.error("instruction after block terminator"));
        }

        let output = if let Some(TokenKind::Variable(text)) = self.peek() {
            let text = text.clone();
            // only an assignment makes this an output; a bare variable line
            // is malformed and caught below
            if matches!(self.tokens.get(self.pos + 1), Some((TokenKind::Assign, _))) {
                self.pos += 2;
                Some(self.make_variable(function, &text))
            } else {
                None
            }
        } else {
            None
        };

        let (opcode, operands) = match self.peek().cloned() {
            Some(TokenKind::Word(word)) => {
                if let Ok(opcode) = word.parse::<Opcode>() {
                    self.pos += 1;
                    let operands = self.parse_operand_list(function)?;
                    (opcode, reorder_parsed_operands(opcode, operands))
                } else if output.is_some() {
                    // literal store: `%x = 42`
                    let literal = self.parse_number(&word)?;
                    self.pos += 1;
                    (Opcode::Store, vec![Operand::Literal(literal)])
                } else {
                    return Err(self.error(format!("unknown opcode `{word}`")));
                }
            }
            Some(TokenKind::Variable(text)) if output.is_some() => {
                // variable store: `%x = %y`
                self.pos += 1;
                (Opcode::Store, vec![Operand::Variable(self.make_variable(function, &text))])
            }
            _ => return Err(self.error("expected instruction")),
        };

        // `invoke` produces a value iff the callee returns one
        if output.is_some() && !opcode.has_output() && opcode != Opcode::Invoke {
            return Err(self.error(format!("opcode `{opcode}` does not produce a value")));
        }

        let mut inst = IrInstruction::new(opcode, operands);
        inst.output = output;
        inst.parent = block;
        let index = function.block(block).insts.len();
        function.insert_instruction(block, index, inst);
        Ok(())
    }

    fn parse_operand_list(
        &mut self,
        function: &mut IrFunction,
    ) -> Result<Vec<Operand>, CompileError> {
        let mut operands = Vec::new();
        if matches!(self.peek(), Some(TokenKind::Newline | TokenKind::RBrace) | None) {
            return Ok(operands);
        }
        loop {
            operands.push(self.parse_operand(function)?);
            if self.peek() == Some(&TokenKind::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(operands)
    }

    fn parse_operand(&mut self, function: &mut IrFunction) -> Result<Operand, CompileError> {
        match self.bump() {
            Some(TokenKind::Variable(text)) => {
                Ok(Operand::Variable(self.make_variable(function, &text)))
            }
            Some(TokenKind::LabelRef(text)) => Ok(Operand::Label(parse_label_ref(&text))),
            Some(TokenKind::Word(word)) => Ok(Operand::Literal(self.parse_number(&word)?)),
            _ => Err(self.error("expected operand")),
        }
    }

    fn parse_number(&self, word: &str) -> Result<Word, CompileError> {
        let parsed = if let Some(hex) = word.strip_prefix("0x") {
            BigUint::parse_bytes(hex.as_bytes(), 16)
        } else {
            BigUint::parse_bytes(word.as_bytes(), 10)
        };
        parsed.ok_or_else(|| self.error(format!("invalid literal `{word}`")))
    }

    /// `%name` or `%name:version`; numeric names advance the function's
    /// fresh-variable counter so later allocations cannot collide.
    fn make_variable(&self, function: &mut IrFunction, text: &str) -> IrVariable {
        let body = text.trim_start_matches('%');
        let (name, version) = match body.split_once(':') {
            Some((name, version)) => (name, version.parse().unwrap_or(0)),
            None => (body, 0),
        };
        if let Ok(n) = name.parse::<u32>() {
            function.reserve_variable(n);
        }
        IrVariable::versioned(name, version)
    }

    fn reserve_label_counter(&self, function: &mut IrFunction, label: &str) {
        let digits: String = label.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(n) = digits.parse::<u32>() {
            function.reserve_label(n);
        }
    }

    fn parse_name(&mut self, what: &str) -> Result<String, CompileError> {
        match self.bump() {
            Some(TokenKind::Word(word)) => Ok(word),
            Some(TokenKind::Quoted(text)) => Ok(text.trim_matches('"').to_owned()),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn parse_data(&mut self, ctx: &mut IrContext) -> Result<(), CompileError> {
        self.expect(&TokenKind::Data, "`data`")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        self.skip_newlines();
        loop {
            match self.bump() {
                Some(TokenKind::RBrace) => break,
                Some(TokenKind::Word(word)) => {
                    let opcode = match word.as_str() {
                        "db" => Opcode::Db,
                        "dbname" => Opcode::Dbname,
                        other => {
                            return Err(self.error(format!("unexpected data directive `{other}`")));
                        }
                    };
                    let operand = match self.bump() {
                        Some(TokenKind::LabelRef(text)) => Operand::Label(parse_label_ref(&text)),
                        Some(TokenKind::Word(word)) => Operand::Literal(self.parse_number(&word)?),
                        _ => return Err(self.error("expected data operand")),
                    };
                    ctx.append_data(opcode, vec![operand]);
                    self.skip_newlines();
                }
                _ => return Err(self.error("expected data directive or `}`")),
            }
        }
        Ok(())
    }
}

fn parse_label_ref(text: &str) -> IrLabel {
    let body = text.trim_start_matches('@').trim_matches('"');
    IrLabel::new(body)
}

/// The printer shows ordinary operands top-of-stack first; storage order is
/// the reverse. Control-flow and pseudo opcodes are positional, and `invoke`
/// keeps its callee first.
fn reorder_parsed_operands(opcode: Opcode, mut operands: Vec<Operand>) -> Vec<Operand> {
    match opcode {
        Opcode::Jmp | Opcode::Jnz | Opcode::Djmp | Opcode::Phi | Opcode::Param => operands,
        Opcode::Invoke => {
            if operands.is_empty() {
                return operands;
            }
            let callee = operands.remove(0);
            operands.reverse();
            operands.insert(0, callee);
            operands
        }
        _ => {
            operands.reverse();
            operands
        }
    }
}
