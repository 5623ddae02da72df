// src/codegen/asm.rs
use crate::ir::Word;
use num_traits::Zero;
use std::fmt;

/// One element of the flat assembly output: a mnemonic, the integer payload
/// following a `PUSH*`, or a symbolic label token resolved by the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmItem {
    Op(String),
    Data(Word),
    Symbol(String),
}

impl AsmItem {
    pub fn op(mnemonic: impl Into<String>) -> Self {
        AsmItem::Op(mnemonic.into())
    }

    pub fn symbol(name: impl fmt::Display) -> Self {
        AsmItem::Symbol(format!("_sym_{name}"))
    }
}

impl fmt::Display for AsmItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmItem::Op(mnemonic) => f.write_str(mnemonic),
            AsmItem::Data(value) => write!(f, "0x{value:x}"),
            AsmItem::Symbol(name) => f.write_str(name),
        }
    }
}

/// Appends a minimal-width push: `PUSH0` for zero, else `PUSHn` followed by
/// the payload.
pub fn push_word(asm: &mut Vec<AsmItem>, value: &Word) {
    if value.is_zero() {
        asm.push(AsmItem::op("PUSH0"));
        return;
    }
    let bytes = value.bits().div_ceil(8);
    asm.push(AsmItem::Op(format!("PUSH{bytes}")));
    asm.push(AsmItem::Data(value.clone()));
}

/// Renders the flat list one item per line, the way test fixtures and the
/// CLI show it.
pub fn format_assembly(items: &[AsmItem]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&item.to_string());
        out.push('\n');
    }
    out
}
