// src/ir/operand.rs
use crate::ir::word::Word;
use num_bigint::BigUint;
use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

/// A virtual register. The base name always starts with `%`; the version is
/// 0 before SSA construction and >= 1 afterwards. Identity is structural on
/// `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrVariable {
    name: Arc<str>,
    version: u32,
}

impl IrVariable {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self::versioned(name, 0)
    }

    pub fn versioned(name: impl AsRef<str>, version: u32) -> Self {
        let name = name.as_ref();
        let name: Arc<str> =
            if name.starts_with('%') { Arc::from(name) } else { Arc::from(format!("%{name}")) };
        IrVariable { name, version }
    }

    /// Base name including the leading `%`, without the version suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Same base name with a different version.
    pub fn with_version(&self, version: u32) -> Self {
        IrVariable { name: Arc::clone(&self.name), version }
    }
}

impl fmt::Display for IrVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version > 0 {
            write!(f, "{}:{}", self.name, self.version)
        } else {
            f.write_str(&self.name)
        }
    }
}

static BARE_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new("^[0-9a-zA-Z_]+$").unwrap());

/// A jump target or function name. `is_symbol` marks labels that originated
/// in user source; passes preserve such labels when folding blocks. Equality
/// and hashing ignore the flag.
#[derive(Debug, Clone)]
pub struct IrLabel {
    name: Arc<str>,
    is_symbol: bool,
}

impl IrLabel {
    pub fn new(name: impl AsRef<str>) -> Self {
        IrLabel { name: Arc::from(name.as_ref()), is_symbol: false }
    }

    pub fn symbol(name: impl AsRef<str>) -> Self {
        IrLabel { name: Arc::from(name.as_ref()), is_symbol: true }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_symbol(&self) -> bool {
        self.is_symbol
    }
}

impl PartialEq for IrLabel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for IrLabel {}

impl Hash for IrLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for IrLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if BARE_LABEL.is_match(&self.name) {
            f.write_str(&self.name)
        } else {
            write!(f, "{:?}", &*self.name)
        }
    }
}

/// Anything an instruction can operate on: a 256-bit literal, a virtual
/// register, or a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Literal(Word),
    Variable(IrVariable),
    Label(IrLabel),
}

impl Operand {
    pub fn literal(value: u64) -> Self {
        Operand::Literal(BigUint::from(value))
    }

    pub fn as_literal(&self) -> Option<&Word> {
        match self {
            Operand::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&IrVariable> {
        match self {
            Operand::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&IrLabel> {
        match self {
            Operand::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Operand::Literal(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Operand::Variable(_))
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Operand::Label(_))
    }
}

impl From<Word> for Operand {
    fn from(value: Word) -> Self {
        Operand::Literal(value)
    }
}

impl From<u64> for Operand {
    fn from(value: u64) -> Self {
        Operand::literal(value)
    }
}

impl From<IrVariable> for Operand {
    fn from(var: IrVariable) -> Self {
        Operand::Variable(var)
    }
}

impl From<IrLabel> for Operand {
    fn from(label: IrLabel) -> Self {
        Operand::Label(label)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{value}"),
            Operand::Variable(var) => write!(f, "{var}"),
            Operand::Label(label) => write!(f, "@{label}"),
        }
    }
}
