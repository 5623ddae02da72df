// src/analysis/alias.rs
//! The memory location model and aliasing oracle.
//!
//! Every instruction has a read location and a write location per address
//! space (memory or storage), derived from its literal operands. When an
//! offset or size operand is not a literal the location degrades to `Full`.
//!
//! Operand indexing follows the storage convention: the last operand is the
//! top of the stack, so e.g. `mstore` stores `[value, offset]` and its
//! write location is `(op1, 32)`.

use crate::ir::word::{WORD_BYTES, to_u64};
use crate::ir::{IrInstruction, Opcode, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Touches nothing. Aliases nothing, not even itself.
    Empty,
    /// May touch the entire address space.
    Full,
    /// The byte range `[offset, offset + size)`, `size > 0`.
    Range { offset: u64, size: u64 },
}

impl MemoryLocation {
    /// Normalizing constructor: a zero-sized range is `Empty`.
    pub fn range(offset: u64, size: u64) -> Self {
        if size == 0 { MemoryLocation::Empty } else { MemoryLocation::Range { offset, size } }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            MemoryLocation::Range { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MemoryLocation::Empty)
    }

    /// Whether two locations can refer to overlapping bytes.
    pub fn may_alias(&self, other: &MemoryLocation) -> bool {
        use MemoryLocation::{Empty, Full, Range};
        match (self, other) {
            (Empty, _) | (_, Empty) => false,
            (Full, _) | (_, Full) => true,
            (Range { offset: a, size: s }, Range { offset: b, size: t }) => {
                let (a, s) = (u128::from(*a), u128::from(*s));
                let (b, t) = (u128::from(*b), u128::from(*t));
                a.max(b) < (a + s).min(b + t)
            }
        }
    }

    /// Whether `self` covers every byte of `other`.
    pub fn completely_overlaps(&self, other: &MemoryLocation) -> bool {
        use MemoryLocation::{Empty, Full, Range};
        match (self, other) {
            (Empty, _) | (_, Empty) => false,
            (Full, _) => true,
            (_, Full) => false,
            (Range { offset: a, size: s }, Range { offset: b, size: t }) => {
                let (a, s) = (u128::from(*a), u128::from(*s));
                let (b, t) = (u128::from(*b), u128::from(*t));
                a <= b && b + t <= a + s
            }
        }
    }
}

/// Which address space a memory SSA instance versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    Memory,
    Storage,
}

impl LocationKind {
    pub fn load_op(self) -> Opcode {
        match self {
            LocationKind::Memory => Opcode::Mload,
            LocationKind::Storage => Opcode::Sload,
        }
    }

    pub fn store_op(self) -> Opcode {
        match self {
            LocationKind::Memory => Opcode::Mstore,
            LocationKind::Storage => Opcode::Sstore,
        }
    }
}

/// Offset from a literal operand, or `None` (meaning "unknown").
fn literal_offset(operand: &Operand) -> Option<u64> {
    operand.as_literal().and_then(to_u64)
}

/// `Range` from literal offset/size operands, `Full` when either is
/// unknown.
fn range_or_full(offset: &Operand, size: &Operand) -> MemoryLocation {
    match (literal_offset(offset), literal_offset(size)) {
        (Some(offset), Some(size)) => MemoryLocation::range(offset, size),
        _ => MemoryLocation::Full,
    }
}

fn word_at(offset: &Operand) -> MemoryLocation {
    match literal_offset(offset) {
        Some(offset) => MemoryLocation::range(offset, WORD_BYTES),
        None => MemoryLocation::Full,
    }
}

/// Storage locations are slot-granular.
fn slot_at(offset: &Operand) -> MemoryLocation {
    match literal_offset(offset) {
        Some(offset) => MemoryLocation::range(offset, 1),
        None => MemoryLocation::Full,
    }
}

/// The location an instruction reads in the given address space.
///
/// Halting opcodes that commit storage (`return`, `stop`, `exit`,
/// `selfdestruct`) read all of storage: the committed state is observable,
/// so no prior store may be considered dead across them. `revert` discards
/// state and reads nothing from storage. `ret` returns to a caller that may
/// read anything, in both address spaces.
pub fn read_location(inst: &IrInstruction, kind: LocationKind) -> MemoryLocation {
    let ops = &inst.operands;
    let n = ops.len();
    match kind {
        LocationKind::Memory => match inst.opcode {
            Opcode::Mload => word_at(&ops[0]),
            Opcode::Mcopy => range_or_full(&ops[1], &ops[0]),
            Opcode::Sha3 | Opcode::Return | Opcode::Revert => range_or_full(&ops[1], &ops[0]),
            Opcode::Sha3_64 => MemoryLocation::range(0, 64),
            Opcode::Log0 | Opcode::Log1 | Opcode::Log2 | Opcode::Log3 | Opcode::Log4 => {
                range_or_full(&ops[n - 1], &ops[n - 2])
            }
            Opcode::Call => range_or_full(&ops[3], &ops[2]),
            Opcode::Staticcall | Opcode::Delegatecall => range_or_full(&ops[3], &ops[2]),
            Opcode::Create => range_or_full(&ops[1], &ops[0]),
            Opcode::Create2 => range_or_full(&ops[2], &ops[1]),
            Opcode::Invoke | Opcode::Ret => MemoryLocation::Full,
            _ => MemoryLocation::Empty,
        },
        LocationKind::Storage => match inst.opcode {
            Opcode::Sload => slot_at(&ops[0]),
            Opcode::Call
            | Opcode::Staticcall
            | Opcode::Delegatecall
            | Opcode::Create
            | Opcode::Create2
            | Opcode::Invoke
            | Opcode::Ret => MemoryLocation::Full,
            Opcode::Return | Opcode::Stop | Opcode::Exit | Opcode::Selfdestruct => {
                MemoryLocation::Full
            }
            _ => MemoryLocation::Empty,
        },
    }
}

/// The location an instruction writes in the given address space.
pub fn write_location(inst: &IrInstruction, kind: LocationKind) -> MemoryLocation {
    let ops = &inst.operands;
    match kind {
        LocationKind::Memory => match inst.opcode {
            Opcode::Mstore => word_at(&ops[1]),
            Opcode::Mcopy
            | Opcode::Calldatacopy
            | Opcode::Codecopy
            | Opcode::Returndatacopy
            | Opcode::Dloadbytes => range_or_full(&ops[2], &ops[0]),
            Opcode::Extcodecopy => range_or_full(&ops[2], &ops[0]),
            // scratch space for the two hashed words
            Opcode::Sha3_64 => MemoryLocation::range(0, 64),
            Opcode::Dload => MemoryLocation::range(0, WORD_BYTES),
            Opcode::Call | Opcode::Staticcall | Opcode::Delegatecall => {
                range_or_full(&ops[1], &ops[0])
            }
            Opcode::Invoke => MemoryLocation::Full,
            _ => MemoryLocation::Empty,
        },
        LocationKind::Storage => match inst.opcode {
            Opcode::Sstore => slot_at(&ops[1]),
            Opcode::Call
            | Opcode::Delegatecall
            | Opcode::Create
            | Opcode::Create2
            | Opcode::Invoke => MemoryLocation::Full,
            _ => MemoryLocation::Empty,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aliases_nothing() {
        let empty = MemoryLocation::Empty;
        assert!(!empty.may_alias(&empty));
        assert!(!empty.may_alias(&MemoryLocation::Full));
        assert!(!MemoryLocation::Full.may_alias(&empty));
        assert!(!empty.may_alias(&MemoryLocation::range(0, 32)));
    }

    #[test]
    fn full_aliases_any_non_empty() {
        let full = MemoryLocation::Full;
        assert!(full.may_alias(&full));
        assert!(full.may_alias(&MemoryLocation::range(1000, 1)));
        assert!(MemoryLocation::range(1000, 1).may_alias(&full));
    }

    #[test]
    fn ranges_alias_iff_intervals_intersect() {
        let a = MemoryLocation::range(0, 32);
        let b = MemoryLocation::range(32, 32);
        let c = MemoryLocation::range(16, 32);
        assert!(!a.may_alias(&b));
        assert!(a.may_alias(&c));
        assert!(c.may_alias(&b));
    }

    #[test]
    fn may_alias_is_symmetric() {
        let locations = [
            MemoryLocation::Empty,
            MemoryLocation::Full,
            MemoryLocation::range(0, 32),
            MemoryLocation::range(16, 64),
            MemoryLocation::range(352, 32),
        ];
        for a in &locations {
            for b in &locations {
                assert_eq!(a.may_alias(b), b.may_alias(a));
            }
        }
    }

    #[test]
    fn complete_overlap_implies_alias() {
        let locations = [
            MemoryLocation::Empty,
            MemoryLocation::Full,
            MemoryLocation::range(0, 64),
            MemoryLocation::range(16, 16),
        ];
        for a in &locations {
            for b in &locations {
                if a.completely_overlaps(b) {
                    assert!(a.may_alias(b));
                }
            }
        }
    }

    #[test]
    fn partial_overlap_is_not_complete() {
        let a = MemoryLocation::range(352, 32);
        let b = MemoryLocation::range(356, 32);
        assert!(a.may_alias(&b));
        assert!(!a.completely_overlaps(&b));
        assert!(!b.completely_overlaps(&a));
    }

    #[test]
    fn zero_sized_range_is_empty() {
        assert!(MemoryLocation::range(10, 0).is_empty());
    }
}
