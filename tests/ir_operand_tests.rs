use evmir::ir::{IrLabel, IrVariable, Operand};
use num_bigint::BigUint;
use std::collections::HashSet;

#[test]
fn variable_identity_is_name_and_version() {
    let a = IrVariable::new("x");
    let b = IrVariable::versioned("x", 0);
    let c = IrVariable::versioned("x", 1);
    assert_eq!(a, b);
    assert_ne!(a, c);

    let mut set = HashSet::new();
    set.insert(a.clone());
    assert!(set.contains(&b));
    assert!(!set.contains(&c));
}

#[test]
fn variable_name_is_normalized_with_percent() {
    let bare = IrVariable::new("x");
    let prefixed = IrVariable::new("%x");
    assert_eq!(bare, prefixed);
    assert_eq!(bare.name(), "%x");
}

#[test]
fn variable_display_shows_version_suffix() {
    assert_eq!(IrVariable::new("val").to_string(), "%val");
    assert_eq!(IrVariable::versioned("val", 2).to_string(), "%val:2");
}

#[test]
fn with_version_keeps_the_base_name() {
    let v0 = IrVariable::new("x");
    let v3 = v0.with_version(3);
    assert_eq!(v3.name(), "%x");
    assert_eq!(v3.version(), 3);
}

#[test]
fn label_equality_ignores_the_symbol_flag() {
    let plain = IrLabel::new("entry");
    let symbol = IrLabel::symbol("entry");
    assert_eq!(plain, symbol);
    assert!(symbol.is_symbol());
    assert!(!plain.is_symbol());

    let mut set = HashSet::new();
    set.insert(plain);
    assert!(set.contains(&symbol));
}

#[test]
fn label_display_quotes_non_identifiers() {
    assert_eq!(IrLabel::new("block_1").to_string(), "block_1");
    assert_eq!(IrLabel::new("weird name").to_string(), "\"weird name\"");
}

#[test]
fn operand_accessors() {
    let lit = Operand::literal(42);
    let var = Operand::Variable(IrVariable::new("x"));
    let label = Operand::Label(IrLabel::new("l"));

    assert_eq!(lit.as_literal(), Some(&BigUint::from(42u32)));
    assert!(lit.as_variable().is_none());
    assert!(var.is_variable());
    assert!(label.is_label());
    assert_eq!(label.to_string(), "@l");
}

#[test]
fn literal_operands_hash_structurally() {
    let a = Operand::literal(1000);
    let b = Operand::Literal(BigUint::from(1000u32));
    let mut set = HashSet::new();
    set.insert(a);
    assert!(set.contains(&b));
}
