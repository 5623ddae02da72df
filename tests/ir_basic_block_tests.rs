use evmir::ir::{IrFunction, IrLabel, Opcode, Operand};

fn sample_function() -> IrFunction {
    IrFunction::new(IrLabel::symbol("main"))
}

#[test]
fn entry_block_carries_the_function_name() {
    let function = sample_function();
    let entry = function.entry();
    assert_eq!(function.block(entry).label.name(), "main");
    assert_eq!(function.num_basic_blocks(), 1);
}

#[test]
fn append_allocates_outputs_only_for_value_opcodes() {
    let mut function = sample_function();
    let entry = function.entry();
    let out = function.append_instruction(entry, Opcode::Calldataload, vec![Operand::literal(0)]);
    assert!(out.is_some());
    let none = function.append_instruction(
        entry,
        Opcode::Mstore,
        vec![Operand::Variable(out.unwrap()), Operand::literal(0)],
    );
    assert!(none.is_none());
}

#[test]
fn block_is_terminated_only_by_a_terminator() {
    let mut function = sample_function();
    let entry = function.entry();
    function.append_instruction(entry, Opcode::Calldataload, vec![Operand::literal(0)]);
    assert!(!function.is_terminated(entry));
    function.append_instruction(entry, Opcode::Stop, vec![]);
    assert!(function.is_terminated(entry));
    assert!(function.terminator_of(entry).is_some());
}

#[test]
fn check_structure_rejects_unterminated_blocks() {
    let mut function = sample_function();
    let entry = function.entry();
    function.append_instruction(entry, Opcode::Calldataload, vec![Operand::literal(0)]);
    assert!(function.check_structure().is_err());
    function.append_instruction(entry, Opcode::Stop, vec![]);
    assert!(function.check_structure().is_ok());
}

#[test]
fn check_structure_rejects_jumps_to_unknown_labels() {
    let mut function = sample_function();
    let entry = function.entry();
    function.append_instruction(
        entry,
        Opcode::Jmp,
        vec![Operand::Label(IrLabel::new("nowhere"))],
    );
    assert!(function.check_structure().is_err());
}

#[test]
fn dead_instruction_set_batches_removal() {
    let mut function = sample_function();
    let entry = function.entry();
    function.append_instruction(entry, Opcode::Calldataload, vec![Operand::literal(0)]);
    function.append_instruction(entry, Opcode::Calldataload, vec![Operand::literal(32)]);
    function.append_instruction(entry, Opcode::Stop, vec![]);

    let doomed = function.inst_ids_of(entry)[0];
    function.block_mut(entry).mark_for_removal(doomed);
    assert_eq!(function.inst_ids_of(entry).len(), 3);
    assert_eq!(function.drain_dead_instructions(), 1);
    assert_eq!(function.inst_ids_of(entry).len(), 2);
}

#[test]
fn fix_phi_degenerates_single_pair_to_store() {
    let mut function = sample_function();
    let entry = function.entry();
    function.append_instruction(
        entry,
        Opcode::Jnz,
        vec![
            Operand::literal(1),
            Operand::Label(IrLabel::new("a")),
            Operand::Label(IrLabel::new("b")),
        ],
    );
    let a = function.append_basic_block(IrLabel::new("a"));
    let b = function.append_basic_block(IrLabel::new("b"));
    let join = function.append_basic_block(IrLabel::new("join"));
    function.append_instruction(a, Opcode::Jmp, vec![Operand::Label(IrLabel::new("join"))]);
    function.append_instruction(b, Opcode::Jmp, vec![Operand::Label(IrLabel::new("join"))]);

    let x1 = evmir::ir::IrVariable::versioned("x", 1);
    let x2 = evmir::ir::IrVariable::versioned("x", 2);
    let phi = evmir::ir::IrInstruction::new(
        Opcode::Phi,
        vec![
            Operand::Label(IrLabel::new("a")),
            Operand::Variable(x1),
            Operand::Label(IrLabel::new("b")),
            Operand::Variable(x2.clone()),
        ],
    )
    .with_output(evmir::ir::IrVariable::versioned("x", 3));
    let phi_id = function.insert_instruction(join, 0, phi);
    function.append_instruction(join, Opcode::Stop, vec![]);

    // only `b` remains a predecessor
    function.block_mut(join).add_cfg_in(b);
    function.fix_phi_instructions(join);

    let fixed = function.inst(phi_id);
    assert_eq!(fixed.opcode, Opcode::Store);
    assert_eq!(fixed.operands, vec![Operand::Variable(x2)]);
}

#[test]
fn fix_phi_degenerates_empty_phi_to_nop() {
    let mut function = sample_function();
    let entry = function.entry();
    let join = function.append_basic_block(IrLabel::new("join"));
    function.append_instruction(entry, Opcode::Jmp, vec![Operand::Label(IrLabel::new("join"))]);

    let phi = evmir::ir::IrInstruction::new(
        Opcode::Phi,
        vec![
            Operand::Label(IrLabel::new("gone")),
            Operand::literal(1),
            Operand::Label(IrLabel::new("also_gone")),
            Operand::literal(2),
        ],
    )
    .with_output(evmir::ir::IrVariable::new("x"));
    let phi_id = function.insert_instruction(join, 0, phi);
    function.append_instruction(join, Opcode::Stop, vec![]);

    function.fix_phi_instructions(join);
    assert_eq!(function.inst(phi_id).opcode, Opcode::Nop);
    assert!(function.inst(phi_id).output.is_none());
}
