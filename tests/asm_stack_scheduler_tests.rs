use evmir::codegen::{AsmItem, generate_assembly};
use evmir::ir::{IrContext, Word};
use evmir::parser::parse_ir;

fn parsed(source: &str) -> IrContext {
    parse_ir(source).expect("test program parses")
}

fn ops(asm: &[AsmItem]) -> Vec<String> {
    asm.iter()
        .map(|item| match item {
            AsmItem::Op(op) => op.clone(),
            AsmItem::Data(value) => format!("<{value}>"),
            AsmItem::Symbol(symbol) => symbol.clone(),
        })
        .collect()
}

fn count_op(asm: &[AsmItem], mnemonic: &str) -> usize {
    asm.iter()
        .filter(|item| matches!(item, AsmItem::Op(op) if op.starts_with(mnemonic)))
        .count()
}

#[test]
fn straight_line_arithmetic_emits_in_stack_order() {
    let mut ctx = parsed(
        "
function main {
    main:
        %a = calldataload 0
        %b = add %a, 1
        mstore 0, %b
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).expect("emits");
    let rendered = ops(&asm);

    // the function label opens the stream
    assert_eq!(rendered[0], "_sym_main");
    assert_eq!(rendered[1], "JUMPDEST");
    assert!(rendered.contains(&"CALLDATALOAD".to_owned()));
    assert!(rendered.contains(&"ADD".to_owned()));
    assert!(rendered.contains(&"MSTORE".to_owned()));
    assert!(rendered.contains(&"STOP".to_owned()));

    // the add comes after its input load, the store after the add
    let load = rendered.iter().position(|op| op == "CALLDATALOAD").unwrap();
    let add = rendered.iter().position(|op| op == "ADD").unwrap();
    let store = rendered.iter().position(|op| op == "MSTORE").unwrap();
    assert!(load < add && add < store);
}

#[test]
fn doubly_used_values_are_duped_once() {
    // one DUP for the second use of a value, none for a single use
    let mut ctx = parsed(
        "
function main {
    main:
        %a = calldataload 0
        %b = add %a, %a
        mstore 0, %b
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    assert_eq!(count_op(&asm, "DUP"), 1);
}

#[test]
fn singly_used_values_are_consumed_in_place() {
    let mut ctx = parsed(
        "
function main {
    main:
        %a = calldataload 0
        %b = add %a, 1
        mstore 0, %b
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    assert_eq!(count_op(&asm, "DUP"), 0);
}

#[test]
fn literals_render_as_minimal_pushes() {
    let mut ctx = parsed(
        "
function main {
    main:
        mstore 0, 300
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    // 300 needs two bytes, the zero offset uses PUSH0
    let rendered = ops(&asm);
    let push2 = rendered.iter().position(|op| op == "PUSH2").unwrap();
    assert_eq!(rendered[push2 + 1], format!("<{}>", Word::from(300u32)));
    assert!(rendered.contains(&"PUSH0".to_owned()));
}

#[test]
fn branches_emit_jumpi_then_unconditional_jump() {
    let mut ctx = parsed(
        "
function main {
    main:
        %c = calldataload 0
        jnz %c, @yes, @no
    yes:
        stop
    no:
        revert 0, 0
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    let rendered = ops(&asm);

    let jumpi = rendered.iter().position(|op| op == "JUMPI").unwrap();
    assert_eq!(rendered[jumpi - 1], "_sym_yes");
    assert_eq!(rendered[jumpi + 1], "_sym_no");
    assert_eq!(rendered[jumpi + 2], "JUMP");
    assert!(rendered.contains(&"REVERT".to_owned()));
}

#[test]
fn merge_blocks_are_emitted_once() {
    let mut ctx = parsed(
        "
function main {
    main:
        %c = calldataload 0
        jnz %c, @a, @b
    a:
        jmp @join
    b:
        jmp @join
    join:
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    let rendered = ops(&asm);
    let join_defs =
        rendered.iter().filter(|op| op.as_str() == "_sym_join").count();
    // one JUMPDEST definition plus two jump references
    assert_eq!(join_defs, 3);
    assert_eq!(count_op(&asm, "STOP"), 1);
}

#[test]
fn phi_values_travel_through_the_stack() {
    let mut ctx = parsed(
        "
function main {
    main:
        %c = calldataload 0
        jnz %c, @a, @b
    a:
        %x:1 = 1
        jmp @join
    b:
        %x:2 = 2
        jmp @join
    join:
        %x:3 = phi @a, %x:1, @b, %x:2
        mstore 0, %x:3
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).expect("phi routing emits");
    // both arm constants are pushed somewhere before the join's store
    let rendered = ops(&asm);
    assert!(rendered.contains(&"PUSH1".to_owned()));
    assert_eq!(count_op(&asm, "MSTORE"), 1);
    assert_eq!(count_op(&asm, "STOP"), 1);
}

#[test]
fn internal_calls_expand_to_jump_pairs() {
    let mut ctx = parsed(
        "
function main {
    main:
        %1 = invoke @helper, 5
        mstore 0, %1
        stop
}
function helper {
    helper:
        %pc = param
        %a = param
        %sum = add %a, 1
        ret %pc, %sum
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    let rendered = ops(&asm);

    // call site: push return label, push callee, jump, land
    let call = rendered.iter().position(|op| op == "_sym_label_ret_0").unwrap();
    assert_eq!(rendered[call + 1], "_sym_helper");
    assert_eq!(rendered[call + 2], "JUMP");
    assert_eq!(rendered[call + 3], "_sym_label_ret_0");
    assert_eq!(rendered[call + 4], "JUMPDEST");

    // the callee body is emitted under its own label
    let helper_at = rendered.iter().rposition(|op| op == "_sym_helper").unwrap();
    assert!(helper_at > call);
}

#[test]
fn the_revert_postamble_closes_the_program() {
    let mut ctx = parsed(
        "
function main {
    main:
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    let rendered = ops(&asm);
    let revert_label =
        rendered.iter().position(|op| op == "_sym___revert").unwrap();
    assert_eq!(
        &rendered[revert_label..revert_label + 5],
        &["_sym___revert", "JUMPDEST", "PUSH0", "DUP1", "REVERT"]
    );
}

#[test]
fn asserts_jump_to_the_shared_revert() {
    let mut ctx = parsed(
        "
function main {
    main:
        %ok = calldataload 0
        assert %ok
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, false).unwrap();
    let rendered = ops(&asm);
    let iszero = rendered.iter().position(|op| op == "ISZERO").unwrap();
    assert_eq!(rendered[iszero + 1], "_sym___revert");
    assert_eq!(rendered[iszero + 2], "JUMPI");
}

#[test]
fn optimized_output_has_no_adjacent_swap_pairs() {
    let mut ctx = parsed(
        "
function main {
    main:
        %a = calldataload 0
        %b = calldataload 32
        %c = sub %a, %b
        mstore 0, %c
        stop
}
",
    );
    let asm = generate_assembly(&mut ctx, true).unwrap();
    let rendered = ops(&asm);
    for pair in rendered.windows(2) {
        if pair[0].starts_with("SWAP") {
            assert_ne!(pair[0], pair[1], "redundant swap pair survived");
        }
    }
    assert!(rendered.contains(&"SUB".to_owned()));
}
