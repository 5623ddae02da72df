use evmir::error::CompileError;
use evmir::ir::{IrLabel, Opcode};
use evmir::lowering::{DEPLOY_FUNCTION, LegacyNode, RUNTIME_FUNCTION, lower_legacy};

fn deploy(runtime: LegacyNode) -> LegacyNode {
    LegacyNode::op("deploy", vec![LegacyNode::num(64), runtime, LegacyNode::num(0)])
}

#[test]
fn the_deploy_root_yields_two_functions() {
    let tree = deploy(LegacyNode::op("seq", vec![LegacyNode::op("stop", vec![])]));
    let ctx = lower_legacy(&tree).expect("lowers");

    assert_eq!(ctx.ctor_mem_size, Some(64));
    assert_eq!(ctx.immutables_len, Some(0));
    assert_eq!(ctx.num_functions(), 2);

    let deploy_fn = ctx.get_function(&IrLabel::new(DEPLOY_FUNCTION)).unwrap();
    let entry = deploy_fn.entry();
    assert!(deploy_fn.instructions_of(entry).any(|i| i.opcode == Opcode::Deploy));
    assert!(deploy_fn.check_structure().is_ok());

    let runtime = ctx.get_function(&IrLabel::new(RUNTIME_FUNCTION)).unwrap();
    assert!(runtime.check_structure().is_ok());
}

#[test]
fn malformed_roots_are_rejected() {
    let err = lower_legacy(&LegacyNode::op("seq", vec![])).unwrap_err();
    assert!(matches!(err, CompileError::StructureError { .. }));
}

#[test]
fn expressions_lower_in_machine_operand_order() {
    // (mstore 0 (add 1 2)): offset first, value second
    let tree = deploy(LegacyNode::op(
        "seq",
        vec![
            LegacyNode::op(
                "mstore",
                vec![
                    LegacyNode::num(0),
                    LegacyNode::op("add", vec![LegacyNode::num(1), LegacyNode::num(2)]),
                ],
            ),
            LegacyNode::op("stop", vec![]),
        ],
    ));
    let ctx = lower_legacy(&tree).expect("lowers");
    let runtime = ctx.get_function(&IrLabel::new(RUNTIME_FUNCTION)).unwrap();
    let entry = runtime.entry();

    let mstore = runtime
        .instructions_of(entry)
        .find(|inst| inst.opcode == Opcode::Mstore)
        .expect("mstore lowered");
    // storage order: value first, offset on top
    assert!(mstore.operands[0].is_variable());
    assert_eq!(mstore.operands[1].as_literal().map(|v| u64::try_from(v).unwrap()), Some(0));
}

#[test]
fn if_expressions_join_through_a_shared_register() {
    let tree = deploy(LegacyNode::op(
        "seq",
        vec![
            LegacyNode::op(
                "mstore",
                vec![
                    LegacyNode::num(0),
                    LegacyNode::op(
                        "if",
                        vec![
                            LegacyNode::op(
                                "lt",
                                vec![
                                    LegacyNode::op("calldataload", vec![LegacyNode::num(0)]),
                                    LegacyNode::num(10),
                                ],
                            ),
                            LegacyNode::num(1),
                            LegacyNode::num(2),
                        ],
                    ),
                ],
            ),
            LegacyNode::op("stop", vec![]),
        ],
    ));
    let ctx = lower_legacy(&tree).expect("lowers");
    let runtime = ctx.get_function(&IrLabel::new(RUNTIME_FUNCTION)).unwrap();
    assert!(runtime.num_basic_blocks() >= 4, "branch arms and a join exist");
    assert!(runtime.check_structure().is_ok());

    // both arms assign the same register
    let stores: Vec<_> = runtime
        .body()
        .iter()
        .flat_map(|&b| runtime.instructions_of(b))
        .filter(|inst| inst.opcode == Opcode::Store && inst.output.is_some())
        .collect();
    assert!(stores.len() >= 2);
}

#[test]
fn with_bindings_scope_their_name() {
    let tree = deploy(LegacyNode::op(
        "seq",
        vec![
            LegacyNode::op(
                "with",
                vec![
                    LegacyNode::name("tmp"),
                    LegacyNode::op("calldataload", vec![LegacyNode::num(4)]),
                    LegacyNode::op(
                        "mstore",
                        vec![
                            LegacyNode::num(0),
                            LegacyNode::op("add", vec![LegacyNode::name("tmp"), LegacyNode::name("tmp")]),
                        ],
                    ),
                ],
            ),
            LegacyNode::op("stop", vec![]),
        ],
    ));
    let ctx = lower_legacy(&tree).expect("lowers");
    let runtime = ctx.get_function(&IrLabel::new(RUNTIME_FUNCTION)).unwrap();
    let entry = runtime.entry();
    let add = runtime
        .instructions_of(entry)
        .find(|inst| inst.opcode == Opcode::Add)
        .expect("add lowered");
    // both operands are the same bound variable
    assert_eq!(add.operands[0], add.operands[1]);
}

#[test]
fn unknown_constructs_are_unsupported_opcodes() {
    let tree = deploy(LegacyNode::op("frobnicate", vec![]));
    let err = lower_legacy(&tree).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOpcode { .. }));
}

#[test]
fn lowered_contexts_compile_end_to_end() {
    let tree = deploy(LegacyNode::op(
        "seq",
        vec![
            LegacyNode::op(
                "mstore",
                vec![
                    LegacyNode::num(0),
                    LegacyNode::op("add", vec![LegacyNode::num(40), LegacyNode::num(2)]),
                ],
            ),
            LegacyNode::op("return", vec![LegacyNode::num(0), LegacyNode::num(32)]),
        ],
    ));
    let asm = evmir::compile_legacy(&tree, true).expect("whole pipeline runs");
    assert!(!asm.is_empty());
}
