use evmir::ir::{IrContext, IrLabel, Opcode, Operand};
use evmir::parser::parse_ir;
use evmir::passes::FuncInliner;

fn parsed(source: &str) -> IrContext {
    parse_ir(source).expect("test program parses")
}

fn count_invokes(ctx: &IrContext) -> usize {
    ctx.functions()
        .flat_map(|f| f.body().iter().flat_map(|&b| f.instructions_of(b)))
        .filter(|inst| inst.opcode == Opcode::Invoke)
        .count()
}

const SINGLE_SITE: &str = "
function main {
    main:
        %arg = calldataload 0
        %1 = invoke @helper, %arg
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
";

#[test]
fn single_site_functions_are_spliced_into_the_caller() {
    let mut ctx = parsed(SINGLE_SITE);
    let changed = FuncInliner::new().run_on_context(&mut ctx).expect("inliner runs");
    assert!(changed);

    // no invoke edges remain and the callee is gone from the context
    assert_eq!(count_invokes(&ctx), 0);
    assert!(ctx.get_function(&IrLabel::new("helper")).is_none());
    assert_eq!(ctx.num_functions(), 1);

    let main = ctx.get_function(&IrLabel::new("main")).unwrap();
    main.check_structure().expect("caller stays structurally valid");

    // the callee body landed in the caller under fresh names
    let has_add = main
        .body()
        .iter()
        .flat_map(|&b| main.instructions_of(b))
        .any(|inst| inst.opcode == Opcode::Add);
    assert!(has_add);
}

#[test]
fn the_return_value_flows_into_the_invoke_output() {
    let mut ctx = parsed(SINGLE_SITE);
    FuncInliner::new().run_on_context(&mut ctx).unwrap();

    let main = ctx.get_function(&IrLabel::new("main")).unwrap();
    // some store now defines %1, the old invoke output
    let defines_result = main
        .body()
        .iter()
        .flat_map(|&b| main.instructions_of(b))
        .any(|inst| {
            inst.opcode == Opcode::Store
                && inst.output.as_ref().is_some_and(|v| v.name() == "%1")
        });
    assert!(defines_result);
}

#[test]
fn params_become_copies_of_the_actuals() {
    let mut ctx = parsed(SINGLE_SITE);
    FuncInliner::new().run_on_context(&mut ctx).unwrap();

    let main = ctx.get_function(&IrLabel::new("main")).unwrap();
    // no params survive anywhere in the spliced code
    for &block in main.body() {
        for inst in main.instructions_of(block) {
            assert_ne!(inst.opcode, Opcode::Param);
        }
    }
    // the argument param became a copy of %arg
    let copies_arg = main
        .body()
        .iter()
        .flat_map(|&b| main.instructions_of(b))
        .any(|inst| {
            inst.opcode == Opcode::Store
                && inst.operands.first() == Some(&Operand::Variable(evmir::ir::IrVariable::new("arg")))
        });
    assert!(copies_arg);
}

#[test]
fn multi_site_functions_are_kept() {
    let mut ctx = parsed(
        "
function main {
    main:
        %1 = invoke @helper, 1
        %2 = invoke @helper, 2
        mstore 0, %1
        mstore 32, %2
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
    let changed = FuncInliner::new().run_on_context(&mut ctx).unwrap();
    assert!(!changed);
    assert_eq!(count_invokes(&ctx), 2);
    assert!(ctx.get_function(&IrLabel::new("helper")).is_some());
}

#[test]
fn recursive_functions_are_kept() {
    let mut ctx = parsed(
        "
function looper {
    looper:
        %pc = param
        %r = invoke @looper, 1
        ret %pc, %r
}
",
    );
    let changed = FuncInliner::new().run_on_context(&mut ctx).unwrap();
    assert!(!changed);
    assert_eq!(count_invokes(&ctx), 1);
}

#[test]
fn chains_of_single_site_calls_collapse_fully() {
    let mut ctx = parsed(
        "
function main {
    main:
        %1 = invoke @outer, 5
        mstore 0, %1
        stop
}
function outer {
    outer:
        %pc = param
        %a = param
        %r = invoke @inner, %a
        ret %pc, %r
}
function inner {
    inner:
        %pc2 = param
        %b = param
        %double = add %b, %b
        ret %pc2, %double
}
",
    );
    let changed = FuncInliner::new().run_on_context(&mut ctx).unwrap();
    assert!(changed);
    assert_eq!(count_invokes(&ctx), 0);
    assert_eq!(ctx.num_functions(), 1);
    ctx.get_function(&IrLabel::new("main")).unwrap().check_structure().unwrap();
}
