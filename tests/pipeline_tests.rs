use evmir::analysis::AnalysisCache;
use evmir::ir::{IrContext, IrLabel, Opcode, Operand};
use evmir::parser::parse_ir;
use evmir::passes::PassManager;

fn parsed(source: &str) -> IrContext {
    parse_ir(source).expect("test program parses")
}

#[test]
fn the_default_pipeline_folds_constant_arithmetic() {
    // the whole computation collapses to the literal 96
    let mut ctx = parsed(
        "
function main {
    main:
        %a = add 32, 64
        %b = add %a, 0
        mstore 0, %b
        return 0, 32
}
",
    );
    PassManager::new().run_pipeline(&mut ctx).expect("pipeline runs");

    let function = ctx.get_function(&IrLabel::new("main")).unwrap();
    let entry = function.entry();
    let mstore = function
        .instructions_of(entry)
        .find(|inst| inst.opcode == Opcode::Mstore)
        .expect("the observable store survives");
    assert_eq!(mstore.operands[0], Operand::literal(96));

    // the folded adds are gone
    assert!(
        !function
            .body()
            .iter()
            .flat_map(|&b| function.instructions_of(b))
            .any(|inst| inst.opcode == Opcode::Add)
    );
}

#[test]
fn the_pipeline_leaves_every_function_structurally_valid() {
    let mut ctx = parsed(
        "
function main {
    main:
        %x = calldataload 0
        %c = lt %x, 10
        jnz %c, @small, @big
    small:
        mstore 0, 1
        jmp @done
    big:
        mstore 0, 2
        jmp @done
    done:
        %r = mload 0
        mstore 32, %r
        return 32, 32
}
",
    );
    PassManager::new().run_pipeline(&mut ctx).expect("pipeline runs");

    for name in ctx.function_names() {
        let function = ctx.get_function_mut(&name).unwrap();
        function.check_structure().expect("structure holds");
        let mut cache = AnalysisCache::new();
        cache.request_cfg(function).expect("cfg recomputes");

        // edge symmetry still holds after the whole pipeline
        for &a in function.body() {
            for &b in function.body() {
                assert_eq!(
                    function.block(a).cfg_out.contains(&b),
                    function.block(b).cfg_in.contains(&a)
                );
            }
        }
    }
}

#[test]
fn constant_branches_fold_away_whole_arms() {
    let mut ctx = parsed(
        "
function main {
    main:
        %c = lt 3, 10
        jnz %c, @taken, @dropped
    taken:
        mstore 0, 1
        stop
    dropped:
        mstore 0, 2
        stop
}
",
    );
    PassManager::new().run_pipeline(&mut ctx).expect("pipeline runs");

    let function = ctx.get_function(&IrLabel::new("main")).unwrap();
    assert!(function.block_by_label(&IrLabel::new("dropped")).is_none());
    // the surviving store writes the taken arm's value
    let store = function
        .body()
        .iter()
        .flat_map(|&b| function.instructions_of(b))
        .find(|inst| inst.opcode == Opcode::Mstore)
        .unwrap();
    assert_eq!(store.operands[0], Operand::literal(1));
}

#[test]
fn single_site_calls_vanish_during_the_pipeline() {
    let mut ctx = parsed(
        "
function main {
    main:
        %arg = calldataload 0
        %1 = invoke @double, %arg
        mstore 0, %1
        return 0, 32
}
function double {
    double:
        %pc = param
        %n = param
        %r = add %n, %n
        ret %pc, %r
}
",
    );
    PassManager::new().run_pipeline(&mut ctx).expect("pipeline runs");

    assert!(ctx.get_function(&IrLabel::new("double")).is_none());
    let function = ctx.get_function(&IrLabel::new("main")).unwrap();
    assert!(
        !function
            .body()
            .iter()
            .flat_map(|&b| function.instructions_of(b))
            .any(|inst| inst.opcode == Opcode::Invoke)
    );
}

#[test]
fn optimized_programs_still_emit_assembly() {
    let mut ctx = parsed(
        "
function main {
    main:
        %x = calldataload 0
        %c = lt %x, 10
        jnz %c, @small, @big
    small:
        mstore 0, 1
        jmp @done
    big:
        mstore 0, 2
        jmp @done
    done:
        %r = mload 0
        mstore 32, %r
        return 32, 32
}
",
    );
    let asm = evmir::compile_context(&mut ctx, true).expect("compiles");
    assert!(!asm.is_empty());
}
