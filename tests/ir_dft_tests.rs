use evmir::analysis::AnalysisCache;
use evmir::ir::{IrContext, IrLabel, Opcode};
use evmir::parser::parse_ir;
use evmir::passes::{DftPass, Pass};

fn parsed(source: &str) -> IrContext {
    parse_ir(source).expect("test program parses")
}

fn entry_outputs(ctx: &IrContext) -> Vec<String> {
    let function = ctx.get_function(&IrLabel::new("main")).unwrap();
    let entry = function.entry();
    function
        .instructions_of(entry)
        .map(|inst| {
            inst.output
                .as_ref()
                .map_or_else(|| inst.opcode.to_string(), |v| v.name().to_owned())
        })
        .collect()
}

#[test]
fn producers_sink_to_their_consumers() {
    let mut ctx = parsed(
        "
function main {
    main:
        %a = calldataload 0
        %b = calldataload 32
        %c = add %a, 1
        mstore 0, %c
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("main")).unwrap();
    let mut cache = AnalysisCache::new();
    let changed = DftPass::new().run(function, &mut cache).unwrap();
    assert!(changed);

    // %a stays glued to its consumer %c; the independent %b drifts after
    // the store it does not feed
    assert_eq!(entry_outputs(&ctx), vec!["%a", "%c", "mstore", "%b", "stop"]);
}

#[test]
fn volatile_fences_pin_the_order() {
    let mut ctx = parsed(
        "
function main {
    main:
        %a = calldataload 0
        mstore 64, %a
        %b = calldataload 32
        %c = add %b, %a
        mstore 0, %c
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("main")).unwrap();
    let mut cache = AnalysisCache::new();
    DftPass::new().run(function, &mut cache).unwrap();

    let order = entry_outputs(&ctx);
    // %a must stay before the first mstore; %b and %c stay after it
    let a = order.iter().position(|x| x == "%a").unwrap();
    let first_store = order.iter().position(|x| x == "mstore").unwrap();
    let b = order.iter().position(|x| x == "%b").unwrap();
    assert!(a < first_store);
    assert!(first_store < b);
    // the terminator is last
    assert_eq!(order.last().map(String::as_str), Some("stop"));
}

#[test]
fn phis_stay_at_the_block_head() {
    let mut ctx = parsed(
        "
function main {
    main:
        %cond = calldataload 0
        jnz %cond, @a, @b
    a:
        %x:1 = 1
        jmp @join
    b:
        %x:2 = 2
        jmp @join
    join:
        %x:3 = phi @a, %x:1, @b, %x:2
        %y = calldataload 32
        %s = add %x:3, %y
        mstore 0, %s
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("main")).unwrap();
    let mut cache = AnalysisCache::new();
    DftPass::new().run(function, &mut cache).unwrap();

    let function = ctx.get_function(&IrLabel::new("main")).unwrap();
    let join = function.block_by_label(&IrLabel::new("join")).unwrap();
    let first = function.instructions_of(join).next().unwrap();
    assert_eq!(first.opcode, Opcode::Phi);
    assert!(function.check_structure().is_ok());
}

#[test]
fn already_ordered_blocks_are_untouched() {
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
    let function = ctx.get_function_mut(&IrLabel::new("main")).unwrap();
    let mut cache = AnalysisCache::new();
    let changed = DftPass::new().run(function, &mut cache).unwrap();
    assert!(!changed);
}
