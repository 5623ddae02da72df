use evmir::analysis::FcgAnalysis;
use evmir::ir::IrLabel;
use evmir::parser::parse_ir;

const THREE_FUNCTIONS: &str = "
function main {
    main:
        %1 = invoke @left, 1
        %2 = invoke @right, 2
        mstore 0, %1
        mstore 32, %2
        stop
}
function left {
    left:
        %pc = param
        %a = param
        %r = invoke @right, %a
        ret %pc, %r
}
function right {
    right:
        %pc = param
        %a = param
        %r = add %a, 1
        ret %pc, %r
}
";

#[test]
fn callees_and_callers_mirror_each_other() {
    let ctx = parse_ir(THREE_FUNCTIONS).unwrap();
    let fcg = FcgAnalysis::analyze(&ctx);

    let main = IrLabel::new("main");
    let left = IrLabel::new("left");
    let right = IrLabel::new("right");

    let main_callees = fcg.callees(&main);
    assert!(main_callees.contains(&left));
    assert!(main_callees.contains(&right));
    assert!(fcg.callees(&right).is_empty());

    assert!(fcg.callers(&left).contains(&main));
    assert!(fcg.callers(&right).contains(&main));
    assert!(fcg.callers(&right).contains(&left));
    assert!(fcg.callers(&main).is_empty());
}

#[test]
fn invoke_sites_index_every_call() {
    let ctx = parse_ir(THREE_FUNCTIONS).unwrap();
    let fcg = FcgAnalysis::analyze(&ctx);

    assert_eq!(fcg.invoke_sites(&IrLabel::new("left")).len(), 1);
    assert_eq!(fcg.invoke_sites(&IrLabel::new("right")).len(), 2);
    assert_eq!(fcg.invoke_sites(&IrLabel::new("main")).len(), 0);

    // each site records its caller
    let (caller, _) = &fcg.invoke_sites(&IrLabel::new("left"))[0];
    assert_eq!(caller, &IrLabel::new("main"));
}

#[test]
fn unknown_functions_have_no_edges() {
    let ctx = parse_ir(THREE_FUNCTIONS).unwrap();
    let fcg = FcgAnalysis::analyze(&ctx);
    assert!(fcg.callees(&IrLabel::new("ghost")).is_empty());
    assert!(fcg.invoke_sites(&IrLabel::new("ghost")).is_empty());
}
