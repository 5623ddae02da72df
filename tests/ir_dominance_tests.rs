use evmir::analysis::AnalysisCache;
use evmir::ir::{BlockId, IrContext, IrFunction, IrLabel};
use evmir::parser::parse_ir;

fn block(function: &IrFunction, name: &str) -> BlockId {
    function.block_by_label(&IrLabel::new(name)).unwrap_or_else(|| panic!("no block {name}"))
}

fn parsed(source: &str) -> IrContext {
    parse_ir(source).expect("test program parses")
}

#[test]
fn dominance_simple_linear() {
    // entry -> block1 -> block2
    let mut ctx = parsed(
        "
function entry {
    entry:
        jmp @block1
    block1:
        jmp @block2
    block2:
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("entry")).unwrap();
    let mut cache = AnalysisCache::new();
    let dom = cache.request_dominators(function).unwrap();

    let entry = block(function, "entry");
    let b1 = block(function, "block1");
    let b2 = block(function, "block2");

    assert_eq!(dom.immediate_dominator(entry), None);
    assert_eq!(dom.immediate_dominator(b1), Some(entry));
    assert_eq!(dom.immediate_dominator(b2), Some(b1));
    assert!(dom.dominates(entry, b2));
    assert!(!dom.dominates(b2, b1));
}

#[test]
fn dominance_if_else() {
    let mut ctx = parsed(
        "
function entry {
    entry:
        %c = calldataload 0
        jnz %c, @then_branch, @else_branch
    then_branch:
        jmp @merge
    else_branch:
        jmp @merge
    merge:
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("entry")).unwrap();
    let mut cache = AnalysisCache::new();
    let dom = cache.request_dominators(function).unwrap();

    let entry = block(function, "entry");
    let then_branch = block(function, "then_branch");
    let else_branch = block(function, "else_branch");
    let merge = block(function, "merge");

    assert_eq!(dom.immediate_dominator(then_branch), Some(entry));
    assert_eq!(dom.immediate_dominator(else_branch), Some(entry));
    // merge's immediate dominator is the branch point, not either arm
    assert_eq!(dom.immediate_dominator(merge), Some(entry));
}

#[test]
fn dominance_while_loop() {
    let mut ctx = parsed(
        "
function entry {
    entry:
        jmp @header
    header:
        %c = calldataload 0
        jnz %c, @body, @exit
    body:
        jmp @header
    exit:
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("entry")).unwrap();
    let mut cache = AnalysisCache::new();
    let dom = cache.request_dominators(function).unwrap();

    let entry = block(function, "entry");
    let header = block(function, "header");
    let body = block(function, "body");
    let exit = block(function, "exit");

    assert_eq!(dom.immediate_dominator(header), Some(entry));
    assert_eq!(dom.immediate_dominator(body), Some(header));
    assert_eq!(dom.immediate_dominator(exit), Some(header));
    assert!(dom.dominates(header, body));
}

#[test]
fn dominance_frontiers_at_the_join() {
    let mut ctx = parsed(
        "
function entry {
    entry:
        %c = calldataload 0
        jnz %c, @then_branch, @else_branch
    then_branch:
        jmp @merge
    else_branch:
        jmp @merge
    merge:
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("entry")).unwrap();
    let mut cache = AnalysisCache::new();
    let dom = cache.request_dominators(function).unwrap();

    let then_branch = block(function, "then_branch");
    let else_branch = block(function, "else_branch");
    let merge = block(function, "merge");
    let entry = block(function, "entry");

    assert!(dom.dominance_frontier(then_branch).unwrap().contains(&merge));
    assert!(dom.dominance_frontier(else_branch).unwrap().contains(&merge));
    // the branch point dominates the join, so the join is not in its frontier
    assert!(!dom.dominance_frontier(entry).unwrap().contains(&merge));
}

#[test]
fn loop_header_is_in_its_own_frontier() {
    let mut ctx = parsed(
        "
function entry {
    entry:
        jmp @header
    header:
        %c = calldataload 0
        jnz %c, @body, @exit
    body:
        jmp @header
    exit:
        stop
}
",
    );
    let function = ctx.get_function_mut(&IrLabel::new("entry")).unwrap();
    let mut cache = AnalysisCache::new();
    let dom = cache.request_dominators(function).unwrap();

    let header = block(function, "header");
    let body = block(function, "body");
    assert!(dom.dominance_frontier(body).unwrap().contains(&header));
    assert!(dom.dominance_frontier(header).unwrap().contains(&header));
}

#[test]
fn tree_orders_cover_reachable_blocks_once() {
    let mut ctx = parsed(
        "
function entry {
    entry:
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
    let function = ctx.get_function_mut(&IrLabel::new("entry")).unwrap();
    let mut cache = AnalysisCache::new();
    let dom = cache.request_dominators(function).unwrap();

    assert_eq!(dom.dom_pre_order().len(), 4);
    assert_eq!(dom.dom_post_order().len(), 4);
    assert_eq!(dom.dom_pre_order()[0], function.entry());
    // every parent precedes its children in pre-order
    for &b in dom.dom_pre_order() {
        if let Some(parent) = dom.immediate_dominator(b) {
            let parent_at = dom.dom_pre_order().iter().position(|&x| x == parent).unwrap();
            let child_at = dom.dom_pre_order().iter().position(|&x| x == b).unwrap();
            assert!(parent_at < child_at);
        }
    }
}
