// src/lib.rs
/// # evmir
///
/// An SSA-based mid-level optimizer and stack scheduler for smart-contract
/// compilers targeting EVM-style stack machines. The crate consumes either
/// a legacy IR tree (from a front-end) or textual IR, runs a sequence of
/// analyses and rewrite passes over a linear basic-block IR, and emits
/// stack-machine assembly.
///
/// ## Important modules:
/// * `ir` - the IR itself: operands, instructions, blocks, functions
/// * `parser` - textual IR lexer and parser (the printer's exact inverse)
/// * `analysis` - CFG, dominators, DFG, liveness, call graph, memory SSA,
///   and the memoizing analysis cache
/// * `passes` - SSA construction, CFG simplification, SCCP, memory
///   promotion, store/load elimination, dead-code removal, scheduling,
///   inlining
/// * `codegen` - the virtual-stack scheduler producing assembly
/// * `lowering` - the legacy-IR entry contract
/// * `error` - structured error types
pub mod analysis;
pub mod cli;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lowering;
pub mod parser;
pub mod passes;

use codegen::AsmItem;
use error::CompileError;
use ir::IrContext;
use passes::PassManager;

/// Runs the full middle-end over a context: the default pass pipeline
/// followed by assembly emission.
pub fn compile_context(
    ctx: &mut IrContext,
    optimize: bool,
) -> Result<Vec<AsmItem>, CompileError> {
    PassManager::new().run_pipeline(ctx)?;
    codegen::generate_assembly(ctx, optimize)
}

/// Lowers a legacy IR tree and compiles it to assembly.
pub fn compile_legacy(
    root: &lowering::LegacyNode,
    optimize: bool,
) -> Result<Vec<AsmItem>, CompileError> {
    let mut ctx = lowering::lower_legacy(root)?;
    compile_context(&mut ctx, optimize)
}
