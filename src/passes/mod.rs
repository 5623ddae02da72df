//! Transformation passes and the manager that sequences them.
//!
//! Each pass requests analyses through the [`AnalysisCache`], mutates one
//! function, declares its invalidations, and must leave the IR structurally
//! valid. The inliner is the one context-level pass and runs before the
//! per-function pipeline.
pub mod dft;
pub mod func_inliner;
pub mod make_ssa;
pub mod mem2var;
pub mod normalization;
pub mod redundant_load_elimination;
pub mod remove_unused_variables;
pub mod sccp;
pub mod simplify_cfg;
pub mod store_elimination;

pub use dft::DftPass;
pub use func_inliner::FuncInliner;
pub use make_ssa::MakeSsa;
pub use mem2var::Mem2Var;
pub use normalization::Normalization;
pub use redundant_load_elimination::RedundantLoadElimination;
pub use remove_unused_variables::RemoveUnusedVariables;
pub use sccp::{LatticeValue, Sccp};
pub use simplify_cfg::SimplifyCfg;
pub use store_elimination::StoreElimination;

use crate::analysis::AnalysisCache;
use crate::error::CompileError;
use crate::ir::{IrContext, IrFunction};

/// A transformation over one function. `run` returns whether the IR
/// changed; invalidations are declared against the cache inside `run`.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(
        &mut self,
        function: &mut IrFunction,
        cache: &mut AnalysisCache,
    ) -> Result<bool, CompileError>;
}

/// Sequences the optimization pipeline over a context and enforces the
/// structural contract between passes.
#[derive(Debug, Default)]
pub struct PassManager;

impl PassManager {
    pub fn new() -> Self {
        PassManager
    }

    /// The default pipeline: inline single-site functions, then optimize
    /// each function to a fixpoint-free single sequence. SSA construction
    /// runs twice because memory-to-register promotion introduces new
    /// multiply-assigned registers.
    pub fn run_pipeline(&mut self, ctx: &mut IrContext) -> Result<(), CompileError> {
        FuncInliner::new().run_on_context(ctx)?;

        for name in ctx.function_names() {
            let Some(function) = ctx.get_function_mut(&name) else { continue };
            let mut cache = AnalysisCache::new();
            let mut passes: Vec<Box<dyn Pass>> = vec![
                Box::new(SimplifyCfg::new()),
                Box::new(MakeSsa::new()),
                Box::new(StoreElimination::new()),
                Box::new(Mem2Var::new()),
                Box::new(MakeSsa::new()),
                Box::new(Sccp::new()),
                Box::new(StoreElimination::new()),
                Box::new(RedundantLoadElimination::new()),
                Box::new(SimplifyCfg::new()),
                Box::new(RemoveUnusedVariables::new()),
                Box::new(DftPass::new()),
            ];
            for pass in &mut passes {
                pass.run(function, &mut cache)?;
                function.check_structure().map_err(|err| {
                    CompileError::bug(format!(
                        "pass {} left {} malformed: {err}",
                        pass.name(),
                        name
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Runs a single pass over every function of a context with a fresh cache
/// each; the emission path uses this for normalization.
pub fn run_pass_everywhere(
    ctx: &mut IrContext,
    pass: &mut dyn Pass,
) -> Result<bool, CompileError> {
    let mut changed = false;
    for name in ctx.function_names() {
        let Some(function) = ctx.get_function_mut(&name) else { continue };
        let mut cache = AnalysisCache::new();
        changed |= pass.run(function, &mut cache)?;
        function.check_structure()?;
    }
    Ok(changed)
}
