//! Analyses over the IR and the cache that memoizes them.
//!
//! All analyses are side tables keyed by arena ids; none of them own IR.
//! The exceptions are the CFG analysis, which maintains `cfg_in`/`cfg_out`
//! on the blocks themselves, and liveness, which writes each block's
//! `out_vars`.
pub mod alias;
pub mod cache;
pub mod cfg;
pub mod dfg;
pub mod dominators;
pub mod fcg;
pub mod liveness;
pub mod mem_ssa;

pub use alias::{LocationKind, MemoryLocation};
pub use cache::{AnalysisCache, AnalysisKind};
pub use cfg::CfgAnalysis;
pub use dfg::DfgAnalysis;
pub use dominators::DominatorTreeAnalysis;
pub use fcg::FcgAnalysis;
pub use liveness::LivenessAnalysis;
pub use mem_ssa::{MemSsa, MemoryAccess, MemoryDef, MemoryPhi, MemoryUse};
