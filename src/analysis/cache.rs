// src/analysis/cache.rs
//! Memoization of per-function analyses.
//!
//! Passes request analyses through the cache and declare what they
//! invalidate. Invalidation is transitive along a fixed dependency graph:
//! CFG feeds everything else, and the DFG feeds memory SSA and liveness.
//! Every cached result carries the generation it was computed at, so a
//! result held across an invalidation is detected by [`AnalysisCache::verify`]
//! instead of silently producing wrong answers.

use super::alias::LocationKind;
use super::cfg::CfgAnalysis;
use super::dfg::DfgAnalysis;
use super::dominators::DominatorTreeAnalysis;
use super::fcg::FcgAnalysis;
use super::liveness::LivenessAnalysis;
use super::mem_ssa::MemSsa;
use crate::error::CompileError;
use crate::ir::{IrContext, IrFunction};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Cfg,
    Dominators,
    Dfg,
    Liveness,
    Fcg,
    MemSsa,
    StorageSsa,
}

const KIND_COUNT: usize = 7;

#[derive(Debug, Default)]
pub struct AnalysisCache {
    cfg: Option<Rc<CfgAnalysis>>,
    dom: Option<Rc<DominatorTreeAnalysis>>,
    dfg: Option<Rc<DfgAnalysis>>,
    liveness: Option<Rc<LivenessAnalysis>>,
    fcg: Option<Rc<FcgAnalysis>>,
    mem_ssa: Option<Rc<MemSsa>>,
    storage_ssa: Option<Rc<MemSsa>>,
    generations: [u64; KIND_COUNT],
}

impl AnalysisCache {
    pub fn new() -> Self {
        AnalysisCache::default()
    }

    fn generation(&self, kind: AnalysisKind) -> u64 {
        self.generations[kind as usize]
    }

    pub fn request_cfg(
        &mut self,
        function: &mut IrFunction,
    ) -> Result<Rc<CfgAnalysis>, CompileError> {
        if let Some(cfg) = &self.cfg {
            return Ok(Rc::clone(cfg));
        }
        let mut analysis = CfgAnalysis::analyze(function)?;
        analysis.generation = self.generation(AnalysisKind::Cfg);
        let analysis = Rc::new(analysis);
        self.cfg = Some(Rc::clone(&analysis));
        Ok(analysis)
    }

    pub fn request_dominators(
        &mut self,
        function: &mut IrFunction,
    ) -> Result<Rc<DominatorTreeAnalysis>, CompileError> {
        if let Some(dom) = &self.dom {
            return Ok(Rc::clone(dom));
        }
        let cfg = self.request_cfg(function)?;
        let mut analysis = DominatorTreeAnalysis::analyze(function, &cfg);
        analysis.generation = self.generation(AnalysisKind::Dominators);
        let analysis = Rc::new(analysis);
        self.dom = Some(Rc::clone(&analysis));
        Ok(analysis)
    }

    pub fn request_dfg(
        &mut self,
        function: &mut IrFunction,
    ) -> Result<Rc<DfgAnalysis>, CompileError> {
        if let Some(dfg) = &self.dfg {
            return Ok(Rc::clone(dfg));
        }
        let mut analysis = DfgAnalysis::analyze(function);
        analysis.generation = self.generation(AnalysisKind::Dfg);
        let analysis = Rc::new(analysis);
        self.dfg = Some(Rc::clone(&analysis));
        Ok(analysis)
    }

    pub fn request_liveness(
        &mut self,
        function: &mut IrFunction,
    ) -> Result<Rc<LivenessAnalysis>, CompileError> {
        if let Some(liveness) = &self.liveness {
            return Ok(Rc::clone(liveness));
        }
        let cfg = self.request_cfg(function)?;
        let mut analysis = LivenessAnalysis::analyze(function, &cfg);
        analysis.generation = self.generation(AnalysisKind::Liveness);
        let analysis = Rc::new(analysis);
        self.liveness = Some(Rc::clone(&analysis));
        Ok(analysis)
    }

    pub fn request_fcg(&mut self, ctx: &IrContext) -> Result<Rc<FcgAnalysis>, CompileError> {
        if let Some(fcg) = &self.fcg {
            return Ok(Rc::clone(fcg));
        }
        let mut analysis = FcgAnalysis::analyze(ctx);
        analysis.generation = self.generation(AnalysisKind::Fcg);
        let analysis = Rc::new(analysis);
        self.fcg = Some(Rc::clone(&analysis));
        Ok(analysis)
    }

    pub fn request_mem_ssa(
        &mut self,
        function: &mut IrFunction,
        kind: LocationKind,
    ) -> Result<Rc<MemSsa>, CompileError> {
        let slot = match kind {
            LocationKind::Memory => &self.mem_ssa,
            LocationKind::Storage => &self.storage_ssa,
        };
        if let Some(ssa) = slot {
            return Ok(Rc::clone(ssa));
        }
        let cfg = self.request_cfg(function)?;
        let dom = self.request_dominators(function)?;
        let mut analysis = MemSsa::analyze(function, &cfg, &dom, kind);
        let analysis_kind = match kind {
            LocationKind::Memory => AnalysisKind::MemSsa,
            LocationKind::Storage => AnalysisKind::StorageSsa,
        };
        analysis.generation = self.generation(analysis_kind);
        let analysis = Rc::new(analysis);
        match kind {
            LocationKind::Memory => self.mem_ssa = Some(Rc::clone(&analysis)),
            LocationKind::Storage => self.storage_ssa = Some(Rc::clone(&analysis)),
        }
        Ok(analysis)
    }

    /// Drops an analysis and everything depending on it, bumping the
    /// affected generation counters.
    pub fn invalidate(&mut self, kind: AnalysisKind) {
        let dependents: &[AnalysisKind] = match kind {
            AnalysisKind::Cfg => &[
                AnalysisKind::Dominators,
                AnalysisKind::Liveness,
                AnalysisKind::Dfg,
                AnalysisKind::MemSsa,
                AnalysisKind::StorageSsa,
                AnalysisKind::Fcg,
            ],
            AnalysisKind::Dfg => {
                &[AnalysisKind::MemSsa, AnalysisKind::StorageSsa, AnalysisKind::Liveness]
            }
            _ => &[],
        };
        self.drop_one(kind);
        for &dependent in dependents {
            self.drop_one(dependent);
        }
    }

    pub fn invalidate_all(&mut self) {
        self.invalidate(AnalysisKind::Cfg);
        self.drop_one(AnalysisKind::Dfg);
    }

    fn drop_one(&mut self, kind: AnalysisKind) {
        self.generations[kind as usize] += 1;
        match kind {
            AnalysisKind::Cfg => self.cfg = None,
            AnalysisKind::Dominators => self.dom = None,
            AnalysisKind::Dfg => self.dfg = None,
            AnalysisKind::Liveness => self.liveness = None,
            AnalysisKind::Fcg => self.fcg = None,
            AnalysisKind::MemSsa => self.mem_ssa = None,
            AnalysisKind::StorageSsa => self.storage_ssa = None,
        }
    }

    /// Confirms a previously requested result is still current.
    pub fn verify_cfg(&self, analysis: &CfgAnalysis) -> Result<(), CompileError> {
        self.check(analysis.generation, AnalysisKind::Cfg, "cfg")
    }

    pub fn verify_dominators(&self, analysis: &DominatorTreeAnalysis) -> Result<(), CompileError> {
        self.check(analysis.generation, AnalysisKind::Dominators, "dominators")
    }

    pub fn verify_dfg(&self, analysis: &DfgAnalysis) -> Result<(), CompileError> {
        self.check(analysis.generation, AnalysisKind::Dfg, "dfg")
    }

    pub fn verify_liveness(&self, analysis: &LivenessAnalysis) -> Result<(), CompileError> {
        self.check(analysis.generation, AnalysisKind::Liveness, "liveness")
    }

    pub fn verify_mem_ssa(&self, analysis: &MemSsa) -> Result<(), CompileError> {
        let kind = match analysis.kind() {
            LocationKind::Memory => AnalysisKind::MemSsa,
            LocationKind::Storage => AnalysisKind::StorageSsa,
        };
        self.check(analysis.generation, kind, "memory ssa")
    }

    fn check(
        &self,
        generation: u64,
        kind: AnalysisKind,
        name: &'static str,
    ) -> Result<(), CompileError> {
        if generation == self.generation(kind) {
            Ok(())
        } else {
            Err(CompileError::StaleAnalysis { analysis: name })
        }
    }
}
