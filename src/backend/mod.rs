//! Backend contract and registry.
//!
//! A backend consumes the fully-analysed program and produces whatever
//! output format it owns; the frontend never needs to know. Backends are
//! registered explicitly by name before the driver constructs a
//! [`crate::compiler::Compiler`], so there is no dependency on
//! initialisation order.

mod registry;
mod report;
mod text;

pub use registry::*;
pub use report::*;
pub use text::*;

use std::path::PathBuf;

use crate::{
    analyzer::{AnalysisFacts, AnalysisPasses, ReentrancyBoundaryKind, ReentrancyMode, CONTEXT_REENTRANT},
    compiler::Options,
    error::CompileResult,
    loader::Program,
    optimizer::OptimizationFacts,
    resolver::{Bindings, Symbol},
};

#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Analysis passes and boundary defaults a backend asks the frontend to
/// run.
#[derive(Debug, Clone, Copy)]
pub struct BackendAnalysisRequirements {
    pub passes: AnalysisPasses,
    pub default_entry_reentrancy: char,
    pub default_exit_reentrancy: char,
}

impl Default for BackendAnalysisRequirements {
    fn default() -> Self {
        Self {
            passes: AnalysisPasses::default(),
            default_entry_reentrancy: CONTEXT_REENTRANT,
            default_exit_reentrancy: CONTEXT_REENTRANT,
        }
    }
}

/// Where backend output lands: a directory plus a file stem; the extension
/// is backend-chosen.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub stem: String,
}

/// The frontend's final product: resolved modules, bindings, and both fact
/// sets.
pub struct AnalyzedProgram<'a> {
    pub program: &'a Program,
    pub bindings: &'a Bindings,
    pub analysis: &'a AnalysisFacts,
    pub optimization: &'a OptimizationFacts,
}

pub struct BackendContext<'a> {
    pub analyzed: AnalyzedProgram<'a>,
    pub options: &'a Options,
    pub outputs: &'a OutputPaths,
}

pub trait Backend: Send + Sync {
    fn info(&self) -> &BackendInfo;

    fn emit(&self, ctx: &BackendContext) -> CompileResult<()>;

    fn analysis_requirements(
        &self,
        _options: &Options,
    ) -> CompileResult<BackendAnalysisRequirements> {
        Ok(BackendAnalysisRequirements::default())
    }

    fn validate_options(&self, _options: &Options) -> CompileResult<()> {
        Ok(())
    }

    /// Override the reentrancy context a symbol carries at a boundary.
    fn boundary_reentrancy_mode(
        &self,
        _symbol: &Symbol,
        _boundary: ReentrancyBoundaryKind,
        _options: &Options,
    ) -> CompileResult<ReentrancyMode> {
        Ok(ReentrancyMode::Default)
    }

    /// Emit a single in-memory translation unit instead of files; `None`
    /// when the backend does not support it.
    fn emit_translation_unit(&self, _ctx: &BackendContext) -> Option<CompileResult<String>> {
        None
    }
}
