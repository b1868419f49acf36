//! Compilation driver: options, the pass pipeline, and output paths.
//!
//! The pipeline is strictly single-threaded and runs every pass to
//! completion on the calling thread; the only termination path is a
//! compile error.

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use log::info;

use crate::{
    analyzer::{AnalysisConfig, AnalysisFacts, Analyzer, CONTEXT_NONREENTRANT, CONTEXT_REENTRANT},
    backend::{
        find_backend, format_analysis_report, AnalyzedProgram, Backend, BackendContext,
        OutputPaths,
    },
    error::{CompileError, CompileResult, SourceLocation},
    loader::{ModuleLoader, Program},
    optimizer::{OptimizationFacts, Optimizer},
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
    validator::{validate_annotations, validate_program_invariants, TypeUseValidator},
};

/// Compiler options, usually assembled by the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    /// Entry source path.
    pub input_file: String,
    /// Base output path; backends choose the extension.
    pub output_file: String,
    pub verbose: bool,
    /// Root directory for module resolution.
    pub project_root: String,
    /// Write an analysis report alongside backend output.
    pub emit_analysis: bool,
    /// Process expressions execute host commands; disabled by default.
    pub allow_process: bool,
    /// 0 = relaxed, 1 = annotated locals, 2 = full strict typing.
    pub type_strictness: u8,
    /// Selected backend name.
    pub backend: String,
    /// Backend-specific key=value options, passed through untouched.
    pub backend_options: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input_file: String::new(),
            output_file: "out".to_owned(),
            verbose: false,
            project_root: ".".to_owned(),
            emit_analysis: false,
            allow_process: false,
            type_strictness: 0,
            backend: "text".to_owned(),
            backend_options: HashMap::new(),
        }
    }
}

fn valid_reentrancy_default(context: char) -> bool {
    context == CONTEXT_REENTRANT || context == CONTEXT_NONREENTRANT
}

fn resolve_output_paths(output_file: &str) -> CompileResult<OutputPaths> {
    let base = Path::new(output_file);
    let dir = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "out".to_owned());
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            CompileError::new(
                format!("Cannot create output directory {}: {e}", dir.display()),
                SourceLocation::default(),
            )
        })?;
    }
    Ok(OutputPaths { dir, stem })
}

struct FrontendResult {
    program: Program,
    bindings: Bindings,
    analysis: AnalysisFacts,
    optimization: OptimizationFacts,
}

pub struct Compiler {
    options: Options,
}

impl Compiler {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Run the full pipeline and hand the program to the configured
    /// backend. Returns the output paths on success.
    pub fn compile(&self) -> CompileResult<OutputPaths> {
        if self.options.verbose {
            info!("Compiling: {}", self.options.input_file);
        }

        let backend = find_backend(&self.options.backend).ok_or_else(|| {
            CompileError::new(
                format!("Unknown backend: {}", self.options.backend),
                SourceLocation::default(),
            )
        })?;

        let frontend = self.run_frontend(&backend)?;
        let paths = resolve_output_paths(&self.options.output_file)?;

        let analyzed = AnalyzedProgram {
            program: &frontend.program,
            bindings: &frontend.bindings,
            analysis: &frontend.analysis,
            optimization: &frontend.optimization,
        };

        if self.options.emit_analysis {
            let report_path = paths.dir.join(format!("{}.analysis.txt", paths.stem));
            if self.options.verbose {
                info!("Writing analysis report: {}", report_path.display());
            }
            let module_name = frontend
                .program
                .modules
                .first()
                .map(|m| m.module.name.clone())
                .unwrap_or_default();
            fs::write(&report_path, format_analysis_report(&analyzed, &module_name)).map_err(
                |e| {
                    CompileError::new(
                        format!("Cannot write analysis report: {e}"),
                        SourceLocation::default(),
                    )
                },
            )?;
        }

        if self.options.verbose {
            info!("Generating backend: {}", backend.info().name);
        }
        let ctx = BackendContext {
            analyzed,
            options: &self.options,
            outputs: &paths,
        };
        backend.emit(&ctx)?;

        if self.options.verbose {
            info!("Compilation successful!");
        }
        Ok(paths)
    }

    /// Run the pipeline and ask the backend for a single in-memory
    /// translation unit.
    pub fn emit_translation_unit(&self) -> CompileResult<String> {
        let backend = find_backend(&self.options.backend).ok_or_else(|| {
            CompileError::new(
                format!("Unknown backend: {}", self.options.backend),
                SourceLocation::default(),
            )
        })?;

        let frontend = self.run_frontend(&backend)?;
        let paths = resolve_output_paths(&self.options.output_file)?;
        let analyzed = AnalyzedProgram {
            program: &frontend.program,
            bindings: &frontend.bindings,
            analysis: &frontend.analysis,
            optimization: &frontend.optimization,
        };
        let ctx = BackendContext {
            analyzed,
            options: &self.options,
            outputs: &paths,
        };

        match backend.emit_translation_unit(&ctx) {
            Some(result) => result,
            None => Err(CompileError::new(
                format!(
                    "Backend '{}' does not support translation-unit emission",
                    backend.info().name
                ),
                SourceLocation::default(),
            )),
        }
    }

    fn run_frontend(&self, backend: &Arc<dyn Backend>) -> CompileResult<FrontendResult> {
        let requirements = backend.analysis_requirements(&self.options)?;
        if !valid_reentrancy_default(requirements.default_entry_reentrancy)
            || !valid_reentrancy_default(requirements.default_exit_reentrancy)
        {
            return Err(CompileError::new(
                format!(
                    "Backend '{}' returned invalid default reentrancy (expected 'R' or 'N')",
                    backend.info().name
                ),
                SourceLocation::default(),
            ));
        }
        backend.validate_options(&self.options)?;

        let loader = ModuleLoader::new(self.options.project_root.clone());
        let mut program = loader.load(&self.options.input_file)?;
        if self.options.verbose {
            info!("Loaded {} module(s)", program.modules.len());
        }

        validate_annotations(&program)?;
        validate_program_invariants(&program, "parse")?;

        let mut bindings = Bindings::new();
        resolve_program(&mut program, &mut bindings, &self.options.project_root)?;
        validate_program_invariants(&program, "resolve")?;

        let (analysis, optimization) = {
            let mut checker = TypeChecker::new(
                &mut program,
                &mut bindings,
                self.options.project_root.clone(),
                self.options.allow_process,
            );
            checker.check_program()?;

            let optimization = Optimizer::run(&mut checker);

            let boundary_backend = Arc::clone(backend);
            let boundary_options = self.options.clone();
            let config = AnalysisConfig {
                passes: requirements.passes,
                default_entry_context: requirements.default_entry_reentrancy,
                default_exit_context: requirements.default_exit_reentrancy,
                boundary_mode: Some(Box::new(move |symbol, boundary| {
                    boundary_backend.boundary_reentrancy_mode(symbol, boundary, &boundary_options)
                })),
            };
            let analysis = Analyzer::new(&checker, &optimization, config).run()?;

            TypeUseValidator::new(&checker, &analysis, &optimization, self.options.type_strictness)
                .run()?;

            (analysis, optimization)
        };

        validate_program_invariants(&program, "analysis")?;

        Ok(FrontendResult {
            program,
            bindings,
            analysis,
            optimization,
        })
    }
}
