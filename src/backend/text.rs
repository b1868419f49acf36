//! Reference backend: a typed-program summary in plain text, or JSON with
//! `--backend-opt format=json`. Useful as a pipeline smoke test and as the
//! template for real code generators.

use std::fs;

use log::debug;
use serde::Serialize;

use crate::{
    ast::StmtKind,
    compiler::Options,
    error::{CompileError, CompileResult, SourceLocation},
    resolver::BindKey,
};

use super::{Backend, BackendContext, BackendInfo};

#[derive(Serialize)]
struct FunctionSummary {
    name: String,
    instance: usize,
    params: Vec<String>,
    receivers: Vec<String>,
    return_type: Option<String>,
    exported: bool,
    external: bool,
    reachable: bool,
    foldable: bool,
}

#[derive(Serialize)]
struct ProgramSummary {
    modules: Vec<String>,
    instances: usize,
    functions: Vec<FunctionSummary>,
    used_globals: Vec<String>,
    used_types: Vec<String>,
}

pub struct TextBackend {
    info: BackendInfo,
}

impl TextBackend {
    pub fn new() -> Self {
        Self {
            info: BackendInfo {
                name: "text".to_owned(),
                description: "Typed program summary (text or JSON)".to_owned(),
                version: "0.1.0".to_owned(),
            },
        }
    }

    fn summarize(&self, ctx: &BackendContext) -> ProgramSummary {
        let analyzed = &ctx.analyzed;
        let program = analyzed.program;
        let bindings = analyzed.bindings;

        let mut functions = vec![];
        for instance in &program.instances {
            for stmt in &instance.top_level {
                let StmtKind::FuncDecl(func) = &program.arena.stmt(*stmt).kind else {
                    continue;
                };
                if func.is_generic && !func.is_instantiation {
                    continue;
                }
                let symbol = bindings.lookup(instance.id, BindKey::Stmt(*stmt));
                functions.push(FunctionSummary {
                    name: func.qualified_name(),
                    instance: instance.id,
                    params: func
                        .params
                        .iter()
                        .map(|p| {
                            let ty = p
                                .ty
                                .as_ref()
                                .map(|t| t.render(&program.arena))
                                .unwrap_or_else(|| "?".to_owned());
                            format!("{}: {}", p.name, ty)
                        })
                        .collect(),
                    receivers: func.ref_params.clone(),
                    return_type: func.return_type.as_ref().map(|t| t.render(&program.arena)),
                    exported: func.is_exported,
                    external: func.is_external,
                    reachable: symbol
                        .is_some_and(|s| analyzed.analysis.reachable_functions.contains(&s)),
                    foldable: symbol
                        .is_some_and(|s| analyzed.optimization.foldable_functions.contains(&s)),
                });
            }
        }
        functions.sort_by(|a, b| a.name.cmp(&b.name).then(a.instance.cmp(&b.instance)));

        let mut used_globals: Vec<String> = analyzed
            .analysis
            .used_global_vars
            .iter()
            .map(|s| {
                let info = bindings.symbol(*s);
                format!("{}@{}", info.name, info.instance_id)
            })
            .collect();
        used_globals.sort();

        ProgramSummary {
            modules: program.modules.iter().map(|m| m.path.clone()).collect(),
            instances: program.instances.len(),
            functions,
            used_globals,
            used_types: analyzed.analysis.used_type_names.iter().cloned().collect(),
        }
    }
}

impl Default for TextBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for TextBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn validate_options(&self, options: &Options) -> CompileResult<()> {
        if let Some(format) = options.backend_options.get("format") {
            if format != "text" && format != "json" {
                return Err(CompileError::new(
                    format!("text backend: unsupported format '{format}' (expected text or json)"),
                    SourceLocation::default(),
                ));
            }
        }
        Ok(())
    }

    fn emit(&self, ctx: &BackendContext) -> CompileResult<()> {
        let summary = self.summarize(ctx);
        let json = ctx
            .options
            .backend_options
            .get("format")
            .is_some_and(|f| f == "json");

        let (extension, contents) = if json {
            let rendered = serde_json::to_string_pretty(&summary).map_err(|e| {
                CompileError::new(
                    format!("text backend: cannot serialize summary: {e}"),
                    SourceLocation::default(),
                )
            })?;
            ("json", rendered)
        } else {
            ("txt", render_text(&summary))
        };

        let path = ctx
            .outputs
            .dir
            .join(format!("{}.{extension}", ctx.outputs.stem));
        debug!("text backend writing {}", path.display());
        fs::write(&path, contents).map_err(|e| {
            CompileError::new(
                format!("Cannot write output file {}: {e}", path.display()),
                SourceLocation::default(),
            )
        })?;
        Ok(())
    }

    fn emit_translation_unit(&self, ctx: &BackendContext) -> Option<CompileResult<String>> {
        Some(Ok(render_text(&self.summarize(ctx))))
    }
}

fn render_text(summary: &ProgramSummary) -> String {
    let mut out = String::new();
    out.push_str("# Sable Program\n");
    for module in &summary.modules {
        out.push_str(&format!("module {module}\n"));
    }
    out.push_str(&format!("instances: {}\n\n", summary.instances));

    for function in &summary.functions {
        let mut line = String::new();
        if function.external {
            line.push_str("external ");
        }
        if function.exported {
            line.push_str("exported ");
        }
        line.push_str(&format!("fn {}@{}(", function.name, function.instance));
        line.push_str(&function.params.join(", "));
        line.push(')');
        if let Some(return_type) = &function.return_type {
            line.push_str(&format!(" -> {return_type}"));
        }
        if !function.receivers.is_empty() {
            line.push_str(&format!(" [receivers: {}]", function.receivers.join(", ")));
        }
        if function.foldable {
            line.push_str(" [foldable]");
        }
        if !function.reachable {
            line.push_str(" [unreachable]");
        }
        out.push_str(&line);
        out.push('\n');
    }

    if !summary.used_globals.is_empty() {
        out.push_str("\nused globals:\n");
        for global in &summary.used_globals {
            out.push_str(&format!("  {global}\n"));
        }
    }
    if !summary.used_types.is_empty() {
        out.push_str("\nused types:\n");
        for ty in &summary.used_types {
            out.push_str(&format!("  {ty}\n"));
        }
    }
    out
}
