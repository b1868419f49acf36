//! Module loading.
//!
//! `ModuleLoader::load` parses the entry file and transitively loads every
//! module it imports, assigning stable module ids. Paths are canonicalised
//! before lookup, so a module reached through two different import chains
//! is parsed exactly once and cyclic imports terminate naturally. Imports
//! that cannot be resolved are left for the resolver, which reports them
//! with a source location.

use std::{collections::HashMap, fs, path::Path};

use log::{debug, trace};

use crate::{
    ast::{visit_stmts_in_stmt, AstArena, Module, StmtId, StmtKind},
    error::{CompileError, CompileResult, SourceLocation},
    parser::parse_source,
};

/// Extension of Sable source files.
pub const SOURCE_EXT: &str = "sbl";

pub type ModuleId = usize;
pub type InstanceId = usize;

#[derive(Debug)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub path: String,
    pub module: Module,
}

/// A realised binding of a module within a particular import chain. Two
/// imports of the same module from different parents yield distinct
/// instances, each with its own resolved symbols. Imported instances own
/// deep clones of the module's declarations; the entry instance shares the
/// parsed statements.
#[derive(Debug)]
pub struct ModuleInstance {
    pub id: InstanceId,
    pub module_id: ModuleId,
    pub top_level: Vec<StmtId>,
}

#[derive(Debug, Default)]
pub struct Program {
    pub arena: AstArena,
    pub modules: Vec<ModuleInfo>,
    pub path_to_id: HashMap<String, ModuleId>,
    pub instances: Vec<ModuleInstance>,
}

impl Program {
    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id]
    }

    pub fn instance(&self, id: InstanceId) -> &ModuleInstance {
        &self.instances[id]
    }

    /// Append a generated statement to an instance's statement list. Used
    /// by the monomorphiser; statements added mid-pass are still picked up
    /// by the current check loop.
    pub fn push_instance_stmt(&mut self, instance: InstanceId, stmt: StmtId) {
        self.instances[instance].top_level.push(stmt);
    }
}

/// Join import segments into a relative path: `[a, b, c]` -> `a/b/c`.
pub fn join_import_path(segments: &[String]) -> String {
    segments.join("/")
}

fn try_resolve_relative(
    relative: &str,
    current_file: &str,
    project_root: &str,
) -> Option<String> {
    if !project_root.is_empty() {
        let candidate = Path::new(project_root).join(relative);
        if candidate.exists() {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    if !current_file.is_empty() {
        if let Some(dir) = Path::new(current_file).parent() {
            let candidate = dir.join(relative);
            if candidate.exists() {
                return Some(candidate.to_string_lossy().into_owned());
            }
        }
    }
    None
}

/// Resolve import segments to a source file, searching the project root
/// first and the importing file's directory second.
pub fn resolve_module_path(
    segments: &[String],
    current_file: &str,
    project_root: &str,
) -> Option<String> {
    let relative = format!("{}.{SOURCE_EXT}", join_import_path(segments));
    try_resolve_relative(&relative, current_file, project_root)
}

/// Resource paths resolve like imports but without appending an extension.
pub fn resolve_resource_path(
    segments: &[String],
    current_file: &str,
    project_root: &str,
) -> Option<String> {
    try_resolve_relative(&join_import_path(segments), current_file, project_root)
}

/// Canonicalise a path for `path_to_id` lookups; paths that cannot be
/// canonicalised are used verbatim.
pub fn normalize_path(path: &str) -> String {
    fs::canonicalize(path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_owned())
}

pub struct ModuleLoader {
    project_root: String,
}

impl ModuleLoader {
    pub fn new(project_root: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Load the entry file and every module reachable from it.
    pub fn load(&self, entry_path: &str) -> CompileResult<Program> {
        let mut program = Program::default();
        self.load_module(&normalize_path(entry_path), &mut program)?;
        Ok(program)
    }

    fn load_module(&self, path: &str, program: &mut Program) -> CompileResult<ModuleId> {
        let normalized = normalize_path(path);
        if let Some(id) = program.path_to_id.get(&normalized) {
            trace!("module already loaded: {normalized}");
            return Ok(*id);
        }

        debug!("loading module: {normalized}");
        let module = self.parse_module_file(&normalized, program)?;

        let id = program.modules.len();
        program.modules.push(ModuleInfo {
            id,
            path: normalized.clone(),
            module,
        });
        program.path_to_id.insert(normalized.clone(), id);

        // Imports can hide anywhere in the statement tree (blocks,
        // conditionals, function bodies), so scan every nested statement.
        let mut imports = vec![];
        for stmt in program.modules[id].module.top_level.clone() {
            collect_imports(&program.arena, stmt, &mut imports);
        }

        for segments in imports {
            let Some(resolved) = resolve_module_path(&segments, &normalized, &self.project_root)
            else {
                // The resolver reports unresolved imports with locations.
                trace!("unresolved import {:?} from {normalized}", segments);
                continue;
            };
            self.load_module(&resolved, program)?;
        }

        Ok(id)
    }

    fn parse_module_file(&self, path: &str, program: &mut Program) -> CompileResult<Module> {
        let source = fs::read_to_string(path).map_err(|_| {
            CompileError::new(format!("Cannot open file: {path}"), SourceLocation::default())
        })?;
        let name = Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());
        parse_source(&mut program.arena, &source, &name, path)
    }
}

fn collect_imports(arena: &AstArena, stmt: StmtId, out: &mut Vec<Vec<String>>) {
    visit_stmts_in_stmt(arena, stmt, &mut |id| {
        if let StmtKind::Import(path) = &arena.stmt(id).kind {
            out.push(path.clone());
        }
    });
}

/// Parse a single in-memory source text into a one-module program. Used by
/// tests and tooling that do not go through the filesystem.
pub fn load_source(source: &str, file_name: &str) -> CompileResult<Program> {
    let mut program = Program::default();
    let module = parse_source(&mut program.arena, source, file_name, file_name)?;
    program.path_to_id.insert(file_name.to_owned(), 0);
    program.modules.push(ModuleInfo {
        id: 0,
        path: file_name.to_owned(),
        module,
    });
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_import_segments() {
        let segments = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        assert_eq!(join_import_path(&segments), "a/b/c");
    }

    #[test]
    fn loads_single_source() {
        let program = load_source("&main() { -> 0; }", "main.sbl").unwrap();
        assert_eq!(program.modules.len(), 1);
        assert_eq!(program.path_to_id["main.sbl"], 0);
        assert_eq!(program.modules[0].module.top_level.len(), 1);
    }

    #[test]
    fn collects_nested_imports() {
        let program = load_source("&f() { ::util::math; }", "main.sbl").unwrap();
        let mut imports = vec![];
        for stmt in &program.modules[0].module.top_level {
            collect_imports(&program.arena, *stmt, &mut imports);
        }
        assert_eq!(imports, vec![vec!["util".to_owned(), "math".to_owned()]]);
    }
}
