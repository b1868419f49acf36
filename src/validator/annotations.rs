//! Annotation validation: unknown `[[name(...)]]` annotations are rejected
//! before any semantic pass runs.

use crate::{
    ast::{
        for_each_expr_child, for_each_stmt_child, Annotation, AstArena, ExprId, StmtId, StmtKind,
    },
    error::{CompileError, CompileResult},
    loader::Program,
};

/// The fixed set of annotations the frontend understands.
pub const KNOWN_ANNOTATIONS: &[&str] = &["nonreentrant", "nonbanked"];

fn validate_list(annotations: &[Annotation]) -> CompileResult<()> {
    for annotation in annotations {
        if !KNOWN_ANNOTATIONS.contains(&annotation.name.as_str()) {
            return Err(CompileError::new(
                format!("Unknown annotation: [[{}]]", annotation.name),
                annotation.location.clone(),
            ));
        }
    }
    Ok(())
}

fn validate_expr(arena: &AstArena, expr: ExprId) -> CompileResult<()> {
    validate_list(&arena.expr(expr).annotations)?;

    let mut child_exprs = vec![];
    let mut child_stmts = vec![];
    for_each_expr_child(
        arena,
        expr,
        &mut |e| child_exprs.push(e),
        &mut |s| child_stmts.push(s),
    );
    for child in child_exprs {
        validate_expr(arena, child)?;
    }
    for child in child_stmts {
        validate_stmt(arena, child)?;
    }
    Ok(())
}

fn validate_stmt(arena: &AstArena, stmt: StmtId) -> CompileResult<()> {
    validate_list(&arena.stmt(stmt).annotations)?;

    match &arena.stmt(stmt).kind {
        StmtKind::FuncDecl(func) => {
            for param in &func.params {
                validate_list(&param.annotations)?;
            }
        }
        StmtKind::TypeDecl(decl) => {
            for field in &decl.fields {
                validate_list(&field.annotations)?;
            }
        }
        _ => {}
    }

    let mut child_exprs = vec![];
    let mut child_stmts = vec![];
    for_each_stmt_child(
        arena,
        stmt,
        &mut |e| child_exprs.push(e),
        &mut |s| child_stmts.push(s),
    );
    for child in child_exprs {
        validate_expr(arena, child)?;
    }
    for child in child_stmts {
        validate_stmt(arena, child)?;
    }
    Ok(())
}

/// Walk every module and reject unknown annotations.
pub fn validate_annotations(program: &Program) -> CompileResult<()> {
    for module in &program.modules {
        for stmt in &module.module.top_level {
            validate_stmt(&program.arena, *stmt)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_source;

    #[test]
    fn accepts_known_annotations() {
        let program = load_source("[[nonreentrant]] &f() { -> 1; }", "test.sbl").unwrap();
        validate_annotations(&program).unwrap();
    }

    #[test]
    fn rejects_unknown_annotations() {
        let program = load_source("[[sparkly]] &f() { -> 1; }", "test.sbl").unwrap();
        let err = validate_annotations(&program).unwrap_err();
        assert!(err.message.contains("Unknown annotation: [[sparkly]]"), "{err}");
    }

    #[test]
    fn validates_parameter_annotations() {
        let program =
            load_source("&f([[mystery]] x: #i32) { -> x; }", "test.sbl").unwrap();
        assert!(validate_annotations(&program).is_err());
    }
}
