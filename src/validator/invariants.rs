//! Structural AST invariants, asserted between phases. A violation is a
//! bug in the compiler itself, reported as `Invariant failure [stage]`.

use crate::{
    ast::{
        for_each_expr_child, for_each_stmt_child, AstArena, ExprId, StmtId, StmtKind,
    },
    error::{CompileError, CompileResult, SourceLocation},
    loader::Program,
};

fn invariant_fail(stage: &str, location: &SourceLocation, message: &str) -> CompileError {
    CompileError::new(
        format!("Invariant failure [{stage}]: {message}"),
        location.clone(),
    )
}

fn validate_expr(arena: &AstArena, expr: ExprId, stage: &str) -> CompileResult<()> {
    let node = arena.expr(expr);
    if node.location.file.is_empty() {
        return Err(invariant_fail(
            stage,
            &node.location,
            "expression node has no source location",
        ));
    }

    let mut child_exprs = vec![];
    let mut child_stmts = vec![];
    for_each_expr_child(
        arena,
        expr,
        &mut |e| child_exprs.push(e),
        &mut |s| child_stmts.push(s),
    );
    for child in child_exprs {
        validate_expr(arena, child, stage)?;
    }
    for child in child_stmts {
        validate_stmt(arena, child, stage)?;
    }
    Ok(())
}

fn validate_stmt(arena: &AstArena, stmt: StmtId, stage: &str) -> CompileResult<()> {
    let node = arena.stmt(stmt);
    let location = &node.location;
    if location.file.is_empty() {
        return Err(invariant_fail(
            stage,
            location,
            "statement node has no source location",
        ));
    }

    match &node.kind {
        StmtKind::VarDecl(decl) => {
            if decl.name.is_empty() {
                return Err(invariant_fail(
                    stage,
                    location,
                    "variable declaration has empty name",
                ));
            }
        }
        StmtKind::FuncDecl(func) => {
            if func.name.is_empty() {
                return Err(invariant_fail(
                    stage,
                    location,
                    "function declaration has empty name",
                ));
            }
            if !func.is_external && func.body.is_none() {
                return Err(invariant_fail(
                    stage,
                    location,
                    "non-external function has no body",
                ));
            }
        }
        StmtKind::TypeDecl(decl) => {
            if decl.name.is_empty() {
                return Err(invariant_fail(
                    stage,
                    location,
                    "type declaration has empty name",
                ));
            }
        }
        StmtKind::Import(path) => {
            if path.is_empty() {
                return Err(invariant_fail(
                    stage,
                    location,
                    "import declaration has empty path",
                ));
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
        validate_expr(arena, child, stage)?;
    }
    for child in child_stmts {
        validate_stmt(arena, child, stage)?;
    }
    Ok(())
}

/// Assert the structural invariants over every module of the program.
pub fn validate_program_invariants(program: &Program, stage: &str) -> CompileResult<()> {
    for module in &program.modules {
        for stmt in &module.module.top_level {
            validate_stmt(&program.arena, *stmt, stage)?;
        }
    }
    for instance in &program.instances {
        for stmt in &instance.top_level {
            validate_stmt(&program.arena, *stmt, stage)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_source;

    #[test]
    fn parsed_program_passes_invariants() {
        let program = load_source(
            "#Point(x: #i32, y: #i32);\n&f(p: #Point) -> #i32 { -> p.x; }",
            "test.sbl",
        )
        .unwrap();
        validate_program_invariants(&program, "parse").unwrap();
    }
}
