//! Generic single-level child visitors. Used by the module loader's import
//! scan, the annotation validator, and the invariant checker so that every
//! structural pass agrees on what the children of a node are.

use super::{AstArena, ExprId, ExprKind, StmtId, StmtKind};

/// Visit the direct children of an expression once each.
pub fn for_each_expr_child(
    arena: &AstArena,
    id: ExprId,
    on_expr: &mut dyn FnMut(ExprId),
    on_stmt: &mut dyn FnMut(StmtId),
) {
    match &arena.expr(id).kind {
        ExprKind::Binary { left, right, .. } => {
            on_expr(*left);
            on_expr(*right);
        }
        ExprKind::Assignment { target, value, .. } => {
            on_expr(*target);
            on_expr(*value);
        }
        ExprKind::Range { start, end } => {
            on_expr(*start);
            on_expr(*end);
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Length { operand }
        | ExprKind::Member { operand, .. } => on_expr(*operand),
        ExprKind::Cast { operand, .. } => on_expr(*operand),
        ExprKind::Call {
            callee,
            receivers,
            args,
        } => {
            on_expr(*callee);
            for receiver in receivers {
                on_expr(*receiver);
            }
            for arg in args {
                on_expr(*arg);
            }
        }
        ExprKind::Index { operand, index } => {
            on_expr(*operand);
            on_expr(*index);
        }
        ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
            for element in elements {
                on_expr(*element);
            }
        }
        ExprKind::Block { statements, result } => {
            for statement in statements {
                on_stmt(*statement);
            }
            if let Some(result) = result {
                on_expr(*result);
            }
        }
        ExprKind::Conditional {
            condition,
            true_expr,
            false_expr,
            ..
        } => {
            on_expr(*condition);
            on_expr(*true_expr);
            on_expr(*false_expr);
        }
        ExprKind::Iteration { subject, body, .. } => {
            on_expr(*subject);
            on_expr(*body);
        }
        ExprKind::Repeat { condition, body } => {
            on_expr(*condition);
            on_expr(*body);
        }
        ExprKind::Int { .. }
        | ExprKind::Float { .. }
        | ExprKind::Str { .. }
        | ExprKind::Char { .. }
        | ExprKind::Identifier { .. }
        | ExprKind::Resource { .. }
        | ExprKind::Process { .. } => {}
    }
}

/// Visit the direct children of a statement once each.
pub fn for_each_stmt_child(
    arena: &AstArena,
    id: StmtId,
    on_expr: &mut dyn FnMut(ExprId),
    on_stmt: &mut dyn FnMut(StmtId),
) {
    match &arena.stmt(id).kind {
        StmtKind::Expr(expr) => on_expr(*expr),
        StmtKind::Return(Some(expr)) => on_expr(*expr),
        StmtKind::Return(None) => {}
        StmtKind::VarDecl(decl) => {
            if let Some(init) = decl.init {
                on_expr(init);
            }
        }
        StmtKind::FuncDecl(func) => {
            if let Some(body) = func.body {
                on_expr(body);
            }
        }
        StmtKind::CondStmt { condition, body } => {
            on_expr(*condition);
            on_stmt(*body);
        }
        StmtKind::TypeDecl(_) | StmtKind::Import(_) | StmtKind::Break | StmtKind::Continue => {}
    }
}

enum WalkItem {
    Expr(ExprId),
    Stmt(StmtId),
}

fn push_children(arena: &AstArena, item: &WalkItem, work: &mut Vec<WalkItem>) {
    let mut child_exprs = vec![];
    let mut child_stmts = vec![];
    match item {
        WalkItem::Expr(id) => for_each_expr_child(
            arena,
            *id,
            &mut |e| child_exprs.push(e),
            &mut |s| child_stmts.push(s),
        ),
        WalkItem::Stmt(id) => for_each_stmt_child(
            arena,
            *id,
            &mut |e| child_exprs.push(e),
            &mut |s| child_stmts.push(s),
        ),
    }
    work.extend(child_exprs.into_iter().map(WalkItem::Expr));
    work.extend(child_stmts.into_iter().map(WalkItem::Stmt));
}

/// Recursively visit every expression in a statement subtree.
pub fn visit_exprs_in_stmt(arena: &AstArena, id: StmtId, on_expr: &mut dyn FnMut(ExprId)) {
    let mut work = vec![WalkItem::Stmt(id)];
    while let Some(item) = work.pop() {
        if let WalkItem::Expr(expr) = item {
            on_expr(expr);
        }
        push_children(arena, &item, &mut work);
    }
}

/// Recursively visit every statement in a statement subtree, the root
/// included.
pub fn visit_stmts_in_stmt(arena: &AstArena, id: StmtId, on_stmt: &mut dyn FnMut(StmtId)) {
    let mut work = vec![WalkItem::Stmt(id)];
    while let Some(item) = work.pop() {
        if let WalkItem::Stmt(stmt) = item {
            on_stmt(stmt);
        }
        push_children(arena, &item, &mut work);
    }
}
