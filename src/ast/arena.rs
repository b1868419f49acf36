use crate::error::SourceLocation;

use super::{Expr, ExprKind, Stmt, StmtKind};

/// Index of an expression node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

/// Index of a statement node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(u32);

impl ExprId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl StmtId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Owner of every AST node in a program. Nodes never move or disappear;
/// passes address them by id and mutate them in place. The monomorphiser
/// and the import expansion deep-copy subtrees into the same arena.
#[derive(Debug, Default)]
pub struct AstArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    /// Allocate a plain integer literal, used for canonicalised array sizes
    /// and desugared nodes.
    pub fn make_int(&mut self, value: u64, location: SourceLocation) -> ExprId {
        self.alloc_expr(Expr::new(ExprKind::int(value, value.to_string()), location))
    }

    /// The literal magnitude of an integer literal expression, with its
    /// unsigned flag. `None` for anything else.
    pub fn int_literal_value(&self, id: ExprId) -> Option<(u64, bool)> {
        match &self.expr(id).kind {
            ExprKind::Int {
                value, unsigned, ..
            } => Some((*value, *unsigned)),
            _ => None,
        }
    }

    /// Deep-copy an expression subtree. Checker-produced types are not
    /// carried over; the copy is re-checked from scratch.
    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        let source = self.expr(id).clone();
        let kind = match source.kind {
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: self.clone_expr(left),
                right: self.clone_expr(right),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: self.clone_expr(operand),
            },
            ExprKind::Call {
                callee,
                receivers,
                args,
            } => ExprKind::Call {
                callee: self.clone_expr(callee),
                receivers: receivers.iter().map(|r| self.clone_expr(*r)).collect(),
                args: args.iter().map(|a| self.clone_expr(*a)).collect(),
            },
            ExprKind::Index { operand, index } => ExprKind::Index {
                operand: self.clone_expr(operand),
                index: self.clone_expr(index),
            },
            ExprKind::Member { operand, field } => ExprKind::Member {
                operand: self.clone_expr(operand),
                field,
            },
            ExprKind::ArrayLiteral { elements } => ExprKind::ArrayLiteral {
                elements: elements.iter().map(|e| self.clone_expr(*e)).collect(),
            },
            ExprKind::TupleLiteral { elements } => ExprKind::TupleLiteral {
                elements: elements.iter().map(|e| self.clone_expr(*e)).collect(),
            },
            ExprKind::Block { statements, result } => ExprKind::Block {
                statements: statements.iter().map(|s| self.clone_stmt(*s)).collect(),
                result: result.map(|r| self.clone_expr(r)),
            },
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                parenthesized,
            } => ExprKind::Conditional {
                condition: self.clone_expr(condition),
                true_expr: self.clone_expr(true_expr),
                false_expr: self.clone_expr(false_expr),
                parenthesized,
            },
            ExprKind::Cast { target, operand } => ExprKind::Cast {
                target,
                operand: self.clone_expr(operand),
            },
            ExprKind::Assignment {
                target,
                value,
                creates_new_variable,
                declared_type,
            } => ExprKind::Assignment {
                target: self.clone_expr(target),
                value: self.clone_expr(value),
                creates_new_variable,
                declared_type,
            },
            ExprKind::Range { start, end } => ExprKind::Range {
                start: self.clone_expr(start),
                end: self.clone_expr(end),
            },
            ExprKind::Length { operand } => ExprKind::Length {
                operand: self.clone_expr(operand),
            },
            ExprKind::Iteration {
                subject,
                body,
                sorted,
            } => ExprKind::Iteration {
                subject: self.clone_expr(subject),
                body: self.clone_expr(body),
                sorted,
            },
            ExprKind::Repeat { condition, body } => ExprKind::Repeat {
                condition: self.clone_expr(condition),
                body: self.clone_expr(body),
            },
            leaf @ (ExprKind::Int { .. }
            | ExprKind::Float { .. }
            | ExprKind::Str { .. }
            | ExprKind::Char { .. }
            | ExprKind::Identifier { .. }
            | ExprKind::Resource { .. }
            | ExprKind::Process { .. }) => leaf,
        };

        self.alloc_expr(Expr {
            kind,
            location: source.location,
            annotations: source.annotations,
            ty: None,
        })
    }

    /// Deep-copy a statement subtree.
    pub fn clone_stmt(&mut self, id: StmtId) -> StmtId {
        let source = self.stmt(id).clone();
        let kind = match source.kind {
            StmtKind::Expr(expr) => StmtKind::Expr(self.clone_expr(expr)),
            StmtKind::Return(expr) => StmtKind::Return(expr.map(|e| self.clone_expr(e))),
            StmtKind::Break => StmtKind::Break,
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::VarDecl(mut decl) => {
                decl.init = decl.init.map(|e| self.clone_expr(e));
                StmtKind::VarDecl(decl)
            }
            StmtKind::TypeDecl(decl) => StmtKind::TypeDecl(decl),
            StmtKind::FuncDecl(mut func) => {
                func.body = func.body.map(|b| self.clone_expr(b));
                StmtKind::FuncDecl(func)
            }
            StmtKind::Import(path) => StmtKind::Import(path),
            StmtKind::CondStmt { condition, body } => StmtKind::CondStmt {
                condition: self.clone_expr(condition),
                body: self.clone_stmt(body),
            },
        };

        self.alloc_stmt(Stmt {
            kind,
            location: source.location,
            annotations: source.annotations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    #[test]
    fn clone_expr_produces_fresh_untyped_nodes() {
        let mut arena = AstArena::new();
        let left = arena.make_int(1, SourceLocation::default());
        let right = arena.make_int(2, SourceLocation::default());
        let sum = arena.alloc_expr(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            },
            SourceLocation::default(),
        ));
        arena.expr_mut(sum).ty = Some(crate::ast::Type::Primitive(crate::ast::Primitive::I8));

        let copy = arena.clone_expr(sum);
        assert_ne!(copy, sum);
        assert!(arena.expr(copy).ty.is_none());
        let ExprKind::Binary {
            left: cl,
            right: cr,
            ..
        } = arena.expr(copy).kind
        else {
            panic!("clone changed node kind");
        };
        assert_ne!(cl, left);
        assert_ne!(cr, right);
        assert_eq!(arena.int_literal_value(cl), Some((1, false)));
        assert_eq!(arena.int_literal_value(cr), Some((2, false)));
    }
}
