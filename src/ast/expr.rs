use std::fmt::Display;

use crate::error::SourceLocation;

use super::{Annotation, ExprId, StmtId, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    /// Modulo, bitwise, and shift operators: unsigned integers only.
    pub fn is_unsigned_only(&self) -> bool {
        matches!(
            self,
            BinaryOp::Mod
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::Shl
                | BinaryOp::Shr
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Operators whose result carries the operand value type. Constraint
    /// propagation pushes target types through these.
    pub fn is_value_op(&self) -> bool {
        self.is_arithmetic() || self.is_unsigned_only()
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Expression node. `ty` is populated by the type checker; after checking,
/// every value-producing expression has `Some`, statement-position
/// expressions (void calls, loops, statement blocks) keep `None`.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: SourceLocation,
    pub annotations: Vec<Annotation>,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location,
            annotations: vec![],
            ty: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal. The raw magnitude is kept unsigned; `unsigned`
    /// records whether the literal was written in an unsigned form (hex or
    /// out of signed range) and controls literal-fit checks.
    Int {
        value: u64,
        unsigned: bool,
        raw: String,
    },
    Float {
        value: f64,
        raw: String,
    },
    Str {
        value: String,
    },
    Char {
        value: u8,
    },
    Identifier {
        name: String,
        /// `$name` inside a callee body: resolves against the
        /// expression-parameter stack before any scope.
        is_expr_param_ref: bool,
        /// `name: #ty` declaration annotation on an assignment target.
        declared_type: Option<Type>,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Call {
        callee: ExprId,
        receivers: Vec<ExprId>,
        args: Vec<ExprId>,
    },
    Index {
        operand: ExprId,
        index: ExprId,
    },
    Member {
        operand: ExprId,
        field: String,
    },
    ArrayLiteral {
        elements: Vec<ExprId>,
    },
    TupleLiteral {
        elements: Vec<ExprId>,
    },
    Block {
        statements: Vec<StmtId>,
        result: Option<ExprId>,
    },
    Conditional {
        condition: ExprId,
        true_expr: ExprId,
        false_expr: ExprId,
        /// Set when the conditional was written in parentheses; bare
        /// conditionals may not nest inside conditional branches.
        parenthesized: bool,
    },
    Cast {
        target: Type,
        operand: ExprId,
    },
    Assignment {
        target: ExprId,
        value: ExprId,
        /// Set by the resolver when the target identifier was unbound and
        /// this assignment declares a new mutable local.
        creates_new_variable: bool,
        /// Explicit annotation recorded when it differs from the inferred
        /// initialiser type; the evaluator coerces through it.
        declared_type: Option<Type>,
    },
    Range {
        start: ExprId,
        end: ExprId,
    },
    Length {
        operand: ExprId,
    },
    Iteration {
        subject: ExprId,
        body: ExprId,
        sorted: bool,
    },
    Repeat {
        condition: ExprId,
        body: ExprId,
    },
    Resource {
        path: Vec<String>,
    },
    Process {
        command: String,
    },
}

impl ExprKind {
    pub fn int(value: u64, raw: impl Into<String>) -> Self {
        ExprKind::Int {
            value,
            unsigned: false,
            raw: raw.into(),
        }
    }

    pub fn uint(value: u64, raw: impl Into<String>) -> Self {
        ExprKind::Int {
            value,
            unsigned: true,
            raw: raw.into(),
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        ExprKind::Identifier {
            name: name.into(),
            is_expr_param_ref: false,
            declared_type: None,
        }
    }
}
