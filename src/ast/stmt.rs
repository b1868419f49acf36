use crate::error::SourceLocation;

use super::{Annotation, ExprId, StmtId, Type};

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: SourceLocation,
    pub annotations: Vec<Annotation>,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location,
            annotations: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(ExprId),
    Return(Option<ExprId>),
    Break,
    Continue,
    VarDecl(VarDecl),
    TypeDecl(TypeDecl),
    FuncDecl(FuncDecl),
    Import(Vec<String>),
    /// `cond ? stmt` one-armed conditional.
    CondStmt {
        condition: ExprId,
        body: StmtId,
    },
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<Type>,
    pub init: Option<ExprId>,
    pub is_mutable: bool,
    pub is_exported: bool,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Option<Type>,
    pub location: SourceLocation,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Option<Type>,
    /// Expression parameters receive their argument as an AST fragment,
    /// re-evaluated in the caller's environment.
    pub is_expression_param: bool,
    pub location: SourceLocation,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    /// `Type::method` namespacing; the first receiver is then typed as the
    /// namespace type.
    pub type_namespace: Option<String>,
    pub params: Vec<Parameter>,
    /// Receiver parameters, bound by name before the positional list.
    pub ref_params: Vec<String>,
    pub ref_param_types: Vec<Option<Type>>,
    pub return_type: Option<Type>,
    /// Tuple return: two or more declared types.
    pub return_types: Vec<Type>,
    pub body: Option<ExprId>,
    pub is_external: bool,
    pub is_exported: bool,
    pub is_generic: bool,
    pub is_instantiation: bool,
}

impl FuncDecl {
    /// The name the function is looked up under: `Type::method` for
    /// namespaced functions, the plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.type_namespace {
            Some(ns) => format!("{}::{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}
