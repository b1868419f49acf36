//! Type-use validation.
//!
//! Runs after the analyser: every *used* value expression and every used
//! global must have a fully concrete type, with no residual unification
//! variable. Dead branches of constexpr conditionals are skipped, matching
//! the type checker's short-circuit, and expression-parameter arguments
//! are opaque here because they were inlined at each expansion site.
//! Generic functions that were never instantiated are not visited at all.

use log::debug;

use crate::{
    analyzer::AnalysisFacts,
    ast::{ExprId, ExprKind, StmtId, StmtKind, Type},
    error::CompileResult,
    loader::InstanceId,
    optimizer::OptimizationFacts,
    resolver::SymbolKind,
    typechecker::TypeChecker,
};

pub struct TypeUseValidator<'c, 'p> {
    checker: &'c TypeChecker<'p>,
    analysis: &'c AnalysisFacts,
    optimization: &'c OptimizationFacts,
    /// 0 = relaxed, 1 = annotated locals, 2 = full.
    strictness: u8,
}

impl<'c, 'p> TypeUseValidator<'c, 'p> {
    pub fn new(
        checker: &'c TypeChecker<'p>,
        analysis: &'c AnalysisFacts,
        optimization: &'c OptimizationFacts,
        strictness: u8,
    ) -> Self {
        Self {
            checker,
            analysis,
            optimization,
            strictness,
        }
    }

    pub fn run(&self) -> CompileResult<()> {
        debug!(
            "type-use validation over {} reachable function(s)",
            self.analysis.reachable_functions.len()
        );

        for symbol in &self.analysis.used_global_vars {
            let info = self.checker.bindings.symbol(*symbol);
            if let Some(ty) = &info.ty {
                if self.contains_type_var(ty) {
                    let location = info
                        .declaration
                        .map(|d| self.checker.program.arena.stmt(d).location.clone())
                        .unwrap_or_default();
                    return Err(crate::error::CompileError::new(
                        format!("Used global '{}' has unresolved type", info.name),
                        location,
                    ));
                }
            }
        }

        for symbol in &self.analysis.reachable_functions {
            let info = self.checker.bindings.symbol(*symbol);
            let Some(declaration) = info.declaration else {
                continue;
            };
            let instance = info.instance_id;
            if let StmtKind::FuncDecl(func) = &self.checker.program.arena.stmt(declaration).kind {
                if func.is_generic && !func.is_instantiation {
                    continue;
                }
            }
            self.validate_stmt(instance, declaration)?;
        }

        Ok(())
    }

    fn contains_type_var(&self, ty: &Type) -> bool {
        match self.checker.resolve_type(ty) {
            Type::Var(_) => true,
            Type::Array { element, .. } => self.contains_type_var(&element),
            _ => false,
        }
    }

    fn demand_concrete(&self, instance: InstanceId, expr: ExprId) -> CompileResult<()> {
        let node = self.checker.program.arena.expr(expr);
        // Expression-parameter references are opaque: their concrete shape
        // comes from the argument inlined at each call site.
        if matches!(
            node.kind,
            ExprKind::Identifier {
                is_expr_param_ref: true,
                ..
            }
        ) {
            return Ok(());
        }
        match &node.ty {
            Some(ty) => {
                if self.contains_type_var(ty) {
                    return Err(crate::error::CompileError::new(
                        "Used expression has unresolved type",
                        node.location.clone(),
                    ));
                }
                Ok(())
            }
            None => {
                // Statement-position shapes are legitimately void; under
                // full strictness everything else must have produced a
                // type.
                let statement_shape = matches!(
                    node.kind,
                    ExprKind::Iteration { .. }
                        | ExprKind::Repeat { .. }
                        | ExprKind::Block { .. }
                        | ExprKind::Call { .. }
                        | ExprKind::Assignment { .. }
                );
                if self.strictness >= 2 && !statement_shape {
                    return Err(crate::error::CompileError::new(
                        "Used expression has no type",
                        node.location.clone(),
                    ));
                }
                let _ = instance;
                Ok(())
            }
        }
    }

    fn validate_stmt(&self, instance: InstanceId, stmt: StmtId) -> CompileResult<()> {
        match self.checker.program.arena.stmt(stmt).kind.clone() {
            StmtKind::FuncDecl(func) => {
                if let Some(body) = func.body {
                    self.validate_expr(instance, body)?;
                }
                Ok(())
            }
            StmtKind::VarDecl(decl) => {
                if self.strictness >= 1 {
                    if let Some(ty) = &decl.ty {
                        if self.contains_type_var(ty) {
                            return Err(crate::error::CompileError::new(
                                format!("Variable '{}' has unresolved type", decl.name),
                                self.checker.program.arena.stmt(stmt).location.clone(),
                            ));
                        }
                    }
                }
                match decl.init {
                    Some(init) => self.validate_expr(instance, init),
                    None => Ok(()),
                }
            }
            StmtKind::Expr(expr) => self.validate_expr(instance, expr),
            StmtKind::Return(Some(expr)) => self.validate_expr(instance, expr),
            StmtKind::CondStmt { condition, body } => {
                self.validate_expr(instance, condition)?;
                if self.optimization.condition(instance, condition) != Some(false) {
                    self.validate_stmt(instance, body)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn validate_expr(&self, instance: InstanceId, expr: ExprId) -> CompileResult<()> {
        self.demand_concrete(instance, expr)?;

        match self.checker.program.arena.expr(expr).kind.clone() {
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => {
                self.validate_expr(instance, condition)?;
                match self.optimization.condition(instance, condition) {
                    Some(true) => self.validate_expr(instance, true_expr),
                    Some(false) => self.validate_expr(instance, false_expr),
                    None => {
                        self.validate_expr(instance, true_expr)?;
                        self.validate_expr(instance, false_expr)
                    }
                }
            }
            ExprKind::Call {
                callee,
                receivers,
                args,
            } => {
                for receiver in receivers {
                    self.validate_expr(instance, receiver)?;
                }
                let callee_symbol = self.checker.bindings.lookup_expr(instance, callee);
                for (index, arg) in args.iter().enumerate() {
                    // Expression-parameter arguments are opaque here.
                    let skip = callee_symbol.is_some_and(|symbol| {
                        let info = self.checker.bindings.symbol(symbol);
                        info.kind == SymbolKind::Function
                            && info
                                .declaration
                                .and_then(|d| match &self.checker.program.arena.stmt(d).kind {
                                    StmtKind::FuncDecl(f) => {
                                        f.params.get(index).map(|p| p.is_expression_param)
                                    }
                                    _ => None,
                                })
                                .unwrap_or(false)
                    });
                    if !skip {
                        self.validate_expr(instance, *arg)?;
                    }
                }
                Ok(())
            }
            ExprKind::Binary { left, right, .. } => {
                self.validate_expr(instance, left)?;
                self.validate_expr(instance, right)
            }
            ExprKind::Assignment { target, value, .. } => {
                if !matches!(
                    self.checker.program.arena.expr(target).kind,
                    ExprKind::Identifier { .. }
                ) {
                    self.validate_expr(instance, target)?;
                }
                self.validate_expr(instance, value)
            }
            ExprKind::Range { start, end } => {
                self.validate_expr(instance, start)?;
                self.validate_expr(instance, end)
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::Length { operand }
            | ExprKind::Member { operand, .. } => self.validate_expr(instance, operand),
            ExprKind::Index { operand, index } => {
                self.validate_expr(instance, operand)?;
                self.validate_expr(instance, index)
            }
            ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
                for element in elements {
                    self.validate_expr(instance, element)?;
                }
                Ok(())
            }
            ExprKind::Block { statements, result } => {
                for stmt in statements {
                    self.validate_stmt(instance, stmt)?;
                }
                match result {
                    Some(result) => self.validate_expr(instance, result),
                    None => Ok(()),
                }
            }
            ExprKind::Iteration { subject, body, .. } => {
                self.validate_expr(instance, subject)?;
                self.validate_expr(instance, body)
            }
            ExprKind::Repeat { condition, body } => {
                self.validate_expr(instance, condition)?;
                self.validate_expr(instance, body)
            }
            _ => Ok(()),
        }
    }
}
