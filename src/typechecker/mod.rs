//! Type checker for Sable.
//!
//! Checking proceeds statement by statement within a module instance, in
//! source order so constant initialisation stays deterministic. Constant
//! folding can re-enter the checker, so every per-statement check is gated
//! by a `(instance, statement)` set; re-running the checker over an
//! already-checked program is a no-op.

mod constraints;
mod control;
mod expr;
mod generics;
mod types;

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::{
    ast::{
        ExprId, ExprKind, FuncDecl, StmtId, StmtKind, Type,
    },
    error::{CompileError, CompileResult, SourceLocation},
    evaluator::{CtValue, CteQuery, EvalContext, Evaluator},
    loader::{InstanceId, Program},
    resolver::{BindKey, Bindings, SymbolId, SymbolKind},
};

pub struct TypeChecker<'a> {
    pub program: &'a mut Program,
    pub bindings: &'a mut Bindings,
    pub(crate) project_root: String,
    pub(crate) allow_process: bool,
    pub(crate) current_instance: InstanceId,
    type_var_counter: usize,
    pub(crate) type_var_bindings: HashMap<String, Type>,
    checked: HashSet<(InstanceId, StmtId)>,
    pub(crate) loop_depth: usize,
    /// Side table mapping synthetic tuple type names to element types.
    pub(crate) tuple_types: HashMap<String, Vec<Type>>,
    /// Generic instantiation cache: (canonical name, instance) -> mangled
    /// name -> instantiated declaration.
    pub(crate) instantiations: HashMap<(String, InstanceId), HashMap<String, StmtId>>,
    /// Constexpr values remembered per symbol from earlier assignments.
    pub(crate) known_symbol_values: HashMap<SymbolId, CtValue>,
    /// Statically-known conditional conditions, recorded while checking.
    pub(crate) constexpr_conditions: HashMap<(InstanceId, ExprId), bool>,
    /// Functions currently being constrained; guards recursion in
    /// `apply_type_constraint`.
    pub(crate) constraint_stack: HashSet<StmtId>,
    cte: Evaluator,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        program: &'a mut Program,
        bindings: &'a mut Bindings,
        project_root: impl Into<String>,
        allow_process: bool,
    ) -> Self {
        Self {
            program,
            bindings,
            project_root: project_root.into(),
            allow_process,
            current_instance: 0,
            type_var_counter: 0,
            type_var_bindings: HashMap::new(),
            checked: HashSet::new(),
            loop_depth: 0,
            tuple_types: HashMap::new(),
            instantiations: HashMap::new(),
            known_symbol_values: HashMap::new(),
            constexpr_conditions: HashMap::new(),
            constraint_stack: HashSet::new(),
            cte: Evaluator::new(),
        }
    }

    pub(crate) fn err(&self, message: impl Into<String>, location: &SourceLocation) -> CompileError {
        CompileError::new(message, location.clone())
    }

    pub(crate) fn stmt_location(&self, stmt: StmtId) -> SourceLocation {
        self.program.arena.stmt(stmt).location.clone()
    }

    pub(crate) fn expr_location(&self, expr: ExprId) -> SourceLocation {
        self.program.arena.expr(expr).location.clone()
    }

    pub(crate) fn expr_type(&self, expr: ExprId) -> Option<Type> {
        self.program.arena.expr(expr).ty.clone()
    }

    pub(crate) fn set_expr_type(&mut self, expr: ExprId, ty: Option<Type>) {
        self.program.arena.expr_mut(expr).ty = ty;
    }

    pub(crate) fn lookup_binding_expr(&self, expr: ExprId) -> Option<SymbolId> {
        self.bindings.lookup_expr(self.current_instance, expr)
    }

    pub(crate) fn lookup_global(&self, name: &str) -> Option<SymbolId> {
        self.bindings.lookup_global(self.current_instance, name)
    }

    pub(crate) fn bind_expr(&mut self, expr: ExprId, symbol: SymbolId) {
        self.bindings
            .bind(self.current_instance, BindKey::Expr(expr), symbol);
    }

    pub(crate) fn with_instance<T>(
        &mut self,
        instance: InstanceId,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = self.current_instance;
        self.current_instance = instance;
        let result = f(self);
        self.current_instance = saved;
        result
    }

    /// Run the compile-time evaluator against the current state.
    pub fn query_constexpr(&mut self, expr: ExprId) -> CteQuery {
        let ctx = EvalContext {
            program: &*self.program,
            bindings: &*self.bindings,
            instance: self.current_instance,
            symbol_values: &self.known_symbol_values,
        };
        self.cte.query(&ctx, expr)
    }

    pub(crate) fn try_evaluate(&mut self, expr: ExprId) -> Option<CtValue> {
        self.query_constexpr(expr).known()
    }

    pub(crate) fn remember_symbol_value(&mut self, symbol: SymbolId, value: CtValue) {
        self.known_symbol_values.insert(symbol, value);
    }

    pub(crate) fn forget_symbol_value(&mut self, symbol: SymbolId) {
        self.known_symbol_values.remove(&symbol);
        self.cte.forget_symbol(symbol);
    }

    pub(crate) fn func_decl(&self, stmt: StmtId) -> Option<&FuncDecl> {
        match &self.program.arena.stmt(stmt).kind {
            StmtKind::FuncDecl(func) => Some(func),
            _ => None,
        }
    }

    pub(crate) fn is_checked(&self, instance: InstanceId, stmt: StmtId) -> bool {
        self.checked.contains(&(instance, stmt))
    }

    /// Check every instance of the program, in declaration order.
    pub fn check_program(&mut self) -> CompileResult<()> {
        for instance in 0..self.program.instances.len() {
            self.with_instance(instance, |checker| checker.check_instance(instance))?;
        }
        Ok(())
    }

    fn check_instance(&mut self, instance: InstanceId) -> CompileResult<()> {
        debug!("type checking instance {instance}");
        // Iterate by index: generic instantiations discovered mid-pass are
        // appended to this instance and must be visible to the loop.
        let mut index = 0;
        while index < self.program.instance(instance).top_level.len() {
            let stmt = self.program.instance(instance).top_level[index];
            self.check_stmt(stmt)?;
            index += 1;
        }
        self.validate_instance_invariants(instance)
    }

    pub(crate) fn check_stmt(&mut self, stmt: StmtId) -> CompileResult<()> {
        if !self.checked.insert((self.current_instance, stmt)) {
            trace!("statement already checked, skipping");
            return Ok(());
        }

        let location = self.stmt_location(stmt);
        match self.program.arena.stmt(stmt).kind.clone() {
            StmtKind::FuncDecl(_) => self.check_func_decl(stmt),
            StmtKind::TypeDecl(_) => self.check_type_decl(stmt),
            StmtKind::VarDecl(_) => self.check_var_decl(stmt),
            StmtKind::Import(_) => Ok(()),
            StmtKind::Expr(expr) => {
                self.check_expr(expr)?;
                Ok(())
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.check_expr(value)?;
                }
                Ok(())
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(self.err("Break statement outside of loop", &location));
                }
                Ok(())
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.err("Continue statement outside of loop", &location));
                }
                Ok(())
            }
            StmtKind::CondStmt { condition, body } => {
                let cond_type = self.check_expr(condition)?;
                self.require_boolean_expr(
                    condition,
                    cond_type.as_ref(),
                    &self.expr_location(condition),
                    "Conditional statement",
                )?;
                self.check_stmt(body)
            }
        }
    }

    fn check_func_decl(&mut self, stmt: StmtId) -> CompileResult<()> {
        let location = self.stmt_location(stmt);
        let Some(func) = self.func_decl(stmt) else {
            return Err(self.err("Internal error: expected function declaration", &location));
        };
        let func = func.clone();
        let func_name = func.qualified_name();

        let is_generic = if func.is_instantiation {
            false
        } else {
            self.is_generic_function(&func)
        };
        if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
            decl.is_generic = is_generic;
        }

        if is_generic && (func.is_exported || func.is_external) {
            return Err(self.err("Generic functions cannot be exported or external", &location));
        }

        if self
            .bindings
            .lookup(self.current_instance, BindKey::Stmt(stmt))
            .is_none()
        {
            return Err(self.err(
                format!("Internal error: unresolved function '{func_name}'"),
                &location,
            ));
        }

        if func.is_external {
            for param in &func.params {
                if let Some(ty) = &param.ty {
                    if !matches!(ty, Type::Primitive(_)) {
                        return Err(self.err(
                            format!(
                                "External functions can only use primitive types (found {} in parameter {})",
                                ty.render(&self.program.arena),
                                param.name
                            ),
                            &location,
                        ));
                    }
                }
            }
            if let Some(ty) = &func.return_type {
                if !matches!(ty, Type::Primitive(_)) {
                    return Err(self.err(
                        format!(
                            "External functions can only use primitive types in return type (found {})",
                            ty.render(&self.program.arena)
                        ),
                        &location,
                    ));
                }
            }
        }

        // Generic bodies are only checked per instantiation.
        if is_generic {
            return Ok(());
        }

        if func.is_external || func.body.is_none() {
            return Ok(());
        }
        let body = func.body.expect("checked above");

        // Receivers: the namespace type for `Type::method`, fresh
        // unification variables otherwise.
        let mut ref_param_types = func.ref_param_types.clone();
        ref_param_types.resize(func.ref_params.len(), None);
        for (index, name) in func.ref_params.iter().enumerate() {
            let Some(rsym) = self
                .bindings
                .lookup(self.current_instance, BindKey::Receiver(stmt, index))
            else {
                return Err(self.err(
                    format!("Internal error: unresolved receiver '{name}'"),
                    &location,
                ));
            };
            let receiver_type = if index == 0 && func.type_namespace.is_some() {
                Some(Type::Named(func.type_namespace.clone().expect("checked")))
            } else if let Some(existing) = &self.bindings.symbol(rsym).ty {
                Some(existing.clone())
            } else if let Some(existing) = &ref_param_types[index] {
                Some(existing.clone())
            } else {
                Some(self.make_fresh_typevar())
            };
            let symbol = self.bindings.symbol_mut(rsym);
            symbol.ty = receiver_type.clone();
            symbol.is_mutable = true;
            ref_param_types[index] = receiver_type;
        }
        if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
            decl.ref_param_types = ref_param_types;
        }

        for index in 0..func.params.len() {
            let param_type = match &func.params[index].ty {
                Some(ty) => ty.clone(),
                None => {
                    let fresh = self.make_fresh_typevar();
                    if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
                        decl.params[index].ty = Some(fresh.clone());
                    }
                    fresh
                }
            };
            let Some(psym) = self
                .bindings
                .lookup(self.current_instance, BindKey::Param(stmt, index))
            else {
                return Err(self.err(
                    format!(
                        "Internal error: unresolved parameter '{}'",
                        func.params[index].name
                    ),
                    &func.params[index].location,
                ));
            };
            let symbol = self.bindings.symbol_mut(psym);
            symbol.ty = Some(param_type);
            symbol.is_mutable = false;
        }

        let body_type = self.check_expr(body)?;

        let current = self.func_decl(stmt).expect("still a function").clone();
        if !current.return_types.is_empty() {
            if current.return_type.is_none() {
                let first = current.return_types[0].clone();
                if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
                    decl.return_type = Some(first);
                }
            }
        } else if current.return_type.is_none() {
            if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
                decl.return_type = body_type.clone();
            }
        } else {
            let declared = current.return_type.clone().expect("checked above");
            if !self.types_compatible(body_type.as_ref(), Some(&declared)) {
                // The body's trailing expression may still be a literal that
                // fits the declared type.
                let mut return_expr = body;
                if let ExprKind::Block {
                    result: Some(result),
                    ..
                } = &self.program.arena.expr(body).kind
                {
                    return_expr = *result;
                }
                if self.literal_assignable_to(&declared, return_expr) {
                    self.set_expr_type(return_expr, Some(declared.clone()));
                    self.set_expr_type(body, Some(declared));
                } else if self.apply_type_constraint(body, &declared) {
                    self.sync_function_signature_from_bindings(stmt);
                } else {
                    return Err(self.err(
                        format!("Return type mismatch in function '{}'", current.name),
                        &location,
                    ));
                }
            }
        }

        Ok(())
    }

    fn check_type_decl(&mut self, stmt: StmtId) -> CompileResult<()> {
        let location = self.stmt_location(stmt);
        let StmtKind::TypeDecl(decl) = self.program.arena.stmt(stmt).kind.clone() else {
            return Err(self.err("Internal error: expected type declaration", &location));
        };
        if self
            .bindings
            .lookup(self.current_instance, BindKey::Stmt(stmt))
            .is_none()
        {
            return Err(self.err(
                format!("Internal error: unresolved type '{}'", decl.name),
                &location,
            ));
        }

        for index in 0..decl.fields.len() {
            if decl.fields[index].ty.is_none() {
                let fresh = self.make_fresh_typevar();
                if let StmtKind::TypeDecl(d) = &mut self.program.arena.stmt_mut(stmt).kind {
                    d.fields[index].ty = Some(fresh);
                }
            }
        }

        self.check_recursive_type(&decl.name, stmt, &location)
    }

    fn check_var_decl(&mut self, stmt: StmtId) -> CompileResult<()> {
        let location = self.stmt_location(stmt);
        let StmtKind::VarDecl(decl) = self.program.arena.stmt(stmt).kind.clone() else {
            return Err(self.err("Internal error: expected variable declaration", &location));
        };

        let mut var_type = decl.ty.clone();
        if let Some(init) = decl.init {
            let init_type = self.check_expr(init)?;
            match &var_type {
                None => {
                    var_type = init_type;
                }
                Some(Type::Array { element, .. })
                    if matches!(
                        self.program.arena.expr(init).kind,
                        ExprKind::ArrayLiteral { .. }
                    ) =>
                {
                    let ExprKind::ArrayLiteral { elements } =
                        self.program.arena.expr(init).kind.clone()
                    else {
                        unreachable!("matched above");
                    };
                    let annotated = var_type.clone().expect("matched above");
                    let element = (**element).clone();
                    if let Some(expected) = annotated_array_size(self, var_type.as_ref()) {
                        if elements.len() as u64 != expected {
                            return Err(
                                self.err("Type mismatch in variable initialization", &location)
                            );
                        }
                    }
                    for el in &elements {
                        let el_type = self.expr_type(*el);
                        if !self.types_compatible(el_type.as_ref(), Some(&element))
                            && !self.literal_assignable_to(&element, *el)
                        {
                            return Err(
                                self.err("Type mismatch in variable initialization", &location)
                            );
                        }
                    }
                    self.set_expr_type(init, Some(annotated));
                }
                Some(annotated) => {
                    if matches!(self.program.arena.expr(init).kind, ExprKind::Cast { .. }) {
                        // Explicit casts satisfy the annotated type.
                        self.set_expr_type(init, Some(annotated.clone()));
                    } else if !self.types_compatible(init_type.as_ref(), Some(annotated)) {
                        let annotated = annotated.clone();
                        if self.literal_assignable_to(&annotated, init) {
                            self.set_expr_type(init, Some(annotated));
                        } else if self.apply_type_constraint(init, &annotated) {
                            // Constraint propagation resolved the mismatch.
                        } else {
                            return Err(
                                self.err("Type mismatch in variable initialization", &location)
                            );
                        }
                    }
                }
            }
        } else if var_type.is_none() {
            return Err(self.err(
                "Variable must have type annotation or initializer",
                &location,
            ));
        }

        let var_type = match var_type {
            Some(ty) => Some(self.validate_type(&ty, &location)?),
            None => None,
        };
        if let StmtKind::VarDecl(d) = &mut self.program.arena.stmt_mut(stmt).kind {
            d.ty = var_type.clone();
        }

        let Some(symbol) = self.bindings.lookup(self.current_instance, BindKey::Stmt(stmt)) else {
            return Err(self.err(
                format!("Internal error: unresolved variable '{}'", decl.name),
                &location,
            ));
        };
        let info = self.bindings.symbol_mut(symbol);
        info.kind = if decl.is_mutable {
            SymbolKind::Variable
        } else {
            SymbolKind::Constant
        };
        info.ty = var_type;
        info.is_mutable = decl.is_mutable;
        info.declaration = Some(stmt);

        // Cache the constant's value eagerly so later statements fold
        // against it.
        if !decl.is_mutable {
            if let Some(init) = decl.init {
                if let Some(value) = self.try_evaluate(init) {
                    self.remember_symbol_value(symbol, value);
                }
            }
        }

        Ok(())
    }

    /// Post-check invariants: every value-producing expression carries a
    /// type, statement-position expressions stay untyped, and declarations
    /// are fully annotated.
    fn validate_instance_invariants(&mut self, instance: InstanceId) -> CompileResult<()> {
        let stmts = self.program.instance(instance).top_level.clone();
        for stmt in stmts {
            self.validate_stmt_types(stmt)?;
        }
        Ok(())
    }

    fn validate_stmt_types(&mut self, stmt: StmtId) -> CompileResult<()> {
        let location = self.stmt_location(stmt);
        match self.program.arena.stmt(stmt).kind.clone() {
            StmtKind::VarDecl(decl) => {
                if decl.ty.is_none() {
                    return Err(self.err(
                        format!(
                            "Internal error: variable '{}' has no type after type checking",
                            decl.name
                        ),
                        &location,
                    ));
                }
                if let Some(init) = decl.init {
                    self.validate_expr_types(init)?;
                    if self.expr_type(init).is_none() {
                        return Err(self.err(
                            format!(
                                "Internal error: variable '{}' initializer has no type",
                                decl.name
                            ),
                            &location,
                        ));
                    }
                }
                Ok(())
            }
            StmtKind::FuncDecl(func) => {
                if func.is_generic && !func.is_instantiation {
                    return Ok(());
                }
                if !func.is_external && func.body.is_none() {
                    return Err(self.err(
                        format!("Internal error: missing function body for '{}'", func.name),
                        &location,
                    ));
                }
                if func.ref_param_types.len() < func.ref_params.len() {
                    return Err(self.err(
                        format!("Internal error: receiver types missing for '{}'", func.name),
                        &location,
                    ));
                }
                for (index, name) in func.ref_params.iter().enumerate() {
                    if func.ref_param_types[index].is_none() {
                        return Err(self.err(
                            format!(
                                "Internal error: receiver '{name}' has no type after type checking"
                            ),
                            &location,
                        ));
                    }
                }
                for param in &func.params {
                    if param.is_expression_param {
                        continue;
                    }
                    if param.ty.is_none() {
                        return Err(self.err(
                            format!(
                                "Internal error: parameter '{}' has no type after type checking",
                                param.name
                            ),
                            &param.location,
                        ));
                    }
                }
                if let Some(body) = func.body {
                    self.validate_expr_types(body)?;
                }
                Ok(())
            }
            StmtKind::TypeDecl(decl) => {
                for field in &decl.fields {
                    if field.ty.is_none() {
                        return Err(self.err(
                            format!(
                                "Internal error: field '{}' missing type in '{}'",
                                field.name, decl.name
                            ),
                            &field.location,
                        ));
                    }
                }
                Ok(())
            }
            StmtKind::Expr(expr) => self.validate_expr_types(expr),
            StmtKind::Return(Some(expr)) => self.validate_expr_types(expr),
            StmtKind::CondStmt { condition, body } => {
                self.validate_expr_types(condition)?;
                self.validate_stmt_types(body)
            }
            StmtKind::Return(None) | StmtKind::Import(_) | StmtKind::Break | StmtKind::Continue => {
                Ok(())
            }
        }
    }

    fn validate_expr_types(&mut self, expr: ExprId) -> CompileResult<()> {
        let location = self.expr_location(expr);
        let kind = self.program.arena.expr(expr).kind.clone();
        let has_type = self.expr_type(expr).is_some();

        let untyped_ok = match &kind {
            ExprKind::Iteration { .. } | ExprKind::Repeat { .. } => true,
            ExprKind::Block { result, .. } => match result {
                None => true,
                Some(result) => self.expr_type(*result).is_none(),
            },
            // Void calls are permitted in statement position; type-use
            // validation rejects them if their value is consumed.
            ExprKind::Call { .. } if !has_type => true,
            ExprKind::Assignment { .. } if !has_type => true,
            _ => false,
        };

        if !has_type && !untyped_ok {
            return Err(self.err("Internal error: missing type after type checking", &location));
        }
        if has_type && untyped_ok {
            return Err(self.err(
                "Internal error: unexpected type on statement expression",
                &location,
            ));
        }

        match kind {
            ExprKind::Binary { left, right, .. } => {
                self.validate_expr_types(left)?;
                self.validate_expr_types(right)
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::Length { operand }
            | ExprKind::Member { operand, .. } => self.validate_expr_types(operand),
            ExprKind::Call {
                callee,
                receivers,
                args,
            } => {
                for receiver in receivers {
                    self.validate_expr_types(receiver)?;
                }
                // Expression-parameter arguments stay opaque; they are
                // re-checked at each expansion site.
                let callee_symbol = self.lookup_binding_expr(callee);
                for (index, arg) in args.iter().enumerate() {
                    let skip = callee_symbol.is_some_and(|sym| {
                        let info = self.bindings.symbol(sym);
                        info.kind == SymbolKind::Function
                            && info
                                .declaration
                                .and_then(|d| self.func_decl(d))
                                .and_then(|f| f.params.get(index))
                                .is_some_and(|p| p.is_expression_param)
                    });
                    if !skip {
                        self.validate_expr_types(*arg)?;
                    }
                }
                Ok(())
            }
            ExprKind::Index { operand, index } => {
                self.validate_expr_types(operand)?;
                self.validate_expr_types(index)
            }
            ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
                for element in elements {
                    self.validate_expr_types(element)?;
                }
                Ok(())
            }
            ExprKind::Block { statements, result } => {
                for stmt in statements {
                    self.validate_stmt_types(stmt)?;
                }
                if let Some(result) = result {
                    self.validate_expr_types(result)?;
                }
                Ok(())
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => {
                self.validate_expr_types(condition)?;
                // Dead branches of constexpr conditionals are exempt,
                // matching the checker's short-circuit.
                match self.constexpr_condition(condition) {
                    Some(true) => self.validate_expr_types(true_expr),
                    Some(false) => self.validate_expr_types(false_expr),
                    None => {
                        self.validate_expr_types(true_expr)?;
                        self.validate_expr_types(false_expr)
                    }
                }
            }
            ExprKind::Assignment { target, value, .. } => {
                if !matches!(
                    self.program.arena.expr(target).kind,
                    ExprKind::Identifier { .. }
                ) {
                    self.validate_expr_types(target)?;
                }
                self.validate_expr_types(value)
            }
            ExprKind::Range { start, end } => {
                self.validate_expr_types(start)?;
                self.validate_expr_types(end)
            }
            ExprKind::Iteration { subject, body, .. } => {
                self.validate_expr_types(subject)?;
                self.validate_expr_types(body)
            }
            ExprKind::Repeat { condition, body } => {
                self.validate_expr_types(condition)?;
                self.validate_expr_types(body)
            }
            _ => Ok(()),
        }
    }
}

fn annotated_array_size(checker: &TypeChecker, ty: Option<&Type>) -> Option<u64> {
    match ty {
        Some(Type::Array {
            size: Some(size), ..
        }) => checker.program.arena.int_literal_value(*size).map(|(v, _)| v),
        _ => None,
    }
}
