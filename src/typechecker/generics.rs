//! Generic monomorphisation.
//!
//! A function is generic when any parameter or return type is (or contains)
//! a unification variable. Generic bodies are never checked directly; each
//! call site with a concrete argument signature produces (or reuses) a
//! specialised clone. Instantiations are cached per `(canonical name,
//! instance, frozen signature)` and appended to the instance's statement
//! list, so they are type-checked in the same module pass that discovered
//! them. The cache makes instantiation deterministic and idempotent.

use std::collections::HashMap;

use log::debug;

use crate::{
    ast::{ExprId, ExprKind, FuncDecl, StmtId, StmtKind, Type},
    error::CompileResult,
    resolver::resolve_generated_function,
};

use super::TypeChecker;

impl<'a> TypeChecker<'a> {
    /// A function is generic when a value parameter lacks a concrete type
    /// or a return type is a type variable.
    pub(crate) fn is_generic_function(&self, func: &FuncDecl) -> bool {
        let untyped_param = func
            .params
            .iter()
            .any(|p| !p.is_expression_param && (p.ty.is_none() || matches!(p.ty, Some(Type::Var(_)))));

        let typevar_return = if !func.return_types.is_empty() {
            func.return_types.iter().any(|t| matches!(t, Type::Var(_)))
        } else {
            matches!(func.return_type, Some(Type::Var(_)))
        };

        untyped_param || typevar_return
    }

    /// Reduce a signature type to canonical form: variables resolved,
    /// array sizes frozen to integer literals where known.
    fn freeze_signature_type(&mut self, ty: &Type) -> Type {
        let resolved = self.resolve_type(ty);
        match resolved {
            Type::Array { element, size } => {
                let element = self.freeze_signature_type(&element);
                let size = match size {
                    Some(size) => match self.program.arena.int_literal_value(size) {
                        Some(_) => Some(size),
                        None => match self.try_evaluate(size) {
                            Some(crate::evaluator::CtValue::Int(v)) if v >= 0 => {
                                let location = self.expr_location(size);
                                Some(self.program.arena.make_int(v as u64, location))
                            }
                            Some(crate::evaluator::CtValue::Uint(v)) => {
                                let location = self.expr_location(size);
                                Some(self.program.arena.make_int(v, location))
                            }
                            _ => Some(size),
                        },
                    },
                    None => None,
                };
                Type::Array {
                    element: Box::new(element),
                    size,
                }
            }
            other => other,
        }
    }

    fn mangle_type_component(&self, ty: Option<&Type>) -> String {
        let Some(ty) = ty else {
            return "unknown".to_owned();
        };
        match ty {
            Type::Primitive(p) => p.name().to_owned(),
            Type::Named(name) => name.clone(),
            Type::Array { element, size } => {
                let mut component = format!("array_{}", self.mangle_type_component(Some(element)));
                match size.map(|s| self.program.arena.int_literal_value(s)) {
                    Some(Some((value, _))) => component.push_str(&format!("_n{value}")),
                    Some(None) => component.push_str("_dyn"),
                    None => component.push_str("_unsized"),
                }
                component
            }
            Type::Var(name) => format!("tv_{name}"),
        }
    }

    /// `<base>_G_<component>_<component>...`
    pub(crate) fn mangle_generic_name(&self, base: &str, types: &[Option<Type>]) -> String {
        let mut result = format!("{base}_G");
        for ty in types {
            result.push('_');
            result.push_str(&self.mangle_type_component(ty.as_ref()));
        }
        result
    }

    /// Look up or create the instantiation of `generic_decl` for the given
    /// argument types. Returns the mangled name of the concrete function.
    pub(crate) fn get_or_create_instantiation(
        &mut self,
        func_name: &str,
        arg_types: &[Option<Type>],
        generic_decl: StmtId,
    ) -> CompileResult<String> {
        let frozen: Vec<Option<Type>> = arg_types
            .iter()
            .map(|t| t.as_ref().map(|t| self.freeze_signature_type(t)))
            .collect();
        let mangled = self.mangle_generic_name(func_name, &frozen);

        let cache_key = (func_name.to_owned(), self.current_instance);
        if let Some(per_func) = self.instantiations.get(&cache_key) {
            if per_func.contains_key(&mangled) {
                return Ok(mangled);
            }
        }

        // An equivalent generated symbol may already exist in scope; reuse
        // it and rehydrate the cache entry.
        if let Some(existing) = self.lookup_global(&mangled) {
            let info = self.bindings.symbol(existing);
            if info.kind == crate::resolver::SymbolKind::Function {
                if let Some(declaration) = info.declaration {
                    self.instantiations
                        .entry(cache_key)
                        .or_insert_with(HashMap::new)
                        .insert(mangled.clone(), declaration);
                    return Ok(mangled);
                }
            }
        }

        debug!("instantiating {func_name} as {mangled}");

        let cloned = self.program.arena.clone_stmt(generic_decl);
        {
            let substitutions = self.collect_substitutions(generic_decl, &frozen);
            self.substitute_types_in_stmt(cloned, &substitutions);
            if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(cloned).kind {
                decl.name = mangled.clone();
                decl.type_namespace = None;
                decl.is_generic = false;
                decl.is_instantiation = true;
                // `frozen` indexes value parameters only; expression
                // parameters stay untyped.
                let mut value_index = 0;
                for param in decl.params.iter_mut() {
                    if param.is_expression_param {
                        continue;
                    }
                    if let Some(Some(frozen_ty)) = frozen.get(value_index) {
                        param.ty = Some(frozen_ty.clone());
                    }
                    value_index += 1;
                }
            }
        }

        resolve_generated_function(self.program, self.bindings, self.current_instance, cloned)?;
        self.program
            .push_instance_stmt(self.current_instance, cloned);

        // Check immediately so the return type is known for the current
        // call site.
        self.check_stmt(cloned)?;

        self.instantiations
            .entry(cache_key)
            .or_insert_with(HashMap::new)
            .insert(mangled.clone(), cloned);
        Ok(mangled)
    }

    /// Dispatch a call to a generic function: validate arguments against
    /// whatever concrete types the generic declares, instantiate, and
    /// rewrite the callee to the mangled name.
    pub(crate) fn check_generic_call(
        &mut self,
        expr: ExprId,
        func_name: &str,
        _symbol: crate::resolver::SymbolId,
        declaration: StmtId,
        args: &[ExprId],
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let func = self
            .func_decl(declaration)
            .expect("generic callee is a function")
            .clone();

        let mut arg_types = vec![];
        for (index, arg) in args.iter().enumerate() {
            let param = &func.params[index];
            if let Some(param_type) = &param.ty {
                if !matches!(param_type, Type::Var(_)) {
                    let arg_type = self.expr_type(*arg);
                    if !self.types_compatible(arg_type.as_ref(), Some(param_type))
                        && !self.literal_assignable_to(param_type, *arg)
                    {
                        return Err(self.err(
                            format!(
                                "Type mismatch for parameter '{}' in call to '{}'",
                                param.name, func.name
                            ),
                            &location,
                        ));
                    }
                }
            }
            if !param.is_expression_param {
                arg_types.push(self.expr_type(*arg));
            }
        }

        let mangled = self.get_or_create_instantiation(func_name, &arg_types, declaration)?;

        // Rewrite the call site to the instantiation.
        let ExprKind::Call { callee, .. } = self.program.arena.expr(expr).kind.clone() else {
            return Err(self.err("Internal error: expected call expression", &location));
        };
        if let ExprKind::Identifier { name, .. } = &mut self.program.arena.expr_mut(callee).kind {
            *name = mangled.clone();
        }
        if let Some(instantiated) = self.lookup_global(&mangled) {
            self.bind_expr(callee, instantiated);
        }

        let cache_key = (func_name.to_owned(), self.current_instance);
        let return_type = self
            .instantiations
            .get(&cache_key)
            .and_then(|per_func| per_func.get(&mangled))
            .and_then(|decl| self.func_decl(*decl))
            .and_then(|f| f.return_type.clone());

        let ty = match return_type {
            Some(ty) => Some(ty),
            None => Some(self.make_fresh_typevar()),
        };
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    /// Map each type variable in the generic's parameter patterns to its
    /// concrete counterpart from the frozen signature.
    fn collect_substitutions(
        &self,
        generic_decl: StmtId,
        frozen: &[Option<Type>],
    ) -> HashMap<String, Type> {
        let mut map = HashMap::new();
        let Some(func) = self.func_decl(generic_decl) else {
            return map;
        };
        let value_params: Vec<&crate::ast::Parameter> = func
            .params
            .iter()
            .filter(|p| !p.is_expression_param)
            .collect();
        for (index, concrete) in frozen.iter().enumerate() {
            let Some(concrete) = concrete else {
                continue;
            };
            if let Some(param) = value_params.get(index) {
                if let Some(pattern) = &param.ty {
                    collect_typevar_bindings(pattern, concrete, &mut map);
                }
            }
        }
        map
    }

    fn substitute_type(&self, ty: &Type, map: &HashMap<String, Type>) -> Type {
        match ty {
            Type::Var(name) => map.get(name).cloned().unwrap_or_else(|| ty.clone()),
            Type::Array { element, size } => Type::Array {
                element: Box::new(self.substitute_type(element, map)),
                size: *size,
            },
            _ => ty.clone(),
        }
    }

    fn substitute_option(&self, ty: &Option<Type>, map: &HashMap<String, Type>) -> Option<Type> {
        ty.as_ref().map(|t| self.substitute_type(t, map))
    }

    /// Substitute bound type variables throughout a cloned declaration:
    /// parameters, receiver types, return types, and every annotation in
    /// the body.
    pub(crate) fn substitute_types_in_stmt(&mut self, stmt: StmtId, map: &HashMap<String, Type>) {
        if map.is_empty() {
            return;
        }
        let kind = self.program.arena.stmt(stmt).kind.clone();
        match kind {
            StmtKind::FuncDecl(func) => {
                let params: Vec<Option<Type>> = func
                    .params
                    .iter()
                    .map(|p| self.substitute_option(&p.ty, map))
                    .collect();
                let ref_types: Vec<Option<Type>> = func
                    .ref_param_types
                    .iter()
                    .map(|t| self.substitute_option(t, map))
                    .collect();
                let return_type = self.substitute_option(&func.return_type, map);
                let return_types: Vec<Type> = func
                    .return_types
                    .iter()
                    .map(|t| self.substitute_type(t, map))
                    .collect();
                if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
                    for (param, ty) in decl.params.iter_mut().zip(params) {
                        param.ty = ty;
                    }
                    decl.ref_param_types = ref_types;
                    decl.return_type = return_type;
                    decl.return_types = return_types;
                }
                if let Some(body) = func.body {
                    self.substitute_types_in_expr(body, map);
                }
            }
            StmtKind::VarDecl(decl) => {
                let ty = self.substitute_option(&decl.ty, map);
                if let StmtKind::VarDecl(d) = &mut self.program.arena.stmt_mut(stmt).kind {
                    d.ty = ty;
                }
                if let Some(init) = decl.init {
                    self.substitute_types_in_expr(init, map);
                }
            }
            StmtKind::Expr(expr) => self.substitute_types_in_expr(expr, map),
            StmtKind::Return(Some(expr)) => self.substitute_types_in_expr(expr, map),
            StmtKind::CondStmt { condition, body } => {
                self.substitute_types_in_expr(condition, map);
                self.substitute_types_in_stmt(body, map);
            }
            _ => {}
        }
    }

    fn substitute_types_in_expr(&mut self, expr: ExprId, map: &HashMap<String, Type>) {
        let kind = self.program.arena.expr(expr).kind.clone();

        if let Some(ty) = self.expr_type(expr) {
            let substituted = self.substitute_type(&ty, map);
            self.set_expr_type(expr, Some(substituted));
        }

        match kind {
            ExprKind::Identifier {
                declared_type: Some(declared),
                ..
            } => {
                let substituted = self.substitute_type(&declared, map);
                if let ExprKind::Identifier { declared_type, .. } =
                    &mut self.program.arena.expr_mut(expr).kind
                {
                    *declared_type = Some(substituted);
                }
            }
            ExprKind::Cast { target, operand } => {
                let substituted = self.substitute_type(&target, map);
                if let ExprKind::Cast { target, .. } = &mut self.program.arena.expr_mut(expr).kind
                {
                    *target = substituted;
                }
                self.substitute_types_in_expr(operand, map);
            }
            ExprKind::Assignment {
                target,
                value,
                declared_type,
                ..
            } => {
                if let Some(declared) = declared_type {
                    let substituted = self.substitute_type(&declared, map);
                    if let ExprKind::Assignment { declared_type, .. } =
                        &mut self.program.arena.expr_mut(expr).kind
                    {
                        *declared_type = Some(substituted);
                    }
                }
                self.substitute_types_in_expr(target, map);
                self.substitute_types_in_expr(value, map);
            }
            ExprKind::Binary { left, right, .. } => {
                self.substitute_types_in_expr(left, map);
                self.substitute_types_in_expr(right, map);
            }
            ExprKind::Range { start, end } => {
                self.substitute_types_in_expr(start, map);
                self.substitute_types_in_expr(end, map);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Length { operand } => {
                self.substitute_types_in_expr(operand, map);
            }
            ExprKind::Member { operand, .. } => self.substitute_types_in_expr(operand, map),
            ExprKind::Call {
                callee,
                receivers,
                args,
            } => {
                self.substitute_types_in_expr(callee, map);
                for receiver in receivers {
                    self.substitute_types_in_expr(receiver, map);
                }
                for arg in args {
                    self.substitute_types_in_expr(arg, map);
                }
            }
            ExprKind::Index { operand, index } => {
                self.substitute_types_in_expr(operand, map);
                self.substitute_types_in_expr(index, map);
            }
            ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
                for element in elements {
                    self.substitute_types_in_expr(element, map);
                }
            }
            ExprKind::Block { statements, result } => {
                for stmt in statements {
                    self.substitute_types_in_stmt(stmt, map);
                }
                if let Some(result) = result {
                    self.substitute_types_in_expr(result, map);
                }
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => {
                self.substitute_types_in_expr(condition, map);
                self.substitute_types_in_expr(true_expr, map);
                self.substitute_types_in_expr(false_expr, map);
            }
            ExprKind::Iteration { subject, body, .. } => {
                self.substitute_types_in_expr(subject, map);
                self.substitute_types_in_expr(body, map);
            }
            ExprKind::Repeat { condition, body } => {
                self.substitute_types_in_expr(condition, map);
                self.substitute_types_in_expr(body, map);
            }
            _ => {}
        }
    }
}

fn collect_typevar_bindings(pattern: &Type, concrete: &Type, map: &mut HashMap<String, Type>) {
    match (pattern, concrete) {
        (Type::Var(name), concrete) => {
            map.entry(name.clone()).or_insert_with(|| concrete.clone());
        }
        (
            Type::Array {
                element: pattern_element,
                ..
            },
            Type::Array {
                element: concrete_element,
                ..
            },
        ) => {
            collect_typevar_bindings(pattern_element, concrete_element, map);
        }
        _ => {}
    }
}
