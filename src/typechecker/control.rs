//! Blocks, conditionals, assignments, ranges, loops, and the in-place
//! lowerings: custom iteration into method calls, resources into literals,
//! process expressions into their captured output.

use std::fs;
use std::path::Path;
use std::process::Command;

use log::debug;

use crate::{
    ast::{
        AstArena, Expr, ExprId, ExprKind, Primitive, StmtId, StmtKind, Type,
    },
    error::{CompileResult, SourceLocation},
    evaluator::CtValue,
    loader::{resolve_resource_path, InstanceId},
    resolver::{BindKey, Bindings, SymbolKind, LOOP_VAR},
};

use super::TypeChecker;

impl<'a> TypeChecker<'a> {
    pub(crate) fn check_block(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let ExprKind::Block { statements, result } = self.program.arena.expr(expr).kind.clone()
        else {
            return Err(self.err(
                "Internal error: expected block expression",
                &self.expr_location(expr),
            ));
        };

        for stmt in statements {
            self.check_stmt(stmt)?;
        }
        let result_type = match result {
            Some(result) => self.check_expr(result)?,
            None => None,
        };
        self.set_expr_type(expr, result_type.clone());
        Ok(result_type)
    }

    pub(crate) fn constexpr_condition(&mut self, expr: ExprId) -> Option<bool> {
        let value = self.try_evaluate(expr)?;
        value.truthiness()
    }

    pub(crate) fn check_conditional(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Conditional {
            condition,
            true_expr,
            false_expr,
            ..
        } = self.program.arena.expr(expr).kind.clone()
        else {
            return Err(self.err("Internal error: expected conditional", &location));
        };

        let cond_type = self.check_expr(condition)?;
        self.require_boolean_expr(
            condition,
            cond_type.as_ref(),
            &self.expr_location(condition),
            "Conditional expression",
        )?;

        // A compile-time known condition short-circuits type requirements
        // for the dead branch; the type-use validator mirrors this.
        let static_value = self.constexpr_condition(condition);
        match static_value {
            Some(value) => {
                self.constexpr_conditions
                    .insert((self.current_instance, condition), value);
            }
            None => {
                self.constexpr_conditions
                    .remove(&(self.current_instance, condition));
            }
        }
        if let Some(value) = static_value {
            let ty = if value {
                self.check_expr(true_expr)?
            } else {
                self.check_expr(false_expr)?
            };
            self.set_expr_type(expr, ty.clone());
            return Ok(ty);
        }

        let true_type = self.check_expr(true_expr)?;
        let false_type = self.check_expr(false_expr)?;

        if let (Some(t), Some(f)) = (&true_type, &false_type) {
            let t = self.resolve_type(t);
            let f = self.resolve_type(f);
            if self.types_equal(&t, &f) {
                self.set_expr_type(expr, Some(t.clone()));
                return Ok(Some(t));
            }
            if matches!((&t, &f), (Type::Primitive(_), Type::Primitive(_)))
                && self.types_in_same_family(&t, &f)
            {
                let ty = self.unify_types(Some(t), Some(f));
                self.set_expr_type(expr, ty.clone());
                return Ok(ty);
            }
        }

        let lhs = true_type
            .map(|t| t.render(&self.program.arena))
            .unwrap_or_else(|| "<unknown>".to_owned());
        let rhs = false_type
            .map(|t| t.render(&self.program.arena))
            .unwrap_or_else(|| "<unknown>".to_owned());
        Err(self.err(
            format!(
                "Conditional branches must have matching types at runtime (type mismatch: {lhs} vs {rhs})"
            ),
            &location,
        ))
    }

    pub(crate) fn check_cast(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Cast { target, operand } = self.program.arena.expr(expr).kind.clone() else {
            return Err(self.err("Internal error: expected cast", &location));
        };

        let operand_type = self.check_expr(operand)?;
        let target = self.validate_type(&target, &location)?;

        // Packed boolean arrays cast to unsigned integers of matching bit
        // width.
        if let Type::Primitive(prim) = &target {
            if prim.is_unsigned_int() {
                if let Some(Type::Array { element, size }) =
                    operand_type.as_ref().map(|t| self.resolve_type(t))
                {
                    if matches!(*element, Type::Primitive(Primitive::Bool)) {
                        let count = size
                            .and_then(|s| self.program.arena.int_literal_value(s))
                            .map(|(v, _)| v as u32)
                            .unwrap_or(0);
                        if Some(count) != prim.bits() {
                            return Err(self.err(
                                format!("Boolean array size mismatch for cast to #{}", prim.name()),
                                &location,
                            ));
                        }
                    }
                }
            }
        }

        if let ExprKind::Cast { target: stored, .. } = &mut self.program.arena.expr_mut(expr).kind {
            *stored = target.clone();
        }
        let ty = Some(target);
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    pub(crate) fn check_assignment(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Assignment { target, value, .. } = self.program.arena.expr(expr).kind.clone()
        else {
            return Err(self.err("Internal error: expected assignment", &location));
        };

        let creates_new_variable = self.bindings.is_new_variable(self.current_instance, expr);
        if creates_new_variable {
            return self.check_declaration_assignment(expr, target, value);
        }

        // Mutation assignment: the target must be bound and mutable.
        if let ExprKind::Identifier { name, .. } = self.program.arena.expr(target).kind.clone() {
            let symbol = match self.lookup_binding_expr(target) {
                Some(symbol) => symbol,
                None => {
                    let Some(symbol) = self.lookup_global(&name) else {
                        return Err(
                            self.err("Internal error: unresolved assignment target", &location)
                        );
                    };
                    self.bind_expr(target, symbol);
                    symbol
                }
            };
            if name == LOOP_VAR {
                return Err(self.err("Cannot assign to read-only loop variable '_'", &location));
            }
            let info = self.bindings.symbol(symbol);
            if !info.is_mutable {
                // First assignment after declaration promotes a binding to
                // a mutable variable; parameters and functions stay fixed.
                if matches!(info.kind, SymbolKind::Variable | SymbolKind::Constant) {
                    let declaration = info.declaration;
                    let promoted = self.bindings.symbol_mut(symbol);
                    promoted.kind = SymbolKind::Variable;
                    promoted.is_mutable = true;
                    if let Some(declaration) = declaration {
                        if let StmtKind::VarDecl(decl) =
                            &mut self.program.arena.stmt_mut(declaration).kind
                        {
                            decl.is_mutable = true;
                        }
                    }
                }
            }
            if !self.bindings.symbol(symbol).is_mutable {
                return Err(self.err(
                    format!("Cannot assign to immutable constant: {name}"),
                    &location,
                ));
            }
        }

        self.reject_function_value(value, &location)?;

        let target_type = self.check_expr(target)?;
        let value_type = self.check_expr(value)?;

        if matches!(
            self.program.arena.expr(target).kind,
            ExprKind::TupleLiteral { .. }
        ) && !matches!(
            self.program.arena.expr(value).kind,
            ExprKind::TupleLiteral { .. }
        ) {
            return Err(self.err("Arity mismatch in multi-assignment", &location));
        }

        if !self.types_compatible(value_type.as_ref(), target_type.as_ref()) {
            let fits = match &target_type {
                Some(target_type) => {
                    let target_type = target_type.clone();
                    self.literal_assignable_to(&target_type, value)
                }
                None => false,
            };
            if !fits {
                return Err(self.err("Type mismatch in assignment", &location));
            }
        }

        self.set_expr_type(expr, target_type.clone());
        self.record_assignment_constexpr(target, value);
        Ok(target_type)
    }

    /// `name = expr` with an unbound name: introduces a new mutable local.
    fn check_declaration_assignment(
        &mut self,
        expr: ExprId,
        target: ExprId,
        value: ExprId,
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Identifier {
            declared_type: annotation,
            ..
        } = self.program.arena.expr(target).kind.clone()
        else {
            return Err(self.err("Internal error: invalid declaration assignment", &location));
        };

        let annotation = match annotation {
            Some(annotation) => Some(self.validate_type(&annotation, &location)?),
            None => None,
        };

        self.reject_function_value(value, &location)?;

        let value_type = self.check_expr(value)?;
        let var_type = annotation.clone().or_else(|| value_type.clone());
        if let Some(annotation) = &annotation {
            self.enforce_declared_initializer_type(annotation, value, value_type.as_ref())?;
        }

        let Some(symbol) = self.lookup_binding_expr(target) else {
            return Err(self.err("Internal error: unresolved declaration target", &location));
        };
        let info = self.bindings.symbol_mut(symbol);
        info.kind = SymbolKind::Variable;
        info.ty = var_type.clone();
        info.is_mutable = true;

        // The declaration-site target is not a typed value expression; the
        // recorded annotation survives for the evaluator's coercions.
        let declared = match (&annotation, &value_type) {
            (Some(annotation), Some(value_type)) if !self.types_equal(annotation, value_type) => {
                Some(annotation.clone())
            }
            _ => None,
        };
        if let ExprKind::Assignment {
            declared_type,
            creates_new_variable,
            ..
        } = &mut self.program.arena.expr_mut(expr).kind
        {
            *declared_type = declared;
            *creates_new_variable = true;
        }
        self.set_expr_type(target, None);

        match self.try_evaluate(value) {
            Some(ct_value) => self.remember_symbol_value(symbol, ct_value),
            None => self.forget_symbol_value(symbol),
        }

        self.set_expr_type(expr, var_type.clone());
        Ok(var_type)
    }

    fn enforce_declared_initializer_type(
        &mut self,
        declared: &Type,
        value: ExprId,
        value_type: Option<&Type>,
    ) -> CompileResult<()> {
        if matches!(self.program.arena.expr(value).kind, ExprKind::Cast { .. }) {
            self.set_expr_type(value, Some(declared.clone()));
            return Ok(());
        }
        if self.types_compatible(value_type, Some(declared)) {
            return Ok(());
        }
        if self.literal_assignable_to(declared, value) {
            self.set_expr_type(value, Some(declared.clone()));
            return Ok(());
        }
        if self.apply_type_constraint(value, declared) {
            return Ok(());
        }
        Err(self.err(
            "Type mismatch in variable initialization",
            &self.expr_location(value),
        ))
    }

    fn reject_function_value(&self, value: ExprId, location: &SourceLocation) -> CompileResult<()> {
        if let ExprKind::Identifier { name, .. } = &self.program.arena.expr(value).kind {
            if let Some(symbol) = self.lookup_binding_expr(value) {
                if self.bindings.symbol(symbol).kind == SymbolKind::Function {
                    return Err(self.err(
                        format!("Cannot assign function to variable (no function types): {name}"),
                        location,
                    ));
                }
            }
        }
        Ok(())
    }

    /// After a successful assignment, remember (or forget) the target
    /// symbol's constexpr value.
    fn record_assignment_constexpr(&mut self, target: ExprId, value: ExprId) {
        let mut cursor = target;
        let base = loop {
            match &self.program.arena.expr(cursor).kind {
                ExprKind::Identifier { .. } => break Some(cursor),
                ExprKind::Member { operand, .. } | ExprKind::Index { operand, .. } => {
                    cursor = *operand;
                }
                _ => break None,
            }
        };
        let Some(base) = base else {
            return;
        };
        let Some(symbol) = self.lookup_binding_expr(base) else {
            return;
        };

        if base == target {
            match self.try_evaluate(value) {
                Some(ct_value) => self.remember_symbol_value(symbol, ct_value),
                None => self.forget_symbol_value(symbol),
            }
        } else {
            // Partial writes through members or indices drop the whole
            // cached value.
            self.forget_symbol_value(symbol);
        }
    }

    pub(crate) fn check_range(
        &mut self,
        expr: ExprId,
        start: ExprId,
        end: ExprId,
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let start_type = self.check_expr(start)?;
        let end_type = self.check_expr(end)?;

        let is_integer = |checker: &Self, t: &Option<Type>| {
            matches!(
                t.as_ref().map(|t| checker.resolve_type(t)),
                Some(Type::Primitive(p)) if p.is_signed_int() || p.is_unsigned_int()
            )
        };
        if !is_integer(self, &start_type) || !is_integer(self, &end_type) {
            return Err(self.err("Range bounds must be integer expressions", &location));
        }
        if !self.types_in_same_family(
            &self.resolve_type(start_type.as_ref().expect("checked above")),
            &self.resolve_type(end_type.as_ref().expect("checked above")),
        ) {
            return Err(self.err("Range bounds must have compatible numeric types", &location));
        }

        let fold = |checker: &mut Self, bound: ExprId| -> Option<i64> {
            if let Some((value, unsigned)) = checker.program.arena.int_literal_value(bound) {
                if unsigned && value > i64::MAX as u64 {
                    return None;
                }
                return Some(value as i64);
            }
            match checker.try_evaluate(bound)? {
                CtValue::Int(v) => Some(v),
                CtValue::Uint(v) if v <= i64::MAX as u64 => Some(v as i64),
                _ => None,
            }
        };
        let (Some(start_val), Some(end_val)) = (fold(self, start), fold(self, end)) else {
            return Err(self.err("Range bounds must be compile-time constants", &location));
        };
        if start_val == end_val {
            return Err(self.err("Range cannot produce an empty array", &location));
        }

        let element = self
            .unify_types(start_type, end_type)
            .expect("both bounds are typed");
        let count = start_val.abs_diff(end_val);
        let size = self.program.arena.make_int(count, location);
        let ty = Some(Type::Array {
            element: Box::new(element),
            size: Some(size),
        });
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    pub(crate) fn check_length(
        &mut self,
        expr: ExprId,
        operand: ExprId,
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let operand_type = self.check_expr(operand)?;
        match operand_type.map(|t| self.resolve_type(&t)) {
            Some(Type::Array { .. }) | Some(Type::Primitive(Primitive::Str)) | Some(Type::Var(_))
            | None => {}
            Some(other) => {
                return Err(self.err(
                    format!(
                        "Length requires an array or string operand (found {})",
                        other.render(&self.program.arena)
                    ),
                    &location,
                ));
            }
        }
        let ty = Some(Type::Primitive(Primitive::I32));
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    pub(crate) fn check_iteration(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Iteration {
            subject,
            body,
            sorted,
        } = self.program.arena.expr(expr).kind.clone()
        else {
            return Err(self.err("Internal error: expected iteration", &location));
        };

        if matches!(
            self.program.arena.expr(subject).kind,
            ExprKind::Assignment { .. }
        ) {
            return Err(self.err(
                "Iteration expressions cannot be used inside larger expressions without parentheses",
                &self.expr_location(subject),
            ));
        }

        let subject_type = self.check_expr(subject)?;

        if let Some(ty) = self.try_custom_iteration(expr, subject_type.as_ref())? {
            return Ok(ty);
        }

        let resolved = subject_type.as_ref().map(|t| self.resolve_type(t));
        let Some(Type::Array { element, .. }) = resolved else {
            if let Some(Type::Named(type_name)) = &resolved {
                let method = if sorted { "@@" } else { "@" };
                return Err(self.err(
                    format!(
                        "Type {type_name} is not iterable (missing &(self)#{type_name}::{method}($loop))"
                    ),
                    &self.expr_location(subject),
                ));
            }
            return Err(self.err(
                "Expression is not iterable (expected array, range, or custom @/@@ iterator)",
                &self.expr_location(subject),
            ));
        };

        let loop_type = (*element).clone();
        assign_loop_symbol_expr(
            &self.program.arena,
            self.bindings,
            self.current_instance,
            body,
            &loop_type,
        );

        // Loop bodies re-run; constexpr knowledge gathered inside them does
        // not survive the loop.
        let saved_values = self.known_symbol_values.clone();
        self.loop_depth += 1;
        let result = self.check_expr(body);
        self.loop_depth -= 1;
        self.known_symbol_values = saved_values;
        result?;

        self.set_expr_type(expr, None);
        Ok(None)
    }

    /// `x @ body` over a named type looks up a user-defined `T::@` (or
    /// `T::@@`) iterator: one receiver, exactly one expression parameter.
    /// The node is rewritten into a method call passing the body
    /// syntactically.
    fn try_custom_iteration(
        &mut self,
        expr: ExprId,
        subject_type: Option<&Type>,
    ) -> CompileResult<Option<Option<Type>>> {
        let Some(Type::Named(type_name)) = subject_type.map(|t| self.resolve_type(t)) else {
            return Ok(None);
        };
        let ExprKind::Iteration {
            subject,
            body,
            sorted,
        } = self.program.arena.expr(expr).kind.clone()
        else {
            return Ok(None);
        };

        let method_token = if sorted { "@@" } else { "@" };
        let method_name = format!("{type_name}::{method_token}");
        let Some(symbol) = self.lookup_global(&method_name) else {
            return Ok(None);
        };
        let info = self.bindings.symbol(symbol);
        if info.kind != SymbolKind::Function {
            return Ok(None);
        }
        let Some(declaration) = info.declaration else {
            return Ok(None);
        };
        let Some(func) = self.func_decl(declaration) else {
            return Ok(None);
        };

        if func.ref_params.len() != 1 {
            return Err(self.err(
                format!("Iterator method {method_name} must declare exactly one receiver parameter"),
                &self.stmt_location(declaration),
            ));
        }
        let expr_params = func.params.iter().filter(|p| p.is_expression_param).count();
        let value_params = func.params.len() - expr_params;
        if expr_params != 1 || value_params != 0 {
            return Err(self.err(
                format!(
                    "Iterator method {method_name} must take exactly one expression parameter and no value parameters"
                ),
                &self.stmt_location(declaration),
            ));
        }

        debug!("lowering {method_token} iteration over {type_name} to {method_name}");

        let loop_type = self.make_fresh_typevar();
        assign_loop_symbol_expr(
            &self.program.arena,
            self.bindings,
            self.current_instance,
            body,
            &loop_type,
        );
        self.loop_depth += 1;
        let body_result = self.check_expr(body);
        self.loop_depth -= 1;
        body_result?;

        let location = self.expr_location(expr);
        let callee = self
            .program
            .arena
            .alloc_expr(Expr::new(ExprKind::identifier(method_token), location));
        self.bind_expr(callee, symbol);
        self.program.arena.expr_mut(expr).kind = ExprKind::Call {
            callee,
            receivers: vec![subject],
            args: vec![body],
        };

        let ty = self.check_call(expr)?;
        Ok(Some(ty))
    }

    pub(crate) fn check_repeat(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Repeat { condition, body } = self.program.arena.expr(expr).kind.clone()
        else {
            return Err(self.err("Internal error: expected repeat loop", &location));
        };

        let cond_type = self.check_expr(condition)?;
        self.require_boolean_expr(
            condition,
            cond_type.as_ref(),
            &self.expr_location(condition),
            "Repeat loop",
        )?;

        let saved_values = self.known_symbol_values.clone();
        self.loop_depth += 1;
        let result = self.check_expr(body);
        self.loop_depth -= 1;
        self.known_symbol_values = saved_values;
        result?;

        self.set_expr_type(expr, None);
        Ok(None)
    }

    /// Resources splice file contents into the AST: files as string
    /// literals, directories as sorted `(filename, contents)` tuple arrays.
    pub(crate) fn check_resource_expr(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Resource { path } = self.program.arena.expr(expr).kind.clone() else {
            return Err(self.err("Internal error: expected resource expression", &location));
        };

        let current_file = location.file.clone();
        let resolved = resolve_resource_path(&path, &current_file, &self.project_root);
        let resolved_path = match resolved {
            Some(found) => found,
            None => {
                let logical = crate::loader::join_import_path(&path);
                if self.project_root.is_empty() {
                    logical
                } else {
                    Path::new(&self.project_root)
                        .join(logical)
                        .to_string_lossy()
                        .into_owned()
                }
            }
        };
        let fs_path = Path::new(&resolved_path);

        if fs_path.is_dir() {
            let mut entries = vec![];
            if let Ok(dir) = fs::read_dir(fs_path) {
                for entry in dir.flatten() {
                    if entry.path().is_file() {
                        entries.push(entry.path());
                    }
                }
            }
            entries.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

            let mut elements = vec![];
            for entry in entries {
                let contents = fs::read(&entry).map_err(|_| {
                    self.err(
                        format!("Cannot open resource file: {}", entry.display()),
                        &location,
                    )
                })?;
                let contents = String::from_utf8_lossy(&contents).into_owned();
                let file_name = entry
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();

                let name_literal = self.program.arena.alloc_expr(Expr::new(
                    ExprKind::Str { value: file_name },
                    location.clone(),
                ));
                let contents_literal = self.program.arena.alloc_expr(Expr::new(
                    ExprKind::Str { value: contents },
                    location.clone(),
                ));
                let record = self.program.arena.alloc_expr(Expr::new(
                    ExprKind::TupleLiteral {
                        elements: vec![name_literal, contents_literal],
                    },
                    location.clone(),
                ));
                elements.push(record);
            }

            if elements.is_empty() {
                return self.empty_directory_resource(expr, &location);
            }
            self.program.arena.expr_mut(expr).kind = ExprKind::ArrayLiteral { elements };
            return self.check_expr(expr);
        }

        if fs_path.is_file() {
            let contents = fs::read(fs_path).map_err(|_| {
                self.err(format!("Cannot open resource: {resolved_path}"), &location)
            })?;
            let contents = String::from_utf8_lossy(&contents).into_owned();
            self.program.arena.expr_mut(expr).kind = ExprKind::Str { value: contents };
            return self.check_expr(expr);
        }

        self.empty_directory_resource(expr, &location)
    }

    fn empty_directory_resource(
        &mut self,
        expr: ExprId,
        location: &SourceLocation,
    ) -> CompileResult<Option<Type>> {
        let string_type = Type::Primitive(Primitive::Str);
        let tuple_name =
            self.tuple_type_name(&[Some(string_type.clone()), Some(string_type.clone())]);
        self.register_tuple_type(&tuple_name, vec![string_type.clone(), string_type]);

        self.program.arena.expr_mut(expr).kind = ExprKind::ArrayLiteral { elements: vec![] };
        let size = self.program.arena.make_int(0, location.clone());
        let ty = Some(Type::Array {
            element: Box::new(Type::Named(tuple_name)),
            size: Some(size),
        });
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    /// Process expressions run a host shell command and splice its stdout
    /// into the AST as a string literal. Gated behind an explicit opt-in.
    pub(crate) fn check_process_expr(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Process { command } = self.program.arena.expr(expr).kind.clone() else {
            return Err(self.err("Internal error: expected process expression", &location));
        };

        if !self.allow_process {
            return Err(self.err(
                "Process expressions are disabled (enable with --allow-process)",
                &location,
            ));
        }

        debug!("running process expression: {command}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|_| self.err(format!("Failed to execute command: {command}"), &location))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        self.program.arena.expr_mut(expr).kind = ExprKind::Str { value: stdout };
        let ty = Some(Type::Primitive(Primitive::Str));
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }
}

/// Give every `_` loop-variable binding in a loop body the element type.
/// Nested iterations own their `_`, so the walk stops at them.
fn assign_loop_symbol_expr(
    arena: &AstArena,
    bindings: &mut Bindings,
    instance: InstanceId,
    expr: ExprId,
    loop_type: &Type,
) {
    match &arena.expr(expr).kind {
        ExprKind::Identifier { name, .. } => {
            if name == LOOP_VAR {
                if let Some(symbol) = bindings.lookup(instance, BindKey::Expr(expr)) {
                    bindings.symbol_mut(symbol).ty = Some(loop_type.clone());
                }
            }
        }
        ExprKind::Iteration { .. } => {
            // Inner loop rebinds `_`.
        }
        ExprKind::Binary { left, right, .. } => {
            assign_loop_symbol_expr(arena, bindings, instance, *left, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *right, loop_type);
        }
        ExprKind::Assignment { target, value, .. } => {
            assign_loop_symbol_expr(arena, bindings, instance, *target, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *value, loop_type);
        }
        ExprKind::Range { start, end } => {
            assign_loop_symbol_expr(arena, bindings, instance, *start, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *end, loop_type);
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Cast { operand, .. }
        | ExprKind::Length { operand }
        | ExprKind::Member { operand, .. } => {
            assign_loop_symbol_expr(arena, bindings, instance, *operand, loop_type);
        }
        ExprKind::Call {
            callee,
            receivers,
            args,
        } => {
            assign_loop_symbol_expr(arena, bindings, instance, *callee, loop_type);
            for receiver in receivers {
                assign_loop_symbol_expr(arena, bindings, instance, *receiver, loop_type);
            }
            for arg in args {
                assign_loop_symbol_expr(arena, bindings, instance, *arg, loop_type);
            }
        }
        ExprKind::Index { operand, index } => {
            assign_loop_symbol_expr(arena, bindings, instance, *operand, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *index, loop_type);
        }
        ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
            for element in elements {
                assign_loop_symbol_expr(arena, bindings, instance, *element, loop_type);
            }
        }
        ExprKind::Block { statements, result } => {
            for stmt in statements {
                assign_loop_symbol_stmt(arena, bindings, instance, *stmt, loop_type);
            }
            if let Some(result) = result {
                assign_loop_symbol_expr(arena, bindings, instance, *result, loop_type);
            }
        }
        ExprKind::Conditional {
            condition,
            true_expr,
            false_expr,
            ..
        } => {
            assign_loop_symbol_expr(arena, bindings, instance, *condition, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *true_expr, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *false_expr, loop_type);
        }
        ExprKind::Repeat { condition, body } => {
            assign_loop_symbol_expr(arena, bindings, instance, *condition, loop_type);
            assign_loop_symbol_expr(arena, bindings, instance, *body, loop_type);
        }
        ExprKind::Int { .. }
        | ExprKind::Float { .. }
        | ExprKind::Str { .. }
        | ExprKind::Char { .. }
        | ExprKind::Resource { .. }
        | ExprKind::Process { .. } => {}
    }
}

fn assign_loop_symbol_stmt(
    arena: &AstArena,
    bindings: &mut Bindings,
    instance: InstanceId,
    stmt: StmtId,
    loop_type: &Type,
) {
    match &arena.stmt(stmt).kind {
        StmtKind::Expr(expr) => {
            assign_loop_symbol_expr(arena, bindings, instance, *expr, loop_type)
        }
        StmtKind::Return(Some(expr)) => {
            assign_loop_symbol_expr(arena, bindings, instance, *expr, loop_type)
        }
        StmtKind::VarDecl(decl) => {
            if let Some(init) = decl.init {
                assign_loop_symbol_expr(arena, bindings, instance, init, loop_type);
            }
        }
        StmtKind::CondStmt { condition, body } => {
            assign_loop_symbol_expr(arena, bindings, instance, *condition, loop_type);
            assign_loop_symbol_stmt(arena, bindings, instance, *body, loop_type);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::{loader::load_source, resolver::Bindings, typechecker::TypeChecker};

    fn check(source: &str) -> crate::error::CompileResult<()> {
        let mut program = load_source(source, "test.sbl")?;
        let mut bindings = Bindings::new();
        crate::resolver::resolve_program(&mut program, &mut bindings, "")?;
        let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
        checker.check_program()
    }

    #[test]
    fn rejects_empty_range() {
        let err = check("&f() { xs = 0..0; }").unwrap_err();
        assert!(
            err.message.contains("Range cannot produce an empty array"),
            "{err}"
        );
    }

    #[test]
    fn accepts_forward_and_backward_ranges() {
        check("&f() { up = 0..3; down = 3..0; }").unwrap();
    }

    #[test]
    fn process_expressions_require_opt_in() {
        let err = check(":: \"echo hi\" -> out;").unwrap_err();
        assert!(err.message.contains("Process expressions are disabled"), "{err}");
    }

    #[test]
    fn dead_conditional_branch_is_not_checked() {
        // The false branch calls an undefined function, but the condition
        // is constexpr-true.
        check("&f() -> #i8 { -> true ? 1 : missing(); }").unwrap();
    }

    #[test]
    fn live_conditional_branches_must_agree() {
        let err = check("&g() -> #b { -> false; } &f(c: #b) { x = c ? 1 : \"s\"; }").unwrap_err();
        assert!(err.message.contains("Conditional branches"), "{err}");
    }
}
