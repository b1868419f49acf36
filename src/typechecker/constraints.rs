//! Contextual type-constraint propagation.
//!
//! `apply_type_constraint` pushes an expected type down into an expression
//! that checked to an unresolved or narrower shape: through blocks and
//! their returns, literals, identifiers (refining their symbols), value
//! operators, conditionals, members, indices, tuple and array literals,
//! casts, and call return types. The rule is monotonic: an unresolved
//! target never weakens a known type, and refinement failure reports back
//! as a plain `false` so callers fall through to their normal error.

use std::collections::HashSet;

use crate::{
    ast::{ExprId, ExprKind, StmtId, StmtKind, Type, TUPLE_TYPE_PREFIX},
    resolver::SymbolKind,
};

use super::TypeChecker;

impl<'a> TypeChecker<'a> {
    fn type_is_unresolved(&self, ty: Option<&Type>) -> bool {
        match ty.map(|t| self.resolve_type(t)) {
            None => true,
            Some(Type::Var(_)) => true,
            Some(Type::Array { element, .. }) => self.type_is_unresolved(Some(&element)),
            Some(_) => false,
        }
    }

    /// Refine a type slot towards `desired`. Returns the new slot value, or
    /// `None` when the constraint is unsatisfiable.
    fn refine_slot(&self, current: Option<&Type>, desired: &Type) -> Option<Option<Type>> {
        let desired = self.resolve_type(desired);
        let current_resolved = current.map(|t| self.resolve_type(t));

        match current_resolved {
            None => Some(Some(desired)),
            Some(current_resolved) => {
                if self.type_is_unresolved(Some(&desired)) {
                    // Unresolved targets cannot weaken a known type.
                    return Some(Some(current_resolved));
                }
                if self.type_is_unresolved(Some(&current_resolved)) {
                    return Some(Some(desired));
                }
                if self.types_equal(&current_resolved, &desired)
                    || self.types_compatible(Some(&current_resolved), Some(&desired))
                {
                    return Some(Some(current_resolved));
                }
                None
            }
        }
    }

    fn refine_expr_type(&mut self, expr: ExprId, desired: &Type) -> bool {
        let current = self.expr_type(expr);
        match self.refine_slot(current.as_ref(), desired) {
            Some(new) => {
                self.set_expr_type(expr, new);
                true
            }
            None => false,
        }
    }

    fn constrain_identifier_symbol(&mut self, expr: ExprId, desired: &Type) -> bool {
        if !matches!(
            self.program.arena.expr(expr).kind,
            ExprKind::Identifier { .. }
        ) {
            return true;
        }
        let Some(symbol) = self.lookup_binding_expr(expr) else {
            return true;
        };

        let current = self.bindings.symbol(symbol).ty.clone();
        let Some(new) = self.refine_slot(current.as_ref(), desired) else {
            return false;
        };
        self.bindings.symbol_mut(symbol).ty = new.clone();

        // Keep the declaration's annotation in step with the symbol.
        if let Some(declaration) = self.bindings.symbol(symbol).declaration {
            if let StmtKind::VarDecl(decl) = self.program.arena.stmt(declaration).kind.clone() {
                if let Some(new) = &new {
                    match self.refine_slot(decl.ty.as_ref(), new) {
                        Some(refined) => {
                            if let StmtKind::VarDecl(d) =
                                &mut self.program.arena.stmt_mut(declaration).kind
                            {
                                d.ty = refined;
                            }
                        }
                        None => return false,
                    }
                }
            }
        }
        true
    }

    fn constrain_stmt_returns(
        &mut self,
        stmt: StmtId,
        return_target: &Type,
        saw_return: &mut bool,
    ) -> bool {
        match self.program.arena.stmt(stmt).kind.clone() {
            StmtKind::Return(Some(value)) => {
                *saw_return = true;
                self.apply_type_constraint(value, return_target)
            }
            StmtKind::Return(None) => {
                *saw_return = true;
                false
            }
            StmtKind::CondStmt { body, .. } => {
                self.constrain_stmt_returns(body, return_target, saw_return)
            }
            _ => true,
        }
    }

    /// Push `target` into `expr`, refining every slot it can reach.
    /// Returns false when the constraint is definitely unsatisfiable.
    pub(crate) fn apply_type_constraint(&mut self, expr: ExprId, target: &Type) -> bool {
        let target = self.resolve_type(target);
        let kind = self.program.arena.expr(expr).kind.clone();

        match kind {
            ExprKind::Block { statements, result } => {
                if let Some(result) = result {
                    if !self.apply_type_constraint(result, &target) {
                        return false;
                    }
                    if self.expr_type(result).is_some() {
                        return self.refine_expr_type(expr, &target);
                    }
                    self.set_expr_type(expr, None);
                    return true;
                }

                let mut saw_return = false;
                for stmt in statements {
                    if !self.constrain_stmt_returns(stmt, &target, &mut saw_return) {
                        return false;
                    }
                }
                // Statement-only blocks never become typed value
                // expressions.
                if !saw_return && !self.type_is_unresolved(Some(&target)) {
                    return false;
                }
                self.set_expr_type(expr, None);
                true
            }

            ExprKind::Int { .. } | ExprKind::Char { .. } => {
                if matches!(target, Type::Primitive(p) if p.is_numeric() || p == crate::ast::Primitive::Bool)
                    && !self.literal_assignable_to(&target, expr)
                {
                    return false;
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Float { .. } => {
                if matches!(&target, Type::Primitive(p) if p.is_float()) {
                    self.set_expr_type(expr, Some(target));
                    true
                } else {
                    false
                }
            }

            ExprKind::Identifier { .. } => {
                if !self.constrain_identifier_symbol(expr, &target) {
                    return false;
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Binary { op, left, right } => {
                if op.is_value_op() {
                    if !self.apply_type_constraint(left, &target) {
                        return false;
                    }
                    if !self.apply_type_constraint(right, &target) {
                        return false;
                    }
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Unary { operand, .. } => {
                if !self.apply_type_constraint(operand, &target) {
                    return false;
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Conditional {
                true_expr,
                false_expr,
                ..
            } => {
                if !self.apply_type_constraint(true_expr, &target) {
                    return false;
                }
                if !self.apply_type_constraint(false_expr, &target) {
                    return false;
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Assignment { value, .. } => {
                if !self.apply_type_constraint(value, &target) {
                    return false;
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Member { operand, field } => {
                let operand_type = self.expr_type(operand).map(|t| self.resolve_type(&t));
                if let Some(Type::Named(type_name)) = operand_type {
                    if type_name.starts_with(TUPLE_TYPE_PREFIX) {
                        if let Some(index) = crate::ast::tuple_field_index(&field) {
                            let slot = self
                                .tuple_types
                                .get(&type_name)
                                .and_then(|elements| elements.get(index).cloned());
                            if let Some(slot) = slot {
                                let Some(refined) = self.refine_slot(Some(&slot), &target) else {
                                    return false;
                                };
                                if let (Some(elements), Some(refined)) =
                                    (self.tuple_types.get_mut(&type_name), refined.clone())
                                {
                                    if let Some(stored) = elements.get_mut(index) {
                                        *stored = refined;
                                    }
                                }
                                if let Some(refined) = refined {
                                    return self.refine_expr_type(expr, &refined);
                                }
                            }
                        }
                    }

                    if let Some(symbol) = self.lookup_global(&type_name) {
                        let info = self.bindings.symbol(symbol);
                        if info.kind == SymbolKind::Type {
                            if let Some(declaration) = info.declaration {
                                let field_ty = match &self.program.arena.stmt(declaration).kind {
                                    StmtKind::TypeDecl(decl) => decl
                                        .fields
                                        .iter()
                                        .find(|f| f.name == field)
                                        .map(|f| f.ty.clone()),
                                    _ => None,
                                };
                                if let Some(field_ty) = field_ty {
                                    let Some(refined) =
                                        self.refine_slot(field_ty.as_ref(), &target)
                                    else {
                                        return false;
                                    };
                                    if let StmtKind::TypeDecl(decl) =
                                        &mut self.program.arena.stmt_mut(declaration).kind
                                    {
                                        if let Some(f) =
                                            decl.fields.iter_mut().find(|f| f.name == field)
                                        {
                                            f.ty = refined.clone();
                                        }
                                    }
                                    if let Some(refined) = refined {
                                        return self.refine_expr_type(expr, &refined);
                                    }
                                }
                            }
                        }
                    }
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Index { operand, .. } => {
                let operand_type = self.expr_type(operand).map(|t| self.resolve_type(&t));
                if let Some(Type::Array { element, size }) = operand_type {
                    let Some(refined) = self.refine_slot(Some(&element), &target) else {
                        return false;
                    };
                    if let Some(refined) = refined {
                        let array = Type::Array {
                            element: Box::new(refined.clone()),
                            size,
                        };
                        if !self.apply_type_constraint(operand, &array) {
                            return false;
                        }
                        return self.refine_expr_type(expr, &refined);
                    }
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::TupleLiteral { elements } => {
                if let Type::Named(name) = &target {
                    if name.starts_with(TUPLE_TYPE_PREFIX) {
                        let expected = self.tuple_types.get(name).cloned();
                        if let Some(expected) = expected {
                            if expected.len() == elements.len() {
                                for (element, ty) in elements.iter().zip(expected.iter()) {
                                    if !self.apply_type_constraint(*element, ty) {
                                        return false;
                                    }
                                }
                            }
                        }
                    }
                }
                self.refine_expr_type(expr, &target)
            }

            ExprKind::Cast { target: cast_target, operand } => {
                let cast_target = self.resolve_type(&cast_target);
                let operand_type = self.expr_type(operand);
                if self.type_is_unresolved(operand_type.as_ref()) {
                    if !self.apply_type_constraint(operand, &cast_target) {
                        return false;
                    }
                }
                if !self.refine_expr_type(expr, &cast_target) {
                    return false;
                }
                self.types_equal(&cast_target, &target)
                    || self.types_compatible(Some(&cast_target), Some(&target))
                    || self.types_compatible(Some(&target), Some(&cast_target))
            }

            ExprKind::ArrayLiteral { elements } => {
                let Type::Array { element, size } = &target else {
                    return self.refine_expr_type(expr, &target);
                };
                if let Some((expected, _)) = size
                    .and_then(|s| self.program.arena.int_literal_value(s))
                    .map(|v| (v.0, v.1))
                {
                    if elements.len() as u64 != expected {
                        return false;
                    }
                }
                let element = (**element).clone();
                for el in elements {
                    if !self.apply_type_constraint(el, &element) {
                        return false;
                    }
                }
                self.set_expr_type(expr, Some(target));
                true
            }

            ExprKind::Call { callee, .. } => {
                if !self.refine_expr_type(expr, &target) {
                    return false;
                }
                let Some(symbol) = self.lookup_binding_expr(callee) else {
                    return true;
                };
                let info = self.bindings.symbol(symbol);
                if info.kind != SymbolKind::Function {
                    return true;
                }
                let Some(declaration) = info.declaration else {
                    return true;
                };
                if self.type_is_unresolved(Some(&target)) {
                    return true;
                }
                let callee_instance = info.instance_id;

                let Some(func) = self.func_decl(declaration) else {
                    return true;
                };
                if func.is_external && func.return_type.is_none() {
                    // External functions without declared returns stay
                    // unresolved.
                    return false;
                }
                let return_slot = func.return_type.clone();
                let body = func.body;
                let Some(new_return) = self.refine_slot(return_slot.as_ref(), &target) else {
                    return false;
                };
                if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(declaration).kind
                {
                    decl.return_type = new_return.clone();
                }

                let Some(body) = body else {
                    return true;
                };
                let Some(new_return) = new_return else {
                    return true;
                };

                // Guard against constraint recursion through recursive
                // functions.
                if !self.active_constraint_funcs().insert(declaration) {
                    return true;
                }
                let ok = self.with_instance(callee_instance, |checker| {
                    checker.apply_type_constraint(body, &new_return)
                });
                self.active_constraint_funcs().remove(&declaration);
                if !ok {
                    return false;
                }
                self.sync_function_signature_from_bindings(declaration);
                true
            }

            _ => self.refine_expr_type(expr, &target),
        }
    }

    fn active_constraint_funcs(&mut self) -> &mut HashSet<StmtId> {
        &mut self.constraint_stack
    }

    /// Copy types resolved through the bindings back into a function's
    /// declared signature.
    pub(crate) fn sync_function_signature_from_bindings(&mut self, stmt: StmtId) {
        let Some(func) = self.func_decl(stmt) else {
            return;
        };
        let param_count = func.params.len();
        let body = func.body;

        for index in 0..param_count {
            let Some(psym) = self
                .bindings
                .lookup(self.current_instance, crate::resolver::BindKey::Param(stmt, index))
            else {
                continue;
            };
            let Some(symbol_type) = self.bindings.symbol(psym).ty.clone() else {
                continue;
            };
            let resolved = self.resolve_type(&symbol_type);
            if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
                let slot = &mut decl.params[index].ty;
                if slot.is_none() || matches!(slot, Some(Type::Var(_))) {
                    *slot = Some(resolved);
                }
            }
        }

        if let Some(body) = body {
            if let Some(body_type) = self.expr_type(body) {
                let resolved = self.resolve_type(&body_type);
                if let StmtKind::FuncDecl(decl) = &mut self.program.arena.stmt_mut(stmt).kind {
                    let slot = &mut decl.return_type;
                    if slot.is_none() || matches!(slot, Some(Type::Var(_))) {
                        *slot = Some(resolved);
                    }
                }
            }
        }
    }
}
