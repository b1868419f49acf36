//! Per-expression-kind primary checks.

use log::trace;

use crate::{
    ast::{BinaryOp, ExprId, ExprKind, Primitive, Type, UnaryOp},
    error::CompileResult,
    resolver::SymbolKind,
};

use super::TypeChecker;

impl<'a> TypeChecker<'a> {
    /// Type-check one expression, record its type on the node, and return
    /// it. `None` is void: the expression produces no value.
    pub(crate) fn check_expr(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let kind = self.program.arena.expr(expr).kind.clone();
        match kind {
            ExprKind::Int { .. }
            | ExprKind::Float { .. }
            | ExprKind::Str { .. }
            | ExprKind::Char { .. } => {
                let ty = self.infer_literal_type(expr);
                self.set_expr_type(expr, ty.clone());
                Ok(ty)
            }
            ExprKind::Identifier { name, .. } => self.check_identifier(expr, &name),
            ExprKind::Binary { op, left, right } => self.check_binary(expr, op, left, right),
            ExprKind::Unary { op, operand } => self.check_unary(expr, op, operand),
            ExprKind::Call { .. } => self.check_call(expr),
            ExprKind::Index { operand, index } => self.check_index(expr, operand, index),
            ExprKind::Member { operand, field } => self.check_member(expr, operand, &field),
            ExprKind::ArrayLiteral { elements } => self.check_array_literal(expr, &elements),
            ExprKind::TupleLiteral { elements } => self.check_tuple_literal(expr, &elements),
            ExprKind::Block { .. } => self.check_block(expr),
            ExprKind::Conditional { .. } => self.check_conditional(expr),
            ExprKind::Cast { .. } => self.check_cast(expr),
            ExprKind::Assignment { .. } => self.check_assignment(expr),
            ExprKind::Range { start, end } => self.check_range(expr, start, end),
            ExprKind::Length { operand } => self.check_length(expr, operand),
            ExprKind::Iteration { .. } => self.check_iteration(expr),
            ExprKind::Repeat { .. } => self.check_repeat(expr),
            ExprKind::Resource { .. } => self.check_resource_expr(expr),
            ExprKind::Process { .. } => self.check_process_expr(expr),
        }
    }

    fn check_identifier(&mut self, expr: ExprId, name: &str) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let symbol = match self.lookup_binding_expr(expr) {
            Some(symbol) => symbol,
            None => {
                let Some(symbol) = self.lookup_global(name) else {
                    return Err(self.err(format!("Undefined identifier: {name}"), &location));
                };
                self.bind_expr(expr, symbol);
                symbol
            }
        };

        // A variable read before its declaration statement was checked
        // forces the declaration, possibly in another instance.
        let info = self.bindings.symbol(symbol);
        if info.ty.is_none() {
            if let (Some(declaration), SymbolKind::Variable | SymbolKind::Constant) =
                (info.declaration, info.kind)
            {
                let owner = info.instance_id;
                self.with_instance(owner, |checker| checker.check_stmt(declaration))?;
            }
        }

        let ty = self.bindings.symbol(symbol).ty.clone();
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    fn check_binary(
        &mut self,
        expr: ExprId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);

        for operand in [left, right] {
            if matches!(
                self.program.arena.expr(operand).kind,
                ExprKind::Iteration { .. }
            ) {
                return Err(self.err(
                    "Iteration expressions cannot be used inside larger expressions without parentheses",
                    &self.expr_location(operand),
                ));
            }
        }

        let left_type = self.check_expr(left)?;

        if op.is_logical() {
            let context = format!("Logical operator {op}");
            self.require_boolean_expr(left, left_type.as_ref(), &self.expr_location(left), &context)?;
            let right_type = self.check_expr(right)?;
            self.require_boolean_expr(
                right,
                right_type.as_ref(),
                &self.expr_location(right),
                &context,
            )?;
            let ty = Some(Type::Primitive(Primitive::Bool));
            self.set_expr_type(expr, ty.clone());
            return Ok(ty);
        }

        // A named left operand dispatches to a user-defined operator
        // method; the node is rewritten into a call.
        if let Some(left_type) = &left_type {
            if let Type::Named(type_name) = self.resolve_type(left_type) {
                if let Some(overloaded) = self.try_operator_overload(expr, op, &type_name)? {
                    return Ok(overloaded);
                }
            }
        }

        let right_type = self.check_expr(right)?;

        let is_numeric_like = |checker: &Self, t: &Option<Type>| match t {
            None => true,
            Some(ty) => match checker.resolve_type(ty) {
                Type::Var(_) => true,
                Type::Primitive(p) => p.is_numeric(),
                _ => false,
            },
        };

        if op.is_arithmetic() {
            if !is_numeric_like(self, &left_type) || !is_numeric_like(self, &right_type) {
                return Err(self.err(format!("Operator {op} requires numeric operands"), &location));
            }
            let ty = self.unify_types(left_type, right_type);
            self.set_expr_type(expr, ty.clone());
            return Ok(ty);
        }

        if op.is_unsigned_only() {
            let context = format!("Operator {op}");
            self.require_unsigned_or_fit(left, left_type.as_ref(), &context)?;
            self.require_unsigned_or_fit(right, right_type.as_ref(), &context)?;

            let left_type = self.expr_type(left);
            if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
                // Shifts take the left operand's type.
                self.set_expr_type(expr, left_type.clone());
                return Ok(left_type);
            }
            let right_type = self.expr_type(right);
            let ty = self.unify_types(left_type, right_type);
            self.set_expr_type(expr, ty.clone());
            return Ok(ty);
        }

        // Comparisons are boolean regardless of operand type.
        let ty = Some(Type::Primitive(Primitive::Bool));
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    /// Unsigned-only operators additionally accept literals that fit an
    /// unsigned type.
    fn require_unsigned_or_fit(
        &mut self,
        operand: ExprId,
        ty: Option<&Type>,
        context: &str,
    ) -> CompileResult<()> {
        let location = self.expr_location(operand);
        if let Some(ty) = ty {
            if matches!(self.resolve_type(ty), Type::Primitive(p) if p.is_unsigned_int()) {
                return Ok(());
            }
        }
        for candidate in [Primitive::U8, Primitive::U16, Primitive::U32, Primitive::U64] {
            let target = Type::Primitive(candidate);
            if self.literal_assignable_to(&target, operand) {
                self.set_expr_type(operand, Some(target));
                return Ok(());
            }
        }
        self.require_unsigned_integer(ty, &location, context)
    }

    /// Rewrite `lhs op rhs` into `T::op` method-call form when the method
    /// exists, preserving the node's identity.
    fn try_operator_overload(
        &mut self,
        expr: ExprId,
        op: BinaryOp,
        type_name: &str,
    ) -> CompileResult<Option<Option<Type>>> {
        let location = self.expr_location(expr);
        let method_name = format!("{type_name}::{op}");
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
                format!(
                    "Operator '{op}' on type {type_name} must declare exactly one receiver parameter"
                ),
                &self.stmt_location(declaration),
            ));
        }
        if func.params.iter().any(|p| p.is_expression_param) {
            return Err(self.err(
                format!("Operator '{op}' on type {type_name} cannot use expression parameters"),
                &self.stmt_location(declaration),
            ));
        }
        let expected_args = func.params.len();
        if expected_args != 1 {
            return Err(self.err(
                format!("Operator '{op}' on type {type_name} expects {expected_args} argument(s)"),
                &location,
            ));
        }

        trace!("rewriting operator {op} on {type_name} into call to {method_name}");
        let ExprKind::Binary { left, right, .. } = self.program.arena.expr(expr).kind.clone()
        else {
            return Ok(None);
        };

        let callee = self.program.arena.alloc_expr(crate::ast::Expr::new(
            ExprKind::identifier(op.name()),
            location.clone(),
        ));
        self.bind_expr(callee, symbol);
        self.program.arena.expr_mut(expr).kind = ExprKind::Call {
            callee,
            receivers: vec![left],
            args: vec![right],
        };

        Ok(Some(self.check_call(expr)?))
    }

    fn check_unary(
        &mut self,
        expr: ExprId,
        op: UnaryOp,
        operand: ExprId,
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let operand_type = self.check_expr(operand)?;

        match op {
            UnaryOp::Neg => {
                let numeric_like = match &operand_type {
                    None => true,
                    Some(ty) => match self.resolve_type(ty) {
                        Type::Var(_) => true,
                        Type::Primitive(p) => p.is_numeric(),
                        _ => false,
                    },
                };
                if !numeric_like {
                    return Err(self.err("Unary - requires numeric operand", &location));
                }
                self.set_expr_type(expr, operand_type.clone());
                Ok(operand_type)
            }
            UnaryOp::Not => {
                self.require_boolean_expr(
                    operand,
                    operand_type.as_ref(),
                    &self.expr_location(operand),
                    "Logical operator !",
                )?;
                let ty = Some(Type::Primitive(Primitive::Bool));
                self.set_expr_type(expr, ty.clone());
                Ok(ty)
            }
            UnaryOp::BitNot => {
                if let Some(ty) = &operand_type {
                    if matches!(self.resolve_type(ty), Type::Primitive(p) if !p.is_unsigned_int())
                    {
                        if self.literal_assignable_to(&Type::Primitive(Primitive::U8), operand) {
                            self.set_expr_type(operand, Some(Type::Primitive(Primitive::U8)));
                        } else {
                            return Err(
                                self.err("Bitwise NOT requires unsigned integer", &location)
                            );
                        }
                    }
                }
                let operand_type = self.expr_type(operand);
                self.set_expr_type(expr, operand_type.clone());
                Ok(operand_type)
            }
        }
    }

    pub(crate) fn check_call(&mut self, expr: ExprId) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let ExprKind::Call {
            callee,
            receivers,
            args,
        } = self.program.arena.expr(expr).kind.clone()
        else {
            return Err(self.err("Internal error: expected call expression", &location));
        };

        let mut receiver_types = vec![];
        let multi_receiver = receivers.len() > 1;
        for receiver in &receivers {
            if multi_receiver
                && !matches!(
                    self.program.arena.expr(*receiver).kind,
                    ExprKind::Identifier { .. }
                )
            {
                return Err(self.err("Multi-receiver calls require identifier receivers", &location));
            }
            receiver_types.push(self.check_expr(*receiver)?);
        }

        let ExprKind::Identifier { name, .. } = self.program.arena.expr(callee).kind.clone() else {
            // Calls on arbitrary expressions never resolve to a function
            // symbol; give the call an unconstrained type.
            self.check_expr(callee)?;
            for arg in &args {
                self.check_expr(*arg)?;
            }
            let ty = Some(self.make_fresh_typevar());
            self.set_expr_type(expr, ty.clone());
            return Ok(ty);
        };

        // Method dispatch: a single receiver of named type qualifies the
        // callee as `Type::name`.
        let mut func_name = name.clone();
        if receivers.len() == 1 && !name.contains("::") {
            if let Some(Some(receiver_type)) = receiver_types.first().map(|t| t.as_ref()) {
                if let Type::Named(type_name) = self.resolve_type(receiver_type) {
                    func_name = format!("{type_name}::{name}");
                    if let ExprKind::Identifier { name: stored, .. } =
                        &mut self.program.arena.expr_mut(callee).kind
                    {
                        *stored = func_name.clone();
                    }
                }
            }
        }

        let mut symbol = self.lookup_binding_expr(callee);
        if symbol.is_none() || func_name != name {
            symbol = self.lookup_global(&func_name);
        }
        let Some(symbol) = symbol else {
            return Err(self.err(format!("Undefined function: {func_name}"), &location));
        };
        self.bind_expr(callee, symbol);

        // Check value arguments; expression-parameter arguments are passed
        // syntactically and skipped here.
        let callee_decl = self.bindings.symbol(symbol).declaration;
        for (index, arg) in args.iter().enumerate() {
            let skip = {
                let info = self.bindings.symbol(symbol);
                info.kind == SymbolKind::Function
                    && info
                        .declaration
                        .and_then(|d| self.func_decl(d))
                        .and_then(|f| f.params.get(index))
                        .is_some_and(|p| p.is_expression_param)
            };
            if !skip {
                self.check_expr(*arg)?;
            }
        }

        let info = self.bindings.symbol(symbol).clone();

        if info.kind == SymbolKind::Type {
            return self.check_constructor_call(expr, &name, symbol, &args);
        }

        if info.kind != SymbolKind::Function {
            return Err(self.err(format!("Cannot call non-function: {func_name}"), &location));
        }
        let Some(declaration) = callee_decl else {
            return Err(self.err(format!("Cannot call non-function: {func_name}"), &location));
        };

        // Idempotent on-demand check so the callee's signature is known at
        // this call site, including forward references and other instances.
        if !self.is_checked(info.instance_id, declaration) {
            self.with_instance(info.instance_id, |checker| checker.check_stmt(declaration))?;
        }

        let func = self
            .func_decl(declaration)
            .ok_or_else(|| self.err(format!("Cannot call non-function: {func_name}"), &location))?
            .clone();

        let expected_receivers = func.ref_params.len();
        if expected_receivers != receivers.len() {
            if expected_receivers == 0 {
                return Err(self.err(
                    format!("Function '{}' does not accept receiver arguments", func.name),
                    &location,
                ));
            }
            return Err(self.err(
                format!(
                    "Function '{}' requires {expected_receivers} receiver(s)",
                    func.name
                ),
                &location,
            ));
        }

        // Reconcile receiver parameter types with the provided receivers.
        if !func.ref_params.is_empty() {
            let mut ref_param_types = func.ref_param_types.clone();
            ref_param_types.resize(func.ref_params.len(), None);
            for (index, receiver_type) in receiver_types.iter().enumerate() {
                let param_type = ref_param_types[index].clone();
                match param_type {
                    None => ref_param_types[index] = receiver_type.clone(),
                    Some(Type::Var(_)) => {
                        if let Some(receiver_type) = receiver_type {
                            let var = ref_param_types[index].clone().expect("matched above");
                            self.bind_typevar(&var, receiver_type);
                        }
                        ref_param_types[index] = receiver_type.clone();
                    }
                    Some(declared) => {
                        if !self.types_compatible(receiver_type.as_ref(), Some(&declared)) {
                            return Err(self.err(
                                format!(
                                    "Receiver '{}' expects type {}",
                                    func.ref_params[index],
                                    declared.render(&self.program.arena)
                                ),
                                &location,
                            ));
                        }
                    }
                }
            }
            if let crate::ast::StmtKind::FuncDecl(decl) =
                &mut self.program.arena.stmt_mut(declaration).kind
            {
                decl.ref_param_types = ref_param_types;
            }
        }

        if args.len() != func.params.len() {
            return Err(self.err(
                format!(
                    "Function '{}' expects {} argument(s)",
                    func.name,
                    func.params.len()
                ),
                &location,
            ));
        }

        if func.is_generic {
            return self.check_generic_call(expr, &func_name, symbol, declaration, &args);
        }

        // Validate argument types against declared parameter types,
        // inferring unannotated parameters from the arguments.
        for (index, param) in func.params.iter().enumerate() {
            if param.is_expression_param {
                continue;
            }
            let arg = args[index];
            let arg_type = self.expr_type(arg);
            match &param.ty {
                None => {
                    if let crate::ast::StmtKind::FuncDecl(decl) =
                        &mut self.program.arena.stmt_mut(declaration).kind
                    {
                        decl.params[index].ty = arg_type;
                    }
                }
                Some(Type::Var(_)) => {
                    let var = param.ty.clone().expect("matched above");
                    if let Some(arg_type) = &arg_type {
                        self.bind_typevar(&var, arg_type);
                    }
                    let unified = self.unify_types(Some(var), arg_type);
                    if let crate::ast::StmtKind::FuncDecl(decl) =
                        &mut self.program.arena.stmt_mut(declaration).kind
                    {
                        decl.params[index].ty = unified;
                    }
                }
                Some(declared) => {
                    if !self.types_compatible(arg_type.as_ref(), Some(declared))
                        && !self.literal_assignable_to(declared, arg)
                    {
                        let declared = declared.clone();
                        if !self.apply_type_constraint(arg, &declared) {
                            return Err(self.err(
                                format!(
                                    "Type mismatch for parameter '{}' in call to '{}'",
                                    param.name, func.name
                                ),
                                &self.expr_location(arg),
                            ));
                        }
                    }
                }
            }
        }

        self.invalidate_receiver_constexpr(&receivers);

        if !func.return_types.is_empty() {
            let element_types: Vec<Option<Type>> =
                func.return_types.iter().cloned().map(Some).collect();
            let tuple_name = self.tuple_type_name(&element_types);
            self.register_tuple_type(&tuple_name, func.return_types.clone());
            let ty = Some(Type::Named(tuple_name));
            self.set_expr_type(expr, ty.clone());
            return Ok(ty);
        }

        let ty = func.return_type.clone();
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    /// A call whose symbol is a type is a field-by-field positional struct
    /// constructor.
    fn check_constructor_call(
        &mut self,
        expr: ExprId,
        type_name: &str,
        symbol: crate::resolver::SymbolId,
        args: &[ExprId],
    ) -> CompileResult<Option<Type>> {
        let declaration = self.bindings.symbol(symbol).declaration;
        if let Some(declaration) = declaration {
            let field_count = match self.program.arena.stmt(declaration).kind.clone() {
                crate::ast::StmtKind::TypeDecl(decl) => decl.fields.len(),
                _ => 0,
            };
            for index in 0..args.len().min(field_count) {
                let arg_type = self.expr_type(args[index]);
                if let crate::ast::StmtKind::TypeDecl(decl) =
                    &mut self.program.arena.stmt_mut(declaration).kind
                {
                    let slot = &mut decl.fields[index].ty;
                    if slot.is_none() || matches!(slot, Some(Type::Var(_))) {
                        *slot = arg_type;
                    }
                }
            }
        }

        let ty = Some(Type::Named(type_name.to_owned()));
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    /// Receivers passed to a call may be mutated by the callee; any
    /// constexpr knowledge about them is dropped.
    fn invalidate_receiver_constexpr(&mut self, receivers: &[ExprId]) {
        for receiver in receivers {
            let mut cursor = *receiver;
            let base = loop {
                match &self.program.arena.expr(cursor).kind {
                    ExprKind::Identifier { .. } => break Some(cursor),
                    ExprKind::Member { operand, .. } | ExprKind::Index { operand, .. } => {
                        cursor = *operand;
                    }
                    _ => break None,
                }
            };
            if let Some(base) = base {
                if let Some(symbol) = self.lookup_binding_expr(base) {
                    self.forget_symbol_value(symbol);
                }
            }
        }
    }

    fn check_index(
        &mut self,
        expr: ExprId,
        operand: ExprId,
        index: ExprId,
    ) -> CompileResult<Option<Type>> {
        let operand_type = self.check_expr(operand)?;
        self.check_expr(index)?;

        let ty = match operand_type.map(|t| self.resolve_type(&t)) {
            Some(Type::Array { element, .. }) => Some((*element).clone()),
            // Indexing a string yields a byte.
            Some(Type::Primitive(Primitive::Str)) => Some(Type::Primitive(Primitive::U8)),
            _ => Some(self.make_fresh_typevar()),
        };
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    fn check_member(
        &mut self,
        expr: ExprId,
        operand: ExprId,
        field: &str,
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        let operand_type = self.check_expr(operand)?;

        if let Some(Type::Named(type_name)) = operand_type.map(|t| self.resolve_type(&t)) {
            // Synthetic tuple types use positional `__N` members.
            if type_name.starts_with(crate::ast::TUPLE_TYPE_PREFIX) {
                if let Some(index) = crate::ast::tuple_field_index(field) {
                    if let Some(elements) = self.tuple_types.get(&type_name) {
                        let Some(element) = elements.get(index) else {
                            return Err(self.err(
                                format!("Tuple field index out of bounds: {field}"),
                                &location,
                            ));
                        };
                        let ty = Some(element.clone());
                        self.set_expr_type(expr, ty.clone());
                        return Ok(ty);
                    }
                    // Fallback: recover element types from the mangled
                    // name.
                    let components: Vec<&str> = type_name
                        .trim_start_matches(crate::ast::TUPLE_TYPE_PREFIX)
                        .split('_')
                        .skip(1)
                        .collect();
                    let Some(component) = components.get(index) else {
                        return Err(self.err(
                            format!("Tuple field index out of bounds: {field}"),
                            &location,
                        ));
                    };
                    let ty = Some(self.parse_type_from_component(component));
                    self.set_expr_type(expr, ty.clone());
                    return Ok(ty);
                }
            }

            if let Some(symbol) = self.lookup_global(&type_name) {
                let info = self.bindings.symbol(symbol);
                if info.kind == SymbolKind::Type {
                    if let Some(declaration) = info.declaration {
                        if let crate::ast::StmtKind::TypeDecl(decl) =
                            &self.program.arena.stmt(declaration).kind
                        {
                            for type_field in &decl.fields {
                                if type_field.name == field {
                                    let ty = type_field.ty.clone();
                                    self.set_expr_type(expr, ty.clone());
                                    return Ok(ty);
                                }
                            }
                            return Err(self.err(
                                format!("Type {type_name} has no field: {field}"),
                                &location,
                            ));
                        }
                    }
                }
            }
        }

        let ty = Some(self.make_fresh_typevar());
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    fn check_array_literal(
        &mut self,
        expr: ExprId,
        elements: &[ExprId],
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);

        let mut element_type = None;
        for element in elements {
            let ty = self.check_expr(*element)?;
            element_type = if element_type.is_none() {
                ty
            } else {
                self.unify_types(element_type, ty)
            };
        }
        let element_type = element_type.unwrap_or_else(|| self.make_fresh_typevar());

        let size = self.program.arena.make_int(elements.len() as u64, location);
        let ty = Some(Type::Array {
            element: Box::new(element_type),
            size: Some(size),
        });
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }

    fn check_tuple_literal(
        &mut self,
        expr: ExprId,
        elements: &[ExprId],
    ) -> CompileResult<Option<Type>> {
        let location = self.expr_location(expr);
        if elements.len() < 2 {
            return Err(self.err("Tuple literal must have at least 2 elements", &location));
        }

        let mut element_types = vec![];
        for element in elements {
            element_types.push(self.check_expr(*element)?);
        }

        let name = self.tuple_type_name(&element_types);
        let concrete: Vec<Type> = element_types
            .iter()
            .map(|t| t.clone().unwrap_or(Type::Named("unknown".to_owned())))
            .collect();
        self.register_tuple_type(&name, concrete);

        let ty = Some(Type::Named(name));
        self.set_expr_type(expr, ty.clone());
        Ok(ty)
    }
}
