//! Name resolution.
//!
//! The resolver builds one scope tree per module instance and binds every
//! identifier, call target, parameter, receiver, and declaration to a
//! [`Symbol`]. Instance 0 is the entry module; every import expands the
//! imported module's declarations under a fresh instance id (deep clones,
//! so type checking can specialise them per instance), entering the new
//! symbols into both the new instance's root scope and the importing
//! scope. An import of a module that is already on the expansion stack
//! reuses that instance, which terminates cyclic import chains.
//!
//! Functions, types, and mutable globals are pre-declared so they can
//! forward-reference each other; constants bind strictly in source order
//! so constant evaluation has a deterministic dependency order.

mod bindings;
mod symbol;

pub use bindings::*;
pub use symbol::*;

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::{
    ast::{
        visit_stmts_in_stmt, ExprId, ExprKind, StmtId, StmtKind, Type, TUPLE_TYPE_PREFIX,
    },
    error::{CompileError, CompileResult, SourceLocation},
    loader::{
        normalize_path, resolve_module_path, InstanceId, ModuleId, ModuleInstance, Program,
    },
};

/// The loop variable is exempt from the shadowing rule and cannot be
/// assigned.
pub const LOOP_VAR: &str = "_";

pub struct Resolver<'a> {
    program: &'a mut Program,
    bindings: &'a mut Bindings,
    project_root: String,
    /// Instances currently being expanded, used to tie import cycles back
    /// to the instance already in flight.
    expansion_stack: Vec<(ModuleId, InstanceId)>,
    expanded: HashMap<InstanceId, HashSet<ModuleId>>,
}

/// Resolve the whole program: create the entry instance, expand imports,
/// and bind every name.
pub fn resolve_program(
    program: &mut Program,
    bindings: &mut Bindings,
    project_root: &str,
) -> CompileResult<()> {
    if program.modules.is_empty() {
        return Ok(());
    }

    if program.instances.is_empty() {
        let top_level = program.modules[0].module.top_level.clone();
        program.instances.push(ModuleInstance {
            id: 0,
            module_id: 0,
            top_level,
        });
    }

    let mut resolver = Resolver {
        program,
        bindings,
        project_root: project_root.to_owned(),
        expansion_stack: vec![],
        expanded: HashMap::new(),
    };
    resolver.resolve_instance(0)
}

/// Declare and resolve a monomorphised function in an existing instance.
/// The clone's mangled name goes straight into the instance root scope.
pub fn resolve_generated_function(
    program: &mut Program,
    bindings: &mut Bindings,
    instance: InstanceId,
    stmt: StmtId,
) -> CompileResult<()> {
    let mut resolver = Resolver {
        program,
        bindings,
        project_root: String::new(),
        expansion_stack: vec![],
        expanded: HashMap::new(),
    };
    let root = resolver
        .bindings
        .instance_root(instance)
        .ok_or_else(|| {
            CompileError::new(
                "Internal error: instance has no root scope",
                SourceLocation::default(),
            )
        })?;
    resolver.declare_function(instance, stmt, root)?;
    resolver.resolve_function(instance, stmt, root)
}

impl<'a> Resolver<'a> {
    fn error(&self, message: impl Into<String>, location: &SourceLocation) -> CompileError {
        CompileError::new(message, location.clone())
    }

    fn resolve_instance(&mut self, instance: InstanceId) -> CompileResult<()> {
        let module_id = self.program.instance(instance).module_id;
        debug!(
            "resolving instance {instance} of module '{}'",
            self.program.module(module_id).module.name
        );

        let root = self.bindings.new_scope(None);
        self.bindings.set_instance_root(instance, root);
        self.expansion_stack.push((module_id, instance));

        let stmts = self.program.instance(instance).top_level.clone();

        // Pre-declare pass: functions, types, and mutable globals may
        // forward-reference each other.
        for &stmt in &stmts {
            self.predeclare_stmt(instance, stmt, root)?;
        }

        // Import expansion. Imports are collected from the module's parsed
        // statements because instance clones drop top-level imports.
        let module_stmts = self.program.module(module_id).module.top_level.clone();
        let mut imports = vec![];
        for stmt in module_stmts {
            let arena = &self.program.arena;
            visit_stmts_in_stmt(arena, stmt, &mut |id| {
                if let StmtKind::Import(path) = &arena.stmt(id).kind {
                    imports.push((path.clone(), arena.stmt(id).location.clone()));
                }
            });
        }
        for (path, location) in imports {
            self.expand_import(instance, root, &path, &location)?;
        }

        // Declaration sweep, in source order: constants bind here.
        for &stmt in &stmts {
            self.resolve_declaration(instance, stmt, root)?;
        }

        // Body sweep: function bodies and top-level expressions see every
        // global of the instance.
        for &stmt in &stmts {
            self.resolve_top_level_body(instance, stmt, root)?;
        }

        self.expansion_stack.pop();
        Ok(())
    }

    fn predeclare_stmt(
        &mut self,
        instance: InstanceId,
        stmt: StmtId,
        root: ScopeId,
    ) -> CompileResult<()> {
        let location = self.program.arena.stmt(stmt).location.clone();
        match &self.program.arena.stmt(stmt).kind {
            StmtKind::FuncDecl(_) => {
                self.declare_function(instance, stmt, root)?;
            }
            StmtKind::TypeDecl(decl) => {
                let name = decl.name.clone();
                if self.bindings.lookup_local(root, &name).is_some() {
                    return Err(self.error(format!("Duplicate definition: {name}"), &location));
                }
                let mut symbol = Symbol::new(SymbolKind::Type, name.clone(), instance);
                symbol.declaration = Some(stmt);
                let id = self.bindings.alloc_symbol(symbol);
                self.bindings.enter(root, name, id);
                self.bindings.bind(instance, BindKey::Stmt(stmt), id);
            }
            StmtKind::VarDecl(decl) if decl.is_mutable => {
                let name = decl.name.clone();
                let is_exported = decl.is_exported;
                if self.bindings.lookup_local(root, &name).is_some() {
                    return Err(self.error(format!("Duplicate definition: {name}"), &location));
                }
                let mut symbol = Symbol::new(SymbolKind::Variable, name.clone(), instance);
                symbol.declaration = Some(stmt);
                symbol.is_mutable = true;
                symbol.is_exported = is_exported;
                let id = self.bindings.alloc_symbol(symbol);
                self.bindings.enter(root, name, id);
                self.bindings.bind(instance, BindKey::Stmt(stmt), id);
            }
            _ => {}
        }
        Ok(())
    }

    fn declare_function(
        &mut self,
        instance: InstanceId,
        stmt: StmtId,
        scope: ScopeId,
    ) -> CompileResult<()> {
        let location = self.program.arena.stmt(stmt).location.clone();
        let StmtKind::FuncDecl(func) = &self.program.arena.stmt(stmt).kind else {
            return Err(self.error("Internal error: expected function declaration", &location));
        };
        let name = func.qualified_name();
        let is_external = func.is_external;
        let is_exported = func.is_exported;
        if self.bindings.lookup_local(scope, &name).is_some() {
            return Err(self.error(format!("Duplicate definition: {name}"), &location));
        }
        let mut symbol = Symbol::new(SymbolKind::Function, name.clone(), instance);
        symbol.declaration = Some(stmt);
        symbol.is_external = is_external;
        symbol.is_exported = is_exported;
        let id = self.bindings.alloc_symbol(symbol);
        self.bindings.enter(scope, name, id);
        self.bindings.bind(instance, BindKey::Stmt(stmt), id);
        Ok(())
    }

    fn expand_import(
        &mut self,
        instance: InstanceId,
        root: ScopeId,
        segments: &[String],
        location: &SourceLocation,
    ) -> CompileResult<()> {
        let module_id = self.program.instance(instance).module_id;
        let current_file = self.program.module(module_id).path.clone();

        let Some(resolved) = resolve_module_path(segments, &current_file, &self.project_root)
        else {
            return Err(self.error(
                format!("Import failed: cannot resolve module '{}'", segments.join("::")),
                location,
            ));
        };
        let normalized = normalize_path(&resolved);
        let Some(&target) = self.program.path_to_id.get(&normalized) else {
            return Err(self.error(
                format!("Import failed: cannot resolve module '{}'", segments.join("::")),
                location,
            ));
        };

        if !self.expanded.entry(instance).or_default().insert(target) {
            trace!("import of module {target} already expanded into instance {instance}");
            return Ok(());
        }

        // A module currently being expanded imports back into the chain:
        // reuse the in-flight instance instead of spawning a fresh one.
        if let Some(&(_, existing)) = self
            .expansion_stack
            .iter()
            .find(|(module, _)| *module == target)
        {
            trace!("cyclic import of module {target}; reusing instance {existing}");
            self.enter_instance_symbols(existing, instance, root);
            return Ok(());
        }

        // Fresh instance: deep-clone the module's declarations (imports
        // excluded; they are expanded for the new instance from the parsed
        // module).
        let source_stmts = self.program.module(target).module.top_level.clone();
        let mut cloned = vec![];
        for stmt in source_stmts {
            if matches!(self.program.arena.stmt(stmt).kind, StmtKind::Import(_)) {
                continue;
            }
            cloned.push(self.program.arena.clone_stmt(stmt));
        }

        let new_instance = self.program.instances.len();
        debug!("expanding import of module {target} as instance {new_instance}");
        self.program.instances.push(ModuleInstance {
            id: new_instance,
            module_id: target,
            top_level: cloned,
        });

        self.resolve_instance(new_instance)?;
        self.enter_instance_symbols(new_instance, instance, root);
        Ok(())
    }

    /// Make the top-level symbols of `source` visible in `dest_scope`.
    /// Names already present locally win over imports.
    fn enter_instance_symbols(
        &mut self,
        source: InstanceId,
        _dest_instance: InstanceId,
        dest_scope: ScopeId,
    ) {
        let stmts = self.program.instance(source).top_level.clone();
        for stmt in stmts {
            let Some(symbol) = self.bindings.lookup(source, BindKey::Stmt(stmt)) else {
                continue;
            };
            let name = self.bindings.symbol(symbol).name.clone();
            if self.bindings.lookup_local(dest_scope, &name).is_none() {
                self.bindings.enter(dest_scope, name, symbol);
            }
        }
    }

    fn resolve_declaration(
        &mut self,
        instance: InstanceId,
        stmt: StmtId,
        root: ScopeId,
    ) -> CompileResult<()> {
        let location = self.program.arena.stmt(stmt).location.clone();
        match self.program.arena.stmt(stmt).kind.clone() {
            StmtKind::VarDecl(decl) => {
                if let Some(ty) = &decl.ty {
                    self.resolve_type(instance, ty, root, &location)?;
                }
                if let Some(init) = decl.init {
                    self.resolve_expr(instance, init, root)?;
                }
                if self.bindings.lookup(instance, BindKey::Stmt(stmt)).is_none() {
                    // Constants were not pre-declared; they become visible
                    // here, in source order.
                    if self.bindings.lookup_local(root, &decl.name).is_some() {
                        return Err(
                            self.error(format!("Duplicate definition: {}", decl.name), &location)
                        );
                    }
                    let mut symbol = Symbol::new(SymbolKind::Constant, decl.name.clone(), instance);
                    symbol.declaration = Some(stmt);
                    symbol.is_exported = decl.is_exported;
                    let id = self.bindings.alloc_symbol(symbol);
                    self.bindings.enter(root, decl.name, id);
                    self.bindings.bind(instance, BindKey::Stmt(stmt), id);
                }
            }
            StmtKind::TypeDecl(decl) => {
                for field in &decl.fields {
                    if let Some(ty) = &field.ty {
                        self.resolve_type(instance, ty, root, &field.location)?;
                    }
                }
            }
            StmtKind::FuncDecl(func) => {
                for param in &func.params {
                    if let Some(ty) = &param.ty {
                        self.resolve_type(instance, ty, root, &param.location)?;
                    }
                }
                if let Some(ty) = &func.return_type {
                    self.resolve_type(instance, ty, root, &location)?;
                }
                for ty in &func.return_types {
                    self.resolve_type(instance, ty, root, &location)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve_top_level_body(
        &mut self,
        instance: InstanceId,
        stmt: StmtId,
        root: ScopeId,
    ) -> CompileResult<()> {
        match self.program.arena.stmt(stmt).kind.clone() {
            StmtKind::FuncDecl(_) => self.resolve_function(instance, stmt, root),
            StmtKind::Expr(expr) => self.resolve_expr(instance, expr, root),
            StmtKind::Return(Some(expr)) => self.resolve_expr(instance, expr, root),
            StmtKind::CondStmt { condition, body } => {
                self.resolve_expr(instance, condition, root)?;
                self.resolve_stmt(instance, body, root)
            }
            _ => Ok(()),
        }
    }

    fn resolve_function(
        &mut self,
        instance: InstanceId,
        stmt: StmtId,
        outer: ScopeId,
    ) -> CompileResult<()> {
        let location = self.program.arena.stmt(stmt).location.clone();
        let StmtKind::FuncDecl(func) = self.program.arena.stmt(stmt).kind.clone() else {
            return Err(self.error("Internal error: expected function declaration", &location));
        };

        let scope = self.bindings.new_scope(Some(outer));

        for (index, name) in func.ref_params.iter().enumerate() {
            self.check_shadowing(scope, name, &location)?;
            let mut symbol = Symbol::new(SymbolKind::Parameter, name.clone(), instance);
            symbol.is_mutable = true;
            symbol.is_local = true;
            let id = self.bindings.alloc_symbol(symbol);
            self.bindings.enter(scope, name.clone(), id);
            self.bindings
                .bind(instance, BindKey::Receiver(stmt, index), id);
        }

        for (index, param) in func.params.iter().enumerate() {
            self.check_shadowing(scope, &param.name, &param.location)?;
            if self.bindings.lookup_local(scope, &param.name).is_some() {
                return Err(self.error(
                    format!("Duplicate definition: {}", param.name),
                    &param.location,
                ));
            }
            let mut symbol = Symbol::new(SymbolKind::Parameter, param.name.clone(), instance);
            symbol.ty = param.ty.clone();
            symbol.is_local = true;
            let id = self.bindings.alloc_symbol(symbol);
            self.bindings.enter(scope, param.name.clone(), id);
            self.bindings.bind(instance, BindKey::Param(stmt, index), id);
        }

        if let Some(body) = func.body {
            self.resolve_expr(instance, body, scope)?;
        }
        Ok(())
    }

    fn resolve_stmt(
        &mut self,
        instance: InstanceId,
        stmt: StmtId,
        scope: ScopeId,
    ) -> CompileResult<()> {
        let location = self.program.arena.stmt(stmt).location.clone();
        match self.program.arena.stmt(stmt).kind.clone() {
            StmtKind::Expr(expr) => self.resolve_expr(instance, expr, scope),
            StmtKind::Return(value) => match value {
                Some(expr) => self.resolve_expr(instance, expr, scope),
                None => Ok(()),
            },
            StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::VarDecl(decl) => {
                if let Some(ty) = &decl.ty {
                    self.resolve_type(instance, ty, scope, &location)?;
                }
                if let Some(init) = decl.init {
                    self.resolve_expr(instance, init, scope)?;
                }
                if self.bindings.lookup_local(scope, &decl.name).is_some() {
                    return Err(
                        self.error(format!("Duplicate definition: {}", decl.name), &location)
                    );
                }
                self.check_shadowing(scope, &decl.name, &location)?;
                let mut symbol = Symbol::new(
                    if decl.is_mutable {
                        SymbolKind::Variable
                    } else {
                        SymbolKind::Constant
                    },
                    decl.name.clone(),
                    instance,
                );
                symbol.declaration = Some(stmt);
                symbol.is_mutable = decl.is_mutable;
                symbol.is_local = true;
                let id = self.bindings.alloc_symbol(symbol);
                self.bindings.enter(scope, decl.name, id);
                self.bindings.bind(instance, BindKey::Stmt(stmt), id);
                Ok(())
            }
            StmtKind::TypeDecl(decl) => {
                if self.bindings.lookup_local(scope, &decl.name).is_some() {
                    return Err(
                        self.error(format!("Duplicate definition: {}", decl.name), &location)
                    );
                }
                let mut symbol = Symbol::new(SymbolKind::Type, decl.name.clone(), instance);
                symbol.declaration = Some(stmt);
                symbol.is_local = true;
                let id = self.bindings.alloc_symbol(symbol);
                self.bindings.enter(scope, decl.name, id);
                self.bindings.bind(instance, BindKey::Stmt(stmt), id);
                Ok(())
            }
            StmtKind::FuncDecl(_) => {
                self.declare_function(instance, stmt, scope)?;
                self.resolve_function(instance, stmt, scope)
            }
            StmtKind::Import(_) => Ok(()),
            StmtKind::CondStmt { condition, body } => {
                self.resolve_expr(instance, condition, scope)?;
                self.resolve_stmt(instance, body, scope)
            }
        }
    }

    fn resolve_expr(
        &mut self,
        instance: InstanceId,
        expr: ExprId,
        scope: ScopeId,
    ) -> CompileResult<()> {
        let location = self.program.arena.expr(expr).location.clone();
        match self.program.arena.expr(expr).kind.clone() {
            ExprKind::Identifier {
                name,
                is_expr_param_ref: _,
                declared_type,
            } => {
                // `$name` references resolve to the expression parameter in
                // scope; the evaluator's expansion stack takes precedence
                // only at evaluation time.
                if let Some(ty) = &declared_type {
                    self.resolve_type(instance, ty, scope, &location)?;
                }
                match self.bindings.lookup_in(scope, &name) {
                    Some(symbol) => {
                        self.bindings.bind(instance, BindKey::Expr(expr), symbol);
                        Ok(())
                    }
                    None => Err(self.error(format!("Undefined identifier: {name}"), &location)),
                }
            }
            ExprKind::Assignment { target, value, .. } => {
                self.resolve_expr(instance, value, scope)?;
                let target_kind = self.program.arena.expr(target).kind.clone();
                if let ExprKind::Identifier {
                    name,
                    is_expr_param_ref: false,
                    declared_type,
                } = target_kind
                {
                    if let Some(ty) = &declared_type {
                        self.resolve_type(instance, ty, scope, &location)?;
                    }
                    match self.bindings.lookup_in(scope, &name) {
                        Some(symbol) => {
                            self.bindings.bind(instance, BindKey::Expr(target), symbol);
                        }
                        None => {
                            // An unbound assignment target declares a new
                            // mutable local in the current scope.
                            trace!("assignment declares new variable '{name}'");
                            let root = self.bindings.instance_root(instance);
                            let mut symbol =
                                Symbol::new(SymbolKind::Variable, name.clone(), instance);
                            symbol.is_mutable = true;
                            symbol.is_local = root != Some(scope);
                            let id = self.bindings.alloc_symbol(symbol);
                            self.bindings.enter(scope, name, id);
                            self.bindings.bind(instance, BindKey::Expr(target), id);
                            self.bindings.mark_new_variable(instance, expr);
                            if let ExprKind::Assignment {
                                creates_new_variable,
                                ..
                            } = &mut self.program.arena.expr_mut(expr).kind
                            {
                                *creates_new_variable = true;
                            }
                        }
                    }
                    return Ok(());
                }
                self.resolve_expr(instance, target, scope)
            }
            ExprKind::Call {
                callee,
                receivers,
                args,
            } => {
                for receiver in receivers {
                    self.resolve_expr(instance, receiver, scope)?;
                }
                for arg in args {
                    self.resolve_expr(instance, arg, scope)?;
                }
                let callee_kind = self.program.arena.expr(callee).kind.clone();
                if let ExprKind::Identifier {
                    name,
                    is_expr_param_ref: false,
                    ..
                } = callee_kind
                {
                    // Method names and `Type::fn` callees resolve in the
                    // type checker once receiver types are known; bind what
                    // is already in scope.
                    if let Some(symbol) = self.bindings.lookup_in(scope, &name) {
                        self.bindings.bind(instance, BindKey::Expr(callee), symbol);
                    }
                    Ok(())
                } else {
                    self.resolve_expr(instance, callee, scope)
                }
            }
            ExprKind::Iteration { subject, body, .. } => {
                self.resolve_expr(instance, subject, scope)?;
                let loop_scope = self.bindings.new_scope(Some(scope));
                let mut symbol = Symbol::new(SymbolKind::Parameter, LOOP_VAR, instance);
                symbol.is_local = true;
                let id = self.bindings.alloc_symbol(symbol);
                self.bindings.enter(loop_scope, LOOP_VAR, id);
                self.resolve_expr(instance, body, loop_scope)
            }
            ExprKind::Repeat { condition, body } => {
                self.resolve_expr(instance, condition, scope)?;
                self.resolve_expr(instance, body, scope)
            }
            ExprKind::Block { statements, result } => {
                // Multi-assignment desugaring produces a block around a
                // `__tmp` temporary; its targets belong to the enclosing
                // scope, so that block is transparent.
                let block_scope = if self.is_tuple_desugar_block(&statements) {
                    scope
                } else {
                    self.bindings.new_scope(Some(scope))
                };
                for stmt in statements {
                    self.resolve_stmt(instance, stmt, block_scope)?;
                }
                if let Some(result) = result {
                    self.resolve_expr(instance, result, block_scope)?;
                }
                Ok(())
            }
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(instance, left, scope)?;
                self.resolve_expr(instance, right, scope)
            }
            ExprKind::Range { start, end } => {
                self.resolve_expr(instance, start, scope)?;
                self.resolve_expr(instance, end, scope)
            }
            ExprKind::Unary { operand, .. } | ExprKind::Length { operand } => {
                self.resolve_expr(instance, operand, scope)
            }
            ExprKind::Member { operand, .. } => self.resolve_expr(instance, operand, scope),
            ExprKind::Index { operand, index } => {
                self.resolve_expr(instance, operand, scope)?;
                self.resolve_expr(instance, index, scope)
            }
            ExprKind::Cast { target, operand } => {
                self.resolve_type(instance, &target, scope, &location)?;
                self.resolve_expr(instance, operand, scope)
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => {
                self.resolve_expr(instance, condition, scope)?;
                self.resolve_expr(instance, true_expr, scope)?;
                self.resolve_expr(instance, false_expr, scope)
            }
            ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
                for element in elements {
                    self.resolve_expr(instance, element, scope)?;
                }
                Ok(())
            }
            ExprKind::Int { .. }
            | ExprKind::Float { .. }
            | ExprKind::Str { .. }
            | ExprKind::Char { .. }
            | ExprKind::Resource { .. }
            | ExprKind::Process { .. } => Ok(()),
        }
    }

    fn is_tuple_desugar_block(&self, statements: &[StmtId]) -> bool {
        statements.first().is_some_and(|first| {
            matches!(
                &self.program.arena.stmt(*first).kind,
                StmtKind::VarDecl(decl) if decl.name.starts_with(crate::ast::TUPLE_TMP_PREFIX)
            )
        })
    }

    /// Resolve the names and size expressions a type annotation mentions.
    fn resolve_type(
        &mut self,
        instance: InstanceId,
        ty: &Type,
        scope: ScopeId,
        location: &SourceLocation,
    ) -> CompileResult<()> {
        match ty {
            Type::Named(name) => {
                if name.starts_with(TUPLE_TYPE_PREFIX) {
                    return Ok(());
                }
                if self.bindings.lookup_in(scope, name).is_none() {
                    return Err(self.error(format!("Unresolved type name: {name}"), location));
                }
                Ok(())
            }
            Type::Array { element, size } => {
                if let Some(size) = size {
                    self.resolve_expr(instance, *size, scope)?;
                }
                self.resolve_type(instance, element, scope, location)
            }
            Type::Primitive(_) | Type::Var(_) => Ok(()),
        }
    }

    fn check_shadowing(
        &self,
        scope: ScopeId,
        name: &str,
        location: &SourceLocation,
    ) -> CompileResult<()> {
        if name == LOOP_VAR {
            return Ok(());
        }
        if self.bindings.visible_in_enclosing(scope, name) {
            return Err(self.error(
                format!("Shadowing of '{name}' from an enclosing scope is not allowed"),
                location,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_source;

    fn resolve(source: &str) -> CompileResult<(Program, Bindings)> {
        let mut program = load_source(source, "test.sbl")?;
        let mut bindings = Bindings::new();
        resolve_program(&mut program, &mut bindings, "")?;
        Ok((program, bindings))
    }

    #[test]
    fn binds_function_parameters() {
        let (program, bindings) = resolve("&double(x: #i32) -> #i32 { -> x * 2; }").unwrap();
        let stmt = program.instance(0).top_level[0];
        let param = bindings.lookup(0, BindKey::Param(stmt, 0)).unwrap();
        assert_eq!(bindings.symbol(param).name, "x");
        assert_eq!(bindings.symbol(param).kind, SymbolKind::Parameter);
    }

    #[test]
    fn functions_forward_reference_each_other() {
        resolve("&a() -> #i32 { -> b(); } &b() -> #i32 { -> a(); }").unwrap();
    }

    #[test]
    fn constants_do_not_forward_reference() {
        let err = resolve("x = y + 1; y = 2;").unwrap_err();
        assert!(err.message.contains("Undefined identifier: y"), "{err}");
    }

    #[test]
    fn unbound_assignment_declares_new_variable() {
        let (program, bindings) = resolve("&f() { x = 3 + 4; y = x * 2; }").unwrap();
        let stmt = program.instance(0).top_level[0];
        let crate::ast::StmtKind::FuncDecl(func) = &program.arena.stmt(stmt).kind else {
            panic!("expected function");
        };
        let crate::ast::ExprKind::Block { statements, .. } =
            &program.arena.expr(func.body.unwrap()).kind
        else {
            panic!("expected block");
        };
        let crate::ast::StmtKind::Expr(assign) = &program.arena.stmt(statements[0]).kind else {
            panic!("expected expression statement");
        };
        assert!(bindings.is_new_variable(0, *assign));
        let crate::ast::ExprKind::Assignment {
            creates_new_variable,
            target,
            ..
        } = &program.arena.expr(*assign).kind
        else {
            panic!("expected assignment");
        };
        assert!(creates_new_variable);
        let symbol = bindings.lookup_expr(0, *target).unwrap();
        assert!(bindings.symbol(symbol).is_mutable);
    }

    #[test]
    fn rejects_shadowing() {
        let err = resolve("&f() { x = 1; { x: #i32; }; }").unwrap_err();
        assert!(err.message.contains("Shadowing"), "{err}");
    }

    #[test]
    fn loop_variable_may_shadow() {
        resolve("&f(xs: #i32[3]) { xs @ { y = _; }; }").unwrap();
    }

    #[test]
    fn rejects_undefined_identifier() {
        let err = resolve("&f() -> #i32 { -> nope; }").unwrap_err();
        assert!(err.message.contains("Undefined identifier: nope"), "{err}");
    }

    #[test]
    fn rejects_duplicate_definitions() {
        let err = resolve("&f() { -> 1; } &f() { -> 2; }").unwrap_err();
        assert!(err.message.contains("Duplicate definition: f"), "{err}");
    }

    #[test]
    fn rejects_unresolved_type_name() {
        let err = resolve("&f(p: #Nope) { -> 1; }").unwrap_err();
        assert!(err.message.contains("Unresolved type name: Nope"), "{err}");
    }

    #[test]
    fn namespaced_functions_use_qualified_names() {
        let (_, bindings) = resolve(
            "#Point(x: #i32, y: #i32);\n\
             &(self)#Point::norm() -> #i32 { -> 0; }",
        )
        .unwrap();
        assert!(bindings.lookup_global(0, "Point::norm").is_some());
        assert!(bindings.lookup_global(0, "norm").is_none());
    }
}
