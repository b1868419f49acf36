use std::collections::{HashMap, HashSet};

use crate::{
    ast::{ExprId, StmtId},
    loader::InstanceId,
};

use super::{Symbol, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One lexical scope: parent pointer plus name map. Scopes are arena-owned
/// and never deleted; lookup walks parent links.
#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub names: HashMap<String, SymbolId>,
    pub children: Vec<ScopeId>,
}

/// Addressable AST positions a symbol can be bound to. Parameters and
/// receivers live inside their function's statement payload, so they are
/// addressed by statement id plus index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindKey {
    Expr(ExprId),
    Stmt(StmtId),
    Param(StmtId, usize),
    Receiver(StmtId, usize),
}

/// The canonical association of AST nodes with symbols, partitioned per
/// module instance, plus the symbol and scope arenas. Populated by the
/// resolver, extended by the type checker (method rewrites, late global
/// binds), and consulted by every later pass.
#[derive(Debug, Default)]
pub struct Bindings {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    instance_roots: Vec<Option<ScopeId>>,
    map: HashMap<(InstanceId, BindKey), SymbolId>,
    new_variables: HashSet<(InstanceId, ExprId)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn alloc_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Enter a name into a scope, replacing any previous entry in that
    /// scope.
    pub fn enter(&mut self, scope: ScopeId, name: impl Into<String>, symbol: SymbolId) {
        self.scopes[scope.index()].names.insert(name.into(), symbol);
    }

    /// Look a name up in one scope only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.index()].names.get(name).copied()
    }

    /// Look a name up by walking the scope chain outwards.
    pub fn lookup_in(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(symbol) = self.scopes[id.index()].names.get(name) {
                return Some(*symbol);
            }
            current = self.scopes[id.index()].parent;
        }
        None
    }

    /// True if `name` is visible in any scope strictly enclosing `scope`.
    pub fn visible_in_enclosing(&self, scope: ScopeId, name: &str) -> bool {
        match self.scopes[scope.index()].parent {
            Some(parent) => self.lookup_in(parent, name).is_some(),
            None => false,
        }
    }

    pub fn set_instance_root(&mut self, instance: InstanceId, scope: ScopeId) {
        if self.instance_roots.len() <= instance {
            self.instance_roots.resize(instance + 1, None);
        }
        self.instance_roots[instance] = Some(scope);
    }

    pub fn instance_root(&self, instance: InstanceId) -> Option<ScopeId> {
        self.instance_roots.get(instance).copied().flatten()
    }

    /// Look a name up in an instance's root scope.
    pub fn lookup_global(&self, instance: InstanceId, name: &str) -> Option<SymbolId> {
        let root = self.instance_root(instance)?;
        self.lookup_in(root, name)
    }

    pub fn bind(&mut self, instance: InstanceId, key: BindKey, symbol: SymbolId) {
        self.map.insert((instance, key), symbol);
    }

    pub fn lookup(&self, instance: InstanceId, key: BindKey) -> Option<SymbolId> {
        self.map.get(&(instance, key)).copied()
    }

    pub fn lookup_expr(&self, instance: InstanceId, expr: ExprId) -> Option<SymbolId> {
        self.lookup(instance, BindKey::Expr(expr))
    }

    pub fn mark_new_variable(&mut self, instance: InstanceId, expr: ExprId) {
        self.new_variables.insert((instance, expr));
    }

    pub fn is_new_variable(&self, instance: InstanceId, expr: ExprId) -> bool {
        self.new_variables.contains(&(instance, expr))
    }
}
