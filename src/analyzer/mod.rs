//! Reachability, usage, and reentrancy analysis.
//!
//! A fixed-point computation over call edges starting from the entry
//! function (`main`), every exported function, and the entry instance's
//! top-level statements. The lattices (reachable set, context sets, mask
//! sets) are finite and grow monotonically, so the iteration terminates.
//! Dead branches of constexpr-known conditionals contribute nothing,
//! matching the type checker's short-circuit.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use log::debug;

use crate::{
    ast::{ExprId, ExprKind, StmtId, StmtKind, Type},
    error::CompileResult,
    loader::InstanceId,
    optimizer::OptimizationFacts,
    resolver::{BindKey, Bindings, Symbol, SymbolId, SymbolKind},
    typechecker::TypeChecker,
};

/// Reentrancy context tags propagated along call edges.
pub const CONTEXT_REENTRANT: char = 'R';
pub const CONTEXT_NONREENTRANT: char = 'N';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReentrancyBoundaryKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReentrancyMode {
    #[default]
    Default,
    ForceReentrant,
    ForceNonReentrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarMutability {
    Mutable,
    Constexpr,
}

pub fn mutability_label(mutability: VarMutability) -> &'static str {
    match mutability {
        VarMutability::Mutable => "mutable",
        VarMutability::Constexpr => "constexpr",
    }
}

/// Which analysis passes a backend wants; reachability always runs.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisPasses {
    pub reentrancy: bool,
    pub ref_variants: bool,
    pub mutability: bool,
}

impl Default for AnalysisPasses {
    fn default() -> Self {
        Self {
            reentrancy: true,
            ref_variants: true,
            mutability: true,
        }
    }
}

type BoundaryModeFn =
    dyn Fn(&Symbol, ReentrancyBoundaryKind) -> CompileResult<ReentrancyMode>;

pub struct AnalysisConfig {
    pub passes: AnalysisPasses,
    pub default_entry_context: char,
    pub default_exit_context: char,
    /// Backend-configured override of the context a symbol carries at a
    /// boundary.
    pub boundary_mode: Option<Box<BoundaryModeFn>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            passes: AnalysisPasses::default(),
            default_entry_context: CONTEXT_REENTRANT,
            default_exit_context: CONTEXT_REENTRANT,
            boundary_mode: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct AnalysisFacts {
    pub reachable_functions: HashSet<SymbolId>,
    pub used_global_vars: HashSet<SymbolId>,
    pub used_type_names: BTreeSet<String>,
    pub reentrancy_variants: HashMap<SymbolId, BTreeSet<char>>,
    pub ref_variants: HashMap<SymbolId, BTreeSet<String>>,
    pub var_mutability: HashMap<SymbolId, VarMutability>,
}

pub struct Analyzer<'c, 'p> {
    checker: &'c TypeChecker<'p>,
    optimization: &'c OptimizationFacts,
    config: AnalysisConfig,
}

impl<'c, 'p> Analyzer<'c, 'p> {
    pub fn new(
        checker: &'c TypeChecker<'p>,
        optimization: &'c OptimizationFacts,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            checker,
            optimization,
            config,
        }
    }

    fn bindings(&self) -> &Bindings {
        self.checker.bindings
    }

    pub fn run(&self) -> CompileResult<AnalysisFacts> {
        let mut facts = AnalysisFacts::default();

        let roots = self.collect_roots()?;
        debug!("analysis roots: {} function(s)", roots.len());

        // Reachability fixed point over call edges.
        let mut queue: VecDeque<SymbolId> = roots.iter().map(|(symbol, _)| *symbol).collect();
        let mut contexts: HashMap<SymbolId, BTreeSet<char>> = HashMap::new();
        for (symbol, context) in &roots {
            facts.reachable_functions.insert(*symbol);
            contexts.entry(*symbol).or_default().insert(*context);
        }

        // Top-level statements of the entry instance execute at startup;
        // they are usage roots even without an entry function.
        let mut top_level_edges = EdgeCollector::default();
        if !self.checker.program.instances.is_empty() {
            let stmts = self.checker.program.instance(0).top_level.clone();
            for stmt in stmts {
                if matches!(
                    self.checker.program.arena.stmt(stmt).kind,
                    StmtKind::FuncDecl(_) | StmtKind::TypeDecl(_) | StmtKind::Import(_)
                ) {
                    continue;
                }
                self.collect_stmt_edges(0, stmt, &mut top_level_edges);
            }
        }
        for callee in &top_level_edges.calls {
            if facts.reachable_functions.insert(*callee) {
                queue.push_back(*callee);
            }
            contexts
                .entry(*callee)
                .or_default()
                .insert(self.config.default_entry_context);
        }
        facts.used_global_vars.extend(&top_level_edges.globals);
        facts.used_type_names.extend(top_level_edges.types.clone());

        let mut call_sites: HashMap<SymbolId, Vec<CallSite>> = HashMap::new();

        while let Some(symbol) = queue.pop_front() {
            let info = self.bindings().symbol(symbol);
            let Some(declaration) = info.declaration else {
                continue;
            };
            let instance = info.instance_id;

            let mut edges = EdgeCollector::default();
            self.collect_stmt_edges(instance, declaration, &mut edges);

            facts.used_global_vars.extend(&edges.globals);
            facts.used_type_names.extend(edges.types.clone());

            let caller_contexts = contexts.get(&symbol).cloned().unwrap_or_default();
            for callee in &edges.calls {
                if facts.reachable_functions.insert(*callee) {
                    queue.push_back(*callee);
                }
                // Contexts flow along the call edge; growth re-queues the
                // callee.
                let callee_contexts = self.callee_contexts(*callee, &caller_contexts)?;
                let entry = contexts.entry(*callee).or_default();
                let before = entry.len();
                entry.extend(callee_contexts);
                if entry.len() > before && !queue.contains(callee) {
                    queue.push_back(*callee);
                }
            }
            for site in &edges.receiver_calls {
                call_sites.entry(site.callee).or_default().push(site.clone());
            }
        }

        if self.config.passes.reentrancy {
            for symbol in &facts.reachable_functions {
                let variants = contexts.get(symbol).cloned().unwrap_or_else(|| {
                    let mut set = BTreeSet::new();
                    set.insert(self.config.default_entry_context);
                    set
                });
                facts.reentrancy_variants.insert(*symbol, variants);
            }
        }

        if self.config.passes.ref_variants {
            let reachable_functions = facts.reachable_functions.clone();
            self.collect_ref_variants(&reachable_functions, &call_sites, &mut facts);
        }

        if self.config.passes.mutability {
            self.collect_var_mutability(&mut facts);
        }

        Ok(facts)
    }

    /// Entry roots: `main` in the entry instance with the entry context,
    /// and every exported function with the exit context.
    fn collect_roots(&self) -> CompileResult<Vec<(SymbolId, char)>> {
        let mut roots = vec![];

        if let Some(main) = self.bindings().lookup_global(0, "main") {
            if self.bindings().symbol(main).kind == SymbolKind::Function {
                let context = self.boundary_context(main, ReentrancyBoundaryKind::Entry)?;
                roots.push((main, context));
            }
        }

        for instance in 0..self.checker.program.instances.len() {
            for stmt in &self.checker.program.instance(instance).top_level {
                let Some(symbol) = self.bindings().lookup(instance, BindKey::Stmt(*stmt)) else {
                    continue;
                };
                let info = self.bindings().symbol(symbol);
                if info.kind == SymbolKind::Function && info.is_exported {
                    let context = self.boundary_context(symbol, ReentrancyBoundaryKind::Exit)?;
                    roots.push((symbol, context));
                }
            }
        }

        Ok(roots)
    }

    fn boundary_context(
        &self,
        symbol: SymbolId,
        boundary: ReentrancyBoundaryKind,
    ) -> CompileResult<char> {
        let default = match boundary {
            ReentrancyBoundaryKind::Entry => self.config.default_entry_context,
            ReentrancyBoundaryKind::Exit => self.config.default_exit_context,
        };
        let mode = match &self.config.boundary_mode {
            Some(mode_fn) => mode_fn(self.bindings().symbol(symbol), boundary)?,
            None => ReentrancyMode::Default,
        };
        Ok(match mode {
            ReentrancyMode::Default => default,
            ReentrancyMode::ForceReentrant => CONTEXT_REENTRANT,
            ReentrancyMode::ForceNonReentrant => CONTEXT_NONREENTRANT,
        })
    }

    /// The contexts a callee is reached in. A `[[nonreentrant]]` function
    /// pins itself to the non-reentrant context regardless of callers.
    fn callee_contexts(
        &self,
        callee: SymbolId,
        caller_contexts: &BTreeSet<char>,
    ) -> CompileResult<BTreeSet<char>> {
        let info = self.bindings().symbol(callee);
        if let Some(declaration) = info.declaration {
            let annotated = self
                .checker
                .program
                .arena
                .stmt(declaration)
                .annotations
                .iter()
                .any(|a| a.name == "nonreentrant");
            if annotated {
                let mut set = BTreeSet::new();
                set.insert(CONTEXT_NONREENTRANT);
                return Ok(set);
            }
        }
        if caller_contexts.is_empty() {
            let mut set = BTreeSet::new();
            set.insert(self.config.default_entry_context);
            return Ok(set);
        }
        Ok(caller_contexts.clone())
    }

    fn collect_ref_variants(
        &self,
        reachable: &HashSet<SymbolId>,
        call_sites: &HashMap<SymbolId, Vec<CallSite>>,
        facts: &mut AnalysisFacts,
    ) {
        for symbol in reachable {
            let info = self.bindings().symbol(*symbol);
            let has_receivers = info
                .declaration
                .and_then(|d| match &self.checker.program.arena.stmt(d).kind {
                    StmtKind::FuncDecl(func) => Some(!func.ref_params.is_empty()),
                    _ => None,
                })
                .unwrap_or(false);
            if !has_receivers {
                continue;
            }

            let masks = facts.ref_variants.entry(*symbol).or_default();
            match call_sites.get(symbol) {
                Some(sites) => {
                    for site in sites {
                        masks.insert(site.mask.clone());
                    }
                }
                None => {
                    masks.insert(String::new());
                }
            }
        }
    }

    fn collect_var_mutability(&self, facts: &mut AnalysisFacts) {
        for symbol in facts.used_global_vars.clone() {
            let info = self.bindings().symbol(symbol);
            let constexpr = info
                .declaration
                .is_some_and(|d| {
                    self.optimization
                        .constexpr_inits
                        .contains(&(info.instance_id, d))
                })
                && !info.is_mutable;
            facts.var_mutability.insert(
                symbol,
                if constexpr {
                    VarMutability::Constexpr
                } else {
                    VarMutability::Mutable
                },
            );
        }
    }

    fn collect_stmt_edges(&self, instance: InstanceId, stmt: StmtId, edges: &mut EdgeCollector) {
        match self.checker.program.arena.stmt(stmt).kind.clone() {
            StmtKind::FuncDecl(func) => {
                for param in &func.params {
                    self.note_type(param.ty.as_ref(), edges);
                }
                for ty in &func.ref_param_types {
                    self.note_type(ty.as_ref(), edges);
                }
                self.note_type(func.return_type.as_ref(), edges);
                for ty in &func.return_types {
                    self.note_type(Some(ty), edges);
                }
                if !func.is_external {
                    if let Some(body) = func.body {
                        self.collect_expr_edges(instance, body, edges);
                    }
                }
            }
            StmtKind::VarDecl(decl) => {
                self.note_type(decl.ty.as_ref(), edges);
                if let Some(init) = decl.init {
                    self.collect_expr_edges(instance, init, edges);
                }
            }
            StmtKind::Expr(expr) => self.collect_expr_edges(instance, expr, edges),
            StmtKind::Return(Some(expr)) => self.collect_expr_edges(instance, expr, edges),
            StmtKind::CondStmt { condition, body } => {
                self.collect_expr_edges(instance, condition, edges);
                // Statically-false conditions never execute their body.
                if self.optimization.condition(instance, condition) != Some(false) {
                    self.collect_stmt_edges(instance, body, edges);
                }
            }
            _ => {}
        }
    }

    fn collect_expr_edges(&self, instance: InstanceId, expr: ExprId, edges: &mut EdgeCollector) {
        self.note_type(self.checker.program.arena.expr(expr).ty.as_ref(), edges);

        match self.checker.program.arena.expr(expr).kind.clone() {
            ExprKind::Identifier { .. } => {
                if let Some(symbol) = self.bindings().lookup_expr(instance, expr) {
                    let info = self.bindings().symbol(symbol);
                    if !info.is_local
                        && matches!(info.kind, SymbolKind::Variable | SymbolKind::Constant)
                    {
                        edges.globals.insert(symbol);
                    }
                }
            }
            ExprKind::Call {
                callee,
                receivers,
                args,
            } => {
                if let Some(symbol) = self.bindings().lookup_expr(instance, callee) {
                    let info = self.bindings().symbol(symbol);
                    if info.kind == SymbolKind::Function {
                        edges.calls.insert(symbol);
                        if !receivers.is_empty() {
                            edges.receiver_calls.push(CallSite {
                                callee: symbol,
                                mask: self.receiver_mask(instance, &receivers),
                            });
                        }
                    }
                }
                for receiver in receivers {
                    self.collect_expr_edges(instance, receiver, edges);
                }
                for arg in args {
                    self.collect_expr_edges(instance, arg, edges);
                }
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => {
                self.collect_expr_edges(instance, condition, edges);
                // Only the live branch of a constexpr conditional is
                // reachable.
                match self.optimization.condition(instance, condition) {
                    Some(true) => self.collect_expr_edges(instance, true_expr, edges),
                    Some(false) => self.collect_expr_edges(instance, false_expr, edges),
                    None => {
                        self.collect_expr_edges(instance, true_expr, edges);
                        self.collect_expr_edges(instance, false_expr, edges);
                    }
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.collect_expr_edges(instance, left, edges);
                self.collect_expr_edges(instance, right, edges);
            }
            ExprKind::Assignment { target, value, .. } => {
                self.collect_expr_edges(instance, target, edges);
                self.collect_expr_edges(instance, value, edges);
            }
            ExprKind::Range { start, end } => {
                self.collect_expr_edges(instance, start, edges);
                self.collect_expr_edges(instance, end, edges);
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Length { operand }
            | ExprKind::Member { operand, .. } => {
                self.collect_expr_edges(instance, operand, edges)
            }
            ExprKind::Cast { target, operand } => {
                self.note_type(Some(&target), edges);
                self.collect_expr_edges(instance, operand, edges);
            }
            ExprKind::Index { operand, index } => {
                self.collect_expr_edges(instance, operand, edges);
                self.collect_expr_edges(instance, index, edges);
            }
            ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
                for element in elements {
                    self.collect_expr_edges(instance, element, edges);
                }
            }
            ExprKind::Block { statements, result } => {
                for stmt in statements {
                    self.collect_stmt_edges(instance, stmt, edges);
                }
                if let Some(result) = result {
                    self.collect_expr_edges(instance, result, edges);
                }
            }
            ExprKind::Iteration { subject, body, .. } => {
                self.collect_expr_edges(instance, subject, edges);
                self.collect_expr_edges(instance, body, edges);
            }
            ExprKind::Repeat { condition, body } => {
                self.collect_expr_edges(instance, condition, edges);
                self.collect_expr_edges(instance, body, edges);
            }
            _ => {}
        }
    }

    /// One character per receiver: `m` when the receiver aliases a mutable
    /// binding at the call site, `r` otherwise.
    fn receiver_mask(&self, instance: InstanceId, receivers: &[ExprId]) -> String {
        receivers
            .iter()
            .map(|receiver| {
                let mutable = self
                    .bindings()
                    .lookup_expr(instance, *receiver)
                    .map(|symbol| self.bindings().symbol(symbol).is_mutable)
                    .unwrap_or(false);
                if mutable {
                    'm'
                } else {
                    'r'
                }
            })
            .collect()
    }

    fn note_type(&self, ty: Option<&Type>, edges: &mut EdgeCollector) {
        match ty {
            Some(Type::Named(name)) => {
                edges.types.insert(name.clone());
            }
            Some(Type::Array { element, .. }) => self.note_type(Some(element), edges),
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
struct CallSite {
    callee: SymbolId,
    mask: String,
}

#[derive(Debug, Default)]
struct EdgeCollector {
    calls: HashSet<SymbolId>,
    globals: HashSet<SymbolId>,
    types: BTreeSet<String>,
    receiver_calls: Vec<CallSite>,
}
