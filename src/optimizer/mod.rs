//! Constexpr fact collection.
//!
//! The optimiser enumerates every instance and statement, attempting
//! compile-time evaluation of each expression. Failures are recorded as
//! skip reasons, never raised: a fact the evaluator cannot prove simply
//! stays unproven.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{
    ast::{ExprId, ExprKind, StmtId, StmtKind},
    evaluator::{CtValue, CteQuery},
    loader::InstanceId,
    resolver::{BindKey, SymbolId, SymbolKind},
    typechecker::TypeChecker,
};

#[derive(Debug, Default)]
pub struct OptimizationFacts {
    /// Every expression the evaluator could prove constant, per instance.
    pub constexpr_values: HashMap<(InstanceId, ExprId), CtValue>,
    /// Variable declarations whose initialiser is constant.
    pub constexpr_inits: HashSet<(InstanceId, StmtId)>,
    /// Statically-known conditional conditions; drives dead-branch
    /// elimination.
    pub constexpr_conditions: HashMap<(InstanceId, ExprId), bool>,
    /// Functions whose body collapses to a scalar constant.
    pub foldable_functions: HashSet<SymbolId>,
    /// Why folding was skipped, per function symbol.
    pub fold_skip_reasons: HashMap<SymbolId, String>,
}

impl OptimizationFacts {
    pub fn condition(&self, instance: InstanceId, expr: ExprId) -> Option<bool> {
        self.constexpr_conditions.get(&(instance, expr)).copied()
    }
}

pub struct Optimizer;

impl Optimizer {
    /// Collect constexpr facts for the whole program.
    pub fn run(checker: &mut TypeChecker) -> OptimizationFacts {
        let mut facts = OptimizationFacts::default();

        for instance in 0..checker.program.instances.len() {
            debug!("collecting constexpr facts for instance {instance}");
            checker.with_instance(instance, |checker| {
                collect_foldable_functions(checker, instance, &mut facts);
                let stmts = checker.program.instance(instance).top_level.clone();
                for stmt in stmts {
                    visit_stmt(checker, instance, stmt, &mut facts);
                }
            });
        }

        facts
    }
}

fn collect_foldable_functions(
    checker: &mut TypeChecker,
    instance: InstanceId,
    facts: &mut OptimizationFacts,
) {
    let stmts = checker.program.instance(instance).top_level.clone();
    for stmt in stmts {
        let Some(symbol) = checker.bindings.lookup(instance, BindKey::Stmt(stmt)) else {
            continue;
        };
        if checker.bindings.symbol(symbol).kind != SymbolKind::Function {
            continue;
        }
        let Some(func) = checker.func_decl(stmt) else {
            continue;
        };

        if func.is_external || func.body.is_none() {
            facts
                .fold_skip_reasons
                .insert(symbol, "external-or-no-body".to_owned());
            continue;
        }
        if !func.params.is_empty() {
            facts
                .fold_skip_reasons
                .insert(symbol, "parameterized".to_owned());
            continue;
        }
        if !func.ref_params.is_empty() {
            facts
                .fold_skip_reasons
                .insert(symbol, "has-receivers".to_owned());
            continue;
        }

        let body = func.body.expect("checked above");
        match checker.query_constexpr(body) {
            CteQuery::Known(value) => {
                if value.is_scalar() {
                    facts.foldable_functions.insert(symbol);
                    facts.fold_skip_reasons.remove(&symbol);
                } else {
                    facts
                        .fold_skip_reasons
                        .insert(symbol, "non-scalar-result".to_owned());
                }
            }
            CteQuery::Unknown(message) | CteQuery::Error(message) => {
                let reason = if message.is_empty() {
                    "unknown".to_owned()
                } else {
                    message
                };
                facts
                    .fold_skip_reasons
                    .insert(symbol, format!("evaluation-failed: {reason}"));
            }
        }
    }
}

fn evaluate_condition(
    checker: &mut TypeChecker,
    instance: InstanceId,
    expr: ExprId,
    facts: &mut OptimizationFacts,
) {
    if let CteQuery::Known(value) = checker.query_constexpr(expr) {
        if let Some(truth) = value.truthiness() {
            facts.constexpr_conditions.insert((instance, expr), truth);
        }
    }
}

fn mark_constexpr_init(
    checker: &mut TypeChecker,
    instance: InstanceId,
    stmt: StmtId,
    facts: &mut OptimizationFacts,
) {
    let StmtKind::VarDecl(decl) = &checker.program.arena.stmt(stmt).kind else {
        return;
    };
    let Some(init) = decl.init else {
        return;
    };
    if let CteQuery::Known(value) = checker.query_constexpr(init) {
        facts.constexpr_inits.insert((instance, stmt));
        facts.constexpr_values.insert((instance, init), value);
    }
}

fn visit_stmt(
    checker: &mut TypeChecker,
    instance: InstanceId,
    stmt: StmtId,
    facts: &mut OptimizationFacts,
) {
    match checker.program.arena.stmt(stmt).kind.clone() {
        StmtKind::FuncDecl(func) => {
            if !func.is_external {
                if let Some(body) = func.body {
                    visit_expr(checker, instance, body, facts);
                }
            }
        }
        StmtKind::VarDecl(decl) => {
            mark_constexpr_init(checker, instance, stmt, facts);
            if let Some(init) = decl.init {
                visit_expr(checker, instance, init, facts);
            }
        }
        StmtKind::Expr(expr) => visit_expr(checker, instance, expr, facts),
        StmtKind::Return(Some(expr)) => visit_expr(checker, instance, expr, facts),
        StmtKind::CondStmt { condition, body } => {
            evaluate_condition(checker, instance, condition, facts);
            visit_expr(checker, instance, condition, facts);
            visit_stmt(checker, instance, body, facts);
        }
        _ => {}
    }
}

fn visit_expr(
    checker: &mut TypeChecker,
    instance: InstanceId,
    expr: ExprId,
    facts: &mut OptimizationFacts,
) {
    if !facts.constexpr_values.contains_key(&(instance, expr)) {
        if let CteQuery::Known(value) = checker.query_constexpr(expr) {
            facts.constexpr_values.insert((instance, expr), value);
        }
    }

    match checker.program.arena.expr(expr).kind.clone() {
        ExprKind::Conditional {
            condition,
            true_expr,
            false_expr,
            ..
        } => {
            evaluate_condition(checker, instance, condition, facts);
            visit_expr(checker, instance, condition, facts);
            visit_expr(checker, instance, true_expr, facts);
            visit_expr(checker, instance, false_expr, facts);
        }
        ExprKind::Call {
            receivers, args, ..
        } => {
            for receiver in receivers {
                visit_expr(checker, instance, receiver, facts);
            }
            for arg in args {
                visit_expr(checker, instance, arg, facts);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            visit_expr(checker, instance, left, facts);
            visit_expr(checker, instance, right, facts);
        }
        ExprKind::Assignment { target, value, .. } => {
            visit_expr(checker, instance, target, facts);
            visit_expr(checker, instance, value, facts);
        }
        ExprKind::Range { start, end } => {
            visit_expr(checker, instance, start, facts);
            visit_expr(checker, instance, end, facts);
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Cast { operand, .. }
        | ExprKind::Length { operand }
        | ExprKind::Member { operand, .. } => visit_expr(checker, instance, operand, facts),
        ExprKind::Index { operand, index } => {
            visit_expr(checker, instance, operand, facts);
            visit_expr(checker, instance, index, facts);
        }
        ExprKind::ArrayLiteral { elements } | ExprKind::TupleLiteral { elements } => {
            for element in elements {
                visit_expr(checker, instance, element, facts);
            }
        }
        ExprKind::Block { statements, result } => {
            for stmt in statements {
                visit_stmt(checker, instance, stmt, facts);
            }
            if let Some(result) = result {
                visit_expr(checker, instance, result, facts);
            }
        }
        ExprKind::Iteration { subject, body, .. } => {
            visit_expr(checker, instance, subject, facts);
            visit_expr(checker, instance, body, facts);
        }
        ExprKind::Repeat { condition, body } => {
            visit_expr(checker, instance, condition, facts);
            visit_expr(checker, instance, body, facts);
        }
        _ => {}
    }
}
