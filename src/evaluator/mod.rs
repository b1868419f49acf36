//! Compile-time evaluator.
//!
//! A recursive tree-walking interpreter over the typed AST, used for array
//! size resolution, conditional branch pruning, constant folding, range
//! checking, and analysis-time condition evaluation.
//!
//! The query contract distinguishes three outcomes: `Known` (the expression
//! is a compile-time constant), `Unknown` (it is not, which is never an
//! error by itself), and `Error` (a definite semantic violation such as
//! division by zero, an out-of-bounds index, a receiver mutation, or a
//! cycle between constants). Purity is path-sensitive: a call is evaluable
//! as long as the executed path stays pure, no matter what dead branches
//! would do.
//!
//! Non-local control flow is a sum-typed interrupt threaded through
//! `Result`: loop frames consume `Break`/`Continue`, call frames consume
//! `Return`.

mod value;

pub use value::*;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::trace;

use crate::{
    ast::{
        tuple_field_name, BinaryOp, ExprId, ExprKind, Primitive, StmtId, StmtKind, Type, UnaryOp,
        TUPLE_TYPE_PREFIX,
    },
    loader::{InstanceId, Program},
    resolver::{Bindings, Symbol, SymbolId, SymbolKind, LOOP_VAR},
};

pub const MAX_RECURSION_DEPTH: usize = 1000;
pub const MAX_LOOP_ITERATIONS: usize = 100_000;

/// Result of a compile-time query.
#[derive(Debug, Clone, PartialEq)]
pub enum CteQuery {
    Known(CtValue),
    Unknown(String),
    Error(String),
}

impl CteQuery {
    pub fn known(self) -> Option<CtValue> {
        match self {
            CteQuery::Known(value) => Some(value),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CteQuery::Known(_) => "",
            CteQuery::Unknown(message) | CteQuery::Error(message) => message,
        }
    }
}

/// Non-local control and failure channel of the interpreter.
#[derive(Debug, Clone)]
pub(crate) enum Interrupt {
    Break,
    Continue,
    Return(CtValue),
    /// Not a compile-time constant along this path.
    Unknown(String),
    /// Definite semantic violation.
    Error(String),
}

type EvalResult<T> = Result<T, Interrupt>;

fn unknown(message: impl Into<String>) -> Interrupt {
    Interrupt::Unknown(message.into())
}

fn hard(message: impl Into<String>) -> Interrupt {
    Interrupt::Error(message.into())
}

/// Read-only view of the compilation the evaluator runs against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub program: &'a Program,
    pub bindings: &'a Bindings,
    pub instance: InstanceId,
    /// Constexpr values the type checker has remembered per symbol from
    /// earlier assignments.
    pub symbol_values: &'a HashMap<SymbolId, CtValue>,
}

impl<'a> EvalContext<'a> {
    fn with_instance(&self, instance: InstanceId) -> EvalContext<'a> {
        EvalContext { instance, ..*self }
    }

    fn symbol_for_expr(&self, expr: ExprId) -> Option<SymbolId> {
        self.bindings.lookup_expr(self.instance, expr)
    }

    fn symbol(&self, id: SymbolId) -> &'a Symbol {
        self.bindings.symbol(id)
    }
}

enum Selector {
    Field(String),
    Index(usize),
}

#[derive(Default)]
pub struct Evaluator {
    /// Local environment of the current evaluation, keyed by name.
    env: HashMap<String, CtValue>,
    uninitialized: HashSet<String>,
    ref_param_stack: Vec<HashSet<String>>,
    expr_param_stack: Vec<HashMap<String, ExprId>>,
    expanding_expr_params: HashSet<String>,
    expr_param_expansion_depth: usize,
    recursion_depth: usize,
    loop_depth: usize,
    return_depth: usize,
    /// Memoised top-level constants; survives across queries.
    constant_cache: HashMap<SymbolId, CtValue>,
    constant_eval_stack: HashSet<SymbolId>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one expression from a clean environment. The constant cache
    /// is kept across queries; everything else is transient.
    pub fn query(&mut self, ctx: &EvalContext, expr: ExprId) -> CteQuery {
        self.env.clear();
        self.uninitialized.clear();
        self.ref_param_stack.clear();
        self.expr_param_stack.clear();
        self.expanding_expr_params.clear();
        self.expr_param_expansion_depth = 0;
        self.recursion_depth = 0;
        self.loop_depth = 0;
        self.return_depth = 0;

        match self.eval_expr(ctx, expr) {
            Ok(value) => CteQuery::Known(value),
            Err(Interrupt::Unknown(message)) => CteQuery::Unknown(message),
            Err(Interrupt::Error(message)) => CteQuery::Error(message),
            Err(Interrupt::Break) => {
                CteQuery::Unknown("Break used outside of loop in compile-time evaluation".into())
            }
            Err(Interrupt::Continue) => {
                CteQuery::Unknown("Continue used outside of loop in compile-time evaluation".into())
            }
            Err(Interrupt::Return(_)) => {
                CteQuery::Unknown("Return used outside of function in compile-time evaluation".into())
            }
        }
    }

    /// Drop a memoised constant after its symbol has been reassigned.
    pub fn forget_symbol(&mut self, symbol: SymbolId) {
        self.constant_cache.remove(&symbol);
    }

    fn eval_expr(&mut self, ctx: &EvalContext, expr: ExprId) -> EvalResult<CtValue> {
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(hard(
                "Recursion depth limit exceeded in compile-time evaluation",
            ));
        }
        self.recursion_depth += 1;
        let result = self.eval_expr_inner(ctx, expr);
        self.recursion_depth -= 1;
        result
    }

    fn eval_expr_inner(&mut self, ctx: &EvalContext, expr: ExprId) -> EvalResult<CtValue> {
        let kind = ctx.program.arena.expr(expr).kind.clone();
        match kind {
            ExprKind::Int { value, unsigned, .. } => {
                if ctx
                    .program
                    .arena
                    .expr(expr)
                    .ty
                    .as_ref()
                    .is_some_and(Type::is_bool)
                {
                    return Ok(CtValue::Bool(value != 0));
                }
                if unsigned {
                    Ok(CtValue::Uint(value))
                } else {
                    Ok(CtValue::Int(value as i64))
                }
            }
            ExprKind::Float { value, .. } => Ok(CtValue::Float(value)),
            ExprKind::Str { value } => Ok(CtValue::Str(value)),
            ExprKind::Char { value } => Ok(CtValue::Int(value as i64)),
            ExprKind::Identifier { name, .. } => self.eval_identifier(ctx, expr, &name),
            ExprKind::Binary { op, left, right } => self.eval_binary(ctx, op, left, right),
            ExprKind::Unary { op, operand } => self.eval_unary(ctx, op, operand),
            ExprKind::Call { .. } => self.eval_call(ctx, expr),
            ExprKind::Member { operand, field } => self.eval_member(ctx, operand, &field),
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
                ..
            } => self.eval_conditional(ctx, condition, true_expr, false_expr),
            ExprKind::Cast { target, operand } => self.eval_cast(ctx, &target, operand),
            ExprKind::Assignment { .. } => self.eval_assignment(ctx, expr),
            ExprKind::ArrayLiteral { elements } => {
                let mut array = CtArray::default();
                for element in elements {
                    array.elements.push(self.eval_expr(ctx, element)?);
                }
                Ok(CtValue::Array(Rc::new(array)))
            }
            ExprKind::TupleLiteral { elements } => {
                let mut tuple = CtComposite::default();
                if let Some(Type::Named(name)) = &ctx.program.arena.expr(expr).ty {
                    tuple.type_name = name.clone();
                }
                for (index, element) in elements.iter().enumerate() {
                    let value = self.eval_expr(ctx, *element)?;
                    tuple.fields.insert(tuple_field_name(index), value);
                }
                Ok(CtValue::Composite(Rc::new(tuple)))
            }
            ExprKind::Range { start, end } => self.eval_range(ctx, start, end),
            ExprKind::Index { operand, index } => self.eval_index(ctx, operand, index),
            ExprKind::Iteration {
                subject,
                body,
                sorted,
            } => self.eval_iteration(ctx, subject, body, sorted),
            ExprKind::Repeat { condition, body } => self.eval_repeat(ctx, condition, body),
            ExprKind::Length { operand } => self.eval_length(ctx, operand),
            ExprKind::Block { .. } => self.eval_block(ctx, expr),
            ExprKind::Resource { .. } | ExprKind::Process { .. } => Err(unknown(
                "Expression kind not supported at compile time",
            )),
        }
    }

    fn eval_identifier(
        &mut self,
        ctx: &EvalContext,
        expr: ExprId,
        name: &str,
    ) -> EvalResult<CtValue> {
        // Expression-parameter arguments shadow everything; the argument
        // AST re-evaluates in the caller's environment, transparently
        // inlining it.
        if !self.expanding_expr_params.contains(name) {
            let binding = self
                .expr_param_stack
                .iter()
                .rev()
                .find_map(|frame| frame.get(name).copied());
            if let Some(arg) = binding {
                self.expanding_expr_params.insert(name.to_owned());
                self.expr_param_expansion_depth += 1;
                let result = self.eval_expr(ctx, arg);
                self.expr_param_expansion_depth -= 1;
                self.expanding_expr_params.remove(name);
                return result;
            }
        }

        if let Some(value) = self.env.get(name) {
            if matches!(value, CtValue::Uninit) {
                return Err(unknown(format!(
                    "uninitialized variable accessed at compile time: {name}"
                )));
            }
            return Ok(value.clone());
        }
        if self.uninitialized.contains(name) {
            return Err(unknown(format!(
                "uninitialized variable accessed at compile time: {name}"
            )));
        }

        let symbol = ctx
            .symbol_for_expr(expr)
            .or_else(|| ctx.bindings.lookup_global(ctx.instance, name));

        if let Some(symbol) = symbol {
            if let Some(value) = ctx.symbol_values.get(&symbol) {
                if matches!(value, CtValue::Uninit) {
                    return Err(unknown(format!(
                        "uninitialized variable accessed at compile time: {name}"
                    )));
                }
                return Ok(value.clone());
            }
            if ctx.symbol(symbol).kind == SymbolKind::Constant {
                return self.evaluate_constant_symbol(ctx, symbol);
            }
        }

        Err(unknown(format!(
            "Identifier not found or not a compile-time constant: {name}"
        )))
    }

    /// Evaluate and memoise a top-level constant. Cycles between constants
    /// are a hard error naming the cycle root.
    fn evaluate_constant_symbol(
        &mut self,
        ctx: &EvalContext,
        symbol: SymbolId,
    ) -> EvalResult<CtValue> {
        if let Some(value) = self.constant_cache.get(&symbol) {
            return Ok(value.clone());
        }

        let info = ctx.symbol(symbol);
        let (Some(declaration), SymbolKind::Constant) = (info.declaration, info.kind) else {
            return Err(unknown(format!("Not a constant: {}", info.name)));
        };
        let StmtKind::VarDecl(decl) = ctx.program.arena.stmt(declaration).kind.clone() else {
            return Err(unknown(format!("Not a constant: {}", info.name)));
        };
        let Some(init) = decl.init else {
            return Err(unknown(format!(
                "Constant has no initializer: {}",
                info.name
            )));
        };

        if !self.constant_eval_stack.insert(symbol) {
            return Err(hard(format!(
                "Compile-time dependency cycle detected at symbol: {}",
                info.name
            )));
        }

        // Constants evaluate in their owning instance.
        let sub_ctx = ctx.with_instance(info.instance_id);
        let result = self.eval_expr(&sub_ctx, init);
        self.constant_eval_stack.remove(&symbol);
        let mut value = result?;

        if let Some(ty) = &ctx.symbol(symbol).ty {
            value = self.coerce_value(ctx, &value, ty)?;
        }
        self.constant_cache.insert(symbol, value.clone());
        trace!("memoised constant {}", ctx.symbol(symbol).name);
        Ok(value)
    }

    fn eval_binary(
        &mut self,
        ctx: &EvalContext,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> EvalResult<CtValue> {
        let left_val = self.eval_expr(ctx, left)?;

        if op.is_logical() {
            let left_bool = left_val
                .truthiness()
                .ok_or_else(|| unknown("Unsupported operand types for logical operation"))?;
            // Short circuit.
            if op == BinaryOp::And && !left_bool {
                return Ok(CtValue::Bool(false));
            }
            if op == BinaryOp::Or && left_bool {
                return Ok(CtValue::Bool(true));
            }
            let right_val = self.eval_expr(ctx, right)?;
            let right_bool = right_val
                .truthiness()
                .ok_or_else(|| unknown("Unsupported operand types for logical operation"))?;
            return Ok(CtValue::Bool(match op {
                BinaryOp::And => left_bool && right_bool,
                _ => left_bool || right_bool,
            }));
        }

        let right_val = self.eval_expr(ctx, right)?;

        if matches!(
            op,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        ) {
            if !left_val.is_int_like() || !right_val.is_int_like() {
                return Err(unknown("Unsupported operand types for bitwise operation"));
            }
            let use_unsigned =
                matches!(left_val, CtValue::Uint(_)) || matches!(right_val, CtValue::Uint(_));
            let l = match left_val {
                CtValue::Uint(v) => v,
                CtValue::Int(v) => v as u64,
                _ => unreachable!(),
            };
            let r = match right_val {
                CtValue::Uint(v) => v,
                CtValue::Int(v) => v as u64,
                _ => unreachable!(),
            };
            let out = match op {
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                BinaryOp::BitXor => l ^ r,
                BinaryOp::Shl => l.wrapping_shl(r as u32),
                _ => l.wrapping_shr(r as u32),
            };
            return Ok(if use_unsigned {
                CtValue::Uint(out)
            } else {
                CtValue::Int(out as i64)
            });
        }

        if matches!(left_val, CtValue::Uint(_)) || matches!(right_val, CtValue::Uint(_)) {
            let l = match &left_val {
                CtValue::Uint(v) => *v,
                other => self.to_int(other)? as u64,
            };
            let r = match &right_val {
                CtValue::Uint(v) => *v,
                other => self.to_int(other)? as u64,
            };
            return match op {
                BinaryOp::Add => Ok(CtValue::Uint(l.wrapping_add(r))),
                BinaryOp::Sub => Ok(CtValue::Uint(l.wrapping_sub(r))),
                BinaryOp::Mul => Ok(CtValue::Uint(l.wrapping_mul(r))),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(hard("Division by zero in compile-time evaluation"));
                    }
                    Ok(CtValue::Uint(l / r))
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        return Err(hard("Modulo by zero in compile-time evaluation"));
                    }
                    Ok(CtValue::Uint(l % r))
                }
                BinaryOp::Eq => Ok(CtValue::Int((l == r) as i64)),
                BinaryOp::Ne => Ok(CtValue::Int((l != r) as i64)),
                BinaryOp::Lt => Ok(CtValue::Int((l < r) as i64)),
                BinaryOp::Le => Ok(CtValue::Int((l <= r) as i64)),
                BinaryOp::Gt => Ok(CtValue::Int((l > r) as i64)),
                BinaryOp::Ge => Ok(CtValue::Int((l >= r) as i64)),
                _ => Err(unknown(format!(
                    "Unsupported binary operator at compile time: {op}"
                ))),
            };
        }

        if let (CtValue::Str(l), CtValue::Str(r)) = (&left_val, &right_val) {
            return match op {
                BinaryOp::Eq => Ok(CtValue::Int((l == r) as i64)),
                BinaryOp::Ne => Ok(CtValue::Int((l != r) as i64)),
                BinaryOp::Lt => Ok(CtValue::Int((l < r) as i64)),
                BinaryOp::Le => Ok(CtValue::Int((l <= r) as i64)),
                BinaryOp::Gt => Ok(CtValue::Int((l > r) as i64)),
                BinaryOp::Ge => Ok(CtValue::Int((l >= r) as i64)),
                _ => Err(unknown(format!(
                    "Unsupported binary operator for strings at compile time: {op}"
                ))),
            };
        }

        let float_involved =
            matches!(left_val, CtValue::Float(_)) || matches!(right_val, CtValue::Float(_));
        if float_involved {
            let l = self.to_float(&left_val)?;
            let r = self.to_float(&right_val)?;
            return match op {
                BinaryOp::Add => Ok(CtValue::Float(l + r)),
                BinaryOp::Sub => Ok(CtValue::Float(l - r)),
                BinaryOp::Mul => Ok(CtValue::Float(l * r)),
                BinaryOp::Div => {
                    if r == 0.0 {
                        return Err(hard("Division by zero in compile-time evaluation"));
                    }
                    Ok(CtValue::Float(l / r))
                }
                BinaryOp::Eq => Ok(CtValue::Int((l == r) as i64)),
                BinaryOp::Ne => Ok(CtValue::Int((l != r) as i64)),
                BinaryOp::Lt => Ok(CtValue::Int((l < r) as i64)),
                BinaryOp::Le => Ok(CtValue::Int((l <= r) as i64)),
                BinaryOp::Gt => Ok(CtValue::Int((l > r) as i64)),
                BinaryOp::Ge => Ok(CtValue::Int((l >= r) as i64)),
                _ => Err(unknown(format!(
                    "Unsupported binary operator at compile time: {op}"
                ))),
            };
        }

        let l = self.to_int(&left_val)?;
        let r = self.to_int(&right_val)?;
        match op {
            BinaryOp::Add => Ok(CtValue::Int(l.wrapping_add(r))),
            BinaryOp::Sub => Ok(CtValue::Int(l.wrapping_sub(r))),
            BinaryOp::Mul => Ok(CtValue::Int(l.wrapping_mul(r))),
            BinaryOp::Div => {
                if r == 0 {
                    return Err(hard("Division by zero in compile-time evaluation"));
                }
                Ok(CtValue::Int(l.wrapping_div(r)))
            }
            BinaryOp::Mod => {
                if r == 0 {
                    return Err(hard("Modulo by zero in compile-time evaluation"));
                }
                Ok(CtValue::Int(l.wrapping_rem(r)))
            }
            BinaryOp::Eq => Ok(CtValue::Int((l == r) as i64)),
            BinaryOp::Ne => Ok(CtValue::Int((l != r) as i64)),
            BinaryOp::Lt => Ok(CtValue::Int((l < r) as i64)),
            BinaryOp::Le => Ok(CtValue::Int((l <= r) as i64)),
            BinaryOp::Gt => Ok(CtValue::Int((l > r) as i64)),
            BinaryOp::Ge => Ok(CtValue::Int((l >= r) as i64)),
            _ => Err(unknown(format!(
                "Unsupported binary operator at compile time: {op}"
            ))),
        }
    }

    fn eval_unary(&mut self, ctx: &EvalContext, op: UnaryOp, operand: ExprId) -> EvalResult<CtValue> {
        let value = self.eval_expr(ctx, operand)?;
        match (op, &value) {
            (UnaryOp::BitNot, CtValue::Uint(v)) => Ok(CtValue::Uint(!v)),
            (UnaryOp::BitNot, CtValue::Int(v)) => Ok(CtValue::Int(!v)),
            (UnaryOp::Neg, CtValue::Int(v)) => Ok(CtValue::Int(v.wrapping_neg())),
            (UnaryOp::Neg, CtValue::Float(v)) => Ok(CtValue::Float(-v)),
            (UnaryOp::Not, CtValue::Int(v)) => Ok(CtValue::Bool(*v == 0)),
            (UnaryOp::Not, CtValue::Float(v)) => Ok(CtValue::Bool(*v == 0.0)),
            (UnaryOp::Not, CtValue::Bool(v)) => Ok(CtValue::Bool(!v)),
            _ => Err(unknown("Unsupported operand type for unary operation")),
        }
    }

    fn eval_call(&mut self, ctx: &EvalContext, expr: ExprId) -> EvalResult<CtValue> {
        let ExprKind::Call {
            callee,
            receivers,
            args,
        } = ctx.program.arena.expr(expr).kind.clone()
        else {
            return Err(unknown("Not a call expression"));
        };

        let ExprKind::Identifier { name, .. } = ctx.program.arena.expr(callee).kind.clone() else {
            return Err(unknown(
                "Cannot evaluate non-identifier function calls at compile time",
            ));
        };

        let symbol = ctx
            .symbol_for_expr(callee)
            .or_else(|| ctx.bindings.lookup_global(ctx.instance, &name))
            .ok_or_else(|| unknown(format!("Symbol not found: {name}")))?;

        if ctx.symbol(symbol).kind == SymbolKind::Type {
            return self.eval_type_constructor(ctx, symbol, &name, &args);
        }

        let info = ctx.symbol(symbol);
        if info.kind != SymbolKind::Function {
            return Err(unknown(format!("Not a function: {name}")));
        }
        if info.is_external {
            return Err(unknown(
                "External functions cannot be evaluated at compile time",
            ));
        }
        let Some(declaration) = info.declaration else {
            return Err(unknown(format!("Not a function: {name}")));
        };
        let StmtKind::FuncDecl(func) = ctx.program.arena.stmt(declaration).kind.clone() else {
            return Err(unknown(format!("Not a function: {name}")));
        };

        if args.len() != func.params.len() {
            return Err(unknown("Argument count mismatch in compile-time evaluation"));
        }
        let Some(body) = func.body else {
            return Err(unknown("Function has no body"));
        };

        // Purity is path-sensitive: evaluation fails only if the executed
        // path reaches an impure operation.
        let saved_env = self.env.clone();
        let saved_uninitialized = self.uninitialized.clone();

        let mut expr_param_bindings = HashMap::new();

        if !func.ref_params.is_empty() {
            if receivers.len() != func.ref_params.len() {
                self.env = saved_env;
                self.uninitialized = saved_uninitialized;
                return Err(unknown("Receiver count mismatch in compile-time evaluation"));
            }
            for (index, ref_name) in func.ref_params.iter().enumerate() {
                let value = match self.eval_expr(ctx, receivers[index]) {
                    Ok(value) => value,
                    Err(interrupt) => {
                        self.env = saved_env;
                        self.uninitialized = saved_uninitialized;
                        return Err(interrupt);
                    }
                };
                let coerced = match func.ref_param_types.get(index).and_then(|t| t.as_ref()) {
                    Some(ty) => match self.coerce_value(ctx, &value, ty) {
                        Ok(coerced) => coerced,
                        Err(interrupt) => {
                            self.env = saved_env;
                            self.uninitialized = saved_uninitialized;
                            return Err(interrupt);
                        }
                    },
                    None => value,
                };
                self.env.insert(ref_name.clone(), coerced);
                self.uninitialized.remove(ref_name);
            }
        } else if !receivers.is_empty() {
            self.env = saved_env;
            self.uninitialized = saved_uninitialized;
            return Err(unknown("Receiver count mismatch in compile-time evaluation"));
        }

        for (index, param) in func.params.iter().enumerate() {
            if param.is_expression_param {
                // The argument is passed as syntax, not evaluated here.
                expr_param_bindings.insert(param.name.clone(), args[index]);
                continue;
            }
            let value = match self.eval_expr(ctx, args[index]) {
                Ok(value) => value,
                Err(interrupt) => {
                    self.env = saved_env;
                    self.uninitialized = saved_uninitialized;
                    return Err(interrupt);
                }
            };
            let coerced = match &param.ty {
                Some(ty) => match self.coerce_value(ctx, &value, ty) {
                    Ok(coerced) => coerced,
                    Err(interrupt) => {
                        self.env = saved_env;
                        self.uninitialized = saved_uninitialized;
                        return Err(interrupt);
                    }
                },
                None => value,
            };
            self.env.insert(param.name.clone(), coerced);
            self.uninitialized.remove(&param.name);
        }

        self.ref_param_stack
            .push(func.ref_params.iter().cloned().collect());
        let pushed_expr_params = !expr_param_bindings.is_empty();
        if pushed_expr_params {
            self.expr_param_stack.push(expr_param_bindings);
        }
        self.return_depth += 1;

        let outcome = match self.eval_expr(ctx, body) {
            Ok(value) => Ok(value),
            Err(Interrupt::Return(value)) => Ok(value),
            Err(other) => Err(other),
        };

        self.return_depth -= 1;
        if pushed_expr_params {
            self.expr_param_stack.pop();
        }
        self.ref_param_stack.pop();

        let result = outcome.and_then(|value| {
            if !func.return_types.is_empty() {
                self.coerce_tuple_return(ctx, expr, &func.return_types, value)
            } else if let Some(return_type) = &func.return_type {
                self.coerce_value(ctx, &value, return_type)
            } else {
                Ok(value)
            }
        });

        self.env = saved_env;
        self.uninitialized = saved_uninitialized;
        result
    }

    fn coerce_tuple_return(
        &mut self,
        ctx: &EvalContext,
        call: ExprId,
        return_types: &[Type],
        value: CtValue,
    ) -> EvalResult<CtValue> {
        let CtValue::Composite(composite) = value else {
            return Err(unknown("Tuple return value expected for compile-time call"));
        };
        let mut out = CtComposite::default();
        out.type_name = match &ctx.program.arena.expr(call).ty {
            Some(Type::Named(name)) => name.clone(),
            _ => composite.type_name.clone(),
        };
        for (index, return_type) in return_types.iter().enumerate() {
            let field_name = tuple_field_name(index);
            let Some(field) = composite.fields.get(&field_name) else {
                return Err(unknown(format!(
                    "Missing tuple return field in compile-time call: {field_name}"
                )));
            };
            let coerced = self.coerce_value(ctx, field, return_type)?;
            out.fields.insert(field_name, coerced);
        }
        Ok(CtValue::Composite(Rc::new(out)))
    }

    fn eval_type_constructor(
        &mut self,
        ctx: &EvalContext,
        symbol: SymbolId,
        name: &str,
        args: &[ExprId],
    ) -> EvalResult<CtValue> {
        let Some(declaration) = ctx.symbol(symbol).declaration else {
            return Err(unknown(format!("Type not found: {name}")));
        };
        let StmtKind::TypeDecl(decl) = ctx.program.arena.stmt(declaration).kind.clone() else {
            return Err(unknown("Not a type declaration"));
        };
        if args.len() != decl.fields.len() {
            return Err(unknown("Type constructor argument count mismatch"));
        }

        let mut composite = CtComposite {
            type_name: name.to_owned(),
            fields: HashMap::new(),
        };
        // Constructors are constexpr only when every field argument is.
        for (index, arg) in args.iter().enumerate() {
            let value = self.eval_expr(ctx, *arg)?;
            composite.fields.insert(decl.fields[index].name.clone(), value);
        }
        Ok(CtValue::Composite(Rc::new(composite)))
    }

    fn eval_member(&mut self, ctx: &EvalContext, operand: ExprId, field: &str) -> EvalResult<CtValue> {
        let value = self.eval_expr(ctx, operand)?;
        let CtValue::Composite(composite) = value else {
            return Err(unknown("Member access on non-composite value"));
        };
        match composite.fields.get(field) {
            Some(CtValue::Uninit) => Err(unknown(format!(
                "uninitialized field accessed at compile time: {field}"
            ))),
            Some(value) => Ok(value.clone()),
            None => Err(unknown(format!("Field not found: {field}"))),
        }
    }

    fn eval_conditional(
        &mut self,
        ctx: &EvalContext,
        condition: ExprId,
        true_expr: ExprId,
        false_expr: ExprId,
    ) -> EvalResult<CtValue> {
        let cond = self.eval_expr(ctx, condition)?;
        let is_true = cond
            .truthiness()
            .ok_or_else(|| unknown("Conditional expression condition must be a scalar value"))?;
        if is_true {
            self.eval_expr(ctx, true_expr)
        } else {
            self.eval_expr(ctx, false_expr)
        }
    }

    fn eval_cast(&mut self, ctx: &EvalContext, target: &Type, operand: ExprId) -> EvalResult<CtValue> {
        let value = self.eval_expr(ctx, operand)?;
        let operand_type = ctx.program.arena.expr(operand).ty.clone();

        // Primitive-to-byte-array conversion, big-endian.
        if let Type::Array { element, size } = target {
            if matches!(**element, Type::Primitive(Primitive::U8)) {
                if let Some(Type::Primitive(source)) = &operand_type {
                    if !source.is_float() {
                        let Some(size) = size else {
                            return Err(unknown("Array length must be a compile-time constant"));
                        };
                        let length = match self.eval_expr(ctx, *size)? {
                            CtValue::Int(v) => v,
                            CtValue::Uint(v) => v as i64,
                            _ => {
                                return Err(unknown(
                                    "Array length must be a compile-time constant",
                                ))
                            }
                        };
                        let bits = source.bits().unwrap_or(0) as i64;
                        if length < 0 || bits / 8 != length {
                            return Err(unknown("Array length/type size mismatch in cast"));
                        }
                        let mut value_bits = match value {
                            CtValue::Uint(v) => v,
                            CtValue::Int(v) => v as u64,
                            CtValue::Bool(v) => v as u64,
                            _ => {
                                return Err(unknown(
                                    "Unsupported operand type for byte array cast",
                                ))
                            }
                        };
                        if bits < 64 {
                            value_bits &= (1u64 << bits) - 1;
                        }
                        let mut array = CtArray::default();
                        for i in 0..length {
                            let shift = (length - 1 - i) * 8;
                            array
                                .elements
                                .push(CtValue::Uint((value_bits >> shift) & 0xFF));
                        }
                        return Ok(CtValue::Array(Rc::new(array)));
                    }
                }
            }
        }

        // Boolean arrays pack into unsigned integers, most significant bit
        // first.
        if let Type::Primitive(prim) = target {
            if prim.is_unsigned_int() {
                if let Some(Type::Array { element, .. }) = &operand_type {
                    if matches!(**element, Type::Primitive(Primitive::Bool)) {
                        let CtValue::Array(array) = &value else {
                            return Err(unknown("Boolean array cast requires compile-time array"));
                        };
                        let length = array.elements.len() as u32;
                        if length == 0 || Some(length) != prim.bits() {
                            return Err(unknown(format!(
                                "Boolean array size mismatch for cast to #{}",
                                prim.name()
                            )));
                        }
                        let mut out = 0u64;
                        for (i, element) in array.elements.iter().enumerate() {
                            let bit = element.truthiness().ok_or_else(|| {
                                unknown("Boolean array contains non-boolean value")
                            })?;
                            if bit {
                                out |= 1 << (length as usize - 1 - i);
                            }
                        }
                        return Ok(CtValue::Uint(out));
                    }
                }
            }
        }

        let Type::Primitive(prim) = target else {
            return Err(unknown("Can only cast to primitive types at compile time"));
        };
        if prim.is_signed_int() {
            Ok(CtValue::Int(self.to_int(&value)?))
        } else if prim.is_unsigned_int() {
            Ok(CtValue::Uint(self.to_int(&value)? as u64))
        } else if prim.is_float() {
            Ok(CtValue::Float(self.to_float(&value)?))
        } else if *prim == Primitive::Bool {
            Ok(CtValue::Bool(self.to_int(&value)? != 0))
        } else {
            Err(unknown("Unsupported cast type at compile time"))
        }
    }

    fn eval_assignment(&mut self, ctx: &EvalContext, expr: ExprId) -> EvalResult<CtValue> {
        let ExprKind::Assignment {
            target,
            value,
            creates_new_variable,
            declared_type,
        } = ctx.program.arena.expr(expr).kind.clone()
        else {
            return Err(unknown("Not an assignment"));
        };

        let rhs = self.eval_expr(ctx, value)?;

        let creates_local_identifier = creates_new_variable
            && matches!(
                ctx.program.arena.expr(target).kind,
                ExprKind::Identifier { .. }
            );

        let base = self.base_identifier(ctx, target);
        if let Some(base) = &base {
            if base == LOOP_VAR {
                return Err(hard("Cannot assign to read-only loop variable '_'"));
            }
            if self.is_ref_param(base) {
                return Err(hard(format!("Cannot mutate receiver at compile time: {base}")));
            }
            let is_local = self.env.contains_key(base) || self.uninitialized.contains(base);
            if !creates_local_identifier && !is_local {
                if let Some(symbol) = ctx.bindings.lookup_global(ctx.instance, base) {
                    let info = ctx.symbol(symbol);
                    if !info.is_mutable {
                        return Err(hard(format!(
                            "Cannot assign to immutable constant: {base}"
                        )));
                    }
                    if info.kind == SymbolKind::Variable && info.is_mutable {
                        return Err(unknown(format!(
                            "Cannot modify mutable globals at compile time: {base}"
                        )));
                    }
                }
            }
        }

        let mut assign_val = rhs;
        let assignment_type = declared_type.or_else(|| ctx.program.arena.expr(expr).ty.clone());
        if let Some(ty) = &assignment_type {
            assign_val = self.coerce_value(ctx, &assign_val, ty)?;
        }

        // Collect the selector path; index expressions evaluate before the
        // write.
        let mut selectors = vec![];
        let mut cursor = target;
        loop {
            match ctx.program.arena.expr(cursor).kind.clone() {
                ExprKind::Identifier { name, .. } => {
                    if creates_local_identifier
                        && !self.env.contains_key(&name)
                        && !self.uninitialized.contains(&name)
                    {
                        self.env.insert(name.clone(), CtValue::Uninit);
                    }
                    if !self.env.contains_key(&name) {
                        // Writes may materialise a slot without reading the
                        // prior value.
                        self.env.insert(name.clone(), CtValue::Uninit);
                    }
                    selectors.reverse();
                    let mut slot = self
                        .env
                        .remove(&name)
                        .expect("slot was just materialised");
                    let write = Self::write_path(&mut slot, &selectors, assign_val.clone());
                    self.env.insert(name.clone(), slot);
                    write?;
                    self.uninitialized.remove(&name);
                    return Ok(assign_val);
                }
                ExprKind::Member { operand, field } => {
                    selectors.push(Selector::Field(field));
                    cursor = operand;
                }
                ExprKind::Index { operand, index } => {
                    let idx = match self.eval_expr(ctx, index)? {
                        CtValue::Int(v) => v,
                        CtValue::Uint(v) => v as i64,
                        CtValue::Bool(v) => v as i64,
                        other => {
                            return Err(unknown(format!(
                                "Index must be an integer/bool constant, got {}",
                                other.kind_name()
                            )))
                        }
                    };
                    if idx < 0 {
                        return Err(hard("Index cannot be negative"));
                    }
                    selectors.push(Selector::Index(idx as usize));
                    cursor = operand;
                }
                _ => {
                    return Err(unknown(
                        "Assignment target is not addressable at compile time",
                    ))
                }
            }
        }
    }

    /// Walk an lvalue path into a value, forking every shared node touched
    /// on the way down, then write the leaf.
    fn write_path(slot: &mut CtValue, path: &[Selector], value: CtValue) -> EvalResult<()> {
        let Some(first) = path.first() else {
            *slot = value;
            return Ok(());
        };
        match (slot, first) {
            (CtValue::Composite(rc), Selector::Field(name)) => {
                let composite = Rc::make_mut(rc);
                let Some(field) = composite.fields.get_mut(name) else {
                    return Err(unknown(format!("Field not found: {name}")));
                };
                Self::write_path(field, &path[1..], value)
            }
            (CtValue::Array(rc), Selector::Index(index)) => {
                let array = Rc::make_mut(rc);
                let Some(element) = array.elements.get_mut(*index) else {
                    return Err(hard("Index out of bounds in compile-time evaluation"));
                };
                Self::write_path(element, &path[1..], value)
            }
            (_, Selector::Field(_)) => Err(unknown("Member access on non-composite value")),
            (_, Selector::Index(_)) => Err(unknown("Indexing non-array value at compile time")),
        }
    }

    fn eval_range(&mut self, ctx: &EvalContext, start: ExprId, end: ExprId) -> EvalResult<CtValue> {
        let start_val = self.eval_expr(ctx, start)?;
        let end_val = self.eval_expr(ctx, end)?;
        let to_bound = |value: &CtValue| match value {
            CtValue::Int(v) => Some(*v),
            CtValue::Uint(v) => Some(*v as i64),
            _ => None,
        };
        let (Some(start), Some(end)) = (to_bound(&start_val), to_bound(&end_val)) else {
            return Err(unknown("Range bounds must be integer constants"));
        };
        if start == end {
            return Err(hard("Range cannot produce an empty array"));
        }

        let mut array = CtArray::default();
        if start < end {
            for v in start..end {
                array.elements.push(CtValue::Int(v));
            }
        } else {
            let mut v = start;
            while v > end {
                array.elements.push(CtValue::Int(v));
                v -= 1;
            }
        }
        Ok(CtValue::Array(Rc::new(array)))
    }

    fn eval_index(&mut self, ctx: &EvalContext, operand: ExprId, index: ExprId) -> EvalResult<CtValue> {
        let container = self.eval_expr(ctx, operand)?;
        let index_val = self.eval_expr(ctx, index)?;
        let idx = match index_val {
            CtValue::Int(v) => v,
            CtValue::Uint(v) => v as i64,
            CtValue::Bool(v) => v as i64,
            other => {
                return Err(unknown(format!(
                    "Index must be an integer/bool constant, got {}",
                    other.kind_name()
                )))
            }
        };
        if idx < 0 {
            return Err(hard("Index cannot be negative"));
        }
        let idx = idx as usize;

        match container {
            CtValue::Array(array) => match array.elements.get(idx) {
                Some(CtValue::Uninit) => Err(unknown(
                    "uninitialized array element accessed at compile time",
                )),
                Some(value) => Ok(value.clone()),
                None => Err(hard("Index out of bounds in compile-time evaluation")),
            },
            CtValue::Str(string) => match string.as_bytes().get(idx) {
                Some(byte) => Ok(CtValue::Uint(*byte as u64)),
                None => Err(hard("Index out of bounds in compile-time evaluation")),
            },
            _ => Err(unknown("Indexing non-array value at compile time")),
        }
    }

    fn eval_iteration(
        &mut self,
        ctx: &EvalContext,
        subject: ExprId,
        body: ExprId,
        sorted: bool,
    ) -> EvalResult<CtValue> {
        let iterable = self.eval_expr(ctx, subject)?;
        let CtValue::Array(array) = iterable else {
            return Err(unknown("Iteration requires compile-time array or range"));
        };

        let mut elements = array.elements.clone();
        if sorted && elements.len() > 1 {
            let kind = elements[0].kind_name();
            if elements.iter().any(|e| e.kind_name() != kind) {
                return Err(unknown(
                    "Sorted iteration requires uniform scalar element types",
                ));
            }
            match &elements[0] {
                CtValue::Int(_) => elements.sort_by_key(|e| match e {
                    CtValue::Int(v) => *v,
                    _ => 0,
                }),
                CtValue::Uint(_) => elements.sort_by_key(|e| match e {
                    CtValue::Uint(v) => *v,
                    _ => 0,
                }),
                CtValue::Bool(_) => elements.sort_by_key(|e| match e {
                    CtValue::Bool(v) => *v,
                    _ => false,
                }),
                CtValue::Float(_) => elements.sort_by(|a, b| {
                    let (CtValue::Float(x), CtValue::Float(y)) = (a, b) else {
                        return std::cmp::Ordering::Equal;
                    };
                    x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal)
                }),
                CtValue::Str(_) => elements.sort_by(|a, b| {
                    let (CtValue::Str(x), CtValue::Str(y)) = (a, b) else {
                        return std::cmp::Ordering::Equal;
                    };
                    x.cmp(y)
                }),
                _ => {
                    return Err(unknown(
                        "Sorted iteration not supported for composite values at compile time",
                    ))
                }
            }
        }

        let saved_loop_var = self.env.get(LOOP_VAR).cloned();
        let saved_uninit = self.uninitialized.contains(LOOP_VAR);

        self.loop_depth += 1;
        let mut outcome = Ok(());
        for element in elements {
            self.env.insert(LOOP_VAR.to_owned(), element);
            self.uninitialized.remove(LOOP_VAR);
            match self.eval_expr(ctx, body) {
                Ok(_) => {}
                Err(Interrupt::Continue) => continue,
                Err(Interrupt::Break) => break,
                Err(other) => {
                    outcome = Err(other);
                    break;
                }
            }
        }
        self.loop_depth -= 1;

        match saved_loop_var {
            Some(value) => {
                self.env.insert(LOOP_VAR.to_owned(), value);
            }
            None => {
                self.env.remove(LOOP_VAR);
            }
        }
        if saved_uninit {
            self.uninitialized.insert(LOOP_VAR.to_owned());
        } else {
            self.uninitialized.remove(LOOP_VAR);
        }

        outcome?;
        Ok(CtValue::Int(0))
    }

    fn eval_repeat(&mut self, ctx: &EvalContext, condition: ExprId, body: ExprId) -> EvalResult<CtValue> {
        self.loop_depth += 1;
        let mut iterations = 0usize;
        let outcome = loop {
            let cond = match self.eval_expr(ctx, condition) {
                Ok(value) => value,
                Err(interrupt) => break Err(interrupt),
            };
            let Some(is_true) = cond.truthiness() else {
                break Err(unknown("Repeat condition must be a scalar value"));
            };
            if !is_true {
                break Ok(());
            }

            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                break Err(hard("Repeat loop exceeded compile-time iteration limit"));
            }

            match self.eval_expr(ctx, body) {
                Ok(_) => {}
                Err(Interrupt::Continue) => continue,
                Err(Interrupt::Break) => break Ok(()),
                Err(other) => break Err(other),
            }
        };
        self.loop_depth -= 1;
        outcome?;
        Ok(CtValue::Int(0))
    }

    fn eval_length(&mut self, ctx: &EvalContext, operand: ExprId) -> EvalResult<CtValue> {
        match self.eval_expr(ctx, operand) {
            Ok(CtValue::Array(array)) => return Ok(CtValue::Int(array.elements.len() as i64)),
            Ok(CtValue::Str(string)) => return Ok(CtValue::Int(string.len() as i64)),
            _ => {}
        }

        // Fall back to the statically-known array size.
        if let Some(Type::Array {
            size: Some(size), ..
        }) = &ctx.program.arena.expr(operand).ty
        {
            match self.eval_expr(ctx, *size)? {
                CtValue::Int(v) => return Ok(CtValue::Int(v)),
                CtValue::Uint(v) => return Ok(CtValue::Int(v as i64)),
                _ => {}
            }
        }
        Err(unknown("Length requires array or string at compile time"))
    }

    fn eval_block(&mut self, ctx: &EvalContext, expr: ExprId) -> EvalResult<CtValue> {
        let ExprKind::Block { statements, result } = ctx.program.arena.expr(expr).kind.clone()
        else {
            return Err(unknown("Not a block"));
        };

        // Locals introduced inside the block shadow outer names; restore on
        // exit regardless of outcome. Desugared multi-assignment blocks are
        // scope-transparent: their targets live in the enclosing scope.
        let transparent = statements.first().is_some_and(|first| {
            matches!(
                &ctx.program.arena.stmt(*first).kind,
                StmtKind::VarDecl(decl) if decl.name.starts_with(crate::ast::TUPLE_TMP_PREFIX)
            )
        });
        let mut shadows: HashMap<String, (Option<CtValue>, bool)> = HashMap::new();

        let outcome = (|| -> EvalResult<CtValue> {
            for stmt in &statements {
                if transparent {
                    let mut ignored = HashMap::new();
                    self.eval_stmt(ctx, *stmt, &mut ignored)?;
                    ignored.clear();
                } else {
                    self.eval_stmt(ctx, *stmt, &mut shadows)?;
                }
            }
            match result {
                Some(result) => self.eval_expr(ctx, result),
                None => Ok(CtValue::Int(0)),
            }
        })();

        for (name, (value, was_uninitialized)) in shadows {
            match value {
                Some(value) => {
                    self.env.insert(name.clone(), value);
                }
                None => {
                    self.env.remove(&name);
                }
            }
            if was_uninitialized {
                self.uninitialized.insert(name);
            } else {
                self.uninitialized.remove(&name);
            }
        }

        outcome
    }

    fn remember_local(
        &self,
        name: &str,
        shadows: &mut HashMap<String, (Option<CtValue>, bool)>,
    ) {
        if name.is_empty() || shadows.contains_key(name) {
            return;
        }
        shadows.insert(
            name.to_owned(),
            (
                self.env.get(name).cloned(),
                self.uninitialized.contains(name),
            ),
        );
    }

    fn eval_stmt(
        &mut self,
        ctx: &EvalContext,
        stmt: StmtId,
        shadows: &mut HashMap<String, (Option<CtValue>, bool)>,
    ) -> EvalResult<()> {
        match ctx.program.arena.stmt(stmt).kind.clone() {
            StmtKind::Expr(expr) => {
                if let ExprKind::Assignment {
                    target,
                    creates_new_variable: true,
                    ..
                } = &ctx.program.arena.expr(expr).kind
                {
                    if let ExprKind::Identifier { name, .. } = &ctx.program.arena.expr(*target).kind
                    {
                        self.remember_local(name, shadows);
                    }
                }
                self.eval_expr(ctx, expr)?;
                Ok(())
            }
            StmtKind::VarDecl(decl) => {
                self.remember_local(&decl.name, shadows);
                match decl.init {
                    Some(init) => {
                        let value = self.eval_expr(ctx, init)?;
                        let stored = match &decl.ty {
                            Some(ty) => self.coerce_value(ctx, &value, ty)?,
                            None => value,
                        };
                        self.env.insert(decl.name.clone(), stored);
                        self.uninitialized.remove(&decl.name);
                        Ok(())
                    }
                    None => self.declare_uninitialized_local(ctx, &decl),
                }
            }
            StmtKind::CondStmt { condition, body } => {
                let cond = self.eval_expr(ctx, condition)?;
                let is_true = cond.truthiness().ok_or_else(|| {
                    unknown("Conditional expression condition must be a scalar value")
                })?;
                if is_true {
                    self.eval_stmt(ctx, body, shadows)?;
                }
                Ok(())
            }
            StmtKind::Return(value) => {
                let Some(value) = value else {
                    return Err(unknown(
                        "Return statement requires an expression at compile time",
                    ));
                };
                let value = self.eval_expr(ctx, value)?;
                Err(Interrupt::Return(value))
            }
            StmtKind::Break => {
                if self.loop_depth > 0 {
                    Err(Interrupt::Break)
                } else {
                    Err(unknown("Break used outside of loop in compile-time evaluation"))
                }
            }
            StmtKind::Continue => {
                if self.loop_depth > 0 {
                    Err(Interrupt::Continue)
                } else {
                    Err(unknown(
                        "Continue used outside of loop in compile-time evaluation",
                    ))
                }
            }
            StmtKind::FuncDecl(_)
            | StmtKind::TypeDecl(_)
            | StmtKind::Import(_) => Ok(()),
        }
    }

    /// Give a declared-but-uninitialised local its storage shape: arrays
    /// and composites get slots filled with `Uninit`, scalars are tracked
    /// by name.
    fn declare_uninitialized_local(
        &mut self,
        ctx: &EvalContext,
        decl: &crate::ast::VarDecl,
    ) -> EvalResult<()> {
        let Some(ty) = &decl.ty else {
            self.uninitialized.insert(decl.name.clone());
            return Ok(());
        };

        match ty {
            Type::Array { size, .. } => {
                let Some(size) = size else {
                    return Err(unknown("Array local requires compile-time size"));
                };
                let size = match self.eval_expr(ctx, *size)? {
                    CtValue::Int(v) => v,
                    CtValue::Uint(v) => v as i64,
                    _ => return Err(unknown("Array local size must be an integer constant")),
                };
                if size < 0 {
                    return Err(unknown("Array local size cannot be negative"));
                }
                let array = CtArray {
                    elements: vec![CtValue::Uninit; size as usize],
                };
                self.env.insert(decl.name.clone(), CtValue::Array(Rc::new(array)));
                self.uninitialized.remove(&decl.name);
                Ok(())
            }
            Type::Named(name) if !name.starts_with(TUPLE_TYPE_PREFIX) => {
                let type_symbol = ctx.bindings.lookup_global(ctx.instance, name);
                let fields = type_symbol
                    .and_then(|sym| ctx.symbol(sym).declaration)
                    .and_then(|decl_stmt| match &ctx.program.arena.stmt(decl_stmt).kind {
                        StmtKind::TypeDecl(type_decl) => Some(
                            type_decl
                                .fields
                                .iter()
                                .map(|f| f.name.clone())
                                .collect::<Vec<_>>(),
                        ),
                        _ => None,
                    });
                match fields {
                    Some(fields) => {
                        let mut composite = CtComposite {
                            type_name: name.clone(),
                            fields: HashMap::new(),
                        };
                        for field in fields {
                            composite.fields.insert(field, CtValue::Uninit);
                        }
                        self.env
                            .insert(decl.name.clone(), CtValue::Composite(Rc::new(composite)));
                        self.uninitialized.remove(&decl.name);
                        Ok(())
                    }
                    None => {
                        self.uninitialized.insert(decl.name.clone());
                        Ok(())
                    }
                }
            }
            _ => {
                self.uninitialized.insert(decl.name.clone());
                Ok(())
            }
        }
    }

    /// Coerce a value into a declared type's storage shape.
    fn coerce_value(&mut self, ctx: &EvalContext, input: &CtValue, ty: &Type) -> EvalResult<CtValue> {
        if matches!(input, CtValue::Uninit) {
            return Ok(CtValue::Uninit);
        }
        match ty {
            Type::Var(_) => Ok(input.clone()),
            Type::Primitive(prim) => {
                if prim.is_signed_int() {
                    Ok(CtValue::Int(self.to_int(input)?))
                } else if prim.is_unsigned_int() {
                    Ok(CtValue::Uint(self.to_int(input)? as u64))
                } else if prim.is_float() {
                    Ok(CtValue::Float(self.to_float(input)?))
                } else if *prim == Primitive::Bool {
                    Ok(CtValue::Bool(self.to_int(input)? != 0))
                } else {
                    match input {
                        CtValue::Str(_) => Ok(input.clone()),
                        _ => Err(unknown("Type mismatch in compile-time coercion to string")),
                    }
                }
            }
            Type::Array { element, size } => {
                let CtValue::Array(array) = input else {
                    return Err(unknown("Type mismatch in compile-time coercion to array"));
                };
                if let Some(size) = size {
                    let expected = match self.eval_expr(ctx, *size)? {
                        CtValue::Int(v) => v,
                        CtValue::Uint(v) => v as i64,
                        _ => {
                            return Err(unknown(
                                "Array size must be integer in compile-time coercion",
                            ))
                        }
                    };
                    if expected < 0 || expected as usize != array.elements.len() {
                        return Err(unknown("Array size mismatch in compile-time coercion"));
                    }
                }
                let mut out = CtArray::default();
                for item in &array.elements {
                    out.elements.push(self.coerce_value(ctx, item, element)?);
                }
                Ok(CtValue::Array(Rc::new(out)))
            }
            Type::Named(name) => {
                let CtValue::Composite(composite) = input else {
                    return Err(unknown(
                        "Type mismatch in compile-time coercion to named type",
                    ));
                };
                let type_symbol = ctx.bindings.lookup_global(ctx.instance, name);
                let decl = type_symbol
                    .and_then(|sym| ctx.symbol(sym).declaration)
                    .and_then(|stmt| match &ctx.program.arena.stmt(stmt).kind {
                        StmtKind::TypeDecl(type_decl) => Some(type_decl.clone()),
                        _ => None,
                    });
                if let Some(decl) = decl {
                    let mut out = CtComposite {
                        type_name: name.clone(),
                        fields: HashMap::new(),
                    };
                    for field in &decl.fields {
                        let Some(value) = composite.fields.get(&field.name) else {
                            return Err(unknown(format!(
                                "Missing field in compile-time coercion: {}",
                                field.name
                            )));
                        };
                        let coerced = match &field.ty {
                            Some(field_ty) => self.coerce_value(ctx, value, field_ty)?,
                            None => value.clone(),
                        };
                        out.fields.insert(field.name.clone(), coerced);
                    }
                    return Ok(CtValue::Composite(Rc::new(out)));
                }
                // Lowered tuple temporaries are compiler-internal named
                // composites; exact-name passthrough is allowed.
                if name.starts_with(TUPLE_TYPE_PREFIX) && composite.type_name == *name {
                    return Ok(input.clone());
                }
                Err(unknown(format!(
                    "Named type must be resolved for compile-time coercion: {name}"
                )))
            }
        }
    }

    fn to_int(&self, value: &CtValue) -> EvalResult<i64> {
        match value {
            CtValue::Int(v) => Ok(*v),
            CtValue::Uint(v) => Ok(*v as i64),
            CtValue::Float(v) => Ok(*v as i64),
            CtValue::Bool(v) => Ok(*v as i64),
            other => Err(hard(format!(
                "Cannot convert value to integer in compile-time evaluation ({})",
                other.kind_name()
            ))),
        }
    }

    fn to_float(&self, value: &CtValue) -> EvalResult<f64> {
        match value {
            CtValue::Float(v) => Ok(*v),
            CtValue::Int(v) => Ok(*v as f64),
            CtValue::Uint(v) => Ok(*v as f64),
            CtValue::Bool(v) => Ok(*v as i64 as f64),
            other => Err(hard(format!(
                "Cannot convert value to float in compile-time evaluation ({})",
                other.kind_name()
            ))),
        }
    }

    fn is_ref_param(&self, name: &str) -> bool {
        self.ref_param_stack
            .last()
            .is_some_and(|frame| frame.contains(name))
    }

    fn base_identifier(&self, ctx: &EvalContext, expr: ExprId) -> Option<String> {
        let mut cursor = expr;
        loop {
            match &ctx.program.arena.expr(cursor).kind {
                ExprKind::Identifier { name, .. } => return Some(name.clone()),
                ExprKind::Member { operand, .. } | ExprKind::Index { operand, .. } => {
                    cursor = *operand;
                }
                _ => return None,
            }
        }
    }
}
