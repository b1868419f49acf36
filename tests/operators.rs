use sable_lang::{
    ast::{ExprKind, StmtKind},
    evaluator::{CtValue, CteQuery},
    loader::{load_source, Program},
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
};

fn frontend(source: &str) -> (Program, Bindings) {
    let mut program = load_source(source, "main.sbl").expect("parse failed");
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").expect("resolution failed");
    {
        let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
        checker.check_program().expect("type checking failed");
    }
    (program, bindings)
}

fn body_statements(program: &Program, func_name: &str) -> Vec<sable_lang::ast::StmtId> {
    for stmt in &program.instance(0).top_level {
        if let StmtKind::FuncDecl(func) = &program.arena.stmt(*stmt).kind {
            if func.name == func_name {
                let ExprKind::Block { statements, .. } =
                    &program.arena.expr(func.body.expect("body")).kind
                else {
                    panic!("expected block body");
                };
                return statements.clone();
            }
        }
    }
    panic!("function {func_name} not found");
}

#[test]
fn operator_on_named_type_rewrites_to_method_call() {
    let (program, bindings) = frontend(
        "#Vec2(x: #i32, y: #i32);\n\
         &(self)#Vec2::+(other: #Vec2) -> #Vec2 { -> Vec2(self.x + other.x, self.y + other.y); }\n\
         &main() -> #i32 { a = Vec2(1, 2); b = Vec2(3, 4); c = a + b; -> c.x; }",
    );

    // The third statement was `c = a + b`; its RHS must now be a call with
    // one receiver, bound to Vec2::+.
    let statements = body_statements(&program, "main");
    let StmtKind::Expr(assign) = &program.arena.stmt(statements[2]).kind else {
        panic!("expected assignment statement");
    };
    let ExprKind::Assignment { value, .. } = &program.arena.expr(*assign).kind else {
        panic!("expected assignment");
    };
    let ExprKind::Call {
        callee, receivers, ..
    } = &program.arena.expr(*value).kind
    else {
        panic!("operator was not rewritten to a call");
    };
    assert_eq!(receivers.len(), 1);
    let symbol = bindings.lookup_expr(0, *callee).expect("callee bound");
    assert_eq!(bindings.symbol(symbol).name, "Vec2::+");
}

#[test]
fn overloaded_operator_folds_through_the_method() {
    let mut program = load_source(
        "#Vec2(x: #i32, y: #i32);\n\
         &(self)#Vec2::+(other: #Vec2) -> #Vec2 { -> Vec2(self.x + other.x, self.y + other.y); }\n\
         &combine() -> #i32 { a = Vec2(1, 2); b = Vec2(3, 4); c = a + b; -> c.x; }\n\
         z = combine();",
        "main.sbl",
    )
    .unwrap();
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").unwrap();
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().unwrap();

    let init = checker
        .program
        .instance(0)
        .top_level
        .iter()
        .find_map(|stmt| match &checker.program.arena.stmt(*stmt).kind {
            StmtKind::VarDecl(decl) if decl.name == "z" => decl.init,
            _ => None,
        })
        .expect("z initializer");
    assert_eq!(
        checker.query_constexpr(init),
        CteQuery::Known(CtValue::Int(4))
    );
}

#[test]
fn custom_iteration_lowers_to_method_call() {
    let (program, bindings) = frontend(
        "#Counter(limit: #i32);\n\
         &(self)#Counter::@($body) { i = 0; (i < self.limit) @ { i = i + 1; $body; }; }\n\
         &main() -> #i32 { c = Counter(3); c @ { t = 1; }; -> 0; }",
    );

    let statements = body_statements(&program, "main");
    let StmtKind::Expr(lowered) = &program.arena.stmt(statements[1]).kind else {
        panic!("expected expression statement");
    };
    let ExprKind::Call {
        callee, receivers, args,
    } = &program.arena.expr(*lowered).kind
    else {
        panic!("iteration was not lowered to a call");
    };
    assert_eq!(receivers.len(), 1);
    assert_eq!(args.len(), 1, "the body travels as the only argument");
    let symbol = bindings.lookup_expr(0, *callee).expect("callee bound");
    assert_eq!(bindings.symbol(symbol).name, "Counter::@");
}

#[test]
fn iteration_over_unsupported_named_type_reports_missing_iterator() {
    let mut program = load_source(
        "#Bare(v: #i32);\n\
         &main() -> #i32 { b = Bare(1); b @ { t = 1; }; -> 0; }",
        "main.sbl",
    )
    .unwrap();
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").unwrap();
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    let err = checker.check_program().unwrap_err();
    assert!(err.message.contains("is not iterable"), "{err}");
}

#[test]
fn iterator_method_requires_one_expression_parameter() {
    let mut program = load_source(
        "#Counter(limit: #i32);\n\
         &(self)#Counter::@(n: #i32) { t = n; }\n\
         &main() -> #i32 { c = Counter(3); c @ { t = 1; }; -> 0; }",
        "main.sbl",
    )
    .unwrap();
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").unwrap();
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    let err = checker.check_program().unwrap_err();
    assert!(
        err.message
            .contains("must take exactly one expression parameter"),
        "{err}"
    );
}
