use sable_lang::{
    ast::StmtKind,
    evaluator::{CtValue, CteQuery},
    loader::load_source,
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
};

/// Run the frontend over `source`, then query the initializer of the
/// top-level variable named `name`.
fn query_init(source: &str, name: &str) -> CteQuery {
    let mut program = load_source(source, "main.sbl").expect("parse failed");
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").expect("resolution failed");
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");

    let init = checker
        .program
        .instance(0)
        .top_level
        .iter()
        .find_map(|stmt| match &checker.program.arena.stmt(*stmt).kind {
            StmtKind::VarDecl(decl) if decl.name == name => decl.init,
            _ => None,
        })
        .expect("variable with initializer");
    checker.query_constexpr(init)
}

#[test]
fn repeat_loop_counts_to_ten() {
    let result = query_init(
        "&count() -> #i8 { i = 0; (i < 10) @ { i = i + 1; }; -> i; }\n\
         n = count();",
        "n",
    );
    assert_eq!(result, CteQuery::Known(CtValue::Int(10)));
}

#[test]
fn ranges_enumerate_in_both_directions() {
    let up = query_init("up = 0..3;", "up");
    let CteQuery::Known(CtValue::Array(array)) = up else {
        panic!("expected known array, got {up:?}");
    };
    let values: Vec<&CtValue> = array.elements.iter().collect();
    assert_eq!(
        values,
        vec![&CtValue::Int(0), &CtValue::Int(1), &CtValue::Int(2)]
    );

    let down = query_init("down = 3..0;", "down");
    let CteQuery::Known(CtValue::Array(array)) = down else {
        panic!("expected known array, got {down:?}");
    };
    let values: Vec<&CtValue> = array.elements.iter().collect();
    assert_eq!(
        values,
        vec![&CtValue::Int(3), &CtValue::Int(2), &CtValue::Int(1)]
    );
}

#[test]
fn division_by_zero_is_a_hard_error() {
    let result = query_init("&f(d: #i8) -> #i8 { -> 8 / d; }\nz = f(0);", "z");
    let CteQuery::Error(message) = result else {
        panic!("expected hard error, got {result:?}");
    };
    assert!(message.contains("Division by zero"), "{message}");
}

#[test]
fn out_of_bounds_index_is_a_hard_error() {
    let result = query_init("xs = [1, 2];\nz = xs[5];", "z");
    let CteQuery::Error(message) = result else {
        panic!("expected hard error, got {result:?}");
    };
    assert!(message.contains("out of bounds"), "{message}");
}

#[test]
fn constant_dependency_cycles_are_hard_errors() {
    let result = query_init("a = f();\n&f() -> #i8 { -> a; }", "a");
    let CteQuery::Error(message) = result else {
        panic!("expected hard error, got {result:?}");
    };
    assert!(message.contains("cycle"), "{message}");
}

#[test]
fn external_calls_are_unknown_not_errors() {
    let result = query_init("&!host(x: #i8) -> #i8;\nz = host(1);", "z");
    assert!(
        matches!(result, CteQuery::Unknown(_)),
        "external call should be unknown, got {result:?}"
    );
}

#[test]
fn mutable_globals_disqualify_folding() {
    let result = query_init("g: #i8;\n&f() -> #i8 { -> g; }\nz = f();", "z");
    assert!(
        matches!(result, CteQuery::Unknown(_)),
        "mutable global read should be unknown, got {result:?}"
    );
}

#[test]
fn dead_impure_branch_does_not_disqualify() {
    // Purity is path-sensitive: the condition is false, so the external
    // call is never reached.
    let result = query_init(
        "&!host() -> #i8;\n\
         &f(c: #b) -> #i8 { -> c ? host() : 7; }\n\
         z = f(false);",
        "z",
    );
    assert_eq!(result, CteQuery::Known(CtValue::Int(7)));
}

#[test]
fn expression_parameters_substitute_syntactically() {
    let result = query_init(
        "&twice($e) -> #i8 { -> $e + $e; }\n\
         z = twice(3);",
        "z",
    );
    assert_eq!(result, CteQuery::Known(CtValue::Int(6)));
}

#[test]
fn composite_writes_fork_shared_values() {
    // `q` is initialised from `p`, then `p` is modified through a member
    // write inside the function; the cached copy must not change.
    let result = query_init(
        "#Point(x: #i8, y: #i8);\n\
         &f() -> #i8 {\n\
           p = Point(1, 2);\n\
           q = p;\n\
           p.x = 9;\n\
           -> q.x + p.x;\n\
         }\n\
         z = f();",
        "z",
    );
    assert_eq!(result, CteQuery::Known(CtValue::Int(10)));
}

#[test]
fn tuple_returns_and_multi_assignment_fold() {
    let result = query_init(
        "&pair() -> (#i8, #i8) { -> (1, 2); }\n\
         &sum() -> #i8 { a, b = pair(); -> a + b; }\n\
         z = sum();",
        "z",
    );
    assert_eq!(result, CteQuery::Known(CtValue::Int(3)));
}

#[test]
fn receiver_mutation_is_rejected_at_compile_time() {
    let result = query_init(
        "#Box(v: #i8);\n\
         &(self)#Box::poke() -> #i8 { self.v = 9; -> self.v; }\n\
         &f() -> #i8 { b = Box(1); -> b.poke(); }\n\
         z = f();",
        "z",
    );
    let CteQuery::Error(message) = result else {
        panic!("expected hard error, got {result:?}");
    };
    assert!(message.contains("receiver"), "{message}");
}

#[test]
fn sorted_iteration_visits_elements_in_order() {
    let result = query_init(
        "&f() -> #i8 { last = 0; [3, 1, 2] @@ { last = _; }; -> last; }\n\
         z = f();",
        "z",
    );
    assert_eq!(result, CteQuery::Known(CtValue::Int(3)));
}
