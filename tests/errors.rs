use sable_lang::{
    loader::load_source,
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
};

fn check_err(source: &str) -> sable_lang::error::CompileError {
    let mut program = load_source(source, "main.sbl").expect("parse failed");
    let mut bindings = Bindings::new();
    if let Err(err) = resolve_program(&mut program, &mut bindings, "") {
        return err;
    }
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker
        .check_program()
        .expect_err("expected a compile error")
}

fn check_ok(source: &str) {
    let mut program = load_source(source, "main.sbl").expect("parse failed");
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").expect("resolution failed");
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");
}

#[test]
fn literal_overflow_rejected_at_annotation() {
    // 127 fits #i8, 128 does not.
    check_ok("x: #i8 = 127;");
    let err = check_err("x: #i8 = 128;");
    assert!(err.message.contains("Type mismatch"), "{err}");

    // 255 fits #u8, 256 does not.
    check_ok("x: #u8 = 255;");
    let err = check_err("x: #u8 = 256;");
    assert!(err.message.contains("Type mismatch"), "{err}");

    // -128 fits #i8, -129 does not.
    check_ok("x: #i8 = -128;");
    let err = check_err("x: #i8 = -129;");
    assert!(err.message.contains("Type mismatch"), "{err}");
}

#[test]
fn array_literal_arity_must_match_annotation() {
    check_ok("xs: #i8[4] = [1, 2, 3, 4];");
    let err = check_err("xs: #i8[4] = [1, 2, 3, 4, 5];");
    assert!(err.message.contains("Type mismatch"), "{err}");
}

#[test]
fn cross_family_assignment_needs_a_cast() {
    let err = check_err("&f(u: #u8) { s: #i8 = u; }");
    assert!(err.message.contains("Type mismatch"), "{err}");
    check_ok("&f(u: #u8) { s: #i8 = (#i8) u; }");
}

#[test]
fn modulo_requires_unsigned_operands() {
    let err = check_err("&f(a: #i8, b: #i8) -> #i8 { -> a % b; }");
    assert!(err.message.contains("unsigned integer"), "{err}");
    check_ok("&f(a: #u8, b: #u8) -> #u8 { -> a % b; }");
}

#[test]
fn logical_operators_require_booleans() {
    let err = check_err("&f(s: #s, c: #b) -> #b { -> c && s; }");
    assert!(err.message.contains("boolean"), "{err}");
}

#[test]
fn assigning_to_loop_variable_is_rejected() {
    let err = check_err("&f(xs: #i8[3]) { xs @ { _ = 1; }; }");
    assert!(err.message.contains("loop variable"), "{err}");
}

#[test]
fn functions_are_not_values() {
    let err = check_err("&g() -> #i8 { -> 1; }\n&f() { h = g; }");
    assert!(err.message.contains("no function types"), "{err}");
}

#[test]
fn break_outside_loop_is_rejected() {
    let err = check_err("&f() { ->|; }");
    assert!(err.message.contains("Break statement outside of loop"), "{err}");
}

#[test]
fn calls_check_arity() {
    let err = check_err("&g(x: #i8) -> #i8 { -> x; }\n&f() -> #i8 { -> g(1, 2); }");
    assert!(err.message.contains("expects 1 argument"), "{err}");
}

#[test]
fn string_index_yields_a_byte() {
    check_ok("&f(s: #s) -> #u8 { -> s[0]; }");
}

#[test]
fn recursive_types_are_rejected() {
    let err = check_err("#Node(next: #Node);\n&f(n: #Node) { t = n; }");
    assert!(err.message.contains("Recursive types"), "{err}");
}

#[test]
fn range_bounds_must_be_constant() {
    let err = check_err("&f(n: #i8) { r = 0..n; }");
    assert!(err.message.contains("compile-time constants"), "{err}");
}

#[test]
fn bool_array_cast_requires_matching_width() {
    check_ok("&f(bits: #b[8]) -> #u8 { -> (#u8) bits; }");
    let err = check_err("&f(bits: #b[4]) -> #u8 { -> (#u8) bits; }");
    assert!(err.message.contains("Boolean array size mismatch"), "{err}");
}
