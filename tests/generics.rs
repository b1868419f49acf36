use sable_lang::{
    ast::{ExprKind, StmtKind},
    loader::{load_source, Program},
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
};

fn check(source: &str) -> (Program, Bindings) {
    let mut program = load_source(source, "main.sbl").expect("parse failed");
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").expect("resolution failed");
    {
        let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
        checker.check_program().expect("type checking failed");
    }
    (program, bindings)
}

fn instantiation_names(program: &Program) -> Vec<String> {
    program
        .instance(0)
        .top_level
        .iter()
        .filter_map(|stmt| match &program.arena.stmt(*stmt).kind {
            StmtKind::FuncDecl(func) if func.is_instantiation => Some(func.name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn distinct_signatures_produce_distinct_instantiations() {
    // 1 is an i8 literal, 0x10000 an unsigned literal that lands in u32.
    let (program, bindings) = check(
        "&id(x) { -> x; }\n\
         &main() { a = id(1); b = id(0x10000); }",
    );

    let names = instantiation_names(&program);
    assert_eq!(names.len(), 2, "expected two instantiations, got {names:?}");
    assert_ne!(names[0], names[1]);
    for name in &names {
        assert!(name.contains("_G_"), "mangled name missing marker: {name}");
        assert!(
            bindings.lookup_global(0, name).is_some(),
            "instantiation {name} not registered in scope"
        );
    }
}

#[test]
fn repeated_signature_reuses_the_instantiation() {
    let (program, _) = check(
        "&id(x) { -> x; }\n\
         &main() { a = id(1); b = id(1); c = id(2); }",
    );

    // Three call sites, one signature: exactly one instantiation.
    let names = instantiation_names(&program);
    assert_eq!(names.len(), 1, "expected one instantiation, got {names:?}");
}

#[test]
fn call_sites_are_rewritten_to_the_mangled_name() {
    let (program, _) = check(
        "&id(x) { -> x; }\n\
         &main() { a = id(1); }",
    );

    // Find the call inside main and check its callee was renamed.
    let main_stmt = program
        .instance(0)
        .top_level
        .iter()
        .find(|stmt| {
            matches!(
                &program.arena.stmt(**stmt).kind,
                StmtKind::FuncDecl(f) if f.name == "main"
            )
        })
        .copied()
        .expect("main exists");
    let StmtKind::FuncDecl(main_fn) = &program.arena.stmt(main_stmt).kind else {
        unreachable!();
    };
    let ExprKind::Block { statements, .. } = &program.arena.expr(main_fn.body.unwrap()).kind
    else {
        panic!("expected block body");
    };
    let StmtKind::Expr(assign) = &program.arena.stmt(statements[0]).kind else {
        panic!("expected assignment statement");
    };
    let ExprKind::Assignment { value, .. } = &program.arena.expr(*assign).kind else {
        panic!("expected assignment");
    };
    let ExprKind::Call { callee, .. } = &program.arena.expr(*value).kind else {
        panic!("expected call");
    };
    let ExprKind::Identifier { name, .. } = &program.arena.expr(*callee).kind else {
        panic!("expected identifier callee");
    };
    assert!(name.contains("_G_"), "callee not rewritten: {name}");
}

#[test]
fn generic_functions_cannot_be_exported_or_external() {
    let mut program = load_source("&^id(x) { -> x; }", "main.sbl").unwrap();
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").unwrap();
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    let err = checker.check_program().unwrap_err();
    assert!(
        err.message
            .contains("Generic functions cannot be exported or external"),
        "{err}"
    );
}

#[test]
fn uninstantiated_generics_need_not_fully_type() {
    // The body of `weird` would not type-check with concrete types, but no
    // call site ever instantiates it.
    check("&weird(x) { -> x; }\n&main() -> #i8 { -> 1; }");
}
