use sable_lang::{
    analyzer::{AnalysisConfig, AnalysisFacts, Analyzer, CONTEXT_NONREENTRANT, CONTEXT_REENTRANT},
    loader::load_source,
    optimizer::{OptimizationFacts, Optimizer},
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
};

fn analyze(source: &str) -> (Vec<String>, Vec<String>, AnalysisFacts, OptimizationFacts) {
    let mut program = load_source(source, "main.sbl").expect("parse failed");
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").expect("resolution failed");
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");
    let optimization = Optimizer::run(&mut checker);
    let analysis = Analyzer::new(&checker, &optimization, AnalysisConfig::default())
        .run()
        .expect("analysis failed");

    let reachable: Vec<String> = analysis
        .reachable_functions
        .iter()
        .map(|s| checker.bindings.symbol(*s).name.clone())
        .collect();
    let foldable: Vec<String> = optimization
        .foldable_functions
        .iter()
        .map(|s| checker.bindings.symbol(*s).name.clone())
        .collect();
    (reachable, foldable, analysis, optimization)
}

#[test]
fn mutual_recursion_is_reachable_but_not_foldable() {
    let (reachable, foldable, _, optimization) = analyze(
        "&main() -> #i32 { -> a(); }\n\
         &a() -> #i32 { -> b(); }\n\
         &b() -> #i32 { -> a(); }",
    );
    assert!(reachable.contains(&"main".to_owned()));
    assert!(reachable.contains(&"a".to_owned()));
    assert!(reachable.contains(&"b".to_owned()));
    assert!(foldable.is_empty(), "recursive functions must not fold");
    // The recursion guard shows up as an evaluation failure, not a crash.
    assert!(optimization
        .fold_skip_reasons
        .values()
        .any(|reason| reason.contains("evaluation-failed")));
}

#[test]
fn uncalled_functions_are_not_reachable() {
    let (reachable, _, _, _) = analyze(
        "&main() -> #i8 { -> 1; }\n\
         &orphan() -> #i8 { -> 2; }",
    );
    assert!(reachable.contains(&"main".to_owned()));
    assert!(!reachable.contains(&"orphan".to_owned()));
}

#[test]
fn exported_functions_are_roots() {
    let (reachable, _, _, _) = analyze(
        "&^api() -> #i8 { -> helper(); }\n\
         &helper() -> #i8 { -> 1; }",
    );
    assert!(reachable.contains(&"api".to_owned()));
    assert!(reachable.contains(&"helper".to_owned()));
}

#[test]
fn dead_branch_calls_are_not_reachable() {
    let (reachable, _, _, _) = analyze(
        "&main() -> #i8 { -> true ? 1 : spare(); }\n\
         &spare() -> #i8 { -> 2; }",
    );
    assert!(reachable.contains(&"main".to_owned()));
    assert!(!reachable.contains(&"spare".to_owned()));
}

#[test]
fn nonreentrant_annotation_pins_the_context() {
    let mut program = load_source(
        "&main() -> #i8 { -> worker(); }\n\
         [[nonreentrant]] &worker() -> #i8 { -> 1; }",
        "main.sbl",
    )
    .unwrap();
    let mut bindings = Bindings::new();
    resolve_program(&mut program, &mut bindings, "").unwrap();
    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().unwrap();
    let optimization = Optimizer::run(&mut checker);
    let analysis = Analyzer::new(&checker, &optimization, AnalysisConfig::default())
        .run()
        .unwrap();

    let worker = checker.bindings.lookup_global(0, "worker").unwrap();
    let main = checker.bindings.lookup_global(0, "main").unwrap();
    assert_eq!(
        analysis.reentrancy_variants[&worker]
            .iter()
            .collect::<Vec<_>>(),
        vec![&CONTEXT_NONREENTRANT]
    );
    assert_eq!(
        analysis.reentrancy_variants[&main].iter().collect::<Vec<_>>(),
        vec![&CONTEXT_REENTRANT]
    );
}

#[test]
fn used_globals_are_collected() {
    let (_, _, analysis, _) = analyze(
        "limit = 10;\n\
         &main() -> #i8 { -> limit; }",
    );
    assert_eq!(analysis.used_global_vars.len(), 1);
    assert!(!analysis.var_mutability.is_empty());
}

#[test]
fn used_types_are_collected() {
    let (_, _, analysis, _) = analyze(
        "#Point(x: #i8, y: #i8);\n\
         &main() -> #i8 { p = Point(1, 2); -> p.x; }",
    );
    assert!(analysis.used_type_names.contains("Point"));
}
