use sable_lang::{
    loader::ModuleLoader,
    resolver::{resolve_program, Bindings},
    typechecker::TypeChecker,
};
use test_utils::Project;

#[test]
fn imported_module_becomes_a_distinct_instance() {
    let project = Project::new("import-basic");
    project.file("b.sbl", "&double(x: #i32) -> #i32 { -> x * 2; }\n");
    project.file("a.sbl", "::b;\n&main() -> #i32 { -> double(21); }\n");

    let loader = ModuleLoader::new(project.root().to_string_lossy().into_owned());
    let mut program = loader
        .load(&project.path("a.sbl").to_string_lossy())
        .expect("load failed");
    assert_eq!(program.modules.len(), 2);

    let mut bindings = Bindings::new();
    resolve_program(
        &mut program,
        &mut bindings,
        &project.root().to_string_lossy(),
    )
    .expect("resolution failed");

    assert_eq!(program.instances.len(), 2);
    let double = bindings
        .lookup_global(0, "double")
        .expect("double visible in the importing instance");
    assert_eq!(bindings.symbol(double).instance_id, 1);

    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");
}

#[test]
fn same_spelling_in_both_modules_resolves_without_collision() {
    // Both modules define `f`; the importing module keeps its own symbol
    // and the import keeps a distinct one under its own instance.
    let project = Project::new("import-collision");
    project.file("b.sbl", "&f(x: #i32) -> #i32 { -> x; }\n");
    project.file(
        "a.sbl",
        "::b;\n&f(x: #i32) -> #i32 { -> x * 2; }\n&main() -> #i32 { -> f(3); }\n",
    );

    let loader = ModuleLoader::new(project.root().to_string_lossy().into_owned());
    let mut program = loader
        .load(&project.path("a.sbl").to_string_lossy())
        .expect("load failed");

    let mut bindings = Bindings::new();
    resolve_program(
        &mut program,
        &mut bindings,
        &project.root().to_string_lossy(),
    )
    .expect("resolution failed");

    let local = bindings.lookup_global(0, "f").expect("local f");
    assert_eq!(bindings.symbol(local).instance_id, 0);
    let imported = bindings.lookup_global(1, "f").expect("imported f");
    assert_eq!(bindings.symbol(imported).instance_id, 1);
    assert_ne!(local, imported);

    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");
}

#[test]
fn diamond_imports_produce_distinct_instances() {
    let project = Project::new("import-diamond");
    project.file("d.sbl", "&leaf() -> #i32 { -> 1; }\n");
    project.file("b.sbl", "::d;\n&from_b() -> #i32 { -> leaf(); }\n");
    project.file("c.sbl", "::d;\n&from_c() -> #i32 { -> leaf(); }\n");
    project.file(
        "a.sbl",
        "::b;\n::c;\n&main() -> #i32 { -> from_b() + from_c(); }\n",
    );

    let loader = ModuleLoader::new(project.root().to_string_lossy().into_owned());
    let mut program = loader
        .load(&project.path("a.sbl").to_string_lossy())
        .expect("load failed");

    // d is parsed exactly once no matter how many chains reach it.
    assert_eq!(program.modules.len(), 4);

    let mut bindings = Bindings::new();
    resolve_program(
        &mut program,
        &mut bindings,
        &project.root().to_string_lossy(),
    )
    .expect("resolution failed");

    // a, b, c, and two instances of d: one per import chain.
    assert_eq!(program.instances.len(), 5);
    let d_instances: Vec<usize> = program
        .instances
        .iter()
        .filter(|i| program.module(i.module_id).path.ends_with("d.sbl"))
        .map(|i| i.id)
        .collect();
    assert_eq!(d_instances.len(), 2);
    assert_ne!(d_instances[0], d_instances[1]);

    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");
}

#[test]
fn cyclic_imports_terminate() {
    let project = Project::new("import-cycle");
    project.file("a.sbl", "::b;\n&main() -> #i32 { -> helper(); }\n");
    project.file("b.sbl", "::a;\n&helper() -> #i32 { -> 1; }\n");

    let loader = ModuleLoader::new(project.root().to_string_lossy().into_owned());
    let mut program = loader
        .load(&project.path("a.sbl").to_string_lossy())
        .expect("load failed");
    assert_eq!(program.modules.len(), 2);

    let mut bindings = Bindings::new();
    resolve_program(
        &mut program,
        &mut bindings,
        &project.root().to_string_lossy(),
    )
    .expect("cyclic imports must resolve");

    let mut checker = TypeChecker::new(&mut program, &mut bindings, "", false);
    checker.check_program().expect("type checking failed");
}

#[test]
fn missing_import_reports_location() {
    let project = Project::new("import-missing");
    project.file("a.sbl", "::nowhere;\n&main() -> #i32 { -> 0; }\n");

    let loader = ModuleLoader::new(project.root().to_string_lossy().into_owned());
    let mut program = loader
        .load(&project.path("a.sbl").to_string_lossy())
        .expect("loading defers missing imports");

    let mut bindings = Bindings::new();
    let err = resolve_program(
        &mut program,
        &mut bindings,
        &project.root().to_string_lossy(),
    )
    .unwrap_err();
    assert!(err.message.contains("Import failed"), "{err}");
    assert!(err.location.line >= 1);
}
