use sable_lang::{
    backend::register_default_backends,
    compiler::{Compiler, Options},
};
use test_utils::Project;

fn options(project: &Project, entry: &str) -> Options {
    Options {
        input_file: project.path(entry).to_string_lossy().into_owned(),
        output_file: project.path("out/prog").to_string_lossy().into_owned(),
        project_root: project.root().to_string_lossy().into_owned(),
        ..Options::default()
    }
}

#[test]
fn compiles_a_program_end_to_end() {
    register_default_backends();
    let project = Project::new("pipeline-basic");
    project.file(
        "main.sbl",
        "&double(x: #i32) -> #i32 { -> x * 2; }\n\
         &main() -> #i32 { -> double(21); }\n",
    );

    let compiler = Compiler::new(options(&project, "main.sbl"));
    let paths = compiler.compile().expect("compilation failed");
    assert_eq!(paths.stem, "prog");
    assert!(project.exists("out/prog.txt"));

    let summary = project.read("out/prog.txt");
    assert!(summary.contains("fn double@0"), "{summary}");
    assert!(summary.contains("fn main@0"), "{summary}");
}

#[test]
fn emits_analysis_report_with_all_sections() {
    register_default_backends();
    let project = Project::new("pipeline-analysis");
    project.file(
        "main.sbl",
        "limit = 3;\n\
         &seven() -> #i8 { -> 7; }\n\
         &main() -> #i8 { -> seven() + limit; }\n",
    );

    let mut opts = options(&project, "main.sbl");
    opts.emit_analysis = true;
    Compiler::new(opts).compile().expect("compilation failed");

    let report = project.read("out/prog.analysis.txt");
    for section in [
        "## Optimization Summary",
        "## Fold Skip Reasons",
        "## Reachable Functions",
        "## Reentrancy Variants",
        "## Ref Variants",
        "## Variable Mutability",
        "## Used Globals",
        "## Used Types",
    ] {
        assert!(report.contains(section), "missing {section} in:\n{report}");
    }
    assert!(report.contains("- main@0"), "{report}");
    assert!(report.contains("- limit@0"), "{report}");
}

#[test]
fn json_backend_option_switches_format() {
    register_default_backends();
    let project = Project::new("pipeline-json");
    project.file("main.sbl", "&main() -> #i8 { -> 1; }\n");

    let mut opts = options(&project, "main.sbl");
    opts.backend_options
        .insert("format".to_owned(), "json".to_owned());
    Compiler::new(opts).compile().expect("compilation failed");

    let summary = project.read("out/prog.json");
    let parsed: serde_json::Value = serde_json::from_str(&summary).expect("valid json");
    assert_eq!(parsed["instances"], 1);
}

#[test]
fn unknown_backend_is_an_error() {
    register_default_backends();
    let project = Project::new("pipeline-unknown-backend");
    project.file("main.sbl", "&main() -> #i8 { -> 1; }\n");

    let mut opts = options(&project, "main.sbl");
    opts.backend = "banked".to_owned();
    let err = Compiler::new(opts).compile().unwrap_err();
    assert!(err.message.contains("Unknown backend: banked"), "{err}");
}

#[test]
fn compile_errors_carry_file_line_column() {
    register_default_backends();
    let project = Project::new("pipeline-diagnostics");
    project.file(
        "main.sbl",
        "&main() -> #i8 {\n  -> missing_fn();\n}\n",
    );

    let err = Compiler::new(options(&project, "main.sbl")).compile().unwrap_err();
    let report = err.report();
    assert!(report.starts_with("Error at "), "{report}");
    assert!(report.contains("main.sbl:2:"), "{report}");
    assert!(report.contains("Undefined function: missing_fn"), "{report}");
}

#[test]
fn translation_unit_emission_round_trips() {
    register_default_backends();
    let project = Project::new("pipeline-tu");
    project.file("main.sbl", "&main() -> #i8 { -> 1; }\n");

    let unit = Compiler::new(options(&project, "main.sbl"))
        .emit_translation_unit()
        .expect("translation unit");
    assert!(unit.contains("fn main@0"), "{unit}");
}

#[test]
fn process_expressions_splice_command_output() {
    register_default_backends();
    let project = Project::new("pipeline-process");
    project.file(
        "main.sbl",
        ":: \"printf hi\" -> greeting;\n\
         &main() -> #i8 { len = |greeting|; -> len > 1 ? 1 : 0; }\n",
    );

    // Disabled by default.
    let err = Compiler::new(options(&project, "main.sbl")).compile().unwrap_err();
    assert!(err.message.contains("Process expressions are disabled"), "{err}");

    let mut opts = options(&project, "main.sbl");
    opts.allow_process = true;
    Compiler::new(opts).compile().expect("compilation failed");
}
