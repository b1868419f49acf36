//! # Cli
//!
//! This module contains everything needed for parsing the CLI arguments
//! for sablec.

use clap::{Parser, ValueEnum};

use sable_lang::compiler::Options;

/// Struct containing the CLI configuration for sablec.
#[derive(Parser, Debug)]
#[command(author, version, about = "Compiler frontend for the Sable programming language")]
pub struct Cli {
    /// The path to the Sable source file.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Base output path; the backend chooses the extension.
    #[arg(short, long, default_value = "out")]
    pub output: std::path::PathBuf,

    /// Backend to generate with.
    #[arg(short, long, default_value = "text")]
    pub backend: String,

    /// Backend-specific option as key=value; may be given multiple times.
    #[arg(long = "backend-opt", value_name = "KEY=VALUE")]
    pub backend_opts: Vec<String>,

    /// Root directory for module resolution.
    #[arg(long, default_value = ".")]
    pub project_root: std::path::PathBuf,

    /// Write an analysis report alongside the backend output.
    #[arg(long)]
    pub emit_analysis: bool,

    /// Allow process expressions (executes host shell commands).
    #[arg(long)]
    pub allow_process: bool,

    /// Strictness of type-use validation.
    #[arg(long, value_enum, default_value_t = TypeStrictness::default())]
    pub type_strictness: TypeStrictness,

    /// Specify the log level of the compiler.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    /// Parse the command line; help and version exit 0, anything malformed
    /// (including unknown flags) exits 1.
    pub fn init() -> Self {
        match Cli::try_parse() {
            Ok(cli) => cli,
            Err(error) => {
                use clap::error::ErrorKind;
                let code = match error.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                    _ => 1,
                };
                let _ = error.print();
                std::process::exit(code);
            }
        }
    }

    pub fn into_options(self) -> Result<Options, String> {
        let mut backend_options = std::collections::HashMap::new();
        for opt in &self.backend_opts {
            let Some((key, value)) = opt.split_once('=') else {
                return Err("--backend-opt expects key=value".to_owned());
            };
            if key.is_empty() || value.is_empty() {
                return Err("--backend-opt expects key=value".to_owned());
            }
            backend_options.insert(key.to_owned(), value.to_owned());
        }

        Ok(Options {
            input_file: self.file.to_string_lossy().into_owned(),
            output_file: self.output.to_string_lossy().into_owned(),
            verbose: !matches!(self.verbosity, LogLevel::Error),
            project_root: self.project_root.to_string_lossy().into_owned(),
            emit_analysis: self.emit_analysis,
            allow_process: self.allow_process,
            type_strictness: self.type_strictness.level(),
            backend: self.backend,
            backend_options,
        })
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum TypeStrictness {
    /// Only demand concrete types where the checker produced one.
    #[default]
    #[value(alias("0"))]
    Relaxed,

    /// Additionally require annotated locals to resolve fully.
    #[value(alias("1"))]
    AnnotatedLocals,

    /// Every used value expression must carry a concrete type.
    #[value(alias("2"))]
    Full,
}

impl TypeStrictness {
    pub fn level(&self) -> u8 {
        match self {
            TypeStrictness::Relaxed => 0,
            TypeStrictness::AnnotatedLocals => 1,
            TypeStrictness::Full => 2,
        }
    }
}

/// Enum for specifying the log level of sablec.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level. Only critical errors will be logged.
    #[default]
    #[value(alias("0"))]
    Error,

    /// Also log warnings.
    #[value(alias("1"))]
    Warn,

    /// Log progress information: which files are compiled, which passes
    /// run, etc.
    #[value(alias("2"))]
    Info,

    /// Log everything which happens internally in the compiler.
    #[value(alias("3"))]
    Debug,

    /// Log extra information; this output can be quite clunky.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
