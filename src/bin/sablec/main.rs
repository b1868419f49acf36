//! # sablec
//!
//! The Sable compiler binary: argument parsing, backend registration, and
//! diagnostics reporting around the library pipeline.

mod cli;

use cli::Cli;

use sable_lang::{
    backend::register_default_backends,
    compiler::Compiler,
};

fn main() {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    register_default_backends();

    let options = match args.into_options() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {message}");
            std::process::exit(1);
        }
    };

    let compiler = Compiler::new(options);
    match compiler.compile() {
        Ok(_) => {}
        Err(error) => {
            eprintln!("{}", error.report());
            std::process::exit(1);
        }
    }
}
