//! Riau CLI
//!
//! `riau [flags] [file]` - with a file argument the full pipeline runs
//! (lex, parse, analyze, compile, execute); without one the parse-only REPL
//! starts. Program output goes to stdout, diagnostics to stderr.
//!
//! Exit codes: 0 on success, 65 for parse/semantic/compile errors, 70 for
//! runtime errors, 74 when the file cannot be read.

mod repl;

use clap::Parser as ClapParser;
use riau_runtime::Vm;
use riauc::Diagnostic;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "riau")]
#[command(about = "Riau programming language", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Script file to run; starts the REPL when omitted
    file: Option<PathBuf>,

    /// Show version information
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Enable debug output
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("Riau v{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    init_tracing(cli.debug);

    if !std::io::stderr().is_terminal() {
        colored::control::set_override(false);
    }

    match cli.file {
        Some(file) => run_file(&file),
        None => repl::run(),
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_file(path: &Path) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Could not open file \"{}\"", path.display());
            process::exit(74);
        }
    };
    let filename = path.display().to_string();

    let mut parser = riauc::Parser::new(&source);
    let program = parser.parse();
    if let Some(error) = parser.error() {
        let diagnostic = Diagnostic::error(&error.message, error.line, error.column)
            .with_filename(&filename)
            .with_length(error.lexeme.chars().count());
        eprint!("{}", diagnostic.render(Some(&source)));
        process::exit(65);
    }
    debug!("parsing successful");

    let mut analyzer = riauc::Analyzer::new();
    if let Err(error) = analyzer.analyze(&program) {
        let diagnostic = Diagnostic::error(&error.message, error.line, 1)
            .with_filename(&filename)
            .with_suggestion(error.suggestion.clone());
        eprint!("{}", diagnostic.render(Some(&source)));
        process::exit(65);
    }
    debug!("semantic analysis passed");

    let chunk = match riauc::compile(&program) {
        Ok(chunk) => chunk,
        Err(error) => {
            let diagnostic =
                Diagnostic::error(&error.message, error.line, 1).with_filename(&filename);
            eprint!("{}", diagnostic.render(Some(&source)));
            process::exit(65);
        }
    };
    debug!("compilation successful");
    debug!("{}", chunk.disassemble(&filename));

    let mut vm = Vm::new();
    if let Err(error) = vm.execute(&chunk) {
        // The VM already printed the stack trace line.
        eprintln!("Runtime error: {}", error);
        process::exit(70);
    }
    debug!("execution successful");
}
