//! Parse-only REPL.
//!
//! Reads one line at a time, checks its syntax, and reports validity;
//! nothing is executed. Exits on `exit`, `quit`, or end of input.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

pub fn run() {
    println!("Riau Programming Language v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' to quit\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("Could not start the REPL: {}", error);
            std::process::exit(74);
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line == "exit" || line == "quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                let mut parser = riauc::Parser::new(line);
                let _ = parser.parse();
                match parser.error() {
                    Some(error) => eprintln!("{}", error),
                    None => println!("\u{2713} Valid syntax"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}
