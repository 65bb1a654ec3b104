//! Riau Compiler Library
//!
//! Front-end for the Riau language: lexing, parsing, semantic analysis, and
//! bytecode emission into a [`riau_core::Chunk`]. The pipeline is strictly
//! staged - each stage refuses to run when the previous one failed - and the
//! stages are exposed individually so drivers can stop early (the REPL, for
//! example, only parses).
//!
//! ```rust
//! use riauc::compile_source;
//!
//! let chunk = compile_source("let x = 1 + 2\nprint(x)").unwrap();
//! assert_eq!(chunk.code.last(), Some(&0)); // HALT
//! ```

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod token;

pub use ast::{Expr, Program, Span, Stmt, TypeInfo, TypeKind};
pub use codegen::{CompileError, compile};
pub use diagnostics::{Diagnostic, Level};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use semantic::{Analyzer, SemanticError, SymbolTable};
pub use token::{Token, TokenKind};

use riau_core::Chunk;

/// Any front-end failure, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileFailure {
    Parse(ParseError),
    Semantic(SemanticError),
    Compile(CompileError),
}

impl std::fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileFailure::Parse(e) => write!(f, "{}", e),
            CompileFailure::Semantic(e) => write!(f, "{}", e),
            CompileFailure::Compile(e) => write!(f, "Compilation error: {}", e),
        }
    }
}

impl std::error::Error for CompileFailure {}

/// Run the whole front-end over a source string.
pub fn compile_source(source: &str) -> Result<Chunk, CompileFailure> {
    let mut parser = Parser::new(source);
    let program = parser.parse();
    if let Some(error) = parser.error() {
        return Err(CompileFailure::Parse(error.clone()));
    }

    let mut analyzer = Analyzer::new();
    analyzer
        .analyze(&program)
        .map_err(CompileFailure::Semantic)?;

    codegen::compile(&program).map_err(CompileFailure::Compile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use riau_core::OpCode;

    #[test]
    fn test_pipeline_produces_executable_chunk() {
        let chunk = compile_source("let x = 2 * 21\nprint(x)").unwrap();
        assert_eq!(chunk.code.last(), Some(&(OpCode::Halt as u8)));
        assert_eq!(chunk.code.len(), chunk.lines.len());
    }

    #[test]
    fn test_parse_failure_stops_the_pipeline() {
        let error = compile_source("let = 5").unwrap_err();
        assert!(matches!(error, CompileFailure::Parse(_)));
        assert!(error.to_string().contains("Expected variable name"));
    }

    #[test]
    fn test_semantic_failure_stops_the_pipeline() {
        let error = compile_source("let x = 7\nlet x = 8").unwrap_err();
        assert!(matches!(error, CompileFailure::Semantic(_)));
        assert_eq!(
            error.to_string(),
            "[line 2] Semantic error: Variable 'x' already defined"
        );
    }

    #[test]
    fn test_compile_failure_carries_its_stage() {
        // `print(y)` slips past semantic analysis (call arguments are not
        // typed) and fails in the code generator.
        let error = compile_source("print(y)").unwrap_err();
        assert!(matches!(error, CompileFailure::Compile(_)));
        assert_eq!(error.to_string(), "Compilation error: Undefined variable 'y'");
    }

    #[test]
    fn test_empty_source_compiles_to_halt() {
        let chunk = compile_source("").unwrap();
        assert_eq!(chunk.code, vec![OpCode::Halt as u8]);
    }
}
