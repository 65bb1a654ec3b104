//! Bytecode generation.
//!
//! Walks a validated AST and emits a single linear `Chunk`. Every expression
//! leaves exactly one value on the stack; statements are responsible for
//! consuming what they produce. Variable slots are handed out densely in
//! declaration order and the table lives on the compiler instance, so a
//! fresh compiler starts from slot zero.
//!
//! `STORE_VAR` keeps the stored value on the stack - the encoding is stable
//! and the VM mirrors it, so no POP follows a declaration.
//!
//! Jumps are two-byte big-endian forward offsets, relative to the byte after
//! the operand, produced with the usual emit-placeholder-then-backpatch
//! pattern. `if`/`else` and the short-circuit forms of `&&` and `||` compile
//! to conditional jumps that peek at the stack top; the taken edge keeps the
//! deciding value, the fall-through edge pops it.

use crate::ast::{Expr, Program, Stmt};
use riau_core::{Chunk, Constant, GLOBALS_MAX, OpCode};

/// Bytecode emission failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// Compile a program into a chunk.
///
/// Emission keeps going after an error so the stack shape stays coherent,
/// but only the first error is returned and the chunk is withheld.
pub fn compile(program: &Program) -> Result<Chunk, CompileError> {
    let mut compiler = Compiler::new();

    for stmt in &program.statements {
        compiler.statement(stmt);
    }
    compiler.chunk.write_op(OpCode::Halt, 0);

    match compiler.error {
        Some(error) => Err(error),
        None => Ok(compiler.chunk),
    }
}

struct Compiler {
    chunk: Chunk,
    variables: Vec<String>,
    error: Option<CompileError>,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            chunk: Chunk::new(),
            variables: Vec::new(),
            error: None,
        }
    }

    fn record_error(&mut self, line: u32, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(CompileError {
                line,
                message: message.into(),
            });
        }
    }

    // Slots are resolved first-match in declaration order.
    fn find_variable(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    fn add_variable(&mut self, name: &str) -> Option<usize> {
        if self.variables.len() >= GLOBALS_MAX {
            return None;
        }
        self.variables.push(name.to_string());
        Some(self.variables.len() - 1)
    }

    fn emit(&mut self, op: OpCode, line: u32) {
        self.chunk.write_op(op, line);
    }

    fn emit_byte(&mut self, byte: u8, line: u32) {
        self.chunk.write(byte, line);
    }

    fn make_constant(&mut self, constant: Constant, line: u32) -> u8 {
        let index = self.chunk.add_constant(constant);
        if index > u8::MAX as usize {
            self.record_error(line, "Too many constants in one chunk");
            return 0;
        }
        index as u8
    }

    /// Emit a jump with a placeholder offset; returns the operand position.
    fn emit_jump(&mut self, op: OpCode, line: u32) -> usize {
        self.emit(op, line);
        self.emit_byte(0xff, line);
        self.emit_byte(0xff, line);
        self.chunk.code.len() - 2
    }

    /// Point the jump at `operand_pos` to the current end of the chunk.
    fn patch_jump(&mut self, operand_pos: usize, line: u32) {
        // Offset is measured from the byte after the two-byte operand.
        let jump = self.chunk.code.len() - operand_pos - 2;
        if jump > u16::MAX as usize {
            self.record_error(line, "Too much code to jump over");
            return;
        }
        let bytes = (jump as u16).to_be_bytes();
        self.chunk.code[operand_pos] = bytes[0];
        self.chunk.code[operand_pos + 1] = bytes[1];
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr { expr, span } => {
                self.expression(expr);
                self.emit(OpCode::Pop, span.line);
            }

            Stmt::VarDecl {
                name,
                initializer,
                span,
                ..
            } => {
                match initializer {
                    Some(expr) => self.expression(expr),
                    None => self.emit(OpCode::PushNull, span.line),
                }
                let Some(slot) = self.add_variable(name) else {
                    self.record_error(span.line, "Too many variables");
                    return;
                };
                self.emit(OpCode::StoreVar, span.line);
                self.emit_byte(slot as u8, span.line);
            }

            Stmt::Return { value, span } => {
                match value {
                    Some(expr) => self.expression(expr),
                    None => self.emit(OpCode::PushNull, span.line),
                }
                self.emit(OpCode::Return, span.line);
            }

            Stmt::Block { statements, .. } => {
                for stmt in statements {
                    self.statement(stmt);
                }
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                self.expression(condition);

                let else_jump = self.emit_jump(OpCode::JumpIfFalse, span.line);
                self.emit(OpCode::Pop, span.line);
                self.statement(then_branch);
                let end_jump = self.emit_jump(OpCode::Jump, span.line);

                self.patch_jump(else_jump, span.line);
                self.emit(OpCode::Pop, span.line);
                if let Some(else_branch) = else_branch {
                    self.statement(else_branch);
                }
                self.patch_jump(end_jump, span.line);
            }

            // Functions, entities, loops, try/catch, use, and spawn have no
            // bytecode counterpart; they are accepted and skipped.
            Stmt::FnDecl { .. }
            | Stmt::EntityDecl { .. }
            | Stmt::ForIn { .. }
            | Stmt::TryCatch { .. }
            | Stmt::Use { .. }
            | Stmt::Spawn { .. } => {}
        }
    }

    fn expression(&mut self, expr: &Expr) {
        match expr {
            Expr::NumberLit { value, span } => {
                let index = self.make_constant(Constant::Number(*value), span.line);
                self.emit(OpCode::PushConst, span.line);
                self.emit_byte(index, span.line);
            }

            Expr::StringLit { value, span } => {
                let index = self.make_constant(Constant::String(value.clone()), span.line);
                self.emit(OpCode::PushConst, span.line);
                self.emit_byte(index, span.line);
            }

            Expr::BoolLit { value, span } => {
                let op = if *value {
                    OpCode::PushTrue
                } else {
                    OpCode::PushFalse
                };
                self.emit(op, span.line);
            }

            Expr::NullLit { span } => {
                self.emit(OpCode::PushNull, span.line);
            }

            Expr::Identifier { name, span } => match self.find_variable(name) {
                Some(slot) => {
                    self.emit(OpCode::LoadVar, span.line);
                    self.emit_byte(slot as u8, span.line);
                }
                None => {
                    self.record_error(span.line, format!("Undefined variable '{}'", name));
                    // Keep the stack shape the expression promised.
                    self.emit(OpCode::PushNull, span.line);
                }
            },

            Expr::Binary {
                op,
                left,
                right,
                span,
            } => match op.as_str() {
                "&&" => {
                    self.expression(left);
                    let end_jump = self.emit_jump(OpCode::JumpIfFalse, span.line);
                    self.emit(OpCode::Pop, span.line);
                    self.expression(right);
                    self.patch_jump(end_jump, span.line);
                }
                "||" => {
                    self.expression(left);
                    let end_jump = self.emit_jump(OpCode::JumpIfTrue, span.line);
                    self.emit(OpCode::Pop, span.line);
                    self.expression(right);
                    self.patch_jump(end_jump, span.line);
                }
                _ => {
                    self.expression(left);
                    self.expression(right);
                    let opcode = match op.as_str() {
                        "+" => Some(OpCode::Add),
                        "-" => Some(OpCode::Sub),
                        "*" => Some(OpCode::Mul),
                        "/" => Some(OpCode::Div),
                        "%" => Some(OpCode::Mod),
                        "==" => Some(OpCode::Equal),
                        "!=" => Some(OpCode::NotEqual),
                        "<" => Some(OpCode::Less),
                        "<=" => Some(OpCode::LessEqual),
                        ">" => Some(OpCode::Greater),
                        ">=" => Some(OpCode::GreaterEqual),
                        _ => None,
                    };
                    if let Some(opcode) = opcode {
                        self.emit(opcode, span.line);
                    }
                }
            },

            Expr::Unary { op, operand, span } => {
                self.expression(operand);
                match op.as_str() {
                    "-" => self.emit(OpCode::Negate, span.line),
                    "!" => self.emit(OpCode::Not, span.line),
                    _ => {}
                }
            }

            Expr::Call {
                callee,
                arguments,
                span,
            } => {
                // Built-ins bind before any user name.
                if let Expr::Identifier { name, .. } = callee.as_ref() {
                    if name == "print" {
                        let Some(first) = arguments.first() else {
                            self.record_error(
                                span.line,
                                "print() requires at least one argument",
                            );
                            return;
                        };
                        self.expression(first);
                        self.emit(OpCode::Print, span.line);
                        return;
                    }
                    if name == "env" {
                        let Some(first) = arguments.first() else {
                            self.record_error(span.line, "env() requires one argument");
                            return;
                        };
                        self.expression(first);
                        self.emit(OpCode::Env, span.line);
                        return;
                    }
                }

                // Runtime dispatch for CALL does not exist yet; the encoding
                // is emitted anyway so the gap is visible at execution time.
                for arg in arguments {
                    self.expression(arg);
                }
                self.expression(callee);
                self.emit(OpCode::Call, span.line);
                self.emit_byte(arguments.len() as u8, span.line);
            }

            Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::ArrayLit { span, .. }
            | Expr::ObjectLit { span, .. } => {
                self.record_error(span.line, "Unknown expression type");
            }
        }
    }
}
