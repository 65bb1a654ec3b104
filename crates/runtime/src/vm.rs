//! The stack-based virtual machine.
//!
//! A fetch-decode-execute loop over a chunk's byte stream. The value stack
//! and the globals table are both bounded at 256 slots; variable slots are
//! assigned densely by the compiler, so the globals table grows from zero.
//!
//! A runtime error prints a single-frame stack trace to stderr, clears the
//! stack, and halts the machine; the observable states are Ready (after
//! construction), Running (inside `execute`), and Halted with a success
//! flag.

use crate::value::Value;
use riau_core::{Chunk, Constant, OpCode, STACK_MAX};
use std::io::Read;
use tracing::trace;

/// Observable machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Ready,
    Running,
    Halted { success: bool },
}

/// A runtime failure, carrying the source line of the failing instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub line: u32,
    pub message: String,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// The virtual machine. Borrows a chunk for the duration of `execute`.
#[derive(Debug, Default)]
pub struct Vm {
    stack: Vec<Value>,
    globals: Vec<Value>,
    state: VmState,
}

impl Default for VmState {
    fn default() -> Self {
        VmState::Ready
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm::default()
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// The value stored in a variable slot, if it has been written.
    pub fn global(&self, slot: usize) -> Option<&Value> {
        self.globals.get(slot)
    }

    /// Current stack contents, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Run a chunk to completion.
    ///
    /// On error the stack is cleared, a `[line N] in script` trace line goes
    /// to stderr, and the machine is left halted-with-error.
    pub fn execute(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        self.state = VmState::Running;

        let result = self.run(chunk);
        match &result {
            Ok(()) => {
                self.state = VmState::Halted { success: true };
            }
            Err(error) => {
                eprintln!("[line {}] in script", error.line);
                self.stack.clear();
                self.state = VmState::Halted { success: false };
            }
        }
        result
    }

    fn run(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        let mut ip = 0usize;

        loop {
            let op_offset = ip;
            let line = chunk.lines.get(op_offset).copied().unwrap_or(0);

            trace!(target: "riau::vm", "{}", chunk.disassemble_instruction(op_offset).0);

            let byte = self.read_byte(chunk, &mut ip, line)?;
            let op = OpCode::try_from(byte);

            match op {
                Ok(OpCode::Halt) => return Ok(()),

                Ok(OpCode::PushConst) => {
                    let index = self.read_byte(chunk, &mut ip, line)? as usize;
                    let value = match chunk.constants.get(index) {
                        Some(Constant::Number(n)) => Value::Number(*n),
                        Some(Constant::String(s)) => Value::String(s.clone()),
                        None => {
                            return Err(self.error(line, format!("Bad constant index {}", index)));
                        }
                    };
                    self.push(value, line)?;
                }

                Ok(OpCode::PushNull) => self.push(Value::Null, line)?,
                Ok(OpCode::PushTrue) => self.push(Value::Bool(true), line)?,
                Ok(OpCode::PushFalse) => self.push(Value::Bool(false), line)?,

                Ok(OpCode::Pop) => {
                    self.pop(line)?;
                }

                Ok(OpCode::Add) => {
                    let (a, b) = self.pop_pair(line)?;
                    let result = match (&a, &b) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        (Value::String(x), Value::String(y)) => {
                            Value::String(format!("{}{}", x, y))
                        }
                        _ => {
                            return Err(
                                self.error(line, "Operands must be two numbers or two strings")
                            );
                        }
                    };
                    self.push(result, line)?;
                }

                Ok(OpCode::Sub) => {
                    let (x, y) = self.pop_numbers(line)?;
                    self.push(Value::Number(x - y), line)?;
                }

                Ok(OpCode::Mul) => {
                    let (x, y) = self.pop_numbers(line)?;
                    self.push(Value::Number(x * y), line)?;
                }

                Ok(OpCode::Div) => {
                    let (x, y) = self.pop_numbers(line)?;
                    if y == 0.0 {
                        return Err(self.error(line, "Division by zero"));
                    }
                    self.push(Value::Number(x / y), line)?;
                }

                Ok(OpCode::Mod) => {
                    let (x, y) = self.pop_numbers(line)?;
                    if y == 0.0 {
                        return Err(self.error(line, "Modulo by zero"));
                    }
                    self.push(Value::Number(x % y), line)?;
                }

                Ok(OpCode::Negate) => {
                    let value = self.pop(line)?;
                    let Some(n) = value.as_number() else {
                        return Err(self.error(line, "Operand must be a number"));
                    };
                    self.push(Value::Number(-n), line)?;
                }

                Ok(OpCode::Not) => {
                    let value = self.pop(line)?;
                    self.push(Value::Bool(!value.is_truthy()), line)?;
                }

                Ok(OpCode::Equal) => {
                    let (a, b) = self.pop_pair(line)?;
                    self.push(Value::Bool(a.equals(&b)), line)?;
                }

                Ok(OpCode::NotEqual) => {
                    let (a, b) = self.pop_pair(line)?;
                    self.push(Value::Bool(!a.equals(&b)), line)?;
                }

                Ok(OpCode::Greater) => {
                    let (x, y) = self.pop_numbers(line)?;
                    self.push(Value::Bool(x > y), line)?;
                }

                Ok(OpCode::GreaterEqual) => {
                    let (x, y) = self.pop_numbers(line)?;
                    self.push(Value::Bool(x >= y), line)?;
                }

                Ok(OpCode::Less) => {
                    let (x, y) = self.pop_numbers(line)?;
                    self.push(Value::Bool(x < y), line)?;
                }

                Ok(OpCode::LessEqual) => {
                    let (x, y) = self.pop_numbers(line)?;
                    self.push(Value::Bool(x <= y), line)?;
                }

                // Both operands are already on the stack; these are the
                // eager forms kept for older chunks. Freshly compiled code
                // short-circuits with jumps instead.
                Ok(OpCode::And) => {
                    let (a, b) = self.pop_pair(line)?;
                    self.push(Value::Bool(a.is_truthy() && b.is_truthy()), line)?;
                }

                Ok(OpCode::Or) => {
                    let (a, b) = self.pop_pair(line)?;
                    self.push(Value::Bool(a.is_truthy() || b.is_truthy()), line)?;
                }

                Ok(OpCode::Jump) => {
                    let offset = self.read_jump(chunk, &mut ip, line)?;
                    ip += offset;
                }

                Ok(OpCode::JumpIfFalse) => {
                    let offset = self.read_jump(chunk, &mut ip, line)?;
                    if !self.peek(line)?.is_truthy() {
                        ip += offset;
                    }
                }

                Ok(OpCode::JumpIfTrue) => {
                    let offset = self.read_jump(chunk, &mut ip, line)?;
                    if self.peek(line)?.is_truthy() {
                        ip += offset;
                    }
                }

                Ok(OpCode::StoreVar) => {
                    let slot = self.read_byte(chunk, &mut ip, line)? as usize;
                    // The stored value stays on the stack.
                    let value = self.peek(line)?.clone();
                    if slot >= self.globals.len() {
                        self.globals.resize(slot + 1, Value::Null);
                    }
                    self.globals[slot] = value;
                }

                Ok(OpCode::LoadVar) => {
                    let slot = self.read_byte(chunk, &mut ip, line)? as usize;
                    let Some(value) = self.globals.get(slot).cloned() else {
                        return Err(self.error(line, "Undefined variable"));
                    };
                    self.push(value, line)?;
                }

                Ok(OpCode::CheckNull) => {
                    if self.peek(line)?.is_null() {
                        return Err(self.error(line, "Variable may be null"));
                    }
                }

                Ok(OpCode::Env) => {
                    let value = self.pop(line)?;
                    let Some(name) = value.as_str() else {
                        return Err(self.error(line, "env() requires a string argument"));
                    };
                    let result = match std::env::var(name) {
                        Ok(v) => Value::String(v),
                        Err(_) => Value::Null,
                    };
                    self.push(result, line)?;
                }

                Ok(OpCode::Input) => {
                    let value = Value::String(read_stdin_content());
                    self.push(value, line)?;
                }

                Ok(OpCode::Print) => {
                    let value = self.pop(line)?;
                    println!("{}", value);
                }

                // Reserved encodings (globals, fields, calls, aggregates,
                // exceptions) and anything out of range.
                Ok(_) | Err(_) => {
                    return Err(self.error(line, format!("Unknown opcode {}", byte)));
                }
            }
        }
    }

    fn error(&self, line: u32, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            line,
            message: message.into(),
        }
    }

    fn read_byte(&self, chunk: &Chunk, ip: &mut usize, line: u32) -> Result<u8, RuntimeError> {
        let Some(byte) = chunk.code.get(*ip).copied() else {
            return Err(self.error(line, "Truncated instruction stream"));
        };
        *ip += 1;
        Ok(byte)
    }

    fn read_jump(&self, chunk: &Chunk, ip: &mut usize, line: u32) -> Result<usize, RuntimeError> {
        let high = self.read_byte(chunk, ip, line)?;
        let low = self.read_byte(chunk, ip, line)?;
        Ok(u16::from_be_bytes([high, low]) as usize)
    }

    fn push(&mut self, value: Value, line: u32) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.error(line, "Stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, line: u32) -> Result<Value, RuntimeError> {
        let Some(value) = self.stack.pop() else {
            return Err(self.error(line, "Stack underflow"));
        };
        Ok(value)
    }

    fn peek(&self, line: u32) -> Result<&Value, RuntimeError> {
        let Some(value) = self.stack.last() else {
            return Err(self.error(line, "Stack underflow"));
        };
        Ok(value)
    }

    /// Pop the right then the left operand; returns them in source order.
    fn pop_pair(&mut self, line: u32) -> Result<(Value, Value), RuntimeError> {
        let b = self.pop(line)?;
        let a = self.pop(line)?;
        Ok((a, b))
    }

    fn pop_numbers(&mut self, line: u32) -> Result<(f64, f64), RuntimeError> {
        let (a, b) = self.pop_pair(line)?;
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(self.error(line, "Operands must be numbers")),
        }
    }
}

/// Read the POST body the CGI way: exactly `CONTENT_LENGTH` bytes from
/// standard input, capped at 1 MiB; anything missing or oversized becomes
/// the empty string.
fn read_stdin_content() -> String {
    let content_length = std::env::var("CONTENT_LENGTH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);

    if content_length == 0 || content_length >= 1_048_576 {
        return String::new();
    }

    let mut buffer = Vec::with_capacity(content_length);
    match std::io::stdin().take(content_length as u64).read_to_end(&mut buffer) {
        Ok(_) => String::from_utf8_lossy(&buffer).into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Hand-assembled chunks, the same way the VM is exercised from C.
    fn chunk_with(code: &[u8], constants: Vec<Constant>) -> Chunk {
        Chunk {
            lines: vec![1; code.len()],
            code: code.to_vec(),
            constants,
        }
    }

    fn number(n: f64) -> Constant {
        Constant::Number(n)
    }

    #[test]
    fn test_arithmetic_stores_result() {
        // 10 20 ADD -> slot 0
        let chunk = chunk_with(
            &[1, 0, 1, 1, 12, 7, 0, 0],
            vec![number(10.0), number(20.0)],
        );
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Number(30.0)));
    }

    #[test]
    fn test_string_concatenation() {
        let chunk = chunk_with(
            &[1, 0, 1, 1, 12, 7, 0, 0],
            vec![
                Constant::String("Hello".to_string()),
                Constant::String(" World".to_string()),
            ],
        );
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(
            vm.global(0)
                .unwrap()
                .equals(&Value::String("Hello World".to_string()))
        );
    }

    #[test]
    fn test_comparison() {
        // 10 < 20 -> true
        let chunk = chunk_with(
            &[1, 0, 1, 1, 23, 7, 0, 0],
            vec![number(10.0), number(20.0)],
        );
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(true)));
    }

    #[test]
    fn test_division_by_zero() {
        let chunk = chunk_with(&[1, 0, 1, 1, 15, 0], vec![number(1.0), number(0.0)]);
        let mut vm = Vm::new();
        let error = vm.execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Division by zero");
        assert_eq!(vm.state(), VmState::Halted { success: false });
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn test_modulo_by_zero() {
        let chunk = chunk_with(&[1, 0, 1, 1, 16, 0], vec![number(1.0), number(0.0)]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Modulo by zero");
    }

    #[test]
    fn test_add_type_mismatch() {
        let chunk = chunk_with(
            &[1, 0, 3, 12, 0],
            vec![Constant::String("x".to_string())],
        );
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Operands must be two numbers or two strings");
    }

    #[test]
    fn test_negate_requires_number() {
        let chunk = chunk_with(&[3, 17, 0], vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Operand must be a number");
    }

    #[test]
    fn test_not_uses_truthiness() {
        // NOT null -> true
        let chunk = chunk_with(&[2, 18, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(true)));
    }

    #[test]
    fn test_equal_across_tags_is_false() {
        // 0 == null -> false
        let chunk = chunk_with(&[1, 0, 2, 19, 7, 0, 0], vec![number(0.0)]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(false)));
    }

    #[test]
    fn test_eager_and_or_still_execute() {
        // true false AND -> false
        let chunk = chunk_with(&[3, 4, 25, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(false)));

        // false true OR -> true
        let chunk = chunk_with(&[4, 3, 26, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(true)));
    }

    #[test]
    fn test_store_then_load_round_trips() {
        // 7 -> slot 0, load it back, add, store in slot 1: 14
        let chunk = chunk_with(&[1, 0, 7, 0, 6, 0, 12, 7, 1, 0], vec![number(7.0)]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(1).unwrap().equals(&Value::Number(14.0)));
    }

    #[test]
    fn test_store_var_keeps_value_on_stack() {
        let chunk = chunk_with(&[1, 0, 7, 0, 0], vec![number(5.0)]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert_eq!(vm.stack().len(), 1);
        assert!(vm.stack()[0].equals(&Value::Number(5.0)));
    }

    #[test]
    fn test_load_from_unwritten_slot_fails() {
        let chunk = chunk_with(&[6, 3, 0], vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Undefined variable");
    }

    #[test]
    fn test_jump_skips_forward() {
        // JUMP +2 over two PUSH_FALSE bytes, then PUSH_TRUE -> slot 0.
        let chunk = chunk_with(&[27, 0, 2, 4, 4, 3, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(true)));
    }

    #[test]
    fn test_jump_if_false_peeks_without_popping() {
        // PUSH_FALSE; JUMP_IF_FALSE +1 over PUSH_NULL; STORE_VAR 0.
        let chunk = chunk_with(&[4, 28, 0, 1, 2, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        // The peeked condition is still there for STORE_VAR.
        assert!(vm.global(0).unwrap().equals(&Value::Bool(false)));
        assert_eq!(vm.stack().len(), 1);
    }

    #[test]
    fn test_jump_if_true_taken_and_not_taken() {
        // PUSH_TRUE; JUMP_IF_TRUE +1 over PUSH_NULL; STORE_VAR 0.
        let chunk = chunk_with(&[3, 29, 0, 1, 2, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::Bool(true)));

        // PUSH_FALSE; JUMP_IF_TRUE not taken; PUSH_NULL lands on top.
        let chunk = chunk_with(&[4, 29, 0, 1, 2, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().is_null());
    }

    #[test]
    fn test_check_null() {
        let chunk = chunk_with(&[2, 41, 0], vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Variable may be null");

        let chunk = chunk_with(&[3, 41, 5, 0], vec![]);
        assert!(Vm::new().execute(&chunk).is_ok());
    }

    #[test]
    fn test_reserved_opcodes_are_unknown() {
        // RETURN is encoded but has no runtime dispatch.
        let chunk = chunk_with(&[2, 31, 0], vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Unknown opcode 31");

        let chunk = chunk_with(&[99, 0], vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Unknown opcode 99");
    }

    #[test]
    fn test_stack_overflow_is_reported() {
        let mut code = vec![2u8; STACK_MAX + 1];
        code.push(0);
        let chunk = chunk_with(&code, vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "Stack overflow");
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut vm = Vm::new();
        assert_eq!(vm.state(), VmState::Ready);

        let chunk = chunk_with(&[0], vec![]);
        vm.execute(&chunk).unwrap();
        assert_eq!(vm.state(), VmState::Halted { success: true });

        let chunk = chunk_with(&[99, 0], vec![]);
        let _ = vm.execute(&chunk);
        assert_eq!(vm.state(), VmState::Halted { success: false });
    }

    #[test]
    fn test_runtime_error_carries_line() {
        let mut chunk = chunk_with(&[1, 0, 1, 1, 15, 0], vec![number(1.0), number(0.0)]);
        chunk.lines = vec![4, 4, 4, 4, 4, 0];
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.line, 4);
    }

    #[test]
    #[serial]
    fn test_env_reads_variables() {
        unsafe { std::env::set_var("RIAU_VM_TEST_VAR", "forty-two") };
        let chunk = chunk_with(
            &[1, 0, 42, 7, 0, 0],
            vec![Constant::String("RIAU_VM_TEST_VAR".to_string())],
        );
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(
            vm.global(0)
                .unwrap()
                .equals(&Value::String("forty-two".to_string()))
        );
        unsafe { std::env::remove_var("RIAU_VM_TEST_VAR") };
    }

    #[test]
    #[serial]
    fn test_env_missing_variable_is_null() {
        unsafe { std::env::remove_var("RIAU_VM_TEST_MISSING") };
        let chunk = chunk_with(
            &[1, 0, 42, 7, 0, 0],
            vec![Constant::String("RIAU_VM_TEST_MISSING".to_string())],
        );
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().is_null());
    }

    #[test]
    fn test_env_requires_string() {
        let chunk = chunk_with(&[2, 42, 0], vec![]);
        let error = Vm::new().execute(&chunk).unwrap_err();
        assert_eq!(error.message, "env() requires a string argument");
    }

    #[test]
    #[serial]
    fn test_input_without_content_length_is_empty() {
        unsafe { std::env::remove_var("CONTENT_LENGTH") };
        let chunk = chunk_with(&[43, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::String(String::new())));
    }

    #[test]
    #[serial]
    fn test_input_rejects_oversized_content_length() {
        unsafe { std::env::set_var("CONTENT_LENGTH", "99999999") };
        let chunk = chunk_with(&[43, 7, 0, 0], vec![]);
        let mut vm = Vm::new();
        vm.execute(&chunk).unwrap();
        assert!(vm.global(0).unwrap().equals(&Value::String(String::new())));
        unsafe { std::env::remove_var("CONTENT_LENGTH") };
    }
}
