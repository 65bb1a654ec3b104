//! Riau Core
//!
//! Shared foundation for the Riau compiler and virtual machine: the bytecode
//! instruction set, compiled chunks, and the constant pool. The numeric
//! values of the opcodes are part of the wire format - previously serialised
//! chunks must stay loadable - so they are pinned here and nowhere else.

pub mod chunk;
pub mod opcode;

pub use chunk::{Chunk, Constant};
pub use opcode::OpCode;

/// Maximum value-stack depth the VM supports.
pub const STACK_MAX: usize = 256;

/// Maximum number of variable slots addressable by the compiler.
pub const GLOBALS_MAX: usize = 256;
