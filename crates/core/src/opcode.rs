//! Bytecode instruction set.
//!
//! Single-byte opcodes. PUSH_CONST, LOAD_VAR, STORE_VAR, LOAD_GLOBAL,
//! STORE_GLOBAL, and CALL take a one-byte operand; the jump family takes a
//! two-byte big-endian forward offset measured from the byte after the
//! operand. Everything else stands alone.

/// One instruction of the Riau stack machine.
///
/// The discriminants are the on-the-wire encoding and must not be renumbered.
/// Several opcodes are reserved for features that do not execute yet
/// (globals, fields, calls, aggregates, exceptions); the VM rejects them as
/// unknown opcodes but their slots are kept so the numbering stays stable.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Halt = 0,
    PushConst = 1,
    PushNull = 2,
    PushTrue = 3,
    PushFalse = 4,
    Pop = 5,
    LoadVar = 6,
    StoreVar = 7,
    LoadGlobal = 8,
    StoreGlobal = 9,
    LoadField = 10,
    StoreField = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Mod = 16,
    Negate = 17,
    Not = 18,
    Equal = 19,
    NotEqual = 20,
    Greater = 21,
    GreaterEqual = 22,
    Less = 23,
    LessEqual = 24,
    And = 25,
    Or = 26,
    Jump = 27,
    JumpIfFalse = 28,
    JumpIfTrue = 29,
    Call = 30,
    Return = 31,
    ArrayNew = 32,
    ArrayGet = 33,
    ArraySet = 34,
    ObjectNew = 35,
    ObjectGet = 36,
    ObjectSet = 37,
    Try = 38,
    Catch = 39,
    Throw = 40,
    CheckNull = 41,
    Env = 42,
    Input = 43,
    Print = 44,
}

impl OpCode {
    /// Instruction name as it appears in disassembly.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Halt => "HALT",
            OpCode::PushConst => "PUSH_CONST",
            OpCode::PushNull => "PUSH_NULL",
            OpCode::PushTrue => "PUSH_TRUE",
            OpCode::PushFalse => "PUSH_FALSE",
            OpCode::Pop => "POP",
            OpCode::LoadVar => "LOAD_VAR",
            OpCode::StoreVar => "STORE_VAR",
            OpCode::LoadGlobal => "LOAD_GLOBAL",
            OpCode::StoreGlobal => "STORE_GLOBAL",
            OpCode::LoadField => "LOAD_FIELD",
            OpCode::StoreField => "STORE_FIELD",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Negate => "NEGATE",
            OpCode::Not => "NOT",
            OpCode::Equal => "EQUAL",
            OpCode::NotEqual => "NOT_EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::GreaterEqual => "GREATER_EQUAL",
            OpCode::Less => "LESS",
            OpCode::LessEqual => "LESS_EQUAL",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::Call => "CALL",
            OpCode::Return => "RETURN",
            OpCode::ArrayNew => "ARRAY_NEW",
            OpCode::ArrayGet => "ARRAY_GET",
            OpCode::ArraySet => "ARRAY_SET",
            OpCode::ObjectNew => "OBJECT_NEW",
            OpCode::ObjectGet => "OBJECT_GET",
            OpCode::ObjectSet => "OBJECT_SET",
            OpCode::Try => "TRY",
            OpCode::Catch => "CATCH",
            OpCode::Throw => "THROW",
            OpCode::CheckNull => "CHECK_NULL",
            OpCode::Env => "ENV",
            OpCode::Input => "INPUT",
            OpCode::Print => "PRINT",
        }
    }

    /// True for opcodes followed by a one-byte operand.
    pub fn has_byte_operand(self) -> bool {
        matches!(
            self,
            OpCode::PushConst
                | OpCode::LoadVar
                | OpCode::StoreVar
                | OpCode::LoadGlobal
                | OpCode::StoreGlobal
                | OpCode::Call
        )
    }

    /// True for opcodes followed by a two-byte big-endian jump offset.
    pub fn has_jump_operand(self) -> bool {
        matches!(
            self,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue
        )
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Ok(match byte {
            0 => OpCode::Halt,
            1 => OpCode::PushConst,
            2 => OpCode::PushNull,
            3 => OpCode::PushTrue,
            4 => OpCode::PushFalse,
            5 => OpCode::Pop,
            6 => OpCode::LoadVar,
            7 => OpCode::StoreVar,
            8 => OpCode::LoadGlobal,
            9 => OpCode::StoreGlobal,
            10 => OpCode::LoadField,
            11 => OpCode::StoreField,
            12 => OpCode::Add,
            13 => OpCode::Sub,
            14 => OpCode::Mul,
            15 => OpCode::Div,
            16 => OpCode::Mod,
            17 => OpCode::Negate,
            18 => OpCode::Not,
            19 => OpCode::Equal,
            20 => OpCode::NotEqual,
            21 => OpCode::Greater,
            22 => OpCode::GreaterEqual,
            23 => OpCode::Less,
            24 => OpCode::LessEqual,
            25 => OpCode::And,
            26 => OpCode::Or,
            27 => OpCode::Jump,
            28 => OpCode::JumpIfFalse,
            29 => OpCode::JumpIfTrue,
            30 => OpCode::Call,
            31 => OpCode::Return,
            32 => OpCode::ArrayNew,
            33 => OpCode::ArrayGet,
            34 => OpCode::ArraySet,
            35 => OpCode::ObjectNew,
            36 => OpCode::ObjectGet,
            37 => OpCode::ObjectSet,
            38 => OpCode::Try,
            39 => OpCode::Catch,
            40 => OpCode::Throw,
            41 => OpCode::CheckNull,
            42 => OpCode::Env,
            43 => OpCode::Input,
            44 => OpCode::Print,
            other => return Err(other),
        })
    }
}
