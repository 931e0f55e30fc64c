use thiserror::Error;

use crate::opcode::Op;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BytecodeError {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("function `{name}` already has id {existing}, cannot assign {requested}")]
    IdReassigned {
        name: String,
        existing: u16,
        requested: u16,
    },
    #[error("unpatched jump site at offset {offset}")]
    UnpatchedSite { offset: usize },
    #[error("offset {offset} is not inside the code buffer (length {len})")]
    PatchOutOfRange { offset: usize, len: usize },
    #[error("code too large: offset {0} does not fit in a 16-bit jump target")]
    CodeTooLarge(usize),

    #[error("too many functions (limit: 65535)")]
    TooManyFunctions,
    #[error("too many string constants (limit: 65535)")]
    TooManyConstants,
    #[error("too many native functions (limit: 65535)")]
    TooManyNatives,

    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },
    #[error("instruction {op} at offset {offset} is truncated")]
    Truncated { offset: usize, op: Op },
}
