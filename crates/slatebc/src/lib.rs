pub mod opcode;
pub mod types;
pub mod bytecode;
pub mod code;
pub mod error;
pub mod validate;
#[cfg(test)]
mod tests;

pub use opcode::Op;
pub use types::{Signature, SignatureElement, VarType};
pub use bytecode::{Bytecode, Instruction, Site};
pub use code::{Code, Function, NativeAddress, NativeFunction, SlotCounts};
pub use error::BytecodeError;
