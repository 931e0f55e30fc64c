use serde::{Deserialize, Serialize};

use crate::types::VarType;

/// Declares the instruction set: one variant per opcode, its mnemonic, the
/// number of inline operand bytes that follow it, and a short description.
/// Byte values follow declaration order, starting at `Invalid = 0`.
macro_rules! opcodes {
    ($($variant:ident = $name:literal, $width:literal, $doc:literal;)*) => {
        /// Bytecode instructions for the Slate VM.
        /// Stack-based: operands are pushed/popped from a typed operand stack.
        /// Binary instructions combine the first-pushed operand with the
        /// last-pushed one, e.g. `ISUB` leaves `first - last`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Op {
            $(#[doc = $doc] $variant,)*
        }

        impl Op {
            /// Every opcode, indexed by its byte value.
            pub const ALL: &'static [Op] = &[$(Op::$variant,)*];

            /// Assembler mnemonic.
            pub fn name(self) -> &'static str {
                match self {
                    $(Op::$variant => $name,)*
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $(Op::$variant => $doc,)*
                }
            }

            /// Inline operand bytes following the opcode byte (0, 2, 4 or 8).
            pub fn operand_width(self) -> usize {
                match self {
                    $(Op::$variant => $width,)*
                }
            }
        }
    };
}

opcodes! {
    Invalid = "INVALID", 0, "Invalid instruction.";
    DLoad = "DLOAD", 8, "Push the double inlined in the next eight bytes.";
    ILoad = "ILOAD", 8, "Push the int inlined in the next eight bytes.";
    SLoad = "SLOAD", 2, "Push a string reference; next two bytes are the constant id.";
    DLoad0 = "DLOAD0", 0, "Push double 0.";
    ILoad0 = "ILOAD0", 0, "Push int 0.";
    SLoad0 = "SLOAD0", 0, "Push the empty string.";
    DLoad1 = "DLOAD1", 0, "Push double 1.";
    ILoad1 = "ILOAD1", 0, "Push int 1.";
    DLoadM1 = "DLOADM1", 0, "Push double -1.";
    ILoadM1 = "ILOADM1", 0, "Push int -1.";
    DAdd = "DADD", 0, "Pop two doubles, push their sum.";
    IAdd = "IADD", 0, "Pop two ints, push their sum.";
    DSub = "DSUB", 0, "Pop two doubles, push first-pushed minus last-pushed.";
    ISub = "ISUB", 0, "Pop two ints, push first-pushed minus last-pushed.";
    DMul = "DMUL", 0, "Pop two doubles, push their product.";
    IMul = "IMUL", 0, "Pop two ints, push their product.";
    DDiv = "DDIV", 0, "Pop two doubles, push first-pushed divided by last-pushed.";
    IDiv = "IDIV", 0, "Pop two ints, push first-pushed divided by last-pushed.";
    IMod = "IMOD", 0, "Pop two ints, push first-pushed modulo last-pushed.";
    DNeg = "DNEG", 0, "Negate the double on top of the stack.";
    INeg = "INEG", 0, "Negate the int on top of the stack.";
    IAOr = "IAOR", 0, "Pop two ints, push their bitwise OR.";
    IAAnd = "IAAND", 0, "Pop two ints, push their bitwise AND.";
    IAXor = "IAXOR", 0, "Pop two ints, push their bitwise XOR.";
    IPrint = "IPRINT", 0, "Pop and print an int.";
    DPrint = "DPRINT", 0, "Pop and print a double.";
    SPrint = "SPRINT", 0, "Pop and print a string.";
    I2D = "I2D", 0, "Convert the int on top of the stack to a double.";
    D2I = "D2I", 0, "Convert the double on top of the stack to an int.";
    S2I = "S2I", 0, "Convert the string on top of the stack to an int.";
    ISwap = "ISWAP", 0, "Swap the two topmost ints.";
    DSwap = "DSWAP", 0, "Swap the two topmost doubles.";
    SSwap = "SSWAP", 0, "Swap the two topmost strings.";
    Pop = "POP", 0, "Discard the topmost value.";
    LoadDVar0 = "LOADDVAR0", 0, "Push double variable 0.";
    LoadDVar1 = "LOADDVAR1", 0, "Push double variable 1.";
    LoadDVar2 = "LOADDVAR2", 0, "Push double variable 2.";
    LoadDVar3 = "LOADDVAR3", 0, "Push double variable 3.";
    LoadIVar0 = "LOADIVAR0", 0, "Push int variable 0.";
    LoadIVar1 = "LOADIVAR1", 0, "Push int variable 1.";
    LoadIVar2 = "LOADIVAR2", 0, "Push int variable 2.";
    LoadIVar3 = "LOADIVAR3", 0, "Push int variable 3.";
    LoadSVar0 = "LOADSVAR0", 0, "Push string variable 0.";
    LoadSVar1 = "LOADSVAR1", 0, "Push string variable 1.";
    LoadSVar2 = "LOADSVAR2", 0, "Push string variable 2.";
    LoadSVar3 = "LOADSVAR3", 0, "Push string variable 3.";
    StoreDVar0 = "STOREDVAR0", 0, "Pop into double variable 0.";
    StoreDVar1 = "STOREDVAR1", 0, "Pop into double variable 1.";
    StoreDVar2 = "STOREDVAR2", 0, "Pop into double variable 2.";
    StoreDVar3 = "STOREDVAR3", 0, "Pop into double variable 3.";
    StoreIVar0 = "STOREIVAR0", 0, "Pop into int variable 0.";
    StoreIVar1 = "STOREIVAR1", 0, "Pop into int variable 1.";
    StoreIVar2 = "STOREIVAR2", 0, "Pop into int variable 2.";
    StoreIVar3 = "STOREIVAR3", 0, "Pop into int variable 3.";
    StoreSVar0 = "STORESVAR0", 0, "Pop into string variable 0.";
    StoreSVar1 = "STORESVAR1", 0, "Pop into string variable 1.";
    StoreSVar2 = "STORESVAR2", 0, "Pop into string variable 2.";
    StoreSVar3 = "STORESVAR3", 0, "Pop into string variable 3.";
    LoadDVar = "LOADDVAR", 2, "Push a double variable of the current function; next two bytes are its slot.";
    LoadIVar = "LOADIVAR", 2, "Push an int variable of the current function; next two bytes are its slot.";
    LoadSVar = "LOADSVAR", 2, "Push a string variable of the current function; next two bytes are its slot.";
    StoreDVar = "STOREDVAR", 2, "Pop into a double variable of the current function; next two bytes are its slot.";
    StoreIVar = "STOREIVAR", 2, "Pop into an int variable of the current function; next two bytes are its slot.";
    StoreSVar = "STORESVAR", 2, "Pop into a string variable of the current function; next two bytes are its slot.";
    LoadCtxDVar = "LOADCTXDVAR", 4, "Push a double variable; next two bytes are the context id, then two bytes of slot.";
    LoadCtxIVar = "LOADCTXIVAR", 4, "Push an int variable; next two bytes are the context id, then two bytes of slot.";
    LoadCtxSVar = "LOADCTXSVAR", 4, "Push a string variable; next two bytes are the context id, then two bytes of slot.";
    StoreCtxDVar = "STORECTXDVAR", 4, "Pop into a double variable; next two bytes are the context id, then two bytes of slot.";
    StoreCtxIVar = "STORECTXIVAR", 4, "Pop into an int variable; next two bytes are the context id, then two bytes of slot.";
    StoreCtxSVar = "STORECTXSVAR", 4, "Pop into a string variable; next two bytes are the context id, then two bytes of slot.";
    DCmp = "DCMP", 0, "Pop two doubles, push cmp(first-pushed, last-pushed) as an int (-1, 0 or 1).";
    ICmp = "ICMP", 0, "Pop two ints, push cmp(first-pushed, last-pushed) as an int (-1, 0 or 1).";
    Ja = "JA", 2, "Jump always; next two bytes are the absolute target offset.";
    IfICmpNe = "IFICMPNE", 4, "Pop two ints; go to the first target if first-pushed != last-pushed, else to the second.";
    IfICmpE = "IFICMPE", 4, "Pop two ints; go to the first target if first-pushed == last-pushed, else to the second.";
    IfICmpG = "IFICMPG", 4, "Pop two ints; go to the first target if first-pushed > last-pushed, else to the second.";
    IfICmpGe = "IFICMPGE", 4, "Pop two ints; go to the first target if first-pushed >= last-pushed, else to the second.";
    IfICmpL = "IFICMPL", 4, "Pop two ints; go to the first target if first-pushed < last-pushed, else to the second.";
    IfICmpLe = "IFICMPLE", 4, "Pop two ints; go to the first target if first-pushed <= last-pushed, else to the second.";
    Dump = "DUMP", 0, "Print the topmost value without removing it.";
    Stop = "STOP", 0, "Stop execution.";
    Call = "CALL", 2, "Call a function; next two bytes are its id.";
    CallNative = "CALLNATIVE", 2, "Call a native function; next two bytes are its registry id.";
    Return = "RETURN", 0, "Return to the caller.";
    Break = "BREAK", 0, "Debugger breakpoint.";
}

impl Op {
    /// Encode to the byte written into the instruction stream.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Op> {
        Op::ALL.get(byte as usize).copied()
    }

    /// Total encoded size: opcode byte plus inline operands.
    pub fn length(self) -> usize {
        1 + self.operand_width()
    }

    pub fn is_jump(self) -> bool {
        self == Op::Ja || self.is_branch()
    }

    /// Two-target conditional branches.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Op::IfICmpNe | Op::IfICmpE | Op::IfICmpG | Op::IfICmpGe | Op::IfICmpL | Op::IfICmpLe
        )
    }

    /// Typed load of a variable; the `Ctx` variants address another function's frame.
    pub fn load_var(ty: VarType, cross_context: bool) -> Option<Op> {
        Some(match (ty, cross_context) {
            (VarType::Int, false) => Op::LoadIVar,
            (VarType::Double, false) => Op::LoadDVar,
            (VarType::String, false) => Op::LoadSVar,
            (VarType::Int, true) => Op::LoadCtxIVar,
            (VarType::Double, true) => Op::LoadCtxDVar,
            (VarType::String, true) => Op::LoadCtxSVar,
            _ => return None,
        })
    }

    pub fn store_var(ty: VarType, cross_context: bool) -> Option<Op> {
        Some(match (ty, cross_context) {
            (VarType::Int, false) => Op::StoreIVar,
            (VarType::Double, false) => Op::StoreDVar,
            (VarType::String, false) => Op::StoreSVar,
            (VarType::Int, true) => Op::StoreCtxIVar,
            (VarType::Double, true) => Op::StoreCtxDVar,
            (VarType::String, true) => Op::StoreCtxSVar,
            _ => return None,
        })
    }

    pub fn print(ty: VarType) -> Option<Op> {
        match ty {
            VarType::Int => Some(Op::IPrint),
            VarType::Double => Some(Op::DPrint),
            VarType::String => Some(Op::SPrint),
            _ => None,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
