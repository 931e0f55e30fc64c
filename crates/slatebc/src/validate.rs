//! Structural checks over finished bytecode.
//!
//! Verifies that every function decodes cleanly, that all jump and branch
//! targets land on an instruction boundary inside the same function, and
//! that ids embedded in instructions refer to existing functions, natives,
//! constants and variable slots.

use std::collections::BTreeSet;

use crate::bytecode::Instruction;
use crate::code::{Code, Function};
use crate::error::BytecodeError;
use crate::opcode::Op;
use crate::types::VarType;

fn err(func: &Function, offset: usize, msg: impl Into<String>) -> BytecodeError {
    BytecodeError::InvalidBytecode(format!("{}@{offset}: {}", func.name, msg.into()))
}

/// Type and addressing mode of a variable access instruction.
fn var_access(op: Op) -> Option<(VarType, bool)> {
    Some(match op {
        Op::LoadIVar | Op::StoreIVar => (VarType::Int, false),
        Op::LoadDVar | Op::StoreDVar => (VarType::Double, false),
        Op::LoadSVar | Op::StoreSVar => (VarType::String, false),
        Op::LoadCtxIVar | Op::StoreCtxIVar => (VarType::Int, true),
        Op::LoadCtxDVar | Op::StoreCtxDVar => (VarType::Double, true),
        Op::LoadCtxSVar | Op::StoreCtxSVar => (VarType::String, true),
        _ => return None,
    })
}

/// Validate every function in the container.
pub fn validate(code: &Code) -> Result<(), BytecodeError> {
    for func in code.functions() {
        validate_function(code, func)?;
    }
    Ok(())
}

pub fn validate_function(code: &Code, func: &Function) -> Result<(), BytecodeError> {
    func.bytecode.ensure_patched()?;

    let insns = func
        .bytecode
        .instructions()
        .collect::<Result<Vec<_>, _>>()?;
    let boundaries: BTreeSet<usize> = insns.iter().map(|insn| insn.offset).collect();

    for insn in &insns {
        check_instruction(code, func, insn, &boundaries)?;
    }
    Ok(())
}

fn check_instruction(
    code: &Code,
    func: &Function,
    insn: &Instruction<'_>,
    boundaries: &BTreeSet<usize>,
) -> Result<(), BytecodeError> {
    let at = insn.offset;
    match insn.op {
        Op::Invalid => return Err(err(func, at, "invalid instruction")),
        Op::Call => {
            let id = insn.u16_operand(0).unwrap_or(u16::MAX);
            if code.function_by_id(id).is_none() {
                return Err(err(func, at, format!("call to unknown function id {id}")));
            }
        }
        Op::CallNative => {
            let id = insn.u16_operand(0).unwrap_or(u16::MAX);
            if code.native_by_id(id).is_none() {
                return Err(err(func, at, format!("call to unknown native id {id}")));
            }
        }
        Op::SLoad => {
            let id = insn.u16_operand(0).unwrap_or(u16::MAX);
            if code.constant_by_id(id).is_none() {
                return Err(err(func, at, format!("unknown string constant {id}")));
            }
        }
        op if op.is_jump() => {
            for target in insn.targets() {
                if !boundaries.contains(&target) {
                    return Err(err(
                        func,
                        at,
                        format!("jump target {target} is not an instruction boundary"),
                    ));
                }
            }
        }
        op => {
            if let Some((ty, cross_context)) = var_access(op) {
                let (owner, slot) = if cross_context {
                    let context = insn.u16_operand(0).unwrap_or(u16::MAX);
                    let owner = code.function_by_id(context).ok_or_else(|| {
                        err(func, at, format!("unknown variable context {context}"))
                    })?;
                    (owner, insn.u16_operand(1).unwrap_or(u16::MAX))
                } else {
                    (func, insn.u16_operand(0).unwrap_or(u16::MAX))
                };
                if slot >= owner.slots.get(ty) {
                    return Err(err(
                        func,
                        at,
                        format!("{ty} slot {slot} out of range for `{}`", owner.name),
                    ));
                }
            }
        }
    }
    Ok(())
}
