use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::BytecodeError;
use crate::opcode::Op;

/// Largest offset a 16-bit jump operand can address.
pub const MAX_TARGET: usize = u16::MAX as usize;

/// A reserved location in a [`Bytecode`] buffer that must be filled in later:
/// either a 2-byte jump operand or a 1-byte opcode slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site(usize);

impl Site {
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Append-only instruction stream of one function.
///
/// Offsets handed out by [`Bytecode::offset`] or as [`Site`]s stay valid for
/// the lifetime of the buffer: bytes are only ever appended or overwritten in
/// place, never inserted or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    bytes: Vec<u8>,
    /// Reserved sites not yet patched.
    #[serde(skip)]
    open: BTreeSet<usize>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Bytecode {
            bytes,
            open: BTreeSet::new(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset at which the next byte will be written.
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    // === Emission ===

    pub fn emit(&mut self, op: Op) {
        self.bytes.push(op.to_byte());
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i64(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an opcode carrying a single 2-byte operand.
    pub fn emit_with_u16(&mut self, op: Op, value: u16) {
        self.emit(op);
        self.emit_u16(value);
    }

    // === Sites ===

    /// Reserve a 2-byte operand to be patched later.
    pub fn reserve_u16(&mut self) -> Site {
        let site = Site(self.offset());
        self.emit_u16(u16::MAX);
        self.open.insert(site.0);
        site
    }

    /// Reserve a one-byte opcode slot to be rewritten in place later.
    pub fn reserve_op(&mut self) -> Site {
        let site = Site(self.offset());
        self.emit(Op::Invalid);
        self.open.insert(site.0);
        site
    }

    /// Fill a reserved jump operand with an absolute target offset.
    pub fn patch_target(&mut self, site: Site, target: usize) -> Result<(), BytecodeError> {
        let target = u16::try_from(target).map_err(|_| BytecodeError::CodeTooLarge(target))?;
        self.patch_u16(site.0, target)?;
        self.open.remove(&site.0);
        Ok(())
    }

    /// Rewrite a reserved opcode slot.
    pub fn patch_op_site(&mut self, site: Site, op: Op) -> Result<(), BytecodeError> {
        self.patch_op(site.0, op)?;
        self.open.remove(&site.0);
        Ok(())
    }

    /// Overwrite two already-written bytes.
    pub fn patch_u16(&mut self, offset: usize, value: u16) -> Result<(), BytecodeError> {
        let len = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(offset..offset + 2)
            .ok_or(BytecodeError::PatchOutOfRange { offset, len })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Overwrite an already-written opcode byte.
    pub fn patch_op(&mut self, offset: usize, op: Op) -> Result<(), BytecodeError> {
        let len = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(offset)
            .ok_or(BytecodeError::PatchOutOfRange { offset, len })?;
        *slot = op.to_byte();
        Ok(())
    }

    pub fn open_sites(&self) -> impl Iterator<Item = usize> + '_ {
        self.open.iter().copied()
    }

    /// Fails on the first reserved site that was never patched.
    pub fn ensure_patched(&self) -> Result<(), BytecodeError> {
        match self.open.iter().next() {
            Some(&offset) => Err(BytecodeError::UnpatchedSite { offset }),
            None => Ok(()),
        }
    }

    // === Reading ===

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.bytes.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            bytes: &self.bytes,
            pos: 0,
            done: false,
        }
    }
}

/// A decoded instruction borrowed from a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction<'a> {
    pub offset: usize,
    pub op: Op,
    pub operands: &'a [u8],
}

impl Instruction<'_> {
    /// 2-byte operand at `index` (0 = first operand word).
    pub fn u16_operand(&self, index: usize) -> Option<u16> {
        let bytes = self.operands.get(index * 2..index * 2 + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn int_operand(&self) -> Option<i64> {
        let bytes: [u8; 8] = self.operands.try_into().ok()?;
        (self.op == Op::ILoad).then(|| i64::from_le_bytes(bytes))
    }

    pub fn double_operand(&self) -> Option<f64> {
        let bytes: [u8; 8] = self.operands.try_into().ok()?;
        (self.op == Op::DLoad).then(|| f64::from_le_bytes(bytes))
    }

    /// Absolute jump targets: one for `JA`, true then false for branches.
    pub fn targets(&self) -> Vec<usize> {
        match self.op {
            Op::Ja => self.u16_operand(0).into_iter().map(usize::from).collect(),
            op if op.is_branch() => [self.u16_operand(0), self.u16_operand(1)]
                .into_iter()
                .flatten()
                .map(usize::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Offset of the following instruction.
    pub fn next_offset(&self) -> usize {
        self.offset + self.op.length()
    }
}

/// Iterator over the instructions of a buffer. Stops after the first error.
pub struct Instructions<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, BytecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.bytes.len() {
            return None;
        }
        let offset = self.pos;
        let byte = self.bytes[offset];
        let Some(op) = Op::from_byte(byte) else {
            self.done = true;
            return Some(Err(BytecodeError::UnknownOpcode { offset, byte }));
        };
        let end = offset + op.length();
        if end > self.bytes.len() {
            self.done = true;
            return Some(Err(BytecodeError::Truncated { offset, op }));
        }
        self.pos = end;
        Some(Ok(Instruction {
            offset,
            op,
            operands: &self.bytes[offset + 1..end],
        }))
    }
}
