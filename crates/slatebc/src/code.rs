use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bytecode::Bytecode;
use crate::error::BytecodeError;
use crate::types::{Signature, VarType};

/// Magic bytes for serialized code files: "SLBC"
pub const MAGIC: [u8; 4] = [0x53, 0x4C, 0x42, 0x43];
pub const VERSION: u16 = 1;

/// Per-type local slot counters of a function.
///
/// Each storable type has its own zero-based local array, so a variable's
/// address is (type, index) rather than a byte offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCounts {
    pub ints: u16,
    pub doubles: u16,
    pub strings: u16,
}

impl SlotCounts {
    pub fn get(&self, ty: VarType) -> u16 {
        match ty {
            VarType::Int => self.ints,
            VarType::Double => self.doubles,
            VarType::String => self.strings,
            _ => 0,
        }
    }

    /// Take the next free slot of `ty`. `None` for non-storable types or
    /// when the 16-bit slot space is exhausted.
    pub fn allocate(&mut self, ty: VarType) -> Option<u16> {
        let counter = match ty {
            VarType::Int => &mut self.ints,
            VarType::Double => &mut self.doubles,
            VarType::String => &mut self.strings,
            _ => return None,
        };
        let slot = *counter;
        *counter = counter.checked_add(1)?;
        Some(slot)
    }

    pub fn total(&self) -> u32 {
        u32::from(self.ints) + u32::from(self.doubles) + u32::from(self.strings)
    }
}

/// A compiled function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    id: Option<u16>,
    pub name: String,
    pub signature: Signature,
    /// Scope that holds the function's body.
    pub scope_id: u16,
    /// Final slot counters; the VM sizes the function's local arrays from these.
    pub slots: SlotCounts,
    pub bytecode: Bytecode,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Function {
            id: None,
            name: name.into(),
            signature,
            scope_id: 0,
            slots: SlotCounts::default(),
            bytecode: Bytecode::new(),
        }
    }

    pub fn id(&self) -> Option<u16> {
        self.id
    }

    /// Assign the function's id. An id can only be assigned once.
    pub fn assign_id(&mut self, id: u16) -> Result<(), BytecodeError> {
        if let Some(existing) = self.id {
            return Err(BytecodeError::IdReassigned {
                name: self.name.clone(),
                existing,
                requested: id,
            });
        }
        self.id = Some(id);
        Ok(())
    }

    pub fn return_type(&self) -> VarType {
        self.signature.return_type()
    }

    pub fn param_count(&self) -> usize {
        self.signature.param_count()
    }

    pub fn param_type(&self, index: usize) -> Option<VarType> {
        self.signature.param_type(index)
    }
}

/// Opaque entry point of a native function, supplied by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeAddress(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeFunction {
    pub name: String,
    pub signature: Signature,
    pub address: NativeAddress,
}

/// All compiled functions, the string constant pool and the native registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub version: u16,
    /// Id of the top-level function.
    pub entry: u16,
    functions: Vec<Function>,
    function_ids: BTreeMap<String, u16>,
    constants: Vec<String>,
    constant_ids: BTreeMap<String, u16>,
    natives: Vec<NativeFunction>,
    native_ids: BTreeMap<String, u16>,
}

impl Default for Code {
    fn default() -> Self {
        Self::new()
    }
}

impl Code {
    pub fn new() -> Self {
        Code {
            version: VERSION,
            entry: 0,
            functions: Vec::new(),
            function_ids: BTreeMap::new(),
            // Constant 0 is always the empty string.
            constants: vec![String::new()],
            constant_ids: BTreeMap::from([(String::new(), 0)]),
            natives: Vec::new(),
            native_ids: BTreeMap::new(),
        }
    }

    // === Functions ===

    /// Add a function, assign it the next id and return that id.
    /// The name index keeps the first function registered under a name.
    pub fn add_function(&mut self, mut func: Function) -> Result<u16, BytecodeError> {
        let id = u16::try_from(self.functions.len()).map_err(|_| BytecodeError::TooManyFunctions)?;
        func.assign_id(id)?;
        self.function_ids.entry(func.name.clone()).or_insert(id);
        self.functions.push(func);
        Ok(id)
    }

    pub fn function_by_id(&self, id: u16) -> Option<&Function> {
        self.functions.get(usize::from(id))
    }

    pub fn function_by_id_mut(&mut self, id: u16) -> Option<&mut Function> {
        self.functions.get_mut(usize::from(id))
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.function_ids
            .get(name)
            .and_then(|&id| self.function_by_id(id))
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn entry_function(&self) -> Option<&Function> {
        self.function_by_id(self.entry)
    }

    // === String constants ===

    /// Intern a string literal and return its id. Identical literals share an id.
    pub fn make_string_constant(&mut self, value: &str) -> Result<u16, BytecodeError> {
        if let Some(&id) = self.constant_ids.get(value) {
            return Ok(id);
        }
        let id = u16::try_from(self.constants.len()).map_err(|_| BytecodeError::TooManyConstants)?;
        self.constants.push(value.to_string());
        self.constant_ids.insert(value.to_string(), id);
        Ok(id)
    }

    pub fn constant_by_id(&self, id: u16) -> Option<&str> {
        self.constants.get(usize::from(id)).map(String::as_str)
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }

    // === Natives ===

    /// Register a native function. Registering the same name again returns
    /// the existing id.
    pub fn make_native_function(
        &mut self,
        name: &str,
        signature: Signature,
        address: NativeAddress,
    ) -> Result<u16, BytecodeError> {
        if let Some(&id) = self.native_ids.get(name) {
            return Ok(id);
        }
        let id = u16::try_from(self.natives.len()).map_err(|_| BytecodeError::TooManyNatives)?;
        self.natives.push(NativeFunction {
            name: name.to_string(),
            signature,
            address,
        });
        self.native_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn native_by_id(&self, id: u16) -> Option<&NativeFunction> {
        self.natives.get(usize::from(id))
    }

    pub fn natives(&self) -> &[NativeFunction] {
        &self.natives
    }

    // === Serialization ===

    /// Serialize to JSON (portable text format).
    pub fn to_json(&self) -> Result<String, BytecodeError> {
        serde_json::to_string_pretty(self).map_err(|e| BytecodeError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, BytecodeError> {
        serde_json::from_str(json).map_err(|e| BytecodeError::Serialization(e.to_string()))
    }

    /// Serialize to the binary envelope: magic + version + length + JSON payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BytecodeError> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        let json =
            serde_json::to_vec(self).map_err(|e| BytecodeError::Serialization(e.to_string()))?;
        let len = u32::try_from(json.len())
            .map_err(|_| BytecodeError::Serialization("payload larger than 4 GiB".into()))?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&json);
        Ok(buf)
    }

    /// Deserialize from the binary envelope.
    pub fn from_bytes(data: &[u8]) -> Result<Self, BytecodeError> {
        if data.len() < 10 {
            return Err(BytecodeError::InvalidBytecode("too short".into()));
        }
        if data[0..4] != MAGIC {
            return Err(BytecodeError::InvalidMagic);
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(BytecodeError::UnsupportedVersion(version));
        }
        let len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
        if data.len() < 10 + len {
            return Err(BytecodeError::InvalidBytecode("truncated payload".into()));
        }
        serde_json::from_slice(&data[10..10 + len])
            .map_err(|e| BytecodeError::Serialization(e.to_string()))
    }
}
