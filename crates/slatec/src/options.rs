use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Translator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Native symbol name to entry-point address.
    pub natives: BTreeMap<String, u64>,
    /// Run the bytecode validator over the finished code.
    pub validate: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            natives: BTreeMap::new(),
            validate: true,
        }
    }
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn bind_native(mut self, symbol: impl Into<String>, address: u64) -> Self {
        self.natives.insert(symbol.into(), address);
        self
    }

    pub fn native_address(&self, symbol: &str) -> Option<u64> {
        self.natives.get(symbol).copied()
    }
}
