use serde::{Deserialize, Serialize};

use crate::error::SourceMapError;

/// Side-channel debug metadata emitted next to a compiled artifact.
///
/// ```json
/// {"mappings": "AAAA,CAEAA", "functions": ["<start>", "fibonacci"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugDescriptor {
    /// Comma-separated VLQ segments, see [`crate::mapping::decode`].
    pub mappings: String,
    /// Display names indexed by wasm function index.
    pub functions: Vec<String>,
}

impl DebugDescriptor {
    pub fn parse(bytes: &[u8]) -> Result<Self, SourceMapError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn function_name(&self, index: u32) -> Result<&str, SourceMapError> {
        self.functions
            .get(index as usize)
            .map(String::as_str)
            .ok_or(SourceMapError::UnknownFunction(index))
    }
}
