use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stowage_types::StorageKey;

use crate::error::{StoreError, StoreResult};

/// Plain-data description of a storage: which backend kind, which key, and
/// backend-specific options.
///
/// ```toml
/// kind = "filesystem"
/// key = "my_fs"
/// base_dir = "/var/lib/blobs"
/// ```
///
/// Every field other than `kind` and `key` is collected into `options` and
/// handed to the backend's constructor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub kind: String,
    pub key: StorageKey,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StorageConfig {
    pub fn new(kind: impl Into<String>, key: StorageKey) -> Self {
        Self {
            kind: kind.into(),
            key,
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> StoreResult<Self> {
        serde_json::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn to_json_string(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load from a file: JSON if the extension is `.json`, TOML otherwise.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }
}
