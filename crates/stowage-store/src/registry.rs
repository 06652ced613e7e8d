//! Backend selection by kind name.
//!
//! A [`Registry`] maps kind names (`"memory"`, `"filesystem"`, ...) to
//! constructors, so a storage can be built from plain configuration data.
//! Applications add their own backends with [`Registry::register`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::backend::Backend;
use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::filesystem::FilesystemBackend;
use crate::memory::InMemoryBackend;
use crate::storage::Storage;

/// Builds a backend from the options of a [`StorageConfig`].
pub type BackendFactory =
    Box<dyn Fn(&Map<String, Value>) -> StoreResult<Arc<dyn Backend>> + Send + Sync>;

/// Decode backend options into a typed struct.
pub fn parse_options<T: DeserializeOwned>(kind: &str, options: &Map<String, Value>) -> StoreResult<T> {
    serde_json::from_value(Value::Object(options.clone()))
        .map_err(|e| StoreError::Config(format!("{kind}: {e}")))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryOptions {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilesystemOptions {
    base_dir: PathBuf,
}

/// Name-to-constructor table of backend kinds.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, BackendFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `memory` and `filesystem` backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            "memory".into(),
            Box::new(|options: &Map<String, Value>| {
                let MemoryOptions {} = parse_options("memory", options)?;
                Ok(Arc::new(InMemoryBackend::new()) as Arc<dyn Backend>)
            }),
        );
        registry.factories.insert(
            "filesystem".into(),
            Box::new(|options: &Map<String, Value>| {
                let opts: FilesystemOptions = parse_options("filesystem", options)?;
                Ok(Arc::new(FilesystemBackend::new(opts.base_dir)) as Arc<dyn Backend>)
            }),
        );
        registry
    }

    /// Add a backend kind. Fails if the kind is already registered.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> StoreResult<()>
    where
        F: Fn(&Map<String, Value>) -> StoreResult<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(StoreError::Config(format!(
                "backend kind already registered: {kind}"
            )));
        }
        self.factories.insert(kind, Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build the storage described by `config`.
    pub fn open(&self, config: &StorageConfig) -> StoreResult<Storage> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            StoreError::Config(format!("unknown backend kind: {}", config.kind))
        })?;
        let backend = factory(&config.options)?;
        debug!(kind = %config.kind, key = %config.key, "opened storage");
        Ok(Storage::from_shared(config.key.clone(), backend))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("kinds", &self.kinds()).finish()
    }
}

impl Storage {
    /// Build a storage from configuration using the built-in backends.
    pub fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        Registry::with_builtins().open(config)
    }
}

#[cfg(test)]
mod tests {
    use stowage_types::StorageKey;

    use super::*;

    fn key() -> StorageKey {
        StorageKey::new("k1").unwrap()
    }

    #[test]
    fn builtins_are_registered() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.kinds(), vec!["filesystem", "memory"]);
        assert!(registry.contains("memory"));
        assert!(!registry.contains("s3"));
    }

    #[test]
    fn open_memory() {
        let storage = Storage::from_config(&StorageConfig::new("memory", key())).unwrap();
        assert_eq!(storage.kind(), "memory");
        let id = storage.put(b"abc").unwrap();
        assert_eq!(storage.get(&id).unwrap(), b"abc");
    }

    #[test]
    fn open_filesystem_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "kind = \"filesystem\"\nkey = \"my_fs\"\nbase_dir = {:?}\n",
            dir.path().to_str().unwrap()
        );
        let config = StorageConfig::from_toml_str(&text).unwrap();
        let storage = Registry::with_builtins().open(&config).unwrap();
        assert_eq!(storage.kind(), "filesystem");
        let id = storage.put(b"on disk").unwrap();
        assert_eq!(id.key(), "my_fs");
        assert_eq!(storage.get(&id).unwrap(), b"on disk");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Registry::with_builtins()
            .open(&StorageConfig::new("s3", key()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn missing_option_is_rejected() {
        let err = Storage::from_config(&StorageConfig::new("filesystem", key())).unwrap_err();
        assert!(err.to_string().contains("base_dir"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let config = StorageConfig::new("memory", key()).with_option("base_dir", "/tmp");
        assert!(matches!(
            Storage::from_config(&config),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn custom_backend_kind() {
        let shared = InMemoryBackend::new();
        let mut registry = Registry::new();
        let handle = shared.clone();
        registry
            .register("shared", move |_| Ok(Arc::new(handle.clone()) as Arc<dyn Backend>))
            .unwrap();

        let storage = registry.open(&StorageConfig::new("shared", key())).unwrap();
        storage.put(b"x").unwrap();
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = Registry::with_builtins();
        let err = registry
            .register("memory", |_| Ok(Arc::new(InMemoryBackend::new()) as Arc<dyn Backend>))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
