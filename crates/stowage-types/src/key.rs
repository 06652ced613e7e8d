//! Storage key validation and namespacing.
//!
//! A key is non-empty and made only of ASCII letters, digits, `-` and `_`.
//! In particular it never contains `:`, so the first `:` of a [`BlobId`]
//! always separates the key from the raw id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdError;
use crate::id::BlobId;

/// Separator between the key and the raw id in a [`BlobId`].
pub const KEY_SEPARATOR: char = ':';

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

/// Validate a storage key, returning `Ok(())` if valid.
///
/// ```
/// use stowage_types::key::validate_key;
///
/// assert!(validate_key("my_fs-2").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("a:b").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<(), IdError> {
    if key.is_empty() {
        return Err(IdError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".into(),
        });
    }
    if let Some(ch) = key.chars().find(|ch| !is_key_char(*ch)) {
        return Err(IdError::InvalidKey {
            key: key.to_string(),
            reason: format!("contains forbidden character: {ch:?}"),
        });
    }
    Ok(())
}

/// Namespace tag embedded in every id a storage issues.
///
/// Only constructible through validation, so namespacing a raw id with it
/// cannot fail.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Validate and wrap a key.
    pub fn new(key: impl Into<String>) -> Result<Self, IdError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mark a backend-local raw id with this key.
    pub fn add_key(&self, raw: &str) -> BlobId {
        BlobId::from_parts(self, raw)
    }

    /// Accept a caller-provided id and return its raw part.
    ///
    /// Splits on the first `:`. Fails if there is no separator or if the
    /// prefix is not this key.
    pub fn strip_key<'a>(&self, id: &'a str) -> Result<&'a str, IdError> {
        let (key, raw) = id
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| IdError::MissingSeparator(id.to_string()))?;
        if key != self.0 {
            return Err(IdError::KeyMismatch {
                expected: self.0.clone(),
                found: key.to_string(),
            });
        }
        Ok(raw)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StorageKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}
