use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdError;
use crate::key::{validate_key, StorageKey, KEY_SEPARATOR};

/// Fully-qualified blob identifier, `key:raw-id`.
///
/// The raw id is backend-defined and opaque. A `BlobId` is always
/// well-formed (it has a separator and a valid key prefix), but whether its
/// key matches a given storage is only checked by
/// [`StorageKey::strip_key`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId {
    text: String,
    /// Byte offset of the separator in `text`.
    split: usize,
}

impl BlobId {
    pub(crate) fn from_parts(key: &StorageKey, raw: &str) -> Self {
        let text = format!("{key}{KEY_SEPARATOR}{raw}");
        Self {
            split: key.as_str().len(),
            text,
        }
    }

    /// Parse a `key:raw-id` string.
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let text = s.into();
        let split = text
            .find(KEY_SEPARATOR)
            .ok_or_else(|| IdError::MissingSeparator(text.clone()))?;
        validate_key(&text[..split])?;
        Ok(Self { text, split })
    }

    /// The key prefix.
    pub fn key(&self) -> &str {
        &self.text[..self.split]
    }

    /// The backend-local raw id.
    pub fn raw(&self) -> &str {
        &self.text[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.text)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for BlobId {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl FromStr for BlobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.text
    }
}
