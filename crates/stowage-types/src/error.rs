use thiserror::Error;

/// Errors produced while validating keys or namespacing blob ids.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The storage key does not match `[-_a-zA-Z0-9]+`.
    #[error("invalid storage key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A blob id had no `:` between key and raw id.
    #[error("blob id {0:?} has no key separator")]
    MissingSeparator(String),

    /// A blob id was issued by a storage with a different key.
    #[error("wrong storage: id keyed {found:?}, storage keyed {expected:?}")]
    KeyMismatch { expected: String, found: String },
}

impl IdError {
    /// `true` for malformed configuration, `false` for misuse of an id.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidKey { .. })
    }
}
