use stowage_types::IdError;

/// Broad classification of a [`StoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed key or storage configuration.
    Config,
    /// Misuse of a session or an id: double commit, write after commit,
    /// reading an id keyed for another storage.
    Protocol,
    /// Anything raised by the backend, passed through unchanged.
    Backend,
}

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key validation or id namespacing failure.
    #[error(transparent)]
    Id(#[from] IdError),

    /// `commit` was called on a session that already committed.
    #[error("cannot commit twice")]
    DoubleCommit,

    /// `write` was called on a session that already committed.
    #[error("cannot write after commit")]
    WriteAfterCommit,

    /// The backend has no blob under this raw id.
    #[error("blob not found: {id}")]
    NotFound { id: String },

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Storage configuration could not be resolved to a backend.
    #[error("invalid storage config: {0}")]
    Config(String),
}

impl StoreError {
    /// Wrap an arbitrary backend error.
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Id(e) if e.is_config() => ErrorClass::Config,
            Self::Config(_) => ErrorClass::Config,
            Self::Id(_) | Self::DoubleCommit | Self::WriteAfterCommit => ErrorClass::Protocol,
            Self::NotFound { .. } | Self::Io(_) | Self::Backend(_) => ErrorClass::Backend,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        self.class() == ErrorClass::Protocol
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
