use std::sync::Arc;

use stowage_types::{BlobId, StorageKey};
use tracing::debug;

use crate::backend::{Backend, WriteTarget};
use crate::coordinator::CommitCoordinator;
use crate::error::{StoreError, StoreResult};
use crate::session::{ReadSession, WriteSession};

/// Keyed, write-once blob storage over a pluggable [`Backend`].
///
/// ```
/// use stowage_store::{InMemoryBackend, Storage, StoreResult};
/// use stowage_types::StorageKey;
///
/// # fn main() -> StoreResult<()> {
/// let storage = Storage::new(StorageKey::new("my_fs")?, InMemoryBackend::new());
///
/// let id = storage.with_writer(|out| {
///     out.write(b"various")?;
///     out.write(b"data")?;
///     out.commit_with(true)
/// })?;
/// assert_eq!(id.key(), "my_fs");
///
/// let data = storage.with_reader(&id, |r| r.read_to_end())?;
/// assert_eq!(data, b"variousdata");
///
/// // Removed ids may stay readable for a while if the backend removes lazily.
/// storage.remove(&id)?;
/// # Ok(())
/// # }
/// ```
///
/// The key never changes after construction. Clones share the backend and
/// may be used from many threads at once; each session belongs to one
/// caller.
#[derive(Clone)]
pub struct Storage {
    key: StorageKey,
    backend: Arc<dyn Backend>,
}

impl Storage {
    pub fn new(key: StorageKey, backend: impl Backend + 'static) -> Self {
        Self::from_shared(key, Arc::new(backend))
    }

    pub fn from_shared(key: StorageKey, backend: Arc<dyn Backend>) -> Self {
        Self { key, backend }
    }

    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    /// Kind of the underlying backend.
    pub fn kind(&self) -> &str {
        self.backend.kind()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Start writing a new blob.
    ///
    /// The blob is removed when the session closes unless it was committed.
    /// A plain drop is a clean close, even when it happens on an early `?`
    /// return. Use [`Storage::with_writer`] or [`WriteSession::abort`] to
    /// close as failed, which `commit_with(true)` relies on.
    pub fn writer(&self) -> StoreResult<WriteSession> {
        let WriteTarget { sink, finalizer } = self.backend.open_write()?;
        debug!(kind = self.kind(), key = %self.key, "opened blob writer");
        Ok(WriteSession::new(
            sink,
            CommitCoordinator::new(self.clone(), finalizer),
        ))
    }

    /// Open a committed blob for reading.
    ///
    /// Fails before touching the backend if `id` was not issued under this
    /// storage's key.
    pub fn reader(&self, id: impl AsRef<str>) -> StoreResult<ReadSession> {
        let id = id.as_ref();
        let raw = self.key.strip_key(id)?;
        let source = self.backend.open_read(raw)?;
        Ok(ReadSession::new(id.to_string(), source))
    }

    /// Remove a blob. Removal may be applied lazily by the backend.
    pub fn remove(&self, id: impl AsRef<str>) -> StoreResult<()> {
        let raw = self.key.strip_key(id.as_ref())?;
        self.backend.remove(raw)?;
        debug!(id = id.as_ref(), "removed blob");
        Ok(())
    }

    /// Run `f` with a fresh write session and close it afterwards.
    ///
    /// The session is closed as failed when `f` returns `Err`, and when `f`
    /// panics. Either way the error or panic reaches the caller untouched.
    pub fn with_writer<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut WriteSession) -> Result<T, E>,
    {
        let mut session = self.writer()?;
        let result = f(&mut session);
        session.finish(result.is_err());
        result
    }

    /// Run `f` with a read session for `id`.
    pub fn with_reader<T, E, F>(&self, id: impl AsRef<str>, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut ReadSession) -> Result<T, E>,
    {
        let mut session = self.reader(id)?;
        f(&mut session)
    }

    /// Store `data` as a single blob.
    pub fn put(&self, data: &[u8]) -> StoreResult<BlobId> {
        self.with_writer(|out| {
            out.write(data)?;
            out.commit()
        })
    }

    /// Read a whole blob.
    pub fn get(&self, id: impl AsRef<str>) -> StoreResult<Vec<u8>> {
        self.with_reader(id, |r| r.read_to_end())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("key", &self.key)
            .field("kind", &self.kind())
            .finish()
    }
}
