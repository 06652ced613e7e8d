//! The capability contract every storage backend provides.
//!
//! A backend only has to offer four primitives: a sequential write sink, a
//! scoped finalize operation that turns the written bytes into a raw id, a
//! sequential read source, and removal. Commit semantics, id namespacing and
//! cleanup of abandoned writes are layered on top by [`crate::Storage`], so
//! every backend gets them identically.

use std::io::{Read, Write};

use crate::error::StoreResult;

/// Scoped finalize operation for one in-flight write.
///
/// The caller pairs the two phases like a `try`/`finally`:
///
/// ```text
/// let raw = finalizer.acquire();   // persist, learn the raw id
/// ... caller code ...
/// finalizer.release();             // always runs, even if acquire failed
/// ```
///
/// `release` is called exactly once after `acquire`, whatever either of them
/// or the code between them returned. Implementations should do the work
/// that can fail *after* the id is known in `release`, so that an error
/// there still leaves the caller able to remove the written blob.
pub trait Finalize: Send {
    /// Flush and persist everything written so far, and return the
    /// backend-local raw id of the blob.
    fn acquire(&mut self) -> StoreResult<String>;

    /// Free the write-side resources held for this blob.
    fn release(&mut self) -> StoreResult<()>;
}

/// What a backend hands out for one blob write.
///
/// The sink is dropped, not flushed, before `acquire` runs; anything a sink
/// buffers must be persisted by the finalizer.
pub struct WriteTarget {
    pub sink: Box<dyn Write + Send>,
    pub finalizer: Box<dyn Finalize>,
}

impl WriteTarget {
    pub fn new(sink: impl Write + Send + 'static, finalizer: impl Finalize + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            finalizer: Box::new(finalizer),
        }
    }
}

impl std::fmt::Debug for WriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTarget").finish_non_exhaustive()
    }
}

/// Pluggable blob storage engine.
///
/// Backends deal only in raw ids; they never see storage keys. Whether
/// concurrent writers and readers of *different* ids are tolerated is up to
/// each implementation to document.
pub trait Backend: Send + Sync {
    /// Short name of this backend kind, as used in configuration.
    fn kind(&self) -> &str;

    /// Start writing a new blob.
    fn open_write(&self) -> StoreResult<WriteTarget>;

    /// Open a committed blob for sequential reading.
    fn open_read(&self, raw_id: &str) -> StoreResult<Box<dyn Read + Send>>;

    /// Remove a blob.
    ///
    /// Removal may be applied lazily: a removed id can stay readable for a
    /// while, but once gone it must never come back.
    fn remove(&self, raw_id: &str) -> StoreResult<()>;
}
