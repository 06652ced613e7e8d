//! Write and read sessions.
//!
//! A [`WriteSession`] is bound to exactly one in-flight blob. Closing it, by
//! [`WriteSession::close`], [`WriteSession::abort`] or by dropping it, runs
//! the commit coordinator's cleanup exactly once. Dropping a session while a
//! panic unwinds counts as a failed close.

use std::io::{self, Read, Write};

use stowage_types::BlobId;
use tracing::debug;

use crate::coordinator::{CommitCoordinator, CommitState};
use crate::error::{StoreError, StoreResult};

/// Sequential writer for one blob. Created by [`crate::Storage::writer`].
pub struct WriteSession {
    /// `None` after commit.
    sink: Option<Box<dyn Write + Send>>,
    coordinator: CommitCoordinator,
    written: u64,
}

impl WriteSession {
    pub(crate) fn new(sink: Box<dyn Write + Send>, coordinator: CommitCoordinator) -> Self {
        Self {
            sink: Some(sink),
            coordinator,
            written: 0,
        }
    }

    /// Append bytes to the blob.
    pub fn write(&mut self, data: &[u8]) -> StoreResult<()> {
        let sink = self.sink.as_mut().ok_or(StoreError::WriteAfterCommit)?;
        sink.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Seal the blob and return its id. Same as `commit_with(false)`.
    pub fn commit(&mut self) -> StoreResult<BlobId> {
        self.commit_with(false)
    }

    /// Seal the blob and return its id.
    ///
    /// Prevents further writes and frees the write-side resources. With
    /// `remove_on_exception`, the blob is still removed if this session then
    /// closes in failure, which lets several blobs be written all-or-nothing.
    ///
    /// A failed close is [`WriteSession::abort`], a drop during a panic, or
    /// the closure of [`crate::Storage::with_writer`] returning `Err`. Dropping
    /// the session on an early `?` return outside `with_writer` is a clean
    /// close and keeps the committed blob.
    pub fn commit_with(&mut self, remove_on_exception: bool) -> StoreResult<BlobId> {
        self.sink = None;
        let id = self.coordinator.commit(remove_on_exception)?;
        debug!(id = %id, bytes = self.written, remove_on_exception, "committed blob");
        Ok(id)
    }

    /// The id, once a commit learned one.
    pub fn id(&self) -> Option<&BlobId> {
        self.coordinator.id()
    }

    pub fn state(&self) -> CommitState {
        self.coordinator.state()
    }

    /// Bytes accepted by [`WriteSession::write`] so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Close normally. An uncommitted blob is removed.
    pub fn close(mut self) -> CommitState {
        self.finish(false)
    }

    /// Close as if an error were propagating out of the session.
    pub fn abort(mut self) -> CommitState {
        self.finish(true)
    }

    pub(crate) fn finish(&mut self, failed: bool) -> CommitState {
        self.sink = None;
        self.coordinator.cleanup(failed);
        self.coordinator.state()
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        self.finish(std::thread::panicking());
    }
}

impl Write for WriteSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| io::Error::other(StoreError::WriteAfterCommit))?;
        let n = sink.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WriteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSession")
            .field("open", &self.sink.is_some())
            .field("written", &self.written)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Sequential reader for one committed blob. Created by
/// [`crate::Storage::reader`].
pub struct ReadSession {
    id: String,
    source: Box<dyn Read + Send>,
}

impl ReadSession {
    pub(crate) fn new(id: String, source: Box<dyn Read + Send>) -> Self {
        Self { id, source }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read up to `size` bytes, or everything that remains if `size` is
    /// `None`. Returns fewer bytes only at the end of the blob.
    pub fn read(&mut self, size: Option<usize>) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        match size {
            None => {
                self.source.read_to_end(&mut buf)?;
            }
            Some(n) => {
                self.source.by_ref().take(n as u64).read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }

    pub fn read_to_end(&mut self) -> StoreResult<Vec<u8>> {
        self.read(None)
    }
}

impl Read for ReadSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl std::fmt::Debug for ReadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSession").field("id", &self.id).finish()
    }
}
