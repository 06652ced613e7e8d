//! Commit protocol shared by every backend.
//!
//! A [`CommitCoordinator`] sits between a write session and the backend's
//! [`Finalize`] operation. It guarantees that:
//!
//! 1. The finalizer runs at most once. It is taken out of the coordinator
//!    before any backend code executes, so a second commit is rejected even
//!    when the first one failed halfway.
//! 2. `release` always follows `acquire`, whatever `acquire` returned.
//! 3. A blob whose id was handed back to the caller is never removed by
//!    cleanup, unless the caller committed with `remove_on_exception` and the
//!    session then ended in failure.
//! 4. A blob that was written but never successfully committed is removed
//!    when the session closes, if its raw id can be learned at all.
//!
//! Cleanup never fails and never hides the outcome of the session: faults
//! during cleanup are logged and discarded.

use stowage_types::BlobId;
use tracing::{debug, error, warn};

use crate::backend::Finalize;
use crate::error::{StoreError, StoreResult};
use crate::storage::Storage;

/// Lifecycle of one blob write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitState {
    /// Bytes may still be written; or a commit attempt failed and the
    /// session has not closed yet.
    Writing,
    /// An id was issued and the blob is kept.
    Committed,
    /// Cleanup ran: the blob was removed, or there was nothing to remove.
    Aborted,
    /// Cleanup could not learn the id or could not remove the blob.
    CleanupFailed,
}

/// Enforces exactly-once commit and cleans up blobs that were not committed.
pub struct CommitCoordinator {
    storage: Storage,
    /// `None` once a commit was attempted.
    finalizer: Option<Box<dyn Finalize>>,
    id: Option<BlobId>,
    /// Remove the blob at cleanup unless told otherwise.
    remove: bool,
    remove_on_exception: bool,
    state: CommitState,
    cleaned_up: bool,
}

impl CommitCoordinator {
    pub fn new(storage: Storage, finalizer: Box<dyn Finalize>) -> Self {
        Self {
            storage,
            finalizer: Some(finalizer),
            id: None,
            remove: true,
            remove_on_exception: false,
            state: CommitState::Writing,
            cleaned_up: false,
        }
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    /// The namespaced id, once the finalizer yielded one.
    ///
    /// Set even when the commit then failed in `release`.
    pub fn id(&self) -> Option<&BlobId> {
        self.id.as_ref()
    }

    /// `true` once a commit was attempted, successful or not.
    pub fn is_consumed(&self) -> bool {
        self.finalizer.is_none()
    }

    /// Finalize the blob and return its namespaced id.
    ///
    /// With `remove_on_exception`, the blob is still removed if the session
    /// later closes in failure. Fails with [`StoreError::DoubleCommit`] on
    /// any call after the first, without touching the backend.
    pub fn commit(&mut self, remove_on_exception: bool) -> StoreResult<BlobId> {
        // Taken before backend code runs, so cleanup and retries see the
        // attempt even if `acquire` or `release` fail.
        let mut finalizer = self.finalizer.take().ok_or(StoreError::DoubleCommit)?;
        self.remove_on_exception = remove_on_exception;

        let acquired = finalizer.acquire().map(|raw| {
            debug_assert!(self.remove, "blob already marked as kept");
            let id = self.storage.key().add_key(&raw);
            self.id = Some(id.clone());
            id
        });
        // A failing release leaves `remove` set, so cleanup removes the
        // blob instead of handing out a possibly-bad id.
        let released = finalizer.release();
        drop(finalizer);

        if let (Err(acquire_err), Err(release_err)) = (&acquired, &released) {
            warn!(
                error = %release_err,
                cause = %acquire_err,
                "release failed after a failed acquire"
            );
        }
        let id = acquired?;
        released?;

        self.remove = false;
        self.state = CommitState::Committed;
        Ok(id)
    }

    /// Session-close cleanup. Runs once; later calls do nothing.
    ///
    /// `failed` tells whether the session is ending because of an error.
    pub fn cleanup(&mut self, failed: bool) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        let mut fault = false;
        if !self.is_consumed() {
            debug_assert!(self.id.is_none() && self.remove);
            // Commit only to learn the id, so the blob can be removed.
            match self.commit(true) {
                Ok(_) => self.remove = true,
                Err(e) => {
                    fault = true;
                    error!(
                        error = %e,
                        kind = self.storage.kind(),
                        "failed to finalize an uncommitted blob during cleanup"
                    );
                }
            }
        }

        if failed && self.remove_on_exception {
            self.remove = true;
        }

        if !self.remove {
            return;
        }
        match &self.id {
            Some(id) => match self.storage.remove(id) {
                Ok(()) => {
                    debug!(id = %id, "removed uncommitted blob");
                    self.state = CommitState::Aborted;
                }
                Err(e) => {
                    error!(id = %id, error = %e, "failed to remove uncommitted blob");
                    self.state = CommitState::CleanupFailed;
                }
            },
            None if fault => self.state = CommitState::CleanupFailed,
            None => self.state = CommitState::Aborted,
        }
    }
}

impl std::fmt::Debug for CommitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitCoordinator")
            .field("state", &self.state)
            .field("id", &self.id)
            .field("remove", &self.remove)
            .field("remove_on_exception", &self.remove_on_exception)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::test_support::{faulty_storage, memory_storage, Faults};

    fn coordinator(storage: &Storage, data: &[u8]) -> CommitCoordinator {
        let target = storage.backend().open_write().unwrap();
        let mut sink = target.sink;
        sink.write_all(data).unwrap();
        drop(sink);
        CommitCoordinator::new(storage.clone(), target.finalizer)
    }

    // -----------------------------------------------------------------------
    // Explicit commit
    // -----------------------------------------------------------------------

    #[test]
    fn commit_namespaces_id() {
        let (storage, backend) = memory_storage();
        let mut c = coordinator(&storage, b"data");
        let id = c.commit(false).unwrap();
        assert_eq!(id.key(), "k1");
        assert!(backend.contains(id.raw()));
        assert_eq!(c.state(), CommitState::Committed);
        assert_eq!(c.id(), Some(&id));
    }

    #[test]
    fn double_commit_is_rejected_without_backend_calls() {
        let (storage, _, calls) = faulty_storage(Faults::default());
        let mut c = coordinator(&storage, b"data");
        c.commit(false).unwrap();
        let err = c.commit(false).unwrap_err();
        assert!(matches!(err, StoreError::DoubleCommit));
        assert!(err.is_protocol_violation());
        assert_eq!(calls.acquires(), 1);
        assert_eq!(calls.releases(), 1);
    }

    #[test]
    fn retry_after_failed_commit_is_rejected() {
        let (storage, _, calls) = faulty_storage(Faults {
            acquire: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        assert!(c.commit(false).is_err());
        assert!(matches!(c.commit(false), Err(StoreError::DoubleCommit)));
        assert_eq!(calls.acquires(), 1);
    }

    #[test]
    fn release_runs_when_acquire_fails() {
        let (storage, backend, calls) = faulty_storage(Faults {
            acquire: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        let err = c.commit(false).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(calls.releases(), 1);
        assert!(c.id().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn release_failure_records_id_but_fails_commit() {
        let (storage, backend, _) = faulty_storage(Faults {
            release: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        assert!(c.commit(false).is_err());
        let id = c.id().cloned().expect("id learned before release");
        assert!(backend.contains(id.raw()));
        assert_eq!(c.state(), CommitState::Writing);
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    #[test]
    fn committed_blob_survives_clean_close() {
        let (storage, backend, calls) = faulty_storage(Faults::default());
        let mut c = coordinator(&storage, b"data");
        let id = c.commit(false).unwrap();
        c.cleanup(false);
        assert!(backend.contains(id.raw()));
        assert_eq!(calls.removes(), 0);
        assert_eq!(c.state(), CommitState::Committed);
    }

    #[test]
    fn committed_blob_survives_unrelated_failure() {
        let (storage, backend) = memory_storage();
        let mut c = coordinator(&storage, b"data");
        let id = c.commit(false).unwrap();
        c.cleanup(true);
        assert!(backend.contains(id.raw()));
        assert_eq!(c.state(), CommitState::Committed);
    }

    #[test]
    fn remove_on_exception_removes_after_failure() {
        let (storage, backend) = memory_storage();
        let mut c = coordinator(&storage, b"data");
        let id = c.commit(true).unwrap();
        c.cleanup(true);
        assert!(!backend.contains(id.raw()));
        assert_eq!(c.state(), CommitState::Aborted);
    }

    #[test]
    fn remove_on_exception_keeps_blob_on_clean_close() {
        let (storage, backend) = memory_storage();
        let mut c = coordinator(&storage, b"data");
        let id = c.commit(true).unwrap();
        c.cleanup(false);
        assert!(backend.contains(id.raw()));
    }

    #[test]
    fn uncommitted_blob_is_removed() {
        let (storage, backend, calls) = faulty_storage(Faults::default());
        let mut c = coordinator(&storage, b"partial");
        c.cleanup(false);
        assert_eq!(calls.acquires(), 1);
        assert_eq!(calls.removes(), 1);
        assert!(backend.is_empty());
        assert_eq!(c.state(), CommitState::Aborted);
        assert!(c.is_consumed());
    }

    #[test]
    fn uncommitted_blob_is_removed_on_failure() {
        let (storage, backend) = memory_storage();
        let mut c = coordinator(&storage, b"partial");
        c.cleanup(true);
        assert!(backend.is_empty());
        assert_eq!(c.state(), CommitState::Aborted);
    }

    #[test]
    fn failed_acquire_leaves_nothing_to_remove() {
        let (storage, _, calls) = faulty_storage(Faults {
            acquire: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        assert!(c.commit(false).is_err());
        c.cleanup(true);
        assert_eq!(calls.removes(), 0);
        assert_eq!(c.state(), CommitState::Aborted);
    }

    #[test]
    fn failed_release_triggers_removal() {
        let (storage, backend, calls) = faulty_storage(Faults {
            release: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        assert!(c.commit(false).is_err());
        c.cleanup(false);
        assert_eq!(calls.removes(), 1);
        assert!(backend.is_empty());
        assert_eq!(c.state(), CommitState::Aborted);
    }

    #[test]
    fn implicit_commit_failure_is_swallowed() {
        let (storage, _, calls) = faulty_storage(Faults {
            acquire: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        c.cleanup(true);
        assert_eq!(calls.acquires(), 1);
        assert_eq!(calls.releases(), 1);
        assert_eq!(calls.removes(), 0);
        assert_eq!(c.state(), CommitState::CleanupFailed);
    }

    #[test]
    fn implicit_commit_release_failure_still_removes() {
        let (storage, backend, calls) = faulty_storage(Faults {
            release: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        c.cleanup(false);
        assert_eq!(calls.removes(), 1);
        assert!(backend.is_empty());
        assert_eq!(c.state(), CommitState::Aborted);
    }

    #[test]
    fn remove_failure_is_swallowed() {
        let (storage, backend, calls) = faulty_storage(Faults {
            remove: true,
            ..Faults::default()
        });
        let mut c = coordinator(&storage, b"data");
        c.cleanup(false);
        assert_eq!(calls.removes(), 1);
        assert_eq!(backend.len(), 1);
        assert_eq!(c.state(), CommitState::CleanupFailed);
    }

    #[test]
    fn cleanup_runs_once() {
        let (storage, _, calls) = faulty_storage(Faults::default());
        let mut c = coordinator(&storage, b"data");
        c.cleanup(false);
        c.cleanup(true);
        assert_eq!(calls.acquires(), 1);
        assert_eq!(calls.removes(), 1);
    }

    #[test]
    fn commit_after_cleanup_is_rejected() {
        let (storage, _) = memory_storage();
        let mut c = coordinator(&storage, b"data");
        c.cleanup(false);
        assert!(matches!(c.commit(false), Err(StoreError::DoubleCommit)));
    }

    #[test]
    fn debug_format() {
        let (storage, _) = memory_storage();
        let c = coordinator(&storage, b"");
        let debug = format!("{c:?}");
        assert!(debug.contains("CommitCoordinator"));
        assert!(debug.contains("Writing"));
    }
}
