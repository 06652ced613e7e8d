//! Write-once blob storage with a backend-agnostic commit protocol.
//!
//! Callers write a blob through a [`WriteSession`], commit it to receive a
//! [`BlobId`] of the form `key:raw-id`, and later read it back through a
//! [`ReadSession`]. Blobs are immutable once committed.
//!
//! # Commit Protocol
//!
//! Backends only provide a write sink, a scoped finalize operation
//! ([`Finalize`]: acquire an id, then always release), a read source and
//! removal. The [`CommitCoordinator`] turns that into:
//!
//! - exactly-once commit: a second `commit` fails with
//!   [`StoreError::DoubleCommit`] and never reaches the backend;
//! - automatic removal of blobs that were never committed;
//! - optional removal of committed blobs when the session ends in failure
//!   (`commit_with(true)`), for all-or-nothing writes of several blobs;
//! - cleanup that never fails and never masks the session's own outcome.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`FilesystemBackend`] -- one file per blob under a base directory
//!
//! A [`Registry`] builds backends by kind name from a [`StorageConfig`].
//!
//! # Design Rules
//!
//! 1. Every id a storage issues carries its key; ids with another key are
//!    rejected before any backend read.
//! 2. A storage is immutable and shareable; each session has one owner.
//! 3. Backend errors pass through unchanged. Only cleanup faults are
//!    swallowed, and those are logged.
//! 4. Removal timing is backend-defined: a removed id may stay readable for
//!    a while, but never reappears once gone.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filesystem;
pub mod memory;
pub mod registry;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_support;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{Backend, Finalize, WriteTarget};
pub use config::StorageConfig;
pub use coordinator::{CommitCoordinator, CommitState};
pub use error::{ErrorClass, StoreError, StoreResult};
pub use filesystem::FilesystemBackend;
pub use memory::InMemoryBackend;
pub use registry::{parse_options, BackendFactory, Registry};
pub use session::{ReadSession, WriteSession};
pub use storage::Storage;
pub use stowage_types::{BlobId, IdError, StorageKey};
