//! Foundation types for stowage.
//!
//! Every blob written through a stowage `Storage` is identified by a
//! [`BlobId`] of the form `key:raw-id`. The [`StorageKey`] is chosen by the
//! caller when the storage is configured; the raw id is whatever the backend
//! hands back and is never interpreted here.
//!
//! Keying ids this way means an id produced under one storage configuration
//! is rejected, rather than silently misread, by a storage configured with a
//! different key.
//!
//! # Key Types
//!
//! - [`StorageKey`] -- validated namespace tag, alphabet `[-_a-zA-Z0-9]+`
//! - [`BlobId`] -- fully-qualified `key:raw-id` identifier
//! - [`IdError`] -- key validation and namespacing failures

pub mod error;
pub mod id;
pub mod key;

pub use error::IdError;
pub use id::BlobId;
pub use key::StorageKey;
