// Turbocache - Remote Build Artifact Cache
// Copyright (C) 2025 Turbocache Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Storage abstraction layer for the Turbocache artifact server
//!
//! This crate provides a unified, asynchronous, streaming storage interface that supports
//! multiple backends:
//! - Local filesystem
//! - AWS S3 and S3-compatible services
//! - Google Cloud Storage (feature `gcs`)
//! - Azure Blob Storage (feature `azure`)
//!
//! # Architecture
//!
//! The [`StorageBackend`] trait is the capability set every backend implements:
//! existence checks, streamed reads, streamed writes and cheap size lookups.
//! A [`Location`] wraps exactly one backend chosen at startup by
//! [`create_location`] and adds a per-call deadline.
//!
//! ## Core Concepts
//!
//! - **Keys**: `/`-separated object identifiers (`teams/acme/0123abcd`)
//! - **Objects**: opaque binary blobs, always moved as a [`ByteStream`]
//! - **Not found**: an expected outcome, reported as [`StorageError::NotFound`]
//!   and never conflated with transport failures
//!
//! # Examples
//!
//! Using the mock backend for testing:
//!
//! ```no_run
//! use turbocache_storage::{stream, StorageBackend, mock::MockBackend};
//!
//! #[tokio::main]
//! async fn main() -> turbocache_storage::StorageResult<()> {
//!     let storage = MockBackend::new();
//!
//!     storage.put("teams/acme/abc123", stream::once("artifact"), Some(8)).await?;
//!     assert!(storage.exists("teams/acme/abc123").await?);
//!
//!     let object = storage.get("teams/acme/abc123").await?;
//!     let bytes = stream::collect(object.stream).await?;
//!     assert_eq!(&bytes[..], b"artifact");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Implementation Guide
//!
//! When implementing `StorageBackend`:
//!
//! 1. Use `#[async_trait]` macro on your impl block
//! 2. Return [`StorageResult`] for all operations
//! 3. Ensure your type implements `Send + Sync + Debug`
//! 4. Map the native "missing object" response to [`StorageError::NotFound`]
//! 5. Never make a partially written object visible to readers
//! 6. Leave retries to the native SDK

#[cfg(feature = "azure")]
pub mod azure;
pub mod error;
#[cfg(feature = "gcs")]
pub mod gcs;
pub mod local;
pub mod location;
pub mod mock;
pub mod s3;
pub mod stream;

use async_trait::async_trait;
use std::fmt::{self, Debug};

#[cfg(feature = "azure")]
pub use azure::AzureBackend;
pub use error::{StorageError, StorageResult};
#[cfg(feature = "gcs")]
pub use gcs::GcsBackend;
pub use local::LocalBackend;
pub use location::{create_location, Location, LocationConfig, Provider};
pub use s3::S3Backend;
pub use stream::ByteStream;

/// An object opened for reading
pub struct FetchedObject {
    /// Object content
    pub stream: ByteStream,

    /// Object size in bytes, when the backend reported it
    pub size: Option<u64>,
}

impl Debug for FetchedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedObject")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Storage backend trait for artifact storage operations
///
/// This trait defines the minimal interface the artifact server needs from an
/// object store. Implementations must be async-safe, thread-safe, and must
/// stream data in both directions instead of buffering whole objects.
///
/// # Error Handling
///
/// All operations return [`StorageResult`]. Operations should return `Err` for:
/// - `get`: key doesn't exist ([`StorageError::NotFound`]), or any I/O error
/// - `put`: permission denied, quota exceeded, inbound stream failure
/// - `exists` / `size`: only I/O, transport or permission errors
///
/// # Examples
///
/// ```rust,no_run
/// # use turbocache_storage::{stream, StorageBackend, mock::MockBackend};
/// #[tokio::main]
/// async fn example() -> turbocache_storage::StorageResult<()> {
///     let backend: Box<dyn StorageBackend> = Box::new(MockBackend::new());
///
///     backend.put("shared/abc", stream::once("data"), None).await?;
///     assert_eq!(backend.size("shared/abc").await?, Some(4));
///
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Check if an object exists
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The object exists
    /// * `Ok(false)` - The object doesn't exist
    /// * `Err` - If an I/O error occurs or permission is denied
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Open an object for streaming reads
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the key doesn't exist. Errors
    /// raised after the stream is opened are delivered through the stream.
    async fn get(&self, key: &str) -> StorageResult<FetchedObject>;

    /// Store an object, consuming `data` until it ends
    ///
    /// Overwrites any previous object under `key`. `size_hint` is the exact
    /// length when the caller knows it; backends use it to pick an upload
    /// strategy but must not trust it for correctness.
    ///
    /// If `data` yields an error the write is abandoned, that error is
    /// returned, and the previous object (if any) stays readable.
    async fn put(&self, key: &str, data: ByteStream, size_hint: Option<u64>) -> StorageResult<()>;

    /// Size of an object in bytes, or `None` when it doesn't exist
    async fn size(&self, key: &str) -> StorageResult<Option<u64>>;

    /// Short identifier of the backend and its target, e.g. `s3:my-bucket`
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _check_object_safe(_: &dyn StorageBackend) {}
    }

    #[test]
    fn fetched_object_debug_omits_stream() {
        let object = FetchedObject {
            stream: stream::once("x"),
            size: Some(1),
        };
        let debug = format!("{:?}", object);
        assert!(debug.contains("size: Some(1)"));
    }
}
