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

//! Local filesystem storage backend
//!
//! Implements the `StorageBackend` trait using the local filesystem with:
//! - One directory level per key segment (`teams/acme/abc` → `root/teams/acme/abc`)
//! - Atomic writes using temp files and rename
//! - Streaming reads and writes through `tokio::fs`
//!
//! # Directory Structure
//!
//! ```text
//! root/
//!   shared/
//!     abc123
//!   teams/
//!     acme/
//!       abc123
//!       abc123.meta
//! ```
//!
//! Uploads are first written to a hidden, uniquely named file next to their
//! destination and renamed into place only after the whole stream has been
//! flushed and synced, so readers never observe a partial artifact.

use crate::error::{StorageError, StorageResult};
use crate::stream::{self, ByteStream};
use crate::{FetchedObject, StorageBackend};
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Local filesystem storage backend
///
/// # Thread Safety
///
/// This implementation is `Send + Sync` and can be safely shared across threads
/// and async tasks. Concurrent writers to the same key race on `rename`, which
/// the filesystem resolves atomically (last writer wins).
#[derive(Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem backend at the given root path
    ///
    /// Creates the root directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Fails if the root path exists but is not a directory, or cannot be created.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use turbocache_storage::local::LocalBackend;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> turbocache_storage::StorageResult<()> {
    /// let storage = LocalBackend::new("/var/cache/turbo").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();

        match fs::metadata(&root).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(StorageError::config(format!(
                    "path exists but is not a directory: {}",
                    root.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&root).await?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!(root = %root.display(), "Initialized local storage backend");
        Ok(LocalBackend { root })
    }

    /// Get the root path for this backend
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path below the root
    ///
    /// Each `/`-separated segment becomes one path component. Empty, `.` and
    /// `..` segments are rejected so a key can never escape the root.
    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::invalid_key("key cannot be empty"));
        }

        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\')
            {
                return Err(StorageError::invalid_key(format!(
                    "invalid segment in key: {}",
                    key
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Temp file used while an upload to `path` is in flight
    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
    }

    /// Stream `data` into `temp`, then flush and sync it
    async fn write_temp(temp: &Path, mut data: ByteStream) -> StorageResult<u64> {
        let mut file = fs::File::create(temp).await?;
        let mut written = 0u64;

        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// Removes an in-flight temp file unless the upload renamed it into place
///
/// Also runs when the upload future is dropped mid-stream.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        TempFile { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persisted(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial upload"),
        }
    }
}

impl fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBackend")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> StorageResult<FetchedObject> {
        let path = self.object_path(key)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::not_found(key));
            }
            Err(e) => return Err(e.into()),
        };

        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StorageError::not_found(key));
        }

        Ok(FetchedObject {
            stream: stream::from_reader(file),
            size: Some(meta.len()),
        })
    }

    /// Store an object with the given key
    ///
    /// Writes to a temporary file first, then atomically renames it to the
    /// final location. On any failure, or if this future is dropped before
    /// completing, the temporary file is removed and a previously stored
    /// object stays untouched.
    async fn put(&self, key: &str, data: ByteStream, size_hint: Option<u64>) -> StorageResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = TempFile::new(Self::temp_path(&path));
        match Self::write_temp(temp.path(), data).await {
            Ok(written) => {
                fs::rename(temp.path(), &path).await?;
                temp.persisted();
                debug!(key = %key, bytes = written, ?size_hint, "Stored object");
                Ok(())
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Discarded partial upload");
                Err(e)
            }
        }
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}
