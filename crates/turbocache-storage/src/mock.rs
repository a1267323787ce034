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

//! In-memory mock storage backend for testing
//!
//! Provides a thread-safe, in-memory implementation of [`StorageBackend`](crate::StorageBackend)
//! using `Arc<RwLock<HashMap>>` for concurrent access. It also counts the
//! calls that reached it, which lets server tests prove that a request was
//! rejected before touching storage, and can simulate outages and latency.
//!
//! # Examples
//!
//! ```rust,no_run
//! use turbocache_storage::{stream, StorageBackend, mock::MockBackend};
//!
//! #[tokio::main]
//! async fn main() -> turbocache_storage::StorageResult<()> {
//!     let storage = MockBackend::new();
//!
//!     storage.put("shared/abc", stream::once("hello world"), None).await?;
//!     assert!(storage.exists("shared/abc").await?);
//!     assert_eq!(storage.put_count(), 1);
//!
//!     Ok(())
//! }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::stream::{self, ByteStream};
use crate::{FetchedObject, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory mock storage backend for testing
///
/// Clones share the same store and counters.
#[derive(Clone, Default)]
pub struct MockBackend {
    store: Arc<RwLock<HashMap<String, Bytes>>>,
    puts: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl MockBackend {
    /// Create a new empty mock storage backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock storage backend with initial data
    pub fn with_data(initial_data: HashMap<String, Vec<u8>>) -> Self {
        let store = initial_data
            .into_iter()
            .map(|(k, v)| (k, Bytes::from(v)))
            .collect();
        MockBackend {
            store: Arc::new(RwLock::new(store)),
            ..Self::default()
        }
    }

    /// Delay every operation by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every operation fail with a backend error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `put` calls that reached the backend
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `get` calls that reached the backend
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Get the current number of objects stored
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Check if the storage is empty
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Raw content stored under `key`
    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.store.read().await.get(key).cloned()
    }

    async fn simulate(&self) -> StorageResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::backend("mock backend unavailable"));
        }
        Ok(())
    }
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("puts", &self.put_count())
            .field("gets", &self.get_count())
            .field("latency", &self.latency)
            .finish()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.simulate().await?;
        Ok(self.store.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> StorageResult<FetchedObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let data = self
            .store
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))?;

        Ok(FetchedObject {
            size: Some(data.len() as u64),
            stream: stream::once(data),
        })
    }

    async fn put(&self, key: &str, data: ByteStream, _size_hint: Option<u64>) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        // collect fully before publishing so a failed stream stores nothing
        let data = stream::collect(data).await?;
        self.store.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        self.simulate().await?;
        Ok(self
            .store
            .read()
            .await
            .get(key)
            .map(|data| data.len() as u64))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
