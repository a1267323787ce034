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

//! Storage location: the one backend the server talks to
//!
//! [`create_location`] turns a [`Provider`] and a [`LocationConfig`] into a
//! [`Location`], resolving every provider-specific detail (credentials,
//! endpoints, temp-folder roots, key unescaping) up front so request handling
//! never sees it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use turbocache_storage::{create_location, LocationConfig, Provider};
//!
//! # #[tokio::main]
//! # async fn main() -> turbocache_storage::StorageResult<()> {
//! let location = create_location(
//!     Provider::Local,
//!     &LocationConfig {
//!         path: Some("turborepo-remote-cache".to_string()),
//!         use_tmp: true,
//!         ..Default::default()
//!     },
//! )
//! .await?;
//!
//! assert!(!location.exists("shared/abc123").await?);
//! # Ok(())
//! # }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::local::LocalBackend;
use crate::s3::{S3Backend, S3Config};
use crate::stream::ByteStream;
use crate::{FetchedObject, StorageBackend};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Default deadline for a single backend call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Supported storage providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Provider {
    /// Local filesystem
    #[default]
    #[serde(rename = "local")]
    Local,

    /// AWS S3 or an S3-compatible service
    #[serde(rename = "s3")]
    S3,

    /// Google Cloud Storage
    #[serde(rename = "google-cloud-storage", alias = "gcs")]
    Gcs,

    /// Azure Blob Storage
    #[serde(rename = "azure-blob-storage", alias = "azure", alias = "abs")]
    AzureBlob,
}

impl Provider {
    /// Canonical configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::S3 => "s3",
            Provider::Gcs => "google-cloud-storage",
            Provider::AzureBlob => "azure-blob-storage",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Provider::Local),
            "s3" => Ok(Provider::S3),
            "google-cloud-storage" | "gcs" => Ok(Provider::Gcs),
            "azure-blob-storage" | "azure" | "abs" => Ok(Provider::AzureBlob),
            other => Err(StorageError::config(format!(
                "unknown storage provider '{}' (expected local, s3, google-cloud-storage or azure-blob-storage)",
                other
            ))),
        }
    }
}

/// Everything any provider might need to build its backend
///
/// Fields that don't apply to the selected provider are ignored.
#[derive(Clone, Default)]
pub struct LocationConfig {
    /// Root directory (local), bucket (S3, GCS) or container (Azure)
    pub path: Option<String>,

    /// Place the local root under the OS temp directory
    pub use_tmp: bool,

    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,

    pub client_email: Option<String>,
    pub private_key: Option<String>,
    pub project_id: Option<String>,

    pub connection_string: Option<String>,
}

impl fmt::Debug for LocationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("LocationConfig")
            .field("path", &self.path)
            .field("use_tmp", &self.use_tmp)
            .field("access_key", &masked(&self.access_key))
            .field("secret_key", &masked(&self.secret_key))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("client_email", &self.client_email)
            .field("private_key", &masked(&self.private_key))
            .field("project_id", &self.project_id)
            .field("connection_string", &masked(&self.connection_string))
            .finish()
    }
}

impl LocationConfig {
    fn require_path(&self, provider: Provider) -> StorageResult<&str> {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                StorageError::config(format!("storage path is required for provider {}", provider))
            })
    }
}

/// Replace literal `\n` sequences with newlines
///
/// Private keys passed through environment variables usually arrive with
/// their line breaks escaped.
pub fn unescape_private_key(key: &str) -> String {
    key.replace("\\n", "\n")
}

/// Build the storage location for `provider`
pub async fn create_location(provider: Provider, config: &LocationConfig) -> StorageResult<Location> {
    let path = config.require_path(provider)?;

    let backend: Arc<dyn StorageBackend> = match provider {
        Provider::Local => {
            let root = if config.use_tmp {
                std::env::temp_dir().join(path)
            } else {
                path.into()
            };
            Arc::new(LocalBackend::new(root).await?)
        }
        Provider::S3 => Arc::new(
            S3Backend::with_config(S3Config {
                bucket: path.to_string(),
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
                access_key: config.access_key.clone(),
                secret_key: config.secret_key.clone(),
                ..Default::default()
            })
            .await?,
        ),
        Provider::Gcs => gcs_backend(path, config).await?,
        Provider::AzureBlob => {
            let connection_string = config
                .connection_string
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    StorageError::config("connection string is required for provider azure-blob-storage")
                })?;
            azure_backend(path, connection_string)?
        }
    };

    info!(provider = %provider, backend = %backend.describe(), "Storage location ready");
    Ok(Location::from_backend(backend, provider))
}

#[cfg(feature = "gcs")]
async fn gcs_backend(bucket: &str, config: &LocationConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    use crate::gcs::{GcsBackend, GcsConfig};

    let backend = GcsBackend::with_config(GcsConfig {
        bucket: bucket.to_string(),
        project_id: config.project_id.clone(),
        client_email: config.client_email.clone(),
        private_key: config.private_key.as_deref().map(unescape_private_key),
    })
    .await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "gcs"))]
async fn gcs_backend(_bucket: &str, _config: &LocationConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    Err(StorageError::config(
        "google-cloud-storage support was not compiled in (enable the `gcs` feature)",
    ))
}

#[cfg(feature = "azure")]
fn azure_backend(container: &str, connection_string: &str) -> StorageResult<Arc<dyn StorageBackend>> {
    let backend = crate::azure::AzureBackend::with_connection_string(container, connection_string)?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "azure"))]
fn azure_backend(_container: &str, _connection_string: &str) -> StorageResult<Arc<dyn StorageBackend>> {
    Err(StorageError::config(
        "azure-blob-storage support was not compiled in (enable the `azure` feature)",
    ))
}

/// A configured storage backend with a per-call deadline
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct Location {
    backend: Arc<dyn StorageBackend>,
    provider: Provider,
    timeout: Duration,
}

impl Location {
    /// Wrap an already constructed backend
    pub fn from_backend(backend: Arc<dyn StorageBackend>, provider: Provider) -> Self {
        Location {
            backend,
            provider,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the deadline applied to each backend call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Backend identifier, e.g. `s3:my-bucket`
    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    async fn deadline<T>(
        &self,
        operation: &str,
        key: &str,
        call: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out(operation, key)),
        }
    }

    fn timed_out(&self, operation: &str, key: &str) -> StorageError {
        StorageError::timeout(format!("{} {} exceeded {:?}", operation, key, self.timeout))
    }

    /// Whether an object exists under `key`
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.deadline("exists", key, self.backend.exists(key)).await
    }

    /// Open `key` for reading
    ///
    /// The deadline covers opening the object, not draining the stream.
    pub async fn fetch(&self, key: &str) -> StorageResult<FetchedObject> {
        self.deadline("fetch", key, self.backend.get(key)).await
    }

    /// Store `data` under `key`, replacing any previous object
    ///
    /// The deadline bounds stalls rather than the whole upload: it restarts
    /// every time the backend pulls another chunk, and once the body has been
    /// consumed it covers committing the object. A slow upload that keeps
    /// moving is never cut off.
    pub async fn store(&self, key: &str, data: ByteStream, size_hint: Option<u64>) -> StorageResult<()> {
        let (progress, mut pulled) = watch::channel(());
        let data: ByteStream = Box::pin(data.inspect(move |_| {
            progress.send_replace(());
        }));

        let put = self.backend.put(key, data, size_hint);
        tokio::pin!(put);

        loop {
            tokio::select! {
                result = &mut put => return result,
                changed = tokio::time::timeout(self.timeout, pulled.changed()) => match changed {
                    Ok(Ok(())) => continue,
                    // body dropped, only the commit is left
                    Ok(Err(_)) => return self.deadline("store", key, &mut put).await,
                    Err(_) => return Err(self.timed_out("store", key)),
                },
            }
        }
    }

    /// Size of the object under `key`, if it exists
    pub async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        self.deadline("size", key, self.backend.size(key)).await
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("provider", &self.provider)
            .field("backend", &self.backend)
            .field("timeout", &self.timeout)
            .finish()
    }
}
