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

//! Azure Blob Storage backend
//!
//! Connects with a storage account connection string, either
//! `DefaultEndpointsProtocol=https;AccountName=...;AccountKey=...;EndpointSuffix=core.windows.net`
//! or a shared access signature such as
//! `BlobEndpoint=https://account.blob.core.windows.net/;SharedAccessSignature=sv=...`.
//! A `BlobEndpoint` entry is used verbatim as the service URL, which is how
//! a local emulator such as Azurite is reached.
//!
//! Uploads are staged as uncommitted blocks and only become visible when the
//! block list is committed, so a failed upload never replaces the current
//! blob. Small artifacts skip staging and use a single `Put Blob`.
//!
//! The container is created on the first write if it doesn't exist yet.
//!
//! # Local Development
//!
//! ```bash
//! docker run -p 10000:10000 mcr.microsoft.com/azure-storage/azurite azurite-blob --blobHost 0.0.0.0
//! ```

use crate::error::{StorageError, StorageResult};
use crate::stream::ByteStream;
use crate::{FetchedObject, StorageBackend};
use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_core::{StatusCode, Url};
use azure_storage::prelude::*;
use azure_storage::{CloudLocation, ConnectionString};
use azure_storage_blobs::prelude::*;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Block size for staged uploads (4 MB)
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Where the client connects and how it authenticates
struct AccountLocation {
    location: CloudLocation,
    credentials: StorageCredentials,
}

fn invalid_connection_string(err: impl fmt::Display) -> StorageError {
    StorageError::config(format!("invalid Azure connection string: {}", err))
}

/// Resolve a connection string into a cloud location and credentials
///
/// Account keys and shared access signatures are both accepted. With a
/// `BlobEndpoint` the account name may be omitted; it is then taken from the
/// endpoint host (`account.blob...`) or its first path segment (`host:port/account`).
fn resolve_connection_string(connection_string: &str) -> StorageResult<AccountLocation> {
    let parsed = ConnectionString::new(connection_string).map_err(invalid_connection_string)?;
    let credentials = parsed
        .storage_credentials()
        .map_err(invalid_connection_string)?;

    let location = match parsed.blob_endpoint {
        Some(endpoint) => {
            let uri = endpoint.trim_end_matches('/');
            let url = Url::parse(uri).map_err(|e| {
                StorageError::config(format!("invalid BlobEndpoint {}: {}", endpoint, e))
            })?;
            let account = parsed
                .account_name
                .map(str::to_string)
                .or_else(|| account_from_endpoint(&url))
                .ok_or_else(|| {
                    StorageError::config(format!(
                        "cannot determine the storage account from BlobEndpoint {}",
                        endpoint
                    ))
                })?;
            debug!("Using custom blob endpoint: {}", uri);
            CloudLocation::Custom {
                account,
                uri: uri.to_string(),
            }
        }
        None => {
            let account = parsed.account_name.ok_or_else(|| {
                invalid_connection_string("missing AccountName or BlobEndpoint")
            })?;
            CloudLocation::Public {
                account: account.to_string(),
            }
        }
    };

    Ok(AccountLocation {
        location,
        credentials,
    })
}

fn account_from_endpoint(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match host.split_once(".blob.") {
        Some((account, _)) if !account.is_empty() => Some(account.to_string()),
        _ => url
            .path_segments()?
            .find(|segment| !segment.is_empty())
            .map(str::to_string),
    }
}

/// Azure Blob Storage backend
#[derive(Clone)]
pub struct AzureBackend {
    account_name: String,
    container_name: String,
    client: Arc<ContainerClient>,
    container_ready: Arc<OnceCell<()>>,
}

impl AzureBackend {
    /// Create a backend for `container_name` from a connection string
    ///
    /// No request is made until the first operation.
    pub fn with_connection_string(
        container_name: impl Into<String>,
        connection_string: &str,
    ) -> StorageResult<Self> {
        let container_name = container_name.into();
        if container_name.is_empty() {
            return Err(StorageError::config("Azure container name cannot be empty"));
        }

        let AccountLocation {
            location,
            credentials,
        } = resolve_connection_string(connection_string)?;
        let account_name = location.account().to_string();
        let client = ClientBuilder::with_location(location, credentials)
            .container_client(container_name.clone());

        info!(
            "Created Azure Blob Storage backend for {}/{}",
            account_name, container_name
        );

        Ok(AzureBackend {
            account_name,
            container_name,
            client: Arc::new(client),
            container_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Ensure the container exists, creating it if needed
    async fn ensure_container(&self) -> StorageResult<()> {
        self.container_ready
            .get_or_try_init(|| async {
                let exists = self
                    .client
                    .exists()
                    .await
                    .map_err(|e| map_error("container exists", &self.container_name, e))?;
                if !exists {
                    info!("Creating container: {}", self.container_name);
                    match self.client.create().await {
                        Ok(_) => {}
                        // lost a creation race with another writer
                        Err(e) if status_of(&e) == Some(StatusCode::Conflict) => {}
                        Err(e) => {
                            return Err(map_error("create container", &self.container_name, e))
                        }
                    }
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Fill a block from `data`; returns the block and whether the stream ended
    async fn next_block(data: &mut ByteStream) -> StorageResult<(Bytes, bool)> {
        let mut buffer = BytesMut::new();
        while buffer.len() < BLOCK_SIZE {
            match data.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => return Ok((buffer.freeze(), true)),
            }
        }
        Ok((buffer.freeze(), false))
    }

    async fn put_staged(&self, key: &str, first: Bytes, mut data: ByteStream) -> StorageResult<()> {
        let blob_client = self.client.blob_client(key);
        let mut block_ids = Vec::new();
        let mut block = first;
        let mut done = false;

        loop {
            let block_id = BlockId::new(format!("{:08}", block_ids.len()));
            blob_client
                .put_block(block_id.clone(), block)
                .await
                .map_err(|e| map_error("put block", key, e))?;
            block_ids.push(block_id);

            if done {
                break;
            }
            let (next, exhausted) = Self::next_block(&mut data).await?;
            if next.is_empty() {
                break;
            }
            block = next;
            done = exhausted;
        }

        let count = block_ids.len();
        let block_list = BlockList {
            blocks: block_ids
                .into_iter()
                .map(BlobBlockType::new_uncommitted)
                .collect(),
        };
        blob_client
            .put_block_list(block_list)
            .await
            .map_err(|e| map_error("put block list", key, e))?;

        debug!("Committed {} blocks for {}", count, key);
        Ok(())
    }
}

impl fmt::Debug for AzureBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBackend")
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .finish()
    }
}

fn status_of(err: &azure_core::Error) -> Option<StatusCode> {
    match err.kind() {
        ErrorKind::HttpResponse { status, .. } => Some(*status),
        _ => None,
    }
}

fn is_not_found(err: &azure_core::Error) -> bool {
    status_of(err) == Some(StatusCode::NotFound)
}

/// Map Azure errors onto storage errors by HTTP status
fn map_error(operation: &str, context: &str, err: azure_core::Error) -> StorageError {
    match status_of(&err) {
        Some(StatusCode::NotFound) => StorageError::not_found(context),
        Some(StatusCode::Forbidden) => {
            StorageError::permission_denied(format!("Azure {} denied for {}", operation, context))
        }
        _ => StorageError::backend(format!("Azure {} failed for {}: {}", operation, context, err)),
    }
}

#[async_trait]
impl StorageBackend for AzureBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.client.blob_client(key).exists().await {
            Ok(exists) => Ok(exists),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_error("exists", key, e)),
        }
    }

    async fn get(&self, key: &str) -> StorageResult<FetchedObject> {
        debug!(
            "Getting object from Azure Blob Storage: {}/{}",
            self.container_name, key
        );

        let blob_client = self.client.blob_client(key);
        let properties = blob_client
            .get_properties()
            .await
            .map_err(|e| map_error("get properties", key, e))?;
        let size = properties.blob.properties.content_length;

        let key = key.to_string();
        let stream = async_stream::try_stream! {
            let mut ranges = Box::pin(blob_client.get().into_stream());
            while let Some(response) = ranges.next().await {
                let response = response.map_err(|e| map_error("get", &key, e))?;
                let chunk: Bytes = response
                    .data
                    .collect()
                    .await
                    .map_err(|e| map_error("get", &key, e))?;
                yield chunk;
            }
        };

        Ok(FetchedObject {
            stream: Box::pin(stream),
            size: Some(size),
        })
    }

    async fn put(&self, key: &str, mut data: ByteStream, size_hint: Option<u64>) -> StorageResult<()> {
        debug!(key = %key, ?size_hint, "Putting object to Azure Blob Storage");
        self.ensure_container().await?;

        let (first, done) = Self::next_block(&mut data).await?;
        if done {
            self.client
                .blob_client(key)
                .put_block_blob(first)
                .content_type("application/octet-stream")
                .await
                .map_err(|e| map_error("put blob", key, e))?;
        } else {
            self.put_staged(key, first, data).await?;
        }

        debug!("Successfully uploaded {}", key);
        Ok(())
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        match self.client.blob_client(key).get_properties().await {
            Ok(properties) => Ok(Some(properties.blob.properties.content_length)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_error("get properties", key, e)),
        }
    }

    fn describe(&self) -> String {
        format!("azure-blob-storage:{}", self.container_name)
    }
}
