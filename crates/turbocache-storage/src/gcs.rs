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

//! Google Cloud Storage backend
//!
//! Authenticates either with inline service account credentials (client
//! email + private key) or with Application Default Credentials when those
//! are absent.
//!
//! Downloads are streamed from the media endpoint. Uploads are streamed as a
//! single simple upload: GCS only makes an object visible once the request
//! body completes, so an aborted upload leaves the previous object intact.
//!
//! # Examples
//!
//! ```rust,no_run
//! use turbocache_storage::gcs::{GcsBackend, GcsConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> turbocache_storage::StorageResult<()> {
//! let storage = GcsBackend::with_config(GcsConfig {
//!     bucket: "turbo-cache".to_string(),
//!     ..Default::default()
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::stream::ByteStream;
use crate::{FetchedObject, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::Error as HttpError;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const CONTENT_TYPE: &str = "application/octet-stream";

/// Chunks buffered between the inbound stream and the upload request
const UPLOAD_CHANNEL_DEPTH: usize = 8;

/// Configuration for the GCS backend
#[derive(Clone, Default)]
pub struct GcsConfig {
    /// Bucket name
    pub bucket: String,

    /// Project id recorded in the generated service account credentials
    pub project_id: Option<String>,

    /// Service account email
    pub client_email: Option<String>,

    /// Service account private key (PEM)
    pub private_key: Option<String>,
}

impl fmt::Debug for GcsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsConfig")
            .field("bucket", &self.bucket)
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Google Cloud Storage backend
#[derive(Clone)]
pub struct GcsBackend {
    client: Arc<GcsClient>,
    config: Arc<GcsConfig>,
}

impl GcsBackend {
    /// Create a GCS backend
    ///
    /// Uses inline service account credentials when both `client_email` and
    /// `private_key` are set, and Application Default Credentials otherwise.
    pub async fn with_config(config: GcsConfig) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::config("GCS bucket name cannot be empty"));
        }

        let client_config = match (&config.client_email, &config.private_key) {
            (Some(email), Some(key)) => {
                let cred = service_account_credentials(email, key, config.project_id.as_deref())?;
                ClientConfig::default()
                    .with_credentials(cred)
                    .await
                    .map_err(|e| StorageError::config(format!("invalid GCS credentials: {}", e)))?
            }
            _ => ClientConfig::default().with_auth().await.map_err(|e| {
                StorageError::config(format!("failed to load default GCS credentials: {}", e))
            })?,
        };

        debug!(bucket = %config.bucket, "Initialized GCS backend");

        Ok(GcsBackend {
            client: Arc::new(GcsClient::new(client_config)),
            config: Arc::new(config),
        })
    }

    fn object_request(&self, key: &str) -> GetObjectRequest {
        GetObjectRequest {
            bucket: self.config.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        }
    }

    async fn stat(&self, key: &str) -> StorageResult<Option<u64>> {
        match self.client.get_object(&self.object_request(key)).await {
            Ok(object) => Ok(Some(u64::try_from(object.size).unwrap_or(0))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_error("get_object", key, e)),
        }
    }
}

impl fmt::Debug for GcsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsBackend")
            .field("bucket", &self.config.bucket)
            .finish()
    }
}

/// Build a service account credentials file from its inline parts
fn service_account_credentials(
    client_email: &str,
    private_key: &str,
    project_id: Option<&str>,
) -> StorageResult<CredentialsFile> {
    let json = serde_json::json!({
        "type": "service_account",
        "client_email": client_email,
        "private_key": private_key,
        "project_id": project_id,
        "token_uri": "https://oauth2.googleapis.com/token",
    });
    serde_json::from_value(json)
        .map_err(|e| StorageError::config(format!("invalid GCS service account: {}", e)))
}

/// HTTP status carried by a GCS error, if the request got that far
fn status_of(err: &HttpError) -> Option<u16> {
    match err {
        HttpError::Response(response) => Some(response.code),
        HttpError::HttpClient(e) | HttpError::RawResponse(e, _) => {
            e.status().map(|status| status.as_u16())
        }
        _ => None,
    }
}

fn is_not_found(err: &HttpError) -> bool {
    status_of(err) == Some(404)
}

fn map_error(operation: &str, key: &str, err: HttpError) -> StorageError {
    match status_of(&err) {
        Some(404) => StorageError::not_found(key),
        Some(401) | Some(403) => {
            StorageError::permission_denied(format!("GCS {} denied for {}", operation, key))
        }
        _ => StorageError::backend(format!("GCS {} failed for {}: {}", operation, key, err)),
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.stat(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> StorageResult<FetchedObject> {
        debug!("Fetching object from GCS: {}", key);

        // metadata first so a missing object is reported before streaming starts
        let size = self
            .stat(key)
            .await?
            .ok_or_else(|| StorageError::not_found(key))?;

        let client = self.client.clone();
        let request = self.object_request(key);
        let key = key.to_string();
        let stream = async_stream::try_stream! {
            let mut body = Box::pin(
                client
                    .download_streamed_object(&request, &Range::default())
                    .await
                    .map_err(|e| map_error("download", &key, e))?,
            );
            while let Some(chunk) = body.next().await {
                let chunk: Bytes = chunk.map_err(|e| map_error("download", &key, e))?;
                yield chunk;
            }
        };

        Ok(FetchedObject {
            stream: Box::pin(stream),
            size: Some(size),
        })
    }

    async fn put(&self, key: &str, mut data: ByteStream, size_hint: Option<u64>) -> StorageResult<()> {
        debug!(key = %key, ?size_hint, "Uploading object to GCS");

        let mut media = Media::new(key.to_string());
        media.content_type = CONTENT_TYPE.into();
        media.content_length = size_hint;
        let request = UploadObjectRequest {
            bucket: self.config.bucket.clone(),
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(UPLOAD_CHANNEL_DEPTH);

        let pump = async move {
            while let Some(chunk) = data.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx.send(Ok(bytes)).await.is_err() {
                            // upload side gave up; its error is reported instead
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(io::Error::other("inbound stream failed")))
                            .await;
                        return Err(e);
                    }
                }
            }
            Ok(())
        };
        let upload_type = UploadType::Simple(media);
        let upload =
            self.client
                .upload_streamed_object(&request, ReceiverStream::new(rx), &upload_type);

        let (pumped, uploaded) = tokio::join!(pump, upload);
        pumped?;
        uploaded.map_err(|e| map_error("upload", key, e))?;

        debug!(key = %key, "Successfully uploaded object to GCS");
        Ok(())
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        self.stat(key).await
    }

    fn describe(&self) -> String {
        format!("google-cloud-storage:{}", self.config.bucket)
    }
}
