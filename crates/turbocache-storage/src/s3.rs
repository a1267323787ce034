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

//! AWS S3 and S3-compatible storage backend
//!
//! Provides a `StorageBackend` implementation for S3 with:
//! - Static credentials or the AWS default credential chain
//! - Custom endpoint + region for S3-compatible services (MinIO, R2, Ceph, ...)
//! - Path-style addressing whenever a custom endpoint is configured
//! - Streaming downloads straight from the response body
//! - Streaming uploads: one `PutObject` for small artifacts, multipart
//!   upload with bounded buffering for large ones
//!
//! Retries are left to the SDK's own retry policy.

use crate::error::{StorageError, StorageResult};
use crate::stream::{self, ByteStream};
use crate::{FetchedObject, StorageBackend};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default multipart part size (8 MB); S3 requires at least 5 MB per part
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

const CONTENT_TYPE: &str = "application/octet-stream";

/// Configuration for the S3 backend
#[derive(Clone, Default)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// Region; falls back to the SDK's region provider chain when unset
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,

    /// Access key id; used only together with `secret_key`
    pub access_key: Option<String>,

    /// Secret access key
    pub secret_key: Option<String>,

    /// Multipart upload part size in bytes (0 selects the default)
    pub part_size: usize,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("part_size", &self.part_size)
            .finish()
    }
}

/// AWS S3 storage backend
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    config: Arc<S3Config>,
}

impl S3Backend {
    /// Create a new S3 backend
    ///
    /// Does not contact the bucket; access problems surface on the first request.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use turbocache_storage::s3::{S3Backend, S3Config};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> turbocache_storage::StorageResult<()> {
    /// let storage = S3Backend::with_config(S3Config {
    ///     bucket: "turbo-cache".to_string(),
    ///     endpoint: Some("http://localhost:9000".to_string()),
    ///     region: Some("us-east-1".to_string()),
    ///     ..Default::default()
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_config(mut config: S3Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::config("S3 bucket name cannot be empty"));
        }
        if config.part_size == 0 {
            config.part_size = DEFAULT_PART_SIZE;
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "TurbocacheStaticCredentials",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        debug!(
            bucket = %config.bucket,
            region = ?sdk_config.region(),
            "Initialized S3 backend"
        );

        Ok(S3Backend {
            client,
            config: Arc::new(config),
        })
    }

    /// Bucket this backend writes to
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Read from `data` until at least `part_size` bytes are buffered or the
    /// stream ends. Returns the buffer and whether the stream is exhausted.
    async fn next_part(data: &mut ByteStream, part_size: usize) -> StorageResult<(Bytes, bool)> {
        let mut buffer = BytesMut::with_capacity(part_size.min(DEFAULT_PART_SIZE));
        while buffer.len() < part_size {
            match data.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => return Ok((buffer.freeze(), true)),
            }
        }
        Ok((buffer.freeze(), false))
    }

    async fn put_single(&self, key: &str, body: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(S3Body::from(body))
            .send()
            .await
            .map_err(|e| backend_error("put_object", key, e))?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, first: Bytes, data: ByteStream) -> StorageResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| backend_error("create_multipart_upload", key, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::backend("no upload_id in create_multipart_upload response"))?
            .to_string();

        let pending = self.pending_upload(key, upload_id);
        match self.upload_parts(key, &pending.upload_id, first, data).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&pending.upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| backend_error("complete_multipart_upload", key, e))?;
                debug!(key = %key, upload_id = %pending.upload_id, "Completed multipart upload");
                pending.completed();
                Ok(())
            }
            Err(e) => {
                debug!(key = %key, upload_id = %pending.upload_id, error = %e, "Multipart upload failed");
                pending.abort().await;
                Err(e)
            }
        }
    }

    fn pending_upload(&self, key: &str, upload_id: String) -> PendingUpload {
        PendingUpload {
            client: self.client.clone(),
            bucket: self.config.bucket.clone(),
            key: key.to_string(),
            upload_id,
            pending: true,
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        mut data: ByteStream,
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part = first;
        let mut part_number = 1i32;
        let mut done = false;

        loop {
            let resp = self
                .client
                .upload_part()
                .bucket(&self.config.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(S3Body::from(part))
                .send()
                .await
                .map_err(|e| backend_error("upload_part", key, e))?;
            parts.push(
                CompletedPart::builder()
                    .e_tag(resp.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
            debug!(key = %key, part_number, "Uploaded part");

            if done {
                break;
            }
            let (next, exhausted) = Self::next_part(&mut data, self.config.part_size).await?;
            if next.is_empty() {
                break;
            }
            part = next;
            done = exhausted;
            part_number += 1;
        }

        Ok(parts)
    }
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.config.bucket)
            .field("endpoint", &self.config.endpoint)
            .field("part_size", &self.config.part_size)
            .finish()
    }
}

/// A started multipart upload that is aborted unless it completes
///
/// Dropping it while still pending (the upload future was cancelled) aborts
/// the upload from a background task so S3 doesn't keep the orphaned parts.
struct PendingUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    pending: bool,
}

impl PendingUpload {
    fn completed(mut self) {
        self.pending = false;
    }

    async fn abort(mut self) {
        self.pending = false;
        abort_upload(&self.client, &self.bucket, &self.key, &self.upload_id).await;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, upload_id = %self.upload_id, "No runtime left to abort multipart upload");
            return;
        };
        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        runtime.spawn(async move {
            abort_upload(&client, &bucket, &key, &upload_id).await;
        });
    }
}

/// Abort a multipart upload; failures are logged, not returned
async fn abort_upload(client: &Client, bucket: &str, key: &str, upload_id: &str) -> bool {
    match client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        Ok(_) => {
            debug!(key = %key, upload_id = %upload_id, "Aborted multipart upload");
            true
        }
        Err(e) => {
            warn!(
                key = %key,
                upload_id = %upload_id,
                error = %aws_sdk_s3::error::DisplayErrorContext(&e),
                "Failed to abort multipart upload"
            );
            false
        }
    }
}

/// HTTP status of a failed SDK call, when a response was received
fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|resp| resp.status().as_u16())
}

fn backend_error<E>(
    operation: &str,
    key: &str,
    err: SdkError<E, HttpResponse>,
) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match status_of(&err) {
        Some(403) => StorageError::permission_denied(format!("S3 {} denied for {}", operation, key)),
        _ => StorageError::backend(format!(
            "S3 {} failed for {}: {}",
            operation,
            key,
            aws_sdk_s3::error::DisplayErrorContext(&err)
        )),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.size(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> StorageResult<FetchedObject> {
        debug!("Fetching object from S3: {}", key);

        let resp = match self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || status_of(&e) == Some(404);
                if missing {
                    return Err(StorageError::not_found(key));
                }
                return Err(backend_error("get_object", key, e));
            }
        };

        let size = resp.content_length().and_then(|n| u64::try_from(n).ok());
        Ok(FetchedObject {
            stream: stream::from_reader(resp.body.into_async_read()),
            size,
        })
    }

    async fn put(&self, key: &str, mut data: ByteStream, size_hint: Option<u64>) -> StorageResult<()> {
        debug!(key = %key, ?size_hint, "Uploading object to S3");

        let (first, done) = Self::next_part(&mut data, self.config.part_size).await?;
        if done {
            self.put_single(key, first).await
        } else {
            self.put_multipart(key, first, data).await
        }
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => Ok(Some(
                resp.content_length()
                    .and_then(|n| u64::try_from(n).ok())
                    .unwrap_or(0),
            )),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                    || status_of(&e) == Some(404);
                if missing {
                    Ok(None)
                } else {
                    Err(backend_error("head_object", key, e))
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("s3:{}", self.config.bucket)
    }
}
