use axum::{
    body::{Body, HttpBody},
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turbocache_storage::{stream, StorageError};

use crate::artifact::{ArtifactKey, ArtifactMetadata, ArtifactQuery};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const OCTET_STREAM: &str = "application/octet-stream";

/// Response body of a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Addresses of the stored artifacts
    pub urls: Vec<String>,
}

/// Response body of the status route
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always `enabled` while the server is up
    pub status: String,

    /// Backend identifier, e.g. `s3:my-bucket`
    pub backend: String,

    /// Whether uploads are refused
    pub read_only: bool,
}

/// Where a client found (or missed) an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    Local,
    Remote,
}

/// Cache lookup outcome reported by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Hit,
    Miss,
}

/// One client-side cache usage event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    pub session_id: String,
    pub source: EventSource,
    pub event: EventKind,
    pub hash: String,
    /// Time saved in milliseconds, reported on hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// HEAD /{version}/artifacts/:hash
pub async fn head_artifact(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(query): Query<ArtifactQuery>,
) -> ApiResult<Response> {
    let key = ArtifactKey::from_request(&hash, &query)?;
    tracing::debug!("HEAD /artifacts/{}", key);

    let storage_key = key.storage_key();
    if !state.location.exists(&storage_key).await? {
        return Err(ApiError::NotFound("Artifact not found".to_string()));
    }

    let mut headers = HeaderMap::new();
    if let Some(size) = state.location.size(&storage_key).await? {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    load_metadata(&state, &key).await.apply(&mut headers);

    Ok((StatusCode::OK, headers).into_response())
}

/// GET /{version}/artifacts/:hash
///
/// Streams the stored bytes; nothing is buffered beyond what the backend
/// yields per chunk.
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(query): Query<ArtifactQuery>,
) -> ApiResult<Response> {
    let key = ArtifactKey::from_request(&hash, &query)?;
    tracing::info!("GET /artifacts/{}", key);

    let object = state.location.fetch(&key.storage_key()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
    if let Some(size) = object.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    load_metadata(&state, &key).await.apply(&mut headers);

    Ok((StatusCode::OK, headers, Body::from_stream(object.stream)).into_response())
}

/// PUT /{version}/artifacts/:hash
///
/// Rejects oversized bodies up front when the length is declared; bodies of
/// unknown length are cut off once they cross the limit and the partial
/// upload is discarded by the backend.
pub async fn put_artifact(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Query(query): Query<ArtifactQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<UploadResponse>> {
    let key = ArtifactKey::from_request(&hash, &query)?;
    tracing::info!("PUT /artifacts/{}", key);

    if !is_octet_stream(&headers) {
        return Err(ApiError::UnsupportedMediaType(format!(
            "Content-Type must be {}",
            OCTET_STREAM
        )));
    }

    let size_hint = match declared_length(&headers)? {
        Some(length) => Some(length),
        None => body.size_hint().exact(),
    };
    if let Some(size) = size_hint {
        if size > state.body_limit {
            tracing::warn!(
                "Rejected upload of {} bytes for {} (limit {})",
                size,
                key,
                state.body_limit
            );
            return Err(ApiError::PayloadTooLarge {
                limit: state.body_limit,
            });
        }
    }

    let data = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(StorageError::other));
    let data = stream::limit(Box::pin(data), state.body_limit);

    state
        .location
        .store(&key.storage_key(), data, size_hint)
        .await?;

    let metadata = ArtifactMetadata::from_headers(&headers);
    store_metadata(&state, &key, &metadata).await?;

    Ok(Json(UploadResponse {
        urls: vec![key.url()],
    }))
}

/// GET /{version}/artifacts/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "enabled".to_string(),
        backend: state.location.describe(),
        read_only: state.read_only,
    })
}

/// POST /{version}/artifacts/events
///
/// Events are logged and otherwise dropped.
pub async fn record_events(
    payload: Result<Json<Vec<CacheEvent>>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(events) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    for event in &events {
        tracing::info!(
            session_id = %event.session_id,
            source = ?event.source,
            event = ?event.event,
            hash = %event.hash,
            duration = ?event.duration,
            "cache event"
        );
    }

    Ok(StatusCode::OK)
}

fn is_octet_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(OCTET_STREAM))
}

fn declared_length(headers: &HeaderMap) -> ApiResult<Option<u64>> {
    match headers.get(header::CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| ApiError::bad_request("Invalid Content-Length header")),
        None => Ok(None),
    }
}

/// Metadata for `key`, empty when missing or unreadable
async fn load_metadata(state: &AppState, key: &ArtifactKey) -> ArtifactMetadata {
    let raw = match state.location.fetch(&key.meta_key()).await {
        Ok(object) => stream::collect(object.stream).await,
        Err(e) => Err(e),
    };

    match raw {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed metadata for {}: {}", key, e);
            ArtifactMetadata::default()
        }),
        Err(e) if e.is_not_found() => ArtifactMetadata::default(),
        Err(e) => {
            tracing::warn!("Failed to read metadata for {}: {}", key, e);
            ArtifactMetadata::default()
        }
    }
}

async fn store_metadata(
    state: &AppState,
    key: &ArtifactKey,
    metadata: &ArtifactMetadata,
) -> ApiResult<()> {
    let record = serde_json::to_vec(metadata).map_err(|e| ApiError::Backend(e.to_string()))?;
    let size = record.len() as u64;
    state
        .location
        .store(&key.meta_key(), stream::once(record), Some(size))
        .await?;
    Ok(())
}
