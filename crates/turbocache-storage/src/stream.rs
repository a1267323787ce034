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

//! Byte stream plumbing shared by every backend
//!
//! Artifacts move through the storage layer as [`ByteStream`]s so that memory
//! use stays bounded by chunk size rather than artifact size.

use crate::error::{StorageError, StorageResult};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// A boxed stream of artifact bytes
pub type ByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// Wrap an in-memory buffer as a single-chunk stream
pub fn once(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Stream the contents of an async reader
pub fn from_reader<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(ReaderStream::new(reader).map(|chunk| chunk.map_err(StorageError::from)))
}

/// Drain a stream into one contiguous buffer
///
/// Only meant for small objects (metadata records, tests).
pub async fn collect(mut data: ByteStream) -> StorageResult<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = data.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}

/// Fail the stream with [`StorageError::TooLarge`] once more than `limit`
/// bytes have passed through it.
///
/// Chunks are forwarded untouched until the limit is crossed; the offending
/// chunk is replaced by the error and the stream ends.
pub fn limit(data: ByteStream, limit: u64) -> ByteStream {
    Box::pin(
        data.scan(0u64, move |seen, chunk| {
            let item = match chunk {
                Ok(bytes) => {
                    *seen = seen.saturating_add(bytes.len() as u64);
                    if *seen > limit {
                        Some(Err(StorageError::TooLarge { limit }))
                    } else {
                        Some(Ok(bytes))
                    }
                }
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(item)
        })
        .scan(false, |failed, item| {
            // end the stream right after the first error
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        }),
    )
}
