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

//! Integration tests for location construction and the per-call deadline

use bytes::Bytes;
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use turbocache_storage::mock::MockBackend;
use turbocache_storage::{
    create_location, stream as bytestream, ByteStream, LocalBackend, Location, LocationConfig,
    Provider, StorageError,
};

fn local_config(path: &std::path::Path) -> LocationConfig {
    LocationConfig {
        path: Some(path.to_string_lossy().into_owned()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_local_location_round_trip() {
    let dir = TempDir::new().unwrap();
    let location = create_location(Provider::Local, &local_config(dir.path()))
        .await
        .unwrap();

    assert_eq!(location.provider(), Provider::Local);
    assert_eq!(location.describe(), "local");
    assert!(!location.exists("teams/acme/abc").await.unwrap());

    location
        .store("teams/acme/abc", bytestream::once("artifact"), Some(8))
        .await
        .unwrap();

    assert!(location.exists("teams/acme/abc").await.unwrap());
    assert_eq!(location.size("teams/acme/abc").await.unwrap(), Some(8));

    let object = location.fetch("teams/acme/abc").await.unwrap();
    assert_eq!(object.size, Some(8));
    let body = bytestream::collect(object.stream).await.unwrap();
    assert_eq!(&body[..], b"artifact");

    // key segments map onto directories below the root
    assert!(dir.path().join("teams").join("acme").join("abc").is_file());
}

#[tokio::test]
async fn test_local_location_fetch_missing() {
    let dir = TempDir::new().unwrap();
    let location = create_location(Provider::Local, &local_config(dir.path()))
        .await
        .unwrap();

    let err = location.fetch("shared/missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(location.size("shared/missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_local_location_use_tmp() {
    let name = format!("turbocache-location-test-{}", std::process::id());
    let config = LocationConfig {
        path: Some(name.clone()),
        use_tmp: true,
        ..Default::default()
    };

    let location = create_location(Provider::Local, &config).await.unwrap();
    location
        .store("shared/abc", bytestream::once("x"), Some(1))
        .await
        .unwrap();

    let expected = std::env::temp_dir().join(&name);
    assert!(expected.join("shared").join("abc").is_file());
    std::fs::remove_dir_all(expected).unwrap();
}

#[tokio::test]
async fn test_missing_path_is_config_error() {
    for provider in [Provider::Local, Provider::S3, Provider::Gcs, Provider::AzureBlob] {
        let err = create_location(provider, &LocationConfig::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, StorageError::Config(_)),
            "{} should require a path, got {:?}",
            provider,
            err
        );
    }
}

#[tokio::test]
async fn test_azure_requires_connection_string() {
    let config = LocationConfig {
        path: Some("artifacts".to_string()),
        ..Default::default()
    };
    let err = create_location(Provider::AzureBlob, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Config(_)));
    assert!(err.to_string().contains("connection string"));
}

#[tokio::test]
async fn test_irrelevant_fields_are_ignored() {
    let dir = TempDir::new().unwrap();
    let config = LocationConfig {
        connection_string: Some("not a connection string".to_string()),
        private_key: Some("garbage".to_string()),
        region: Some("nowhere-1".to_string()),
        ..local_config(dir.path())
    };
    assert!(create_location(Provider::Local, &config).await.is_ok());
}

#[tokio::test]
async fn test_deadline_surfaces_as_timeout() {
    let backend = MockBackend::new().with_latency(Duration::from_millis(200));
    let location = Location::from_backend(Arc::new(backend), Provider::Local)
        .with_timeout(Duration::from_millis(20));

    let err = location.exists("shared/abc").await.unwrap_err();
    assert!(err.is_timeout());

    let err = location
        .store("shared/abc", bytestream::once("x"), None)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_failed_store_keeps_previous_object() {
    let backend = MockBackend::new();
    let location = Location::from_backend(Arc::new(backend.clone()), Provider::Local);

    location
        .store("shared/abc", bytestream::once("first"), None)
        .await
        .unwrap();

    let failing: ByteStream = Box::pin(stream::iter(vec![
        Ok(Bytes::from_static(b"sec")),
        Err(StorageError::backend("client went away")),
    ]));
    assert!(location.store("shared/abc", failing, None).await.is_err());

    assert_eq!(
        backend.object("shared/abc").await.unwrap(),
        Bytes::from_static(b"first")
    );
}

fn stalled_stream() -> ByteStream {
    Box::pin(
        stream::once(async { Ok::<_, StorageError>(Bytes::from_static(b"partial")) })
            .chain(stream::pending()),
    )
}

#[tokio::test]
async fn test_stalled_upload_times_out_without_leftovers() {
    let dir = TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path()).await.unwrap();
    let location = Location::from_backend(Arc::new(backend), Provider::Local)
        .with_timeout(Duration::from_millis(50));

    location
        .store("shared/abc", bytestream::once("original"), None)
        .await
        .unwrap();

    let err = location
        .store("shared/abc", stalled_stream(), None)
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let names: Vec<String> = std::fs::read_dir(dir.path().join("shared"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["abc".to_string()]);

    let object = location.fetch("shared/abc").await.unwrap();
    let body = bytestream::collect(object.stream).await.unwrap();
    assert_eq!(&body[..], b"original");
}

#[tokio::test]
async fn test_slow_upload_that_keeps_moving_succeeds() {
    let dir = TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path()).await.unwrap();
    let location = Location::from_backend(Arc::new(backend), Provider::Local)
        .with_timeout(Duration::from_millis(100));

    // five chunks 40ms apart: well past the deadline in total, never stalled
    let slow: ByteStream = Box::pin(stream::iter(0..5u8).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok::<_, StorageError>(Bytes::from(vec![b'a' + i]))
    }));
    location.store("shared/slow", slow, None).await.unwrap();

    let object = location.fetch("shared/slow").await.unwrap();
    let body = bytestream::collect(object.stream).await.unwrap();
    assert_eq!(&body[..], b"abcde");
}
