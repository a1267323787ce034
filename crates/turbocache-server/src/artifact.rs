//! Artifact addressing and metadata
//!
//! An artifact is identified by `(team, hash)`. Both parts are restricted to
//! `[A-Za-z0-9_-]`, which keeps the derived storage keys free of path
//! separators and dots:
//!
//! | team      | storage key          | metadata key              |
//! |-----------|----------------------|---------------------------|
//! | `Some(t)` | `teams/{t}/{hash}`   | `teams/{t}/{hash}.meta`   |
//! | `None`    | `shared/{hash}`      | `shared/{hash}.meta`      |
//!
//! The prefixes differ and neither part can contain `/` or `.`, so distinct
//! pairs never share a key and a metadata key never equals an artifact key.

use crate::error::{ApiError, ApiResult};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the client-reported build duration in milliseconds
pub const ARTIFACT_DURATION: HeaderName = HeaderName::from_static("x-artifact-duration");

/// Header carrying the client-supplied artifact tag
pub const ARTIFACT_TAG: HeaderName = HeaderName::from_static("x-artifact-tag");

const MAX_SEGMENT_LEN: usize = 128;

/// Query parameters accepted on artifact routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactQuery {
    /// Team scope
    #[serde(rename = "teamId")]
    pub team_id: Option<String>,

    /// Team scope by slug, used when `teamId` is absent
    pub slug: Option<String>,
}

impl ArtifactQuery {
    /// Effective team, `teamId` first
    pub fn team(&self) -> Option<&str> {
        self.team_id
            .as_deref()
            .or(self.slug.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Validated `(team, hash)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    team: Option<String>,
    hash: String,
}

impl ArtifactKey {
    /// Validate and build a key
    pub fn new(team: Option<&str>, hash: &str) -> ApiResult<Self> {
        if !is_valid_segment(hash) {
            return Err(ApiError::bad_request(format!(
                "Invalid artifact hash '{}'",
                hash
            )));
        }
        if let Some(team) = team {
            if !is_valid_segment(team) {
                return Err(ApiError::bad_request(format!("Invalid team '{}'", team)));
            }
        }

        Ok(ArtifactKey {
            team: team.map(str::to_string),
            hash: hash.to_string(),
        })
    }

    /// Build a key from the path hash and query
    pub fn from_request(hash: &str, query: &ArtifactQuery) -> ApiResult<Self> {
        Self::new(query.team(), hash)
    }

    pub fn team(&self) -> Option<&str> {
        self.team.as_deref()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Object key of the artifact body
    pub fn storage_key(&self) -> String {
        match &self.team {
            Some(team) => format!("teams/{}/{}", team, self.hash),
            None => format!("shared/{}", self.hash),
        }
    }

    /// Object key of the companion metadata record
    pub fn meta_key(&self) -> String {
        format!("{}.meta", self.storage_key())
    }

    /// Address reported back to clients after an upload
    pub fn url(&self) -> String {
        match &self.team {
            Some(team) => format!("{}/{}", team, self.hash),
            None => self.hash.clone(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= MAX_SEGMENT_LEN
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Metadata stored next to an artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Build duration in milliseconds, as reported by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Opaque client tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ArtifactMetadata {
    /// Read metadata from upload headers
    ///
    /// A duration that is not an integer is dropped rather than rejected.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let duration = headers
            .get(&ARTIFACT_DURATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let tag = headers
            .get(&ARTIFACT_TAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|t| !t.is_empty());

        ArtifactMetadata { duration, tag }
    }

    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.tag.is_none()
    }

    /// Copy the stored values into response headers
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Some(duration) = self.duration {
            headers.insert(ARTIFACT_DURATION, HeaderValue::from(duration));
        }
        if let Some(tag) = &self.tag {
            if let Ok(value) = HeaderValue::from_str(tag) {
                headers.insert(ARTIFACT_TAG, value);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_storage_keys() {
        let key = ArtifactKey::new(Some("t1"), "abc123").unwrap();
        assert_eq!(key.storage_key(), "teams/t1/abc123");
        assert_eq!(key.meta_key(), "teams/t1/abc123.meta");
        assert_eq!(key.url(), "t1/abc123");

        let shared = ArtifactKey::new(None, "abc123").unwrap();
        assert_eq!(shared.storage_key(), "shared/abc123");
        assert_eq!(shared.url(), "abc123");
    }

    #[test]
    fn test_key_derivation_is_injective() {
        let pairs = [
            (None, "abc"),
            (None, "teams"),
            (Some("shared"), "abc"),
            (Some("teams"), "abc"),
            (Some("t1"), "abc"),
            (Some("t2"), "abc"),
            (Some("t1"), "abc_meta"),
            (Some("t1-abc"), "x"),
            (Some("t1"), "abc-x"),
        ];

        let mut keys = HashSet::new();
        for (team, hash) in pairs {
            let key = ArtifactKey::new(team, hash).unwrap();
            assert!(keys.insert(key.storage_key()), "duplicate for {:?}", key);
            assert!(keys.insert(key.meta_key()), "duplicate meta for {:?}", key);
        }
    }

    #[test]
    fn test_rejects_unsafe_segments() {
        for hash in ["", "..", "a/b", "a.meta", "a b", "%2e%2e"] {
            assert!(ArtifactKey::new(None, hash).is_err(), "accepted {:?}", hash);
        }
        assert!(ArtifactKey::new(Some("../t1"), "abc").is_err());
        assert!(ArtifactKey::new(None, &"a".repeat(129)).is_err());
        assert!(ArtifactKey::new(None, &"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_query_team_fallback() {
        let query = ArtifactQuery {
            team_id: Some("team_1".to_string()),
            slug: Some("my-team".to_string()),
        };
        assert_eq!(query.team(), Some("team_1"));

        let query = ArtifactQuery {
            team_id: None,
            slug: Some("my-team".to_string()),
        };
        assert_eq!(query.team(), Some("my-team"));

        let query = ArtifactQuery {
            team_id: Some(String::new()),
            slug: None,
        };
        assert_eq!(query.team(), None);
    }

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ARTIFACT_DURATION, HeaderValue::from_static("1234"));
        headers.insert(ARTIFACT_TAG, HeaderValue::from_static("sig-abc"));

        let meta = ArtifactMetadata::from_headers(&headers);
        assert_eq!(meta.duration, Some(1234));
        assert_eq!(meta.tag.as_deref(), Some("sig-abc"));

        let mut out = HeaderMap::new();
        meta.apply(&mut out);
        assert_eq!(out.get(ARTIFACT_DURATION).unwrap(), "1234");
        assert_eq!(out.get(ARTIFACT_TAG).unwrap(), "sig-abc");
    }

    #[test]
    fn test_metadata_ignores_bad_duration() {
        let mut headers = HeaderMap::new();
        headers.insert(ARTIFACT_DURATION, HeaderValue::from_static("fast"));
        let meta = ArtifactMetadata::from_headers(&headers);
        assert!(meta.is_empty());
    }

    #[test]
    fn test_metadata_json_shape() {
        let meta = ArtifactMetadata {
            duration: Some(50),
            tag: None,
        };
        assert_eq!(serde_json::to_string(&meta).unwrap(), r#"{"duration":50}"#);
        let parsed: ArtifactMetadata = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }
}
