// Copyright (C) 2026  Turbocache Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Configuration schema
//!
//! Every field has a default so a partial file (or no file at all) is a
//! valid starting point for environment overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use turbocache_storage::{LocationConfig, Provider};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Storage backend settings
    pub storage: StorageConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// API version path prefix, e.g. `v8`
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Maximum artifact upload size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: u64,

    /// Deadline for a single storage call, in seconds
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    /// Reject uploads; only reads are served
    #[serde(default)]
    pub read_only: bool,

    /// Accepted bearer tokens
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            api_version: default_api_version(),
            body_limit: default_body_limit(),
            backend_timeout_secs: default_backend_timeout_secs(),
            read_only: false,
            tokens: Vec::new(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_version", &self.api_version)
            .field("body_limit", &self.body_limit)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("read_only", &self.read_only)
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

impl ServerConfig {
    /// `host:port` for binding the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Storage call deadline
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Backend provider
    #[serde(default)]
    pub provider: Provider,

    /// Root directory (local), bucket (S3, GCS) or container (Azure)
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Place a local root under the OS temp directory
    #[serde(default)]
    pub use_tmp: bool,

    /// S3 settings
    #[serde(default)]
    pub s3: S3Settings,

    /// Google Cloud Storage settings
    #[serde(default)]
    pub gcs: GcsSettings,

    /// Azure Blob Storage settings
    #[serde(default)]
    pub azure: AzureSettings,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            provider: Provider::Local,
            path: default_storage_path(),
            use_tmp: false,
            s3: S3Settings::default(),
            gcs: GcsSettings::default(),
            azure: AzureSettings::default(),
        }
    }
}

impl StorageConfig {
    /// Flatten into the bag consumed by `create_location`
    pub fn location_config(&self) -> LocationConfig {
        LocationConfig {
            path: Some(self.path.clone()).filter(|p| !p.is_empty()),
            use_tmp: self.use_tmp,
            access_key: self.s3.access_key.clone(),
            secret_key: self.s3.secret_key.clone(),
            region: self.s3.region.clone(),
            endpoint: self.s3.endpoint.clone(),
            client_email: self.gcs.client_email.clone(),
            private_key: self.gcs.private_key.clone(),
            project_id: self.gcs.project_id.clone(),
            connection_string: self.azure.connection_string.clone(),
        }
    }
}

/// S3 and S3-compatible settings
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct S3Settings {
    /// Access key id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Secret access key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    /// Region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Google Cloud Storage settings
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GcsSettings {
    /// Project id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Service account email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,

    /// Service account private key; literal `\n` sequences are accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl fmt::Debug for GcsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsSettings")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Azure Blob Storage settings
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AzureSettings {
    /// Storage account connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Filter directive; `RUST_LOG` applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Output format: pretty, compact or json
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: None,
            log_format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_version() -> String {
    "v8".to_string()
}

fn default_body_limit() -> u64 {
    100 * 1024 * 1024
}

fn default_backend_timeout_secs() -> u64 {
    300
}

fn default_storage_path() -> String {
    "turborepo-remote-cache".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.api_version, "v8");
        assert_eq!(config.server.body_limit, 104_857_600);
        assert_eq!(config.server.backend_timeout(), Duration::from_secs(300));
        assert!(!config.server.read_only);
        assert!(config.server.tokens.is_empty());
        assert_eq!(config.storage.provider, Provider::Local);
        assert_eq!(config.storage.path, "turborepo-remote-cache");
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server": {"port": 8080}, "storage": {"provider": "s3"}}"#)
                .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_version, "v8");
        assert_eq!(config.storage.provider, Provider::S3);
        assert_eq!(config.storage.path, "turborepo-remote-cache");
    }

    #[test]
    fn test_location_config_mapping() {
        let mut storage = StorageConfig {
            provider: Provider::S3,
            path: "bucket".to_string(),
            ..Default::default()
        };
        storage.s3.region = Some("eu-west-1".to_string());
        storage.azure.connection_string = Some("AccountName=a".to_string());

        let location = storage.location_config();
        assert_eq!(location.path.as_deref(), Some("bucket"));
        assert_eq!(location.region.as_deref(), Some("eu-west-1"));
        assert_eq!(location.connection_string.as_deref(), Some("AccountName=a"));
        assert!(!location.use_tmp);
    }

    #[test]
    fn test_empty_path_maps_to_none() {
        let storage = StorageConfig {
            path: String::new(),
            ..Default::default()
        };
        assert!(storage.location_config().path.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.server.tokens = vec!["tok-secret".to_string()];
        config.storage.s3.secret_key = Some("s3-secret".to_string());
        config.storage.gcs.private_key = Some("pem-secret".to_string());
        config.storage.azure.connection_string = Some("abs-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("tok-secret"));
        assert!(!debug.contains("s3-secret"));
        assert!(!debug.contains("pem-secret"));
        assert!(!debug.contains("abs-secret"));
        assert!(debug.contains("1 redacted"));
    }
}
