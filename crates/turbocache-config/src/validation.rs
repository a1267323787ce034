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
//! Configuration validation

use crate::error::{ConfigError, ConfigResult};
use crate::schema::*;
use turbocache_observability::{validate_filter, LogFormat};
use turbocache_storage::Provider;

/// Validator for configuration settings
pub trait Validator {
    /// Check the settings, returning the first problem found
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.storage.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl Validator for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingRequired("server.host".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::invalid_value(
                "server.port",
                "port must be between 1 and 65535",
            ));
        }

        if !is_valid_api_version(&self.api_version) {
            return Err(ConfigError::invalid_value(
                "server.api_version",
                format!("expected v<number>, got '{}'", self.api_version),
            ));
        }

        if self.body_limit == 0 {
            return Err(ConfigError::invalid_value(
                "server.body_limit",
                "body limit must be greater than zero",
            ));
        }

        if self.backend_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.backend_timeout_secs",
                "timeout must be greater than zero",
            ));
        }

        if self.tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::validation_error(
                "at least one bearer token is required (set TURBO_TOKEN)",
            ));
        }

        Ok(())
    }
}

impl Validator for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.path.is_empty() {
            return Err(ConfigError::MissingRequired("storage.path".to_string()));
        }

        match self.provider {
            Provider::Local | Provider::Gcs => Ok(()),
            Provider::S3 => self.s3.validate(),
            Provider::AzureBlob => self.azure.validate(),
        }
    }
}

impl Validator for S3Settings {
    fn validate(&self) -> ConfigResult<()> {
        // static credentials come as a pair, otherwise the default chain is used
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ConfigError::ConflictingValues(
                "storage.s3.access_key and storage.s3.secret_key must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

impl Validator for AzureSettings {
    fn validate(&self) -> ConfigResult<()> {
        match self.connection_string.as_deref() {
            Some(c) if !c.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingRequired(
                "storage.azure.connection_string".to_string(),
            )),
        }
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.log_format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::invalid_value("observability.log_format", e.to_string()))?;

        if let Some(level) = &self.log_level {
            validate_filter(level).map_err(|e| {
                ConfigError::invalid_value("observability.log_level", e.to_string())
            })?;
        }

        Ok(())
    }
}

fn is_valid_api_version(version: &str) -> bool {
    version
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.server.tokens = vec!["secret".to_string()];
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_requires_token() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_blank_tokens_rejected() {
        let mut config = valid_config();
        config.server.tokens = vec![" ".to_string(), String::new()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_version_format() {
        assert!(is_valid_api_version("v8"));
        assert!(is_valid_api_version("v10"));
        assert!(!is_valid_api_version("v"));
        assert!(!is_valid_api_version("8"));
        assert!(!is_valid_api_version("v8/extra"));
        assert!(!is_valid_api_version("vx"));
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let mut config = valid_config();
        config.server.body_limit = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { ref field, .. } if field == "server.body_limit"
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_azure_requires_connection_string() {
        let mut config = valid_config();
        config.storage.provider = Provider::AzureBlob;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::MissingRequired(_)
        ));

        config.storage.azure.connection_string = Some("AccountName=a;AccountKey=b".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_keys_must_pair() {
        let mut config = valid_config();
        config.storage.provider = Provider::S3;
        config.storage.s3.access_key = Some("ak".to_string());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::ConflictingValues(_)
        ));

        config.storage.s3.secret_key = Some("sk".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_irrelevant_provider_settings_ignored() {
        let mut config = valid_config();
        config.storage.provider = Provider::Local;
        config.storage.s3.access_key = Some("ak".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_settings() {
        let mut config = valid_config();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        config.observability.log_format = "json".to_string();
        config.observability.log_level = Some("warn,turbocache_server=debug".to_string());
        assert!(config.validate().is_ok());

        config.observability.log_level = Some("turbocache=loud".to_string());
        assert!(config.validate().is_err());
    }
}
