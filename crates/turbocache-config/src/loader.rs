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
//! Configuration loading: file, then environment, then validation

use crate::error::{ConfigError, ConfigResult};
use crate::schema::Config;
use crate::validation::Validator;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML
    Toml,
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load the effective configuration
    ///
    /// Starts from `path` when given (defaults otherwise), applies the
    /// process environment on top, then validates.
    pub async fn load(&self, path: Option<&Path>) -> ConfigResult<Config> {
        self.load_with_lookup(path, |name| std::env::var(name).ok())
            .await
    }

    /// Like [`load`](Self::load) with an explicit variable lookup
    pub async fn load_with_lookup<F>(&self, path: Option<&Path>, lookup: F) -> ConfigResult<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let (content, format) = read_file(path).await?;
                parse(&content, format)?
            }
            None => {
                debug!("No configuration file given, starting from defaults");
                Config::default()
            }
        };

        apply_overrides_from(&mut config, lookup)?;

        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }

        Ok(config)
    }

    /// Load configuration from a file, without environment overrides
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let (content, format) = read_file(path.as_ref()).await?;
        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config = parse(content, format)?;

        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }

        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        apply_overrides_from(config, |name| std::env::var(name).ok())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_file(path: &Path) -> ConfigResult<(String, ConfigFormat)> {
    debug!("Loading configuration from: {}", path.display());

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).await?;

    info!(
        "Loaded {} configuration file: {}",
        format.name(),
        path.display()
    );

    Ok((content, format))
}

fn parse(content: &str, format: ConfigFormat) -> ConfigResult<Config> {
    let config = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    debug!("Configuration parsed from {}", format.name());
    Ok(config)
}

/// Apply environment-style overrides read through `lookup`
///
/// Variables that are unset leave the corresponding field untouched.
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    // Server settings
    if let Some(value) = lookup("HOST") {
        config.server.host = value;
    }
    if let Some(value) = lookup("PORT") {
        config.server.port = parse_value("PORT", &value, "expected valid port number (1-65535)")?;
    }
    if let Some(value) = lookup("API_VERSION") {
        config.server.api_version = value;
    }
    if let Some(value) = lookup("BODY_LIMIT") {
        config.server.body_limit =
            parse_value("BODY_LIMIT", &value, "expected a size in bytes")?;
    }
    if let Some(value) = lookup("BACKEND_TIMEOUT_SECS") {
        config.server.backend_timeout_secs =
            parse_value("BACKEND_TIMEOUT_SECS", &value, "expected a number of seconds")?;
    }
    if let Some(value) = lookup("READ_ONLY_MODE") {
        config.server.read_only = parse_bool("READ_ONLY_MODE", &value)?;
    }
    if let Some(value) = lookup("TURBO_TOKEN") {
        config.server.tokens = split_tokens(&value);
    }

    // Storage settings
    if let Some(value) = lookup("STORAGE_PROVIDER") {
        config.storage.provider = value.parse().map_err(|_| {
            ConfigError::env_var_parsing_error(
                "STORAGE_PROVIDER",
                &value,
                "expected local, s3, google-cloud-storage or azure-blob-storage",
            )
        })?;
    }
    if let Some(value) = lookup("STORAGE_PATH") {
        config.storage.path = value;
    }
    if let Some(value) = lookup("STORAGE_PATH_USE_TMP_FOLDER") {
        config.storage.use_tmp = parse_bool("STORAGE_PATH_USE_TMP_FOLDER", &value)?;
    }
    if let Some(value) = lookup("S3_ACCESS_KEY") {
        config.storage.s3.access_key = Some(value);
    }
    if let Some(value) = lookup("S3_SECRET_KEY") {
        config.storage.s3.secret_key = Some(value);
    }
    if let Some(value) = lookup("S3_REGION") {
        config.storage.s3.region = Some(value);
    }
    if let Some(value) = lookup("S3_ENDPOINT") {
        config.storage.s3.endpoint = Some(value);
    }
    if let Some(value) = lookup("GCS_PROJECT_ID") {
        config.storage.gcs.project_id = Some(value);
    }
    if let Some(value) = lookup("GCS_CLIENT_EMAIL") {
        config.storage.gcs.client_email = Some(value);
    }
    if let Some(value) = lookup("GCS_PRIVATE_KEY") {
        config.storage.gcs.private_key = Some(value);
    }
    if let Some(value) = lookup("ABS_CONNECTION_STRING") {
        config.storage.azure.connection_string = Some(value);
    }

    // Observability settings
    if let Some(value) = lookup("LOG_LEVEL") {
        config.observability.log_level = Some(value);
    }
    if let Some(value) = lookup("LOG_FORMAT") {
        config.observability.log_format = value;
    }

    Ok(())
}

/// Split a comma-separated token list, dropping blanks
pub fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T: FromStr>(name: &str, value: &str, reason: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_var_parsing_error(name, value, reason))
}

/// Parse boolean from string (accepts: true, false, yes, no, 1, 0, on, off)
fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" | "" => Ok(false),
        _ => Err(ConfigError::env_var_parsing_error(
            name,
            value,
            "expected 'true', 'false', 'yes', 'no', '1', '0', 'on', or 'off'",
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use turbocache_storage::Provider;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_format_detection_error() {
        assert!(ConfigFormat::from_path("config.xml").is_err());
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "YES").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(parse_bool("X", "on").unwrap());
        assert!(!parse_bool("X", "false").unwrap());
        assert!(!parse_bool("X", "no").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_split_tokens() {
        assert_eq!(split_tokens("a"), vec!["a"]);
        assert_eq!(split_tokens(" a , b ,,c "), vec!["a", "b", "c"]);
        assert!(split_tokens(" , ").is_empty());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            env(&[
                ("PORT", "8080"),
                ("BODY_LIMIT", "1024"),
                ("READ_ONLY_MODE", "true"),
                ("TURBO_TOKEN", "t1,t2"),
                ("STORAGE_PROVIDER", "abs"),
                ("STORAGE_PATH", "artifacts"),
                ("ABS_CONNECTION_STRING", "AccountName=a;AccountKey=b"),
                ("LOG_FORMAT", "json"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.body_limit, 1024);
        assert!(config.server.read_only);
        assert_eq!(config.server.tokens, vec!["t1", "t2"]);
        assert_eq!(config.storage.provider, Provider::AzureBlob);
        assert_eq!(config.storage.path, "artifacts");
        assert_eq!(
            config.storage.azure.connection_string.as_deref(),
            Some("AccountName=a;AccountKey=b")
        );
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_unset_variables_keep_values() {
        let mut config = Config::default();
        config.server.port = 9999;
        apply_overrides_from(&mut config, env(&[])).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config, {
            let mut expected = Config::default();
            expected.server.port = 9999;
            expected
        });
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let mut config = Config::default();
        let err = apply_overrides_from(&mut config, env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EnvVarParsingError { ref variable_name, .. } if variable_name == "PORT"
        ));

        let err = apply_overrides_from(&mut config, env(&[("BODY_LIMIT", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarParsingError { .. }));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        let err =
            apply_overrides_from(&mut config, env(&[("STORAGE_PROVIDER", "ftp")])).unwrap_err();
        assert!(err.to_string().contains("STORAGE_PROVIDER"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
        [server]
        port = 8080
        tokens = ["abc"]

        [storage]
        provider = "s3"
        path = "cache-bucket"

        [storage.s3]
        region = "us-east-1"
        endpoint = "http://localhost:9000"
        "#;
        let config = ConfigLoader::new()
            .load_from_string(toml, ConfigFormat::Toml)
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.provider, Provider::S3);
        assert_eq!(config.storage.s3.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "server:\n  tokens: [abc]\nstorage:\n  provider: google-cloud-storage\n  path: cache\n";
        let config = ConfigLoader::new()
            .load_from_string(yaml, ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config.storage.provider, Provider::Gcs);
    }

    #[test]
    fn test_loader_without_validation() {
        let json = r#"{"server": {"body_limit": 0}}"#;
        assert!(ConfigLoader::new()
            .load_from_string(json, ConfigFormat::Json)
            .is_err());
        assert!(ConfigLoader::without_validation()
            .load_from_string(json, ConfigFormat::Json)
            .is_ok());
    }

    #[tokio::test]
    async fn test_load_without_file_uses_environment() {
        let config = ConfigLoader::new()
            .load_with_lookup(None, env(&[("TURBO_TOKEN", "secret")]))
            .await
            .unwrap();
        assert_eq!(config.server.tokens, vec!["secret"]);
        assert_eq!(config.server.port, 3000);
    }

    #[tokio::test]
    async fn test_load_without_token_fails() {
        let result = ConfigLoader::new().load_with_lookup(None, env(&[])).await;
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
