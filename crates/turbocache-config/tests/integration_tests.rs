use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;
use turbocache_config::{Config, ConfigError, ConfigLoader, Validator};
use turbocache_storage::Provider;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[tokio::test]
async fn test_load_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turbocache.toml");
    fs::write(
        &path,
        r#"
[server]
port = 4000
api_version = "v8"
body_limit = 1048576
tokens = ["ci-token", "dev-token"]

[storage]
provider = "local"
path = "/var/cache/turbo"

[observability]
log_format = "json"
log_level = "debug"
"#,
    )
    .unwrap();

    let config = ConfigLoader::new().load_file(&path).await.unwrap();
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.server.body_limit, 1_048_576);
    assert_eq!(config.server.tokens.len(), 2);
    assert_eq!(config.storage.path, "/var/cache/turbo");
    assert_eq!(config.observability.log_level.as_deref(), Some("debug"));
}

#[tokio::test]
async fn test_load_yaml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turbocache.yml");
    fs::write(
        &path,
        r#"
server:
  read_only: true
  tokens:
    - abc
storage:
  provider: azure-blob-storage
  path: artifacts
  azure:
    connection_string: "AccountName=a;AccountKey=b"
"#,
    )
    .unwrap();

    let config = ConfigLoader::new().load_file(&path).await.unwrap();
    assert!(config.server.read_only);
    assert_eq!(config.storage.provider, Provider::AzureBlob);
}

#[tokio::test]
async fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turbocache.json");
    fs::write(
        &path,
        r#"{"server": {"port": 4000, "tokens": ["from-file"]}, "storage": {"path": "from-file"}}"#,
    )
    .unwrap();

    let config = ConfigLoader::new()
        .load_with_lookup(
            Some(path.as_path()),
            env(&[
                ("PORT", "5000"),
                ("TURBO_TOKEN", "from-env"),
                ("STORAGE_PATH_USE_TMP_FOLDER", "true"),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(config.server.port, 5000);
    assert_eq!(config.server.tokens, vec!["from-env"]);
    // untouched by the environment
    assert_eq!(config.storage.path, "from-file");
    assert!(config.storage.use_tmp);
}

#[tokio::test]
async fn test_environment_can_make_config_invalid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turbocache.toml");
    fs::write(&path, "[server]\ntokens = [\"abc\"]\n").unwrap();

    let err = ConfigLoader::new()
        .load_with_lookup(Some(path.as_path()), env(&[("API_VERSION", "eight")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[tokio::test]
async fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .load_file(dir.path().join("absent.toml"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[tokio::test]
async fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turbocache.ini");
    fs::write(&path, "port=1").unwrap();

    let err = ConfigLoader::new().load_file(&path).await.unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn test_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turbocache.toml");
    fs::write(&path, "[server\nport = ").unwrap();

    let err = ConfigLoader::new().load_file(&path).await.unwrap_err();
    assert!(matches!(err, ConfigError::TomlParseError(_)));
}

#[test]
fn test_location_config_from_env_only() {
    let mut config = Config::default();
    turbocache_config::apply_overrides_from(
        &mut config,
        env(&[
            ("TURBO_TOKEN", "t"),
            ("STORAGE_PROVIDER", "gcs"),
            ("STORAGE_PATH", "bucket"),
            ("GCS_CLIENT_EMAIL", "svc@example.iam.gserviceaccount.com"),
            ("GCS_PRIVATE_KEY", "-----BEGIN-----\\nabc\\n-----END-----"),
        ]),
    )
    .unwrap();
    assert!(config.validate().is_ok());

    let location = config.storage.location_config();
    assert_eq!(location.path.as_deref(), Some("bucket"));
    assert_eq!(
        location.client_email.as_deref(),
        Some("svc@example.iam.gserviceaccount.com")
    );
    // unescaping happens when the backend is built
    assert!(location.private_key.unwrap().contains("\\n"));
}
