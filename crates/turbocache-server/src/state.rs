use std::sync::Arc;

use turbocache_config::ServerConfig;
use turbocache_storage::Location;

use crate::auth::TokenSet;

/// Default API version prefix
pub const DEFAULT_API_VERSION: &str = "v8";

/// Default maximum upload size (100 MiB)
pub const DEFAULT_BODY_LIMIT: u64 = 100 * 1024 * 1024;

/// Shared application state
///
/// Built once at startup and never mutated; handlers receive it as
/// `State<Arc<AppState>>`.
#[derive(Debug)]
pub struct AppState {
    /// Storage location every artifact goes through
    pub location: Location,

    /// Accepted bearer tokens
    pub tokens: TokenSet,

    /// When set, the upload route is not registered
    pub read_only: bool,

    /// Maximum upload size in bytes
    pub body_limit: u64,

    /// Route prefix without slashes, e.g. `v8`
    pub api_version: String,
}

impl AppState {
    /// Create state with default limits and uploads enabled
    pub fn new(location: Location, tokens: TokenSet) -> Self {
        Self {
            location,
            tokens,
            read_only: false,
            body_limit: DEFAULT_BODY_LIMIT,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Create state from the server section of the configuration
    pub fn from_config(config: &ServerConfig, location: Location) -> Self {
        Self {
            location,
            tokens: TokenSet::from_iter(config.tokens.iter().cloned()),
            read_only: config.read_only,
            body_limit: config.body_limit,
            api_version: config.api_version.clone(),
        }
    }

    /// Serve reads only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_body_limit(mut self, body_limit: u64) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Wrap for sharing with the router
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turbocache_storage::mock::MockBackend;
    use turbocache_storage::Provider;

    fn location() -> Location {
        Location::from_backend(Arc::new(MockBackend::new()), Provider::Local)
    }

    #[test]
    fn test_from_config() {
        let config = ServerConfig {
            read_only: true,
            body_limit: 1024,
            api_version: "v9".to_string(),
            tokens: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };

        let state = AppState::from_config(&config, location());
        assert!(state.read_only);
        assert_eq!(state.body_limit, 1024);
        assert_eq!(state.api_version, "v9");
        assert!(state.tokens.contains("a"));
        assert!(state.tokens.contains("b"));
        assert!(!state.tokens.contains("c"));
    }

    #[test]
    fn test_defaults() {
        let state = AppState::new(location(), TokenSet::from_iter(["t".to_string()]));
        assert!(!state.read_only);
        assert_eq!(state.body_limit, DEFAULT_BODY_LIMIT);
        assert_eq!(state.api_version, "v8");
    }
}
