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
//! Logging initialization and setup.
//!
//! Installs a global `tracing` subscriber made of an [`EnvFilter`] and one
//! formatting layer chosen by [`LogFormat`].

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize tracing with a format and optional filter directive
///
/// # Errors
///
/// Fails if the filter can't be parsed or a global subscriber is already set.
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let mut config = LogConfig::new().with_format(format);
    if let Some(level) = level {
        config = config.with_level(level);
    }
    init_tracing_with_config(config)
}

/// Initialize tracing with a full [`LogConfig`]
pub fn init_tracing_with_config(config: LogConfig) -> Result<(), LogError> {
    let env_filter = build_env_filter(&config)?;

    Registry::default()
        .with(format_layer(&config))
        .with(env_filter)
        .try_init()
        .map_err(|e| LogError::ConfigError(format!("Failed to install subscriber: {}", e)))
}

/// Check that `directive` is a valid filter without installing anything
pub fn validate_filter(directive: &str) -> Result<(), LogError> {
    EnvFilter::try_new(directive)
        .map(|_| ())
        .map_err(|e| LogError::InvalidLogLevel(format!("'{}': {}", directive, e)))
}

fn format_layer(config: &LogConfig) -> BoxedLayer {
    let writer = get_writer(&config.output);

    match (config.format, config.use_timestamps) {
        (LogFormat::Pretty, true) => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_ansi(config.use_color)
            .boxed(),
        (LogFormat::Pretty, false) => fmt::layer()
            .pretty()
            .without_time()
            .with_writer(writer)
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_ansi(config.use_color)
            .boxed(),
        (LogFormat::Compact, true) => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_ansi(config.use_color)
            .boxed(),
        (LogFormat::Compact, false) => fmt::layer()
            .compact()
            .without_time()
            .with_writer(writer)
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_ansi(config.use_color)
            .boxed(),
        (LogFormat::Json, true) => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .boxed(),
        (LogFormat::Json, false) => fmt::layer()
            .json()
            .without_time()
            .with_writer(writer)
            .with_target(config.include_targets)
            .with_thread_ids(config.include_thread_ids)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .boxed(),
    }
}

fn get_writer(output: &LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let level_str = config.get_effective_level();

    EnvFilter::try_new(&level_str).map_err(|e| {
        LogError::InvalidLogLevel(format!("Failed to parse log filter '{}': {}", level_str, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Installing the global subscriber is covered in tests/, one per process.

    #[test]
    fn test_env_filter_parsing() {
        assert!(build_env_filter(&LogConfig::new().with_level("debug")).is_ok());
        assert!(build_env_filter(&LogConfig::new().with_level("warn,tower_http=debug")).is_ok());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let err = build_env_filter(&LogConfig::new().with_level("turbocache=loud")).unwrap_err();
        assert!(matches!(err, LogError::InvalidLogLevel(_)));
    }

    #[test]
    fn test_validate_filter() {
        assert!(validate_filter("trace").is_ok());
        assert!(validate_filter("turbocache_server=debug").is_ok());
        assert!(validate_filter("turbocache=loud").is_err());
    }

    #[test]
    fn test_every_format_builds_a_layer() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            for timestamps in [true, false] {
                let config = LogConfig::new()
                    .with_format(format)
                    .with_timestamps(timestamps);
                let _layer = format_layer(&config);
            }
        }
    }
}
