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
//! Turbocache Observability Module
//!
//! Structured logging for the artifact server.
//!
//! # Features
//!
//! - **Multiple Output Formats**: Pretty, JSON, and compact output formats
//! - **Environment-based Filtering**: `RUST_LOG` when no level is configured
//! - **Fallible Setup**: initialization reports errors instead of panicking
//!
//! # Example
//!
//! ```ignore
//! use turbocache_observability::{init_tracing, LogFormat};
//!
//! fn main() -> Result<(), turbocache_observability::LogError> {
//!     init_tracing(LogFormat::Json, Some("info,turbocache_server=debug"))?;
//!     tracing::info!("Server starting");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_tracing, init_tracing_with_config, validate_filter};
