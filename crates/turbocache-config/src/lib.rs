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
//! Configuration for the Turbocache artifact server
//!
//! Settings come from an optional TOML, YAML or JSON file and are then
//! overridden by environment variables (`PORT`, `TURBO_TOKEN`,
//! `STORAGE_PROVIDER`, ...). The result is validated before use.
//!
//! # Example
//!
//! ```no_run
//! use turbocache_config::ConfigLoader;
//!
//! # #[tokio::main]
//! # async fn main() -> turbocache_config::ConfigResult<()> {
//! let config = ConfigLoader::new().load(None).await?;
//! println!("listening on {}", config.server.bind_address());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides_from, split_tokens, ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::Validator;
