//! Configuration management for scriptrepo.
//!
//! This crate handles loading, validating and persisting the engine's
//! `config.json` settings document.

mod error;
mod schema;
mod store;

pub use error::{ConfigError, ConfigResult};
pub use schema::{Config, ConfigKey, DEFAULT_REPOSITORY_URL};
pub use store::{CONFIG_FILE_NAME, ConfigStore};
