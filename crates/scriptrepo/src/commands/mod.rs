//! Subcommand implementations.

pub mod bulk;
pub mod cache;
pub mod config;
pub mod scripts;
pub mod sources;
