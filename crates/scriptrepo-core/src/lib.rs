//! Core library for scriptrepo.
//!
//! This crate handles:
//! - Manifest resolution across the public and custom sources
//! - Verified, atomic caching of downloaded scripts
//! - Includes bundle synchronization
//! - Update detection and bulk operations
//! - Execution policy (local, cached or remote)
//!
//! Front ends talk to [`ScriptRepository`].

pub mod bulk;
pub mod cache;
pub mod checksum;
mod engine;
mod error;
pub mod execution;
pub mod fetch;
mod fsutil;
pub mod includes;
pub mod manifest;
mod outcome;
pub mod resolver;
pub mod source;

pub use bulk::{BulkReport, ItemFailure, UpdateCandidate, UpdateCheck, UpdateReason};
pub use cache::{CacheEntry, CacheManager, CacheStats};
pub use checksum::Checksum;
pub use engine::{Download, ScheduledCheck, ScriptRepository};
pub use error::{RepoError, RepoResult};
pub use execution::ExecutionState;
pub use fetch::{FetchPolicy, Fetcher, HttpFetcher, Origin};
pub use includes::{IncludesStatus, SourceIncludes};
pub use manifest::{Category, Manifest, ScriptEntry};
pub use outcome::Outcome;
pub use resolver::{EntryFilter, Resolution, ResolvedEntry, SourceReport, SourceStatus};
pub use source::{Source, SourceId, SourceKind};
