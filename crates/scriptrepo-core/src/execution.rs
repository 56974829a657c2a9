//! Where a script would run from.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cache::CacheManager;
use crate::fetch::Origin;
use crate::manifest::ScriptEntry;
use crate::source::Source;

/// Execution state of an entry at the time of the query.
///
/// Only an explicit download moves an entry from `Remote` to `Cached`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    /// Origin is a filesystem path; executed in place.
    Local { path: PathBuf },
    /// Network origin with a cached copy.
    Cached { path: PathBuf },
    /// Network origin, not cached.
    Remote,
}

impl ExecutionState {
    /// Returns true if the script can be executed right now.
    pub fn is_runnable(&self) -> bool {
        match self {
            Self::Local { path } => path.is_file(),
            Self::Cached { .. } => true,
            Self::Remote => false,
        }
    }

    /// Returns the path the script would run from.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Local { path } | Self::Cached { path } => Some(path),
            Self::Remote => None,
        }
    }

    /// Short label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Cached { .. } => "cached",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } | Self::Cached { path } => {
                write!(f, "{} ({})", self.label(), path.display())
            }
            Self::Remote => f.write_str(self.label()),
        }
    }
}

/// Decides the execution state of `entry`. Never downloads.
///
/// Local origins never consult the cache.
pub fn execution_state(
    entry: &ScriptEntry,
    source: &Source,
    cache: &CacheManager,
) -> ExecutionState {
    if let Origin::Path(path) = &entry.origin {
        return ExecutionState::Local { path: path.clone() };
    }

    match cache.lookup(entry, source) {
        Some(path) => ExecutionState::Cached { path },
        None => ExecutionState::Remote,
    }
}
