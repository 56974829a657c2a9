//! Error types for the script repository engine.

use std::path::{Path, PathBuf};

/// Result type for engine operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Network or local transfer failed.
    #[error("failed to fetch {origin}: {reason}")]
    Transport { origin: String, reason: String },

    /// A manifest, origin or checksum string could not be parsed.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// Downloaded bytes do not match the manifest checksum.
    #[error("checksum mismatch for {id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// Script, file or origin does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Access to a path was denied.
    #[error("permission denied: {}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings could not be read or written.
    #[error("config error: {0}")]
    Config(#[from] scriptrepo_config::ConfigError),

    /// No space left while writing into the cache.
    #[error("no space left on device while writing {}", path.display())]
    DiskFull { path: PathBuf },

    /// Origin returned zero bytes for a script that is not declared empty.
    #[error("empty response for {id} from {origin}")]
    EmptyPayload { id: String, origin: String },

    /// Origin returned something that is not a script (e.g. an HTML page).
    #[error("unexpected content for {id} from {origin}: {preview}")]
    UnexpectedPayload {
        id: String,
        origin: String,
        preview: String,
    },

    /// Plain HTTP origin while insecure downloads are disabled.
    #[error("insecure origin rejected (enable allow_insecure_downloads to permit): {origin}")]
    Insecure { origin: String },

    /// Entry has a local-path origin and is executed in place.
    #[error("{id} has a local origin and is not cached")]
    NotCacheable { id: String },

    /// Resolution produced no entries across all sources.
    #[error("no scripts available from {sources} source(s)")]
    NoScripts { sources: usize },

    /// An id matches entries in several sources.
    #[error("{id} is provided by several sources ({}); pick one", sources.join(", "))]
    Ambiguous { id: String, sources: Vec<String> },

    /// Any other filesystem failure.
    #[error("storage error at {}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    /// Classifies an IO error raised while touching `path`.
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Permission {
                path: path.to_path_buf(),
                source,
            },
            std::io::ErrorKind::StorageFull => Self::DiskFull {
                path: path.to_path_buf(),
            },
            _ => Self::Storage {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Returns true for integrity failures, which are never downgraded.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::EmptyPayload { .. }
                | Self::UnexpectedPayload { .. }
        )
    }
}
