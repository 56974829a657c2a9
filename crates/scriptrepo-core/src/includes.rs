//! Includes bundle synchronization.
//!
//! Downloaded scripts source shared helpers from the `includes` directory
//! next to their category directories. Each source base (see
//! [`CacheManager::source_root`](crate::cache::CacheManager::source_root))
//! has its own bundle and markers. [`IncludesSynchronizer::sync`] makes that
//! directory available, trying in order:
//!
//! 1. the previously fetched bundle, if it came from the same origin and is
//!    younger than [`MAX_BUNDLE_AGE_HOURS`]
//! 2. a fresh fetch from the source's origin root
//! 3. a symbolic link to the local reference bundle
//! 4. a copy of the local reference bundle
//!
//! When all of them fail the outcome is [`IncludesStatus::Unavailable`];
//! callers log it and carry on.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::fetch::{FetchPolicy, Fetcher, Origin};
use crate::fsutil;
use crate::resolver::IncludesSource;
use crate::source::SourceId;

/// Bundle directory name under a source base.
pub const INCLUDES_DIR: &str = "includes";

/// Maximum age of a fetched bundle before it is fetched again.
pub const MAX_BUNDLE_AGE_HOURS: i64 = 24;

const ORIGIN_MARKER: &str = ".includes_origin";
const TIMESTAMP_MARKER: &str = ".includes_timestamp";

/// Outcome of an includes synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludesStatus {
    /// Previously fetched bundle is still fresh.
    Reused { origin: String },
    /// Bundle was fetched from the origin root.
    Fetched { origin: String, files: usize },
    /// Bundle directory is a symlink to the local reference copy.
    Linked { target: PathBuf },
    /// Local reference copy was copied into place.
    Copied { from: PathBuf },
    /// No bundle could be provided.
    Unavailable { reason: String },
}

impl IncludesStatus {
    /// Returns true if a usable bundle is in place.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for IncludesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reused { origin } => write!(f, "includes up to date ({origin})"),
            Self::Fetched { origin, files } => {
                write!(f, "fetched {files} include file(s) from {origin}")
            }
            Self::Linked { target } => write!(f, "includes linked to {}", target.display()),
            Self::Copied { from } => write!(f, "includes copied from {}", from.display()),
            Self::Unavailable { reason } => write!(f, "includes unavailable: {reason}"),
        }
    }
}

/// Includes outcome for one source's bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIncludes {
    pub source: SourceId,
    pub status: IncludesStatus,
}

impl fmt::Display for SourceIncludes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source.name, self.status)
    }
}

/// Keeps `<base>/includes` populated.
pub struct IncludesSynchronizer<'a> {
    fetcher: &'a dyn Fetcher,
    base: &'a Path,
    local_reference: Option<&'a Path>,
}

impl<'a> IncludesSynchronizer<'a> {
    /// Creates a synchronizer for the bundle under `base`.
    ///
    /// `local_reference` is a directory holding a reference copy of the
    /// bundle, used when fetching is not possible.
    pub fn new(
        fetcher: &'a dyn Fetcher,
        base: &'a Path,
        local_reference: Option<&'a Path>,
    ) -> Self {
        Self {
            fetcher,
            base,
            local_reference,
        }
    }

    /// Returns the bundle directory.
    pub fn bundle_dir(&self) -> PathBuf {
        self.base.join(INCLUDES_DIR)
    }

    /// Makes the bundle available. Never fails; see [`IncludesStatus`].
    pub fn sync(&self, source: Option<&IncludesSource>, policy: FetchPolicy) -> IncludesStatus {
        self.sync_at(source, policy, Utc::now())
    }

    /// Same as [`sync`](Self::sync) with an explicit clock.
    pub fn sync_at(
        &self,
        source: Option<&IncludesSource>,
        policy: FetchPolicy,
        now: DateTime<Utc>,
    ) -> IncludesStatus {
        let mut failures = Vec::new();

        if let Some(source) = source {
            let origin = source.root.to_string();

            if self.is_fresh(&origin, now) {
                debug!(%origin, "reusing includes bundle");
                return IncludesStatus::Reused { origin };
            }

            match self.fetch_bundle(source, policy, now) {
                Ok(files) => {
                    info!(%origin, files, "fetched includes bundle");
                    return IncludesStatus::Fetched { origin, files };
                }
                Err(e) => {
                    warn!(%origin, error = %e, "failed to fetch includes bundle");
                    failures.push(format!("fetch from {origin} failed: {e}"));
                }
            }
        } else {
            failures.push("no source declares an includes bundle".to_string());
        }

        match self.local_reference {
            Some(reference) if reference.is_dir() => {
                match self.link_reference(reference) {
                    Ok(()) => {
                        info!(reference = %reference.display(), "linked includes bundle");
                        return IncludesStatus::Linked {
                            target: reference.to_path_buf(),
                        };
                    }
                    Err(e) => {
                        debug!(error = %e, "symlink failed, copying includes bundle");
                        failures.push(format!("link failed: {e}"));
                    }
                }

                match self.copy_reference(reference) {
                    Ok(()) => {
                        info!(from = %reference.display(), "copied includes bundle");
                        return IncludesStatus::Copied {
                            from: reference.to_path_buf(),
                        };
                    }
                    Err(e) => failures.push(format!("copy failed: {e}")),
                }
            }
            Some(reference) => failures.push(format!(
                "local reference {} is not a directory",
                reference.display()
            )),
            None => failures.push("no local reference bundle".to_string()),
        }

        let reason = failures.join("; ");
        warn!(%reason, "includes bundle unavailable");
        IncludesStatus::Unavailable { reason }
    }

    fn is_fresh(&self, origin: &str, now: DateTime<Utc>) -> bool {
        let bundle = self.bundle_dir();
        let is_real_dir = std::fs::symlink_metadata(&bundle).is_ok_and(|m| m.is_dir());
        if !is_real_dir {
            return false;
        }

        let Ok(recorded) = std::fs::read_to_string(self.base.join(ORIGIN_MARKER)) else {
            return false;
        };
        if recorded.trim() != origin {
            debug!(recorded = recorded.trim(), origin, "includes origin changed");
            return false;
        }

        std::fs::read_to_string(self.base.join(TIMESTAMP_MARKER))
            .ok()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
            .is_some_and(|fetched_at| {
                now.signed_duration_since(fetched_at) < Duration::hours(MAX_BUNDLE_AGE_HOURS)
            })
    }

    /// Fetches every bundle file into a temporary directory, then swaps it
    /// in. The previous bundle is untouched unless every file arrived.
    fn fetch_bundle(
        &self,
        source: &IncludesSource,
        policy: FetchPolicy,
        now: DateTime<Utc>,
    ) -> std::io::Result<usize> {
        let staging = self.staging_dir();
        fsutil::remove_any(&staging)?;
        std::fs::create_dir_all(&staging)?;

        let result = self.fetch_into(&staging, source, policy);
        let files = match result {
            Ok(files) => files,
            Err(e) => {
                let _ = fsutil::remove_any(&staging);
                return Err(e);
            }
        };

        self.swap_in(&staging)?;
        fsutil::write_atomic(
            &self.base.join(ORIGIN_MARKER),
            source.root.to_string().as_bytes(),
        )?;
        fsutil::write_atomic(
            &self.base.join(TIMESTAMP_MARKER),
            now.to_rfc3339().as_bytes(),
        )?;
        Ok(files)
    }

    fn fetch_into(
        &self,
        staging: &Path,
        source: &IncludesSource,
        policy: FetchPolicy,
    ) -> std::io::Result<usize> {
        let mut count = 0;
        for name in &source.files {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                warn!(name, "skipping invalid include file name");
                continue;
            }

            let bytes = source
                .root
                .join(&format!("{INCLUDES_DIR}/{name}"))
                .and_then(|origin: Origin| self.fetcher.fetch(&origin, policy))
                .map_err(std::io::Error::other)?;

            let path = staging.join(name);
            std::fs::write(&path, bytes)?;
            fsutil::make_executable(&path)?;
            count += 1;
        }

        if count == 0 {
            return Err(std::io::Error::other("bundle lists no valid files"));
        }
        Ok(count)
    }

    #[cfg(unix)]
    fn link_reference(&self, reference: &Path) -> std::io::Result<()> {
        let bundle = self.bundle_dir();
        std::fs::create_dir_all(self.base)?;
        self.clear_markers();
        fsutil::remove_any(&bundle)?;
        std::os::unix::fs::symlink(reference, &bundle)
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_self)]
    fn link_reference(&self, _reference: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }

    fn copy_reference(&self, reference: &Path) -> std::io::Result<()> {
        let staging = self.staging_dir();
        fsutil::remove_any(&staging)?;

        if let Err(e) = fsutil::copy_dir(reference, &staging) {
            let _ = fsutil::remove_any(&staging);
            return Err(e);
        }

        self.clear_markers();
        self.swap_in(&staging)
    }

    fn swap_in(&self, staging: &Path) -> std::io::Result<()> {
        let bundle = self.bundle_dir();
        fsutil::remove_any(&bundle)?;
        std::fs::rename(staging, &bundle)
    }

    fn clear_markers(&self) {
        for marker in [ORIGIN_MARKER, TIMESTAMP_MARKER] {
            let _ = fsutil::remove_any(&self.base.join(marker));
        }
    }

    fn staging_dir(&self) -> PathBuf {
        self.base
            .join(format!(".{INCLUDES_DIR}.{}.tmp", std::process::id()))
    }
}
