//! Update detection and operations over every known entry.
//!
//! All operations walk the resolution in its stable order, one entry at a
//! time. A failing entry is recorded in the report and never stops the
//! remaining ones.

use std::fmt;

use scriptrepo_config::Config;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::checksum::Checksum;
use crate::fetch::Fetcher;
use crate::includes::SourceIncludes;
use crate::outcome::Outcome;
use crate::resolver::{Resolution, ResolvedEntry};
use crate::RepoResult;

/// One entry an operation could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub source: String,
    pub message: String,
}

/// Totals of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Entries the operation applied to.
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entries left alone (local, already cached, not cached).
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    /// Includes synchronization run after the operation, one per source.
    pub includes: Vec<SourceIncludes>,
}

impl BulkReport {
    /// Returns true if no entry failed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// One-line summary.
    pub fn message(&self) -> String {
        if self.candidates == 0 {
            return "nothing to do".to_string();
        }
        let mut message = format!("{} of {} succeeded", self.succeeded, self.candidates);
        if self.skipped > 0 {
            message.push_str(&format!(", {} skipped", self.skipped));
        }
        message
    }

    fn record<T>(&mut self, resolved: &ResolvedEntry, result: RepoResult<T>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                warn!(
                    id = %resolved.entry.id,
                    source = %resolved.source.id,
                    error = %e,
                    "entry failed"
                );
                self.failed += 1;
                self.failures.push(ItemFailure {
                    id: resolved.entry.id.clone(),
                    source: resolved.source.id.name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
}

impl From<&BulkReport> for Outcome {
    fn from(report: &BulkReport) -> Self {
        Self {
            success: report.success(),
            message: report.message(),
            counts: Some((report.succeeded, report.failed)),
        }
    }
}

/// Why a cached entry is considered out of date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReason {
    /// Cached bytes no longer match the manifest checksum.
    ChecksumChanged,
    /// Manifest version differs from the downloaded one.
    VersionChanged { cached: String, available: String },
    /// Cached file could not be read.
    Unreadable,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumChanged => f.write_str("checksum changed"),
            Self::VersionChanged { cached, available } => {
                let upgrade = match (
                    semver::Version::parse(cached),
                    semver::Version::parse(available),
                ) {
                    (Ok(old), Ok(new)) => new > old,
                    _ => true,
                };
                if upgrade {
                    write!(f, "{cached} -> {available}")
                } else {
                    write!(f, "{cached} -> {available} (downgrade)")
                }
            }
            Self::Unreadable => f.write_str("cached file unreadable"),
        }
    }
}

/// A cached entry with an update available.
#[derive(Debug, Clone)]
pub struct UpdateCandidate {
    pub resolved: ResolvedEntry,
    pub reason: UpdateReason,
}

/// Result of comparing the cache with the manifests.
#[derive(Debug, Clone, Default)]
pub struct UpdateCheck {
    /// Number of cached entries compared.
    pub cached: usize,
    pub candidates: Vec<UpdateCandidate>,
}

impl UpdateCheck {
    /// Number of update candidates.
    pub fn count(&self) -> usize {
        self.candidates.len()
    }
}

/// Runs cache operations over a whole resolution.
pub struct BulkOperator<'a> {
    cache: &'a CacheManager,
    fetcher: &'a dyn Fetcher,
    config: &'a Config,
}

impl<'a> BulkOperator<'a> {
    pub fn new(cache: &'a CacheManager, fetcher: &'a dyn Fetcher, config: &'a Config) -> Self {
        Self {
            cache,
            fetcher,
            config,
        }
    }

    /// Compares every cached entry with its manifest without downloading.
    ///
    /// With checksum verification on and a declared checksum, the cached
    /// file's digest is compared; otherwise the recorded version is. Entries
    /// cached without a record are not candidates.
    pub fn check(&self, resolution: &Resolution) -> UpdateCheck {
        let mut check = UpdateCheck::default();

        for resolved in &resolution.entries {
            if resolved.entry.origin.is_local() {
                continue;
            }
            let Some(path) = self.cache.lookup(&resolved.entry, &resolved.source) else {
                continue;
            };
            check.cached += 1;

            if let Some(reason) = self.update_reason(resolved, &path) {
                debug!(id = %resolved.entry.id, %reason, "update available");
                check.candidates.push(UpdateCandidate {
                    resolved: resolved.clone(),
                    reason,
                });
            }
        }

        info!(
            cached = check.cached,
            candidates = check.count(),
            "checked for updates"
        );
        check
    }

    fn update_reason(
        &self,
        resolved: &ResolvedEntry,
        path: &std::path::Path,
    ) -> Option<UpdateReason> {
        let entry = &resolved.entry;

        if self.config.verify_checksums
            && let Some(expected) = &entry.checksum
        {
            return match Checksum::of_file(path) {
                Ok(actual) if actual == *expected => None,
                Ok(_) => Some(UpdateReason::ChecksumChanged),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read cached script");
                    Some(UpdateReason::Unreadable)
                }
            };
        }

        let record = self.cache.record(entry, &resolved.source)?;
        (record.version != entry.version).then(|| UpdateReason::VersionChanged {
            cached: record.version,
            available: entry.version.clone(),
        })
    }

    /// Re-downloads every update candidate.
    pub fn update_all(&self, resolution: &Resolution) -> (UpdateCheck, BulkReport) {
        let check = self.check(resolution);
        let mut report = BulkReport {
            candidates: check.count(),
            ..BulkReport::default()
        };

        for candidate in &check.candidates {
            let resolved = &candidate.resolved;
            let result = self
                .cache
                .download(&resolved.entry, &resolved.source, self.fetcher, self.config);
            report.record(resolved, result);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "updated scripts"
        );
        (check, report)
    }

    /// Downloads every network entry that is not cached yet.
    pub fn download_all(&self, resolution: &Resolution) -> BulkReport {
        let mut report = BulkReport::default();

        for resolved in &resolution.entries {
            let entry = &resolved.entry;
            if entry.origin.is_local() || self.cache.lookup(entry, &resolved.source).is_some() {
                report.skipped += 1;
                continue;
            }
            report.candidates += 1;
            let result = self
                .cache
                .download(entry, &resolved.source, self.fetcher, self.config);
            report.record(resolved, result);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "downloaded scripts"
        );
        report
    }

    /// Removes every cached entry.
    pub fn remove_all(&self, resolution: &Resolution) -> BulkReport {
        let mut report = BulkReport::default();

        for resolved in &resolution.entries {
            if self
                .cache
                .lookup(&resolved.entry, &resolved.source)
                .is_none()
            {
                report.skipped += 1;
                continue;
            }
            report.candidates += 1;
            let result = self.cache.remove(&resolved.entry, &resolved.source);
            report.record(resolved, result);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "removed scripts"
        );
        report
    }
}
