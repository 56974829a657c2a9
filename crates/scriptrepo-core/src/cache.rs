//! On-disk script cache.
//!
//! The directory layout is the index:
//! ```text
//! <cache_root>/
//! ├── install/
//! │   ├── chrome.sh
//! │   └── .chrome.sh.meta.json
//! ├── tools/ exercises/ uninstall/
//! ├── custom/
//! │   └── custom-1a2b3c4d5e6f/
//! │       ├── install/ tools/ ...
//! │       └── includes/
//! ├── includes/
//! └── manifests/
//! ```
//! Public-source scripts live directly under the category directories.
//! Every custom source, online or local, gets its own base under
//! `custom/<slug>/` so entries from different sources never overwrite each
//! other. Whether an entry is cached at all depends only on its origin.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scriptrepo_config::Config;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::fetch::{FetchPolicy, Fetcher};
use crate::fsutil;
use crate::manifest::{Category, ScriptEntry};
use crate::source::{Source, SourceId, SourceKind};
use crate::{RepoError, RepoResult};

/// Directory holding scripts of custom network sources.
pub const CUSTOM_DIR: &str = "custom";

static HTML_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*<(?:!doctype\s+html|html[\s>]|head[\s>]|body[\s>])")
        .expect("invalid regex")
});

/// Record of a downloaded script, kept in a sidecar next to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub script_id: String,
    pub source: SourceId,
    pub path: PathBuf,
    /// Size in bytes.
    pub length: u64,
    /// Digest of the stored bytes.
    pub checksum: Checksum,
    /// Manifest version that was downloaded.
    pub version: String,
    pub downloaded_at: DateTime<Utc>,
}

/// Per-category file counts and sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub categories: BTreeMap<Category, CategoryStats>,
}

/// Counts for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub files: usize,
    pub bytes: u64,
}

impl CacheStats {
    /// Total number of cached scripts.
    pub fn total_files(&self) -> usize {
        self.categories.values().map(|s| s.files).sum()
    }

    /// Total size of cached scripts.
    pub fn total_bytes(&self) -> u64 {
        self.categories.values().map(|s| s.bytes).sum()
    }
}

/// Manages the script cache directory.
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    /// Opens (creating if needed) a cache at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or category directories cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let cache = Self { root: root.into() };
        cache.ensure_category_dirs(&cache.root)?;
        Ok(cache)
    }

    /// Returns the default cache root (`<cache_dir>/scriptrepo`).
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] if the platform has no cache directory.
    pub fn default_root() -> RepoResult<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("scriptrepo"))
            .ok_or_else(|| RepoError::NotFound("user cache directory".to_string()))
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the base directory of a source: its category directories and
    /// its includes bundle live here.
    pub fn source_root(&self, source: &Source) -> PathBuf {
        match source.id.kind {
            SourceKind::Public => self.root.clone(),
            SourceKind::CustomOnline | SourceKind::CustomLocal => {
                self.root.join(CUSTOM_DIR).join(&source.slug)
            }
        }
    }

    /// Returns where `entry` is (or would be) cached.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotCacheable`] for local-path origins.
    pub fn entry_path(&self, entry: &ScriptEntry, source: &Source) -> RepoResult<PathBuf> {
        if entry.origin.is_local() {
            return Err(RepoError::NotCacheable {
                id: entry.id.clone(),
            });
        }
        Ok(self
            .source_root(source)
            .join(entry.category.as_str())
            .join(&entry.file_name))
    }

    /// Returns the cached file of `entry`, if present.
    pub fn lookup(&self, entry: &ScriptEntry, source: &Source) -> Option<PathBuf> {
        self.entry_path(entry, source)
            .ok()
            .filter(|path| path.is_file())
    }

    /// Reads the sidecar record of a cached entry.
    pub fn record(&self, entry: &ScriptEntry, source: &Source) -> Option<CacheEntry> {
        let path = self.lookup(entry, source)?;
        let content = std::fs::read(sidecar_path(&path)).ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// Fetches, validates and stores `entry`.
    ///
    /// Checksums are verified before anything is written, so a rejected
    /// download never replaces a previously cached file.
    ///
    /// # Errors
    ///
    /// Returns the transfer error, [`RepoError::ChecksumMismatch`],
    /// [`RepoError::EmptyPayload`], [`RepoError::UnexpectedPayload`], or a
    /// storage error such as [`RepoError::DiskFull`].
    pub fn download(
        &self,
        entry: &ScriptEntry,
        source: &Source,
        fetcher: &dyn Fetcher,
        config: &Config,
    ) -> RepoResult<CacheEntry> {
        let path = self.entry_path(entry, source)?;

        info!("Downloading {} from {}", entry.id, entry.origin);
        let bytes = fetcher.fetch(&entry.origin, FetchPolicy::from_config(config))?;

        validate_payload(entry, &bytes)?;

        let actual = Checksum::of(&bytes);
        if config.verify_checksums
            && let Some(expected) = &entry.checksum
            && *expected != actual
        {
            return Err(RepoError::ChecksumMismatch {
                id: entry.id.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepoError::io(parent, e))?;
        }
        fsutil::write_atomic(&path, &bytes).map_err(|e| RepoError::io(&path, e))?;
        if let Err(e) = fsutil::make_executable(&path) {
            warn!(path = %path.display(), error = %e, "failed to mark script executable");
        }

        let record = CacheEntry {
            script_id: entry.id.clone(),
            source: source.id.clone(),
            path: path.clone(),
            length: bytes.len() as u64,
            checksum: actual,
            version: entry.version.clone(),
            downloaded_at: Utc::now(),
        };
        self.write_record(&record);

        info!("Saved {} to {}", entry.id, path.display());
        Ok(record)
    }

    fn write_record(&self, record: &CacheEntry) {
        let sidecar = sidecar_path(&record.path);
        let result = serde_json::to_vec_pretty(record)
            .map_err(std::io::Error::other)
            .and_then(|content| fsutil::write_atomic(&sidecar, &content));
        if let Err(e) = result {
            warn!(path = %sidecar.display(), error = %e, "failed to write cache record");
        }
    }

    /// Removes the cached file of `entry`. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be deleted.
    pub fn remove(&self, entry: &ScriptEntry, source: &Source) -> RepoResult<bool> {
        let Some(path) = self.lookup(entry, source) else {
            return Ok(false);
        };

        std::fs::remove_file(&path).map_err(|e| RepoError::io(&path, e))?;
        let _ = std::fs::remove_file(sidecar_path(&path));
        info!("Removed {} from {}", entry.id, path.display());
        Ok(true)
    }

    /// Deletes every cached script, keeping the directory structure.
    /// Returns the number of scripts removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a category directory cannot be read or a file
    /// cannot be deleted.
    pub fn clear_all(&self) -> RepoResult<usize> {
        let mut removed = 0;
        for dir in self.category_dirs()? {
            for item in std::fs::read_dir(&dir).map_err(|e| RepoError::io(&dir, e))? {
                let item = item.map_err(|e| RepoError::io(&dir, e))?;
                let path = item.path();
                if !path.is_file() {
                    continue;
                }
                std::fs::remove_file(&path).map_err(|e| RepoError::io(&path, e))?;
                if !is_hidden(&path) {
                    removed += 1;
                }
            }
        }
        info!(removed, "cleared script cache");
        Ok(removed)
    }

    /// Counts cached scripts per category.
    ///
    /// # Errors
    ///
    /// Returns an error if a category directory cannot be read.
    pub fn stats(&self) -> RepoResult<CacheStats> {
        let mut stats = CacheStats::default();
        for category in Category::ALL {
            stats.categories.insert(category, CategoryStats::default());
        }

        for dir in self.category_dirs()? {
            let Some(category) = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<Category>().ok())
            else {
                continue;
            };
            let counts = stats.categories.entry(category).or_default();
            for item in std::fs::read_dir(&dir).map_err(|e| RepoError::io(&dir, e))? {
                let path = item.map_err(|e| RepoError::io(&dir, e))?.path();
                if path.is_file() && !is_hidden(&path) {
                    counts.files += 1;
                    counts.bytes += std::fs::metadata(&path).map_or(0, |m| m.len());
                }
            }
        }
        Ok(stats)
    }

    /// All existing category directories, public and custom.
    fn category_dirs(&self) -> RepoResult<Vec<PathBuf>> {
        let mut bases = vec![self.root.clone()];

        let custom = self.root.join(CUSTOM_DIR);
        if custom.is_dir() {
            for item in std::fs::read_dir(&custom).map_err(|e| RepoError::io(&custom, e))? {
                let path = item.map_err(|e| RepoError::io(&custom, e))?.path();
                if path.is_dir() {
                    bases.push(path);
                }
            }
        }

        Ok(bases
            .into_iter()
            .flat_map(|base| Category::ALL.map(|c| base.join(c.as_str())))
            .filter(|dir| dir.is_dir())
            .collect())
    }

    fn ensure_category_dirs(&self, base: &Path) -> RepoResult<()> {
        for category in Category::ALL {
            let dir = base.join(category.as_str());
            std::fs::create_dir_all(&dir).map_err(|e| RepoError::io(&dir, e))?;
        }
        debug!(root = %base.display(), "cache layout ready");
        Ok(())
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.meta.json"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

/// Rejects payloads that cannot be the script the manifest describes.
///
/// An empty body is only accepted when the manifest declares the digest of
/// the empty file. HTML documents are always rejected.
fn validate_payload(entry: &ScriptEntry, bytes: &[u8]) -> RepoResult<()> {
    if bytes.is_empty() {
        if entry.checksum.as_ref().is_some_and(Checksum::is_empty_digest) {
            return Ok(());
        }
        return Err(RepoError::EmptyPayload {
            id: entry.id.clone(),
            origin: entry.origin.to_string(),
        });
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    if HTML_RE.is_match(&head) {
        return Err(RepoError::UnexpectedPayload {
            id: entry.id.clone(),
            origin: entry.origin.to_string(),
            preview: format_bytes_preview(bytes),
        });
    }

    Ok(())
}

/// Formats the first bytes of a buffer as a hex + ASCII preview.
fn format_bytes_preview(data: &[u8]) -> String {
    let take = data.len().min(16);
    let hex: Vec<String> = data[..take].iter().map(|b| format!("{b:02x}")).collect();
    let ascii: String = data[..take]
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
        .collect();
    format!("[{}] \"{}\"", hex.join(" "), ascii)
}
