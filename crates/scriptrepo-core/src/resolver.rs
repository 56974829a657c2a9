//! Manifest resolution across all active sources.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scriptrepo_config::Config;
use tracing::{debug, info, warn};

use crate::fetch::{FetchPolicy, Fetcher, Origin};
use crate::fsutil;
use crate::manifest::{Category, Manifest, ScriptEntry};
use crate::source::{Source, active_sources};
use crate::{RepoError, RepoResult};

/// Root and file list of a source's includes bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludesSource {
    pub root: Origin,
    pub files: Vec<String>,
}

/// An entry together with the source it came from.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub entry: ScriptEntry,
    pub source: Arc<Source>,
    /// Includes bundle declared by the entry's manifest.
    pub includes: Option<Arc<IncludesSource>>,
}

/// How a source's manifest was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Fetched and parsed during this resolution.
    Fetched,
    /// Cached manifest was within its freshness window.
    Cached,
    /// Fetch failed; the last good cached manifest was used.
    Stale { error: String },
    /// Fetch failed and no cached manifest exists; no entries contributed.
    Failed { error: String },
}

/// Per-source outcome of a resolution.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: Arc<Source>,
    pub status: SourceStatus,
    pub entry_count: usize,
    pub includes: Option<Arc<IncludesSource>>,
}

/// Result of resolving all active sources.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Entries grouped by category, then source order, then manifest order.
    pub entries: Vec<ResolvedEntry>,
    pub sources: Vec<SourceReport>,
    /// Human-readable problems (invalid locations, failed sources).
    pub warnings: Vec<String>,
}

impl Resolution {
    /// Returns true if no source contributed an entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds an entry by id, optionally restricted to one source name.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] if nothing matches, or
    /// [`RepoError::Ambiguous`] if the id exists in several sources and no
    /// source was given.
    pub fn find(&self, id: &str, source: Option<&str>) -> RepoResult<&ResolvedEntry> {
        let matches: Vec<&ResolvedEntry> = self
            .entries
            .iter()
            .filter(|r| r.entry.id == id)
            .filter(|r| source.is_none_or(|name| r.source.id.name == name))
            .collect();

        match matches.as_slice() {
            [] => Err(RepoError::NotFound(match source {
                Some(name) => format!("script {id} in source {name}"),
                None => format!("script {id}"),
            })),
            [single] => Ok(single),
            many => Err(RepoError::Ambiguous {
                id: id.to_string(),
                sources: many.iter().map(|r| r.source.id.name.clone()).collect(),
            }),
        }
    }

    /// Returns the entries matching `filter`, in resolution order.
    pub fn filter<'a>(&'a self, filter: &EntryFilter) -> Vec<&'a ResolvedEntry> {
        self.entries.iter().filter(|r| filter.matches(r)).collect()
    }

    /// Returns the sources that contributed at least one network-origin
    /// entry, in source order.
    pub fn network_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|report| {
            self.entries
                .iter()
                .any(|r| r.source.id == report.source.id && !r.entry.origin.is_local())
        })
    }
}

/// Criteria for [`Resolution::filter`]. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub category: Option<Category>,
    /// Source name.
    pub source: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive text matched against id, name and description.
    pub query: Option<String>,
}

impl EntryFilter {
    /// Returns true if `resolved` satisfies every set criterion.
    pub fn matches(&self, resolved: &ResolvedEntry) -> bool {
        let entry = &resolved.entry;

        if self.category.is_some_and(|c| c != entry.category) {
            return false;
        }
        if let Some(source) = &self.source
            && resolved.source.id.name != *source
        {
            return false;
        }
        if let Some(tag) = &self.tag
            && !entry.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
        {
            return false;
        }
        if let Some(query) = &self.query {
            let query = query.to_lowercase();
            let hit = [&entry.id, &entry.name, &entry.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&query));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Resolves manifests for all active sources.
pub struct ManifestResolver<'a> {
    fetcher: &'a dyn Fetcher,
    cache_root: &'a Path,
}

impl<'a> ManifestResolver<'a> {
    /// Creates a resolver that keeps last-good manifests under `cache_root`.
    pub fn new(fetcher: &'a dyn Fetcher, cache_root: &'a Path) -> Self {
        Self {
            fetcher,
            cache_root,
        }
    }

    /// Resolves every active source of `config`.
    ///
    /// Never fails as a whole: a source that cannot be loaded contributes no
    /// entries and a warning.
    pub fn resolve(&self, config: &Config) -> Resolution {
        self.resolve_at(config, Utc::now())
    }

    /// Same as [`resolve`](Self::resolve) with an explicit clock.
    pub fn resolve_at(&self, config: &Config, now: DateTime<Utc>) -> Resolution {
        let policy = FetchPolicy::from_config(config);
        let (sources, invalid) = active_sources(config, self.cache_root);

        let mut resolution = Resolution::default();
        for bad in invalid {
            resolution
                .warnings
                .push(format!("invalid source {}: {}", bad.location, bad.reason));
        }

        for source in sources {
            let source = Arc::new(source);
            let (manifest, status) = self.load_source(&source, policy, now);

            match &status {
                SourceStatus::Stale { error } => resolution.warnings.push(format!(
                    "{}: using cached manifest ({error})",
                    source.id.name
                )),
                SourceStatus::Failed { error } => resolution
                    .warnings
                    .push(format!("{}: {error}", source.id.name)),
                SourceStatus::Fetched | SourceStatus::Cached => {}
            }

            let includes = manifest.as_ref().and_then(|m| {
                m.origin_root.clone().map(|root| {
                    Arc::new(IncludesSource {
                        root,
                        files: m.includes.clone(),
                    })
                })
            });

            let entries = manifest.map(|m| m.entries).unwrap_or_default();
            resolution.sources.push(SourceReport {
                source: Arc::clone(&source),
                status,
                entry_count: entries.len(),
                includes: includes.clone(),
            });

            resolution
                .entries
                .extend(entries.into_iter().map(|entry| ResolvedEntry {
                    entry,
                    source: Arc::clone(&source),
                    includes: includes.clone(),
                }));
        }

        // Stable: keeps source order and manifest order within a category.
        resolution.entries.sort_by_key(|r| r.entry.category);

        info!(
            entries = resolution.entries.len(),
            sources = resolution.sources.len(),
            "resolved manifests"
        );
        resolution
    }

    fn load_source(
        &self,
        source: &Source,
        policy: FetchPolicy,
        now: DateTime<Utc>,
    ) -> (Option<Manifest>, SourceStatus) {
        if let Some(age) = cached_age(&source.manifest_cache, now)
            && age < source.freshness
        {
            match self.read_cached(source) {
                Ok(manifest) => {
                    debug!(source = %source.id, "using fresh cached manifest");
                    return (Some(manifest), SourceStatus::Cached);
                }
                Err(e) => debug!(source = %source.id, error = %e, "cached manifest unusable"),
            }
        }

        match self.fetch_and_store(source, policy) {
            Ok(manifest) => (Some(manifest), SourceStatus::Fetched),
            Err(error) => {
                let error = error.to_string();
                match self.read_cached(source) {
                    Ok(manifest) => {
                        warn!(source = %source.id, %error, "falling back to cached manifest");
                        (Some(manifest), SourceStatus::Stale { error })
                    }
                    Err(_) => {
                        warn!(source = %source.id, %error, "source contributes no entries");
                        (None, SourceStatus::Failed { error })
                    }
                }
            }
        }
    }

    fn fetch_and_store(&self, source: &Source, policy: FetchPolicy) -> RepoResult<Manifest> {
        let bytes = self.fetcher.fetch(&source.origin, policy)?;
        let manifest = Manifest::parse(&bytes, &source.origin)?;

        if let Some(parent) = source.manifest_cache.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepoError::io(parent, e))?;
        }
        if let Err(e) = fsutil::write_atomic(&source.manifest_cache, &bytes) {
            // The manifest is usable even if it cannot be kept.
            warn!(path = %source.manifest_cache.display(), error = %e, "failed to cache manifest");
        }

        Ok(manifest)
    }

    fn read_cached(&self, source: &Source) -> RepoResult<Manifest> {
        let path = &source.manifest_cache;
        let bytes = std::fs::read(path).map_err(|e| RepoError::io(path, e))?;
        Manifest::parse(&bytes, &source.origin)
    }
}

fn cached_age(path: &Path, now: DateTime<Utc>) -> Option<chrono::Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(now.signed_duration_since(DateTime::<Utc>::from(modified)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceId, SourceKind};
    use std::path::PathBuf;

    fn resolved(id: &str, category: Category, source: &str, tags: &[&str]) -> ResolvedEntry {
        ResolvedEntry {
            entry: ScriptEntry {
                id: id.to_string(),
                name: format!("{id} name"),
                category,
                version: "1.0".to_string(),
                file_name: format!("{id}.sh"),
                relative_path: String::new(),
                origin: Origin::Path(PathBuf::from(format!("/srv/{id}.sh"))),
                checksum: None,
                description: "Installs things".to_string(),
                requires_sudo: false,
                dependencies: Vec::new(),
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
            },
            source: Arc::new(Source {
                id: SourceId {
                    kind: SourceKind::CustomLocal,
                    name: source.to_string(),
                },
                origin: Origin::Path(PathBuf::from("/srv/manifest.json")),
                slug: source.to_string(),
                manifest_cache: PathBuf::from("/cache/manifests/x.json"),
                freshness: chrono::Duration::zero(),
            }),
            includes: None,
        }
    }

    fn sample() -> Resolution {
        Resolution {
            entries: vec![
                resolved("chrome", Category::Install, "public", &["browser"]),
                resolved("chrome", Category::Install, "mirror", &["browser"]),
                resolved("htop", Category::Tools, "public", &["monitor"]),
            ],
            ..Resolution::default()
        }
    }

    #[test]
    fn test_find_unique_and_ambiguous() {
        let resolution = sample();
        assert_eq!(resolution.find("htop", None).unwrap().entry.id, "htop");

        let err = resolution.find("chrome", None).unwrap_err();
        assert!(matches!(err, RepoError::Ambiguous { ref sources, .. } if sources.len() == 2));

        let found = resolution.find("chrome", Some("mirror")).unwrap();
        assert_eq!(found.source.id.name, "mirror");

        assert!(matches!(
            resolution.find("vim", None),
            Err(RepoError::NotFound(_))
        ));
    }

    #[test]
    fn test_filter() {
        let resolution = sample();

        let by_category = EntryFilter {
            category: Some(Category::Tools),
            ..EntryFilter::default()
        };
        assert_eq!(resolution.filter(&by_category).len(), 1);

        let by_source = EntryFilter {
            source: Some("public".to_string()),
            ..EntryFilter::default()
        };
        assert_eq!(resolution.filter(&by_source).len(), 2);

        let by_tag = EntryFilter {
            tag: Some("BROWSER".to_string()),
            ..EntryFilter::default()
        };
        assert_eq!(resolution.filter(&by_tag).len(), 2);

        let by_query = EntryFilter {
            query: Some("HTOP".to_string()),
            ..EntryFilter::default()
        };
        assert_eq!(resolution.filter(&by_query).len(), 1);

        assert_eq!(resolution.filter(&EntryFilter::default()).len(), 3);
    }

    #[test]
    fn test_network_sources() {
        let mut network = resolved("vim", Category::Tools, "mine", &[]);
        network.entry.origin = Origin::parse("https://cdn.example.com/vim.sh").unwrap();
        let local = resolved("htop", Category::Tools, "toolkit", &[]);

        let report = |entry: &ResolvedEntry| SourceReport {
            source: Arc::clone(&entry.source),
            status: SourceStatus::Fetched,
            entry_count: 1,
            includes: None,
        };
        let resolution = Resolution {
            sources: vec![report(&local), report(&network)],
            entries: vec![local, network],
            warnings: Vec::new(),
        };

        let names: Vec<_> = resolution
            .network_sources()
            .map(|r| r.source.id.name.as_str())
            .collect();
        assert_eq!(names, vec!["mine"]);
    }
}
