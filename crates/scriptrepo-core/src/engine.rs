//! The engine facade used by front ends.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use scriptrepo_config::{Config, ConfigKey, ConfigStore};
use tracing::{debug, info};

use crate::bulk::{BulkOperator, BulkReport, UpdateCheck};
use crate::cache::{CacheEntry, CacheManager, CacheStats};
use crate::execution::{ExecutionState, execution_state};
use crate::fetch::{FetchPolicy, Fetcher, HttpFetcher};
use crate::includes::{IncludesStatus, IncludesSynchronizer, SourceIncludes};
use crate::resolver::{EntryFilter, IncludesSource, ManifestResolver, Resolution, ResolvedEntry};
use crate::source::Source;
use crate::{RepoError, RepoResult};

/// Result of a single download.
#[derive(Debug, Clone)]
pub struct Download {
    pub record: CacheEntry,
    pub includes: IncludesStatus,
}

/// What [`ScriptRepository::run_scheduled_check`] did.
#[derive(Debug, Clone)]
pub enum ScheduledCheck {
    /// Automatic checks are disabled.
    Disabled,
    /// The interval has not elapsed since the last check.
    NotDue { last_check: Option<DateTime<Utc>> },
    /// Checked; updates were not installed.
    Checked(UpdateCheck),
    /// Checked and installed updates.
    Updated(UpdateCheck, BulkReport),
}

/// Script repository engine.
///
/// Configuration is read from the store at every operation, so changes made
/// by another front end take effect at the next call. Several engines with
/// different stores and cache roots can coexist.
pub struct ScriptRepository {
    store: ConfigStore,
    cache: CacheManager,
    fetcher: Box<dyn Fetcher>,
    local_includes: Option<PathBuf>,
}

impl ScriptRepository {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache layout cannot be created.
    pub fn new(
        store: ConfigStore,
        cache_root: impl Into<PathBuf>,
        fetcher: Box<dyn Fetcher>,
    ) -> RepoResult<Self> {
        Ok(Self {
            store,
            cache: CacheManager::new(cache_root)?,
            fetcher,
            local_includes: None,
        })
    }

    /// Opens the engine with the default config location, cache root and
    /// HTTP fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if a default location is unavailable or the HTTP
    /// client cannot be built.
    pub fn open_default() -> RepoResult<Self> {
        Self::new(
            ConfigStore::at_default_location()?,
            CacheManager::default_root()?,
            Box::new(HttpFetcher::new()?),
        )
    }

    /// Sets the local reference copy of the includes bundle.
    #[must_use]
    pub fn with_local_includes(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_includes = Some(dir.into());
        self
    }

    /// Returns the configuration store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Returns the cache manager.
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Loads the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Config`] if the document is unreadable or invalid.
    pub fn config(&self) -> RepoResult<Config> {
        Ok(self.store.load()?)
    }

    /// Resolves every source, including the ones that failed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the configuration cannot be loaded.
    pub fn inspect_sources(&self) -> RepoResult<Resolution> {
        let config = self.config()?;
        Ok(ManifestResolver::new(self.fetcher.as_ref(), self.cache.root()).resolve(&config))
    }

    /// Resolves every source into the combined entry list.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoScripts`] if no source contributed an entry.
    pub fn resolve_sources(&self) -> RepoResult<Resolution> {
        let resolution = self.inspect_sources()?;
        if resolution.is_empty() {
            return Err(RepoError::NoScripts {
                sources: resolution.sources.len(),
            });
        }
        Ok(resolution)
    }

    /// Lists the entries matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoScripts`] if no source contributed an entry.
    pub fn list_entries(&self, filter: &EntryFilter) -> RepoResult<Vec<ResolvedEntry>> {
        let resolution = self.resolve_sources()?;
        Ok(resolution.filter(filter).into_iter().cloned().collect())
    }

    /// Finds one entry by id, optionally within a named source.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] or [`RepoError::Ambiguous`].
    pub fn find_entry(&self, id: &str, source: Option<&str>) -> RepoResult<ResolvedEntry> {
        self.resolve_sources()?.find(id, source).cloned()
    }

    /// Returns the execution state of `entry`. Never downloads.
    pub fn get_execution_state(&self, entry: &ResolvedEntry) -> ExecutionState {
        execution_state(&entry.entry, &entry.source, &self.cache)
    }

    /// Returns the cached file of `entry`, if any.
    pub fn lookup(&self, entry: &ResolvedEntry) -> Option<PathBuf> {
        self.cache.lookup(&entry.entry, &entry.source)
    }

    /// Downloads `entry` into the cache, then synchronizes the includes
    /// bundle of its source.
    ///
    /// # Errors
    ///
    /// Returns the download error; includes problems are reported in
    /// [`Download::includes`] instead.
    pub fn download(&self, entry: &ResolvedEntry) -> RepoResult<Download> {
        let config = self.config()?;
        let record = self
            .cache
            .download(&entry.entry, &entry.source, self.fetcher.as_ref(), &config)?;
        let includes = self.includes(&entry.source, entry.includes.as_deref(), &config);
        Ok(Download { record, includes })
    }

    /// Removes the cached copy of `entry`. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cached file cannot be deleted.
    pub fn remove(&self, entry: &ResolvedEntry) -> RepoResult<bool> {
        self.cache.remove(&entry.entry, &entry.source)
    }

    /// Deletes every cached script. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be emptied.
    pub fn clear_cache(&self) -> RepoResult<usize> {
        self.cache.clear_all()
    }

    /// Counts update candidates without downloading and records the check
    /// time.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution yields nothing or the check time cannot
    /// be saved.
    pub fn check_for_updates(&self) -> RepoResult<UpdateCheck> {
        let config = self.config()?;
        let resolution = self.resolve_sources()?;
        let check =
            BulkOperator::new(&self.cache, self.fetcher.as_ref(), &config).check(&resolution);
        self.record_check(Utc::now())?;
        Ok(check)
    }

    /// Re-downloads every cached entry that has an update.
    ///
    /// # Errors
    ///
    /// Returns an error only if resolution or configuration fails; per-entry
    /// failures are in the report.
    pub fn update_all(&self) -> RepoResult<BulkReport> {
        let config = self.config()?;
        let resolution = self.resolve_sources()?;
        let (_, report) = self.update_with(&config, &resolution);
        self.record_check(Utc::now())?;
        Ok(report)
    }

    fn update_with(&self, config: &Config, resolution: &Resolution) -> (UpdateCheck, BulkReport) {
        let (check, mut report) =
            BulkOperator::new(&self.cache, self.fetcher.as_ref(), config).update_all(resolution);
        report.includes = self.sync_network_sources(resolution, config);
        (check, report)
    }

    /// Downloads every network entry not cached yet.
    ///
    /// # Errors
    ///
    /// Returns an error only if resolution or configuration fails.
    pub fn download_all(&self) -> RepoResult<BulkReport> {
        let config = self.config()?;
        let resolution = self.resolve_sources()?;
        let mut report = BulkOperator::new(&self.cache, self.fetcher.as_ref(), &config)
            .download_all(&resolution);
        report.includes = self.sync_network_sources(&resolution, &config);
        Ok(report)
    }

    /// Removes every cached entry known to the current manifests.
    ///
    /// # Errors
    ///
    /// Returns an error only if resolution or configuration fails.
    pub fn remove_all(&self) -> RepoResult<BulkReport> {
        let config = self.config()?;
        let resolution = self.resolve_sources()?;
        Ok(BulkOperator::new(&self.cache, self.fetcher.as_ref(), &config).remove_all(&resolution))
    }

    /// Runs the automatic update check when it is enabled and due, and
    /// installs updates when `auto_install_updates` is on.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution or configuration fails.
    pub fn run_scheduled_check(&self) -> RepoResult<ScheduledCheck> {
        self.run_scheduled_check_at(Utc::now())
    }

    /// Same as [`run_scheduled_check`](Self::run_scheduled_check) with an
    /// explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution or configuration fails.
    pub fn run_scheduled_check_at(&self, now: DateTime<Utc>) -> RepoResult<ScheduledCheck> {
        let config = self.config()?;
        if !config.auto_check_updates {
            debug!("automatic update checks disabled");
            return Ok(ScheduledCheck::Disabled);
        }
        if !config.update_check_due(now) {
            debug!(last = ?config.last_update_check, "update check not due");
            return Ok(ScheduledCheck::NotDue {
                last_check: config.last_update_check,
            });
        }

        let resolution = self.resolve_sources()?;
        let result = if config.auto_install_updates {
            let (check, report) = self.update_with(&config, &resolution);
            if check.count() > 0 {
                ScheduledCheck::Updated(check, report)
            } else {
                ScheduledCheck::Checked(check)
            }
        } else {
            ScheduledCheck::Checked(
                BulkOperator::new(&self.cache, self.fetcher.as_ref(), &config).check(&resolution),
            )
        };

        self.record_check(now)?;
        info!("scheduled update check complete");
        Ok(result)
    }

    /// Synchronizes the includes bundle of every source with network-origin
    /// entries. Sources without any are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error only if the configuration cannot be loaded.
    pub fn sync_includes(&self) -> RepoResult<Vec<SourceIncludes>> {
        let config = self.config()?;
        let resolution =
            ManifestResolver::new(self.fetcher.as_ref(), self.cache.root()).resolve(&config);
        Ok(self.sync_network_sources(&resolution, &config))
    }

    /// Returns per-category cache statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    pub fn cache_stats(&self) -> RepoResult<CacheStats> {
        self.cache.stats()
    }

    /// Reads one setting by key name.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Config`] for unknown keys or unreadable settings.
    pub fn get_config(&self, key: &str) -> RepoResult<String> {
        Ok(self.store.get(key)?)
    }

    /// Stores one setting by key name.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Config`] for unknown keys or invalid values.
    pub fn set_config(&self, key: &str, value: &str) -> RepoResult<()> {
        self.store.set(key, value)?;
        info!(key, value, "setting updated");
        Ok(())
    }

    /// Returns every setting with its current value.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Config`] if the settings cannot be loaded.
    pub fn config_entries(&self) -> RepoResult<Vec<(ConfigKey, String)>> {
        let config = self.config()?;
        Ok(ConfigKey::ALL
            .iter()
            .map(|key| (*key, config.get(*key)))
            .collect())
    }

    /// Synchronizes the bundle in `source`'s cache base.
    fn includes(
        &self,
        source: &Source,
        bundle: Option<&IncludesSource>,
        config: &Config,
    ) -> IncludesStatus {
        let base = self.cache.source_root(source);
        IncludesSynchronizer::new(self.fetcher.as_ref(), &base, self.local_includes.as_deref())
            .sync(bundle, FetchPolicy::from_config(config))
    }

    fn sync_network_sources(
        &self,
        resolution: &Resolution,
        config: &Config,
    ) -> Vec<SourceIncludes> {
        resolution
            .network_sources()
            .map(|report| SourceIncludes {
                source: report.source.id.clone(),
                status: self.includes(&report.source, report.includes.as_deref(), config),
            })
            .collect()
    }

    fn record_check(&self, now: DateTime<Utc>) -> RepoResult<()> {
        self.store.update(|config| {
            config.last_update_check = Some(now);
            Ok(())
        })?;
        Ok(())
    }

    /// Returns the local reference bundle, if configured.
    pub fn local_includes(&self) -> Option<&Path> {
        self.local_includes.as_deref()
    }
}
