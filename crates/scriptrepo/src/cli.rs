//! CLI definition.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scriptrepo_config::ConfigStore;
use scriptrepo_core::{CacheManager, HttpFetcher, ScriptRepository};
use tracing::debug;

use crate::commands;

/// Browse, download, verify and update provisioning scripts.
#[derive(Debug, Parser)]
#[command(name = "scriptrepo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to <config_dir>/scriptrepo/config.json)
    #[arg(long, global = true, env = "SCRIPTREPO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory (defaults to <cache_dir>/scriptrepo)
    #[arg(long, global = true, env = "SCRIPTREPO_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Local reference copy of the includes bundle
    #[arg(long, global = true, env = "SCRIPTREPO_INCLUDES_DIR")]
    pub includes_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show configured manifest sources and how they loaded
    Sources,

    /// List available scripts
    List(commands::scripts::ListArgs),

    /// Show details and execution state of a script
    Status(commands::scripts::EntryArgs),

    /// Download a script into the cache
    Download(commands::scripts::EntryArgs),

    /// Remove a script from the cache
    Remove(commands::scripts::EntryArgs),

    /// Re-download cached scripts that have updates
    Update,

    /// Download every script that is not cached yet
    DownloadAll,

    /// Remove every cached script
    RemoveAll,

    /// Count available updates without downloading
    Check(commands::bulk::CheckArgs),

    /// Delete all cached scripts, keeping the cache layout
    ClearCache,

    /// Fetch or link the shared includes bundle
    SyncIncludes,

    /// Show cache statistics
    Stats,

    /// Read or change settings
    Config(commands::config::ConfigArgs),
}

impl Cli {
    /// Runs the CLI command.
    pub fn run(self) -> Result<()> {
        let repo = self.open_repository()?;

        match self.command {
            Commands::Sources => commands::sources::run(&repo),
            Commands::List(args) => commands::scripts::list(&repo, &args),
            Commands::Status(args) => commands::scripts::status(&repo, &args),
            Commands::Download(args) => commands::scripts::download(&repo, &args),
            Commands::Remove(args) => commands::scripts::remove(&repo, &args),
            Commands::Update => commands::bulk::update(&repo),
            Commands::DownloadAll => commands::bulk::download_all(&repo),
            Commands::RemoveAll => commands::bulk::remove_all(&repo),
            Commands::Check(args) => commands::bulk::check(&repo, &args),
            Commands::ClearCache => commands::cache::clear(&repo),
            Commands::SyncIncludes => commands::cache::sync_includes(&repo),
            Commands::Stats => commands::cache::stats(&repo),
            Commands::Config(args) => commands::config::run(&repo, args),
        }
    }

    fn open_repository(&self) -> Result<ScriptRepository> {
        let store = match &self.config {
            Some(path) => ConfigStore::new(path),
            None => ConfigStore::at_default_location()
                .context("failed to locate the configuration directory")?,
        };

        let cache_root = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => CacheManager::default_root().context("failed to locate the cache directory")?,
        };

        debug!(
            config = %store.path().display(),
            cache = %cache_root.display(),
            "opening repository"
        );

        let fetcher = HttpFetcher::new().context("failed to initialize HTTP client")?;
        let repo = ScriptRepository::new(store, &cache_root, Box::new(fetcher))
            .with_context(|| format!("failed to open cache at {}", cache_root.display()))?;

        Ok(match &self.includes_dir {
            Some(dir) => repo.with_local_includes(dir),
            None => repo,
        })
    }
}
