//! Configuration store.
//!
//! The store never keeps a parsed [`Config`] around: every read goes back to
//! disk so that settings changed by another front end are picked up at the
//! next decision point.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Config, ConfigError, ConfigKey, ConfigResult};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Reads and writes the persisted [`Config`] document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the platform default location
    /// (`<config_dir>/scriptrepo/config.json`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no configuration directory exists
    /// for the current user.
    pub fn at_default_location() -> ConfigResult<Self> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dir.join("scriptrepo").join(CONFIG_FILE_NAME)))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(&self) -> ConfigResult<Config> {
        debug!(path = ?self.path, "loading configuration");

        if !self.path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration.
    ///
    /// Writes a temporary sibling first and renames it over the target, so the
    /// document is never left half-written.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or cannot be written.
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        let temp_path = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));

        std::fs::write(&temp_path, format!("{content}\n"))?;
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!(path = ?self.path, "saved configuration");
        Ok(())
    }

    /// Loads, applies `f`, and saves.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, the update itself, or saving fails.
    pub fn update<F>(&self, f: F) -> ConfigResult<Config>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        let mut config = self.load()?;
        f(&mut config)?;
        self.save(&config)?;
        Ok(config)
    }

    /// Reads a single setting by key name.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the config cannot be loaded.
    pub fn get(&self, key: &str) -> ConfigResult<String> {
        let key: ConfigKey = key.parse()?;
        Ok(self.load()?.get(key))
    }

    /// Stores a single setting by key name.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value is invalid, or the
    /// config cannot be loaded or saved.
    pub fn set(&self, key: &str, value: &str) -> ConfigResult<()> {
        let key: ConfigKey = key.parse()?;
        self.update(|config| config.set(key, value))?;
        Ok(())
    }
}
