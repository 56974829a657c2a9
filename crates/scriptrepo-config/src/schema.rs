//! Configuration schema.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Default public repository root.
pub const DEFAULT_REPOSITORY_URL: &str =
    "https://raw.githubusercontent.com/linux-toolbox/scripts/main";

/// Persisted engine settings.
///
/// Every field has a serde default so partial or older documents load cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the public repository; its manifest is `<root>/manifest.json`.
    #[serde(default = "default_repository_url")]
    pub repository_url: String,

    /// Comma-separated custom manifest locations (URLs or local paths).
    #[serde(default)]
    pub custom_manifest_url: String,

    /// Whether network-hosted sources are consulted at all.
    #[serde(default = "default_true")]
    pub use_remote_scripts: bool,

    /// Check for updates automatically when the interval has elapsed.
    #[serde(default = "default_true")]
    pub auto_check_updates: bool,

    /// Apply updates found by an automatic check.
    #[serde(default)]
    pub auto_install_updates: bool,

    /// Minutes between automatic update checks.
    #[serde(default = "default_update_check_interval")]
    pub update_check_interval_minutes: u64,

    /// Time of the last completed update check.
    #[serde(default)]
    pub last_update_check: Option<DateTime<Utc>>,

    /// Allow plain HTTP origins and invalid TLS certificates.
    #[serde(default)]
    pub allow_insecure_downloads: bool,

    /// Days a cached network manifest stays fresh.
    #[serde(default = "default_cache_timeout_days")]
    pub cache_timeout_days: u64,

    /// Verify SHA-256 checksums of downloaded scripts.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository_url: default_repository_url(),
            custom_manifest_url: String::new(),
            use_remote_scripts: true,
            auto_check_updates: true,
            auto_install_updates: false,
            update_check_interval_minutes: default_update_check_interval(),
            last_update_check: None,
            allow_insecure_downloads: false,
            cache_timeout_days: default_cache_timeout_days(),
            verify_checksums: true,
        }
    }
}

fn default_repository_url() -> String {
    DEFAULT_REPOSITORY_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_update_check_interval() -> u64 {
    24 * 60
}

fn default_cache_timeout_days() -> u64 {
    1
}

impl Config {
    /// Returns the custom manifest locations in configuration order.
    pub fn custom_manifest_urls(&self) -> Vec<&str> {
        self.custom_manifest_url
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Freshness window for cached network manifests.
    pub fn manifest_freshness(&self) -> Duration {
        let days = i64::try_from(self.cache_timeout_days).unwrap_or(i64::MAX);
        Duration::try_days(days).unwrap_or(Duration::MAX)
    }

    /// Returns true when an automatic update check should run at `now`.
    pub fn update_check_due(&self, now: DateTime<Utc>) -> bool {
        if !self.auto_check_updates {
            return false;
        }

        let Some(last) = self.last_update_check else {
            return true;
        };

        let minutes = i64::try_from(self.update_check_interval_minutes).unwrap_or(i64::MAX);
        let interval = Duration::try_minutes(minutes).unwrap_or(Duration::MAX);
        now.signed_duration_since(last) >= interval
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is out of range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.repository_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "repository_url must not be empty".to_string(),
            ));
        }
        if self.update_check_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "update_check_interval_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads a setting as its display string.
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::RepositoryUrl => self.repository_url.clone(),
            ConfigKey::CustomManifestUrl => self.custom_manifest_url.clone(),
            ConfigKey::UseRemoteScripts => self.use_remote_scripts.to_string(),
            ConfigKey::AutoCheckUpdates => self.auto_check_updates.to_string(),
            ConfigKey::AutoInstallUpdates => self.auto_install_updates.to_string(),
            ConfigKey::UpdateCheckIntervalMinutes => self.update_check_interval_minutes.to_string(),
            ConfigKey::LastUpdateCheck => self
                .last_update_check
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            ConfigKey::AllowInsecureDownloads => self.allow_insecure_downloads.to_string(),
            ConfigKey::CacheTimeoutDays => self.cache_timeout_days.to_string(),
            ConfigKey::VerifyChecksums => self.verify_checksums.to_string(),
        }
    }

    /// Parses `value` according to the key's type and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the value does not parse or
    /// violates the key's constraints. The config is left unchanged then.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> ConfigResult<()> {
        let value = value.trim();
        match key {
            ConfigKey::RepositoryUrl => {
                if value.is_empty() {
                    return Err(invalid(key, value, "must not be empty"));
                }
                self.repository_url = value.trim_end_matches('/').to_string();
            }
            ConfigKey::CustomManifestUrl => self.custom_manifest_url = value.to_string(),
            ConfigKey::UseRemoteScripts => self.use_remote_scripts = parse_bool(key, value)?,
            ConfigKey::AutoCheckUpdates => self.auto_check_updates = parse_bool(key, value)?,
            ConfigKey::AutoInstallUpdates => self.auto_install_updates = parse_bool(key, value)?,
            ConfigKey::UpdateCheckIntervalMinutes => {
                let minutes = parse_u64(key, value)?;
                if minutes == 0 {
                    return Err(invalid(key, value, "must be at least 1"));
                }
                self.update_check_interval_minutes = minutes;
            }
            ConfigKey::LastUpdateCheck => {
                self.last_update_check = if value.is_empty() || value == "never" {
                    None
                } else {
                    let parsed = DateTime::parse_from_rfc3339(value)
                        .map_err(|e| invalid(key, value, &e.to_string()))?;
                    Some(parsed.with_timezone(&Utc))
                };
            }
            ConfigKey::AllowInsecureDownloads => {
                self.allow_insecure_downloads = parse_bool(key, value)?;
            }
            ConfigKey::CacheTimeoutDays => self.cache_timeout_days = parse_u64(key, value)?,
            ConfigKey::VerifyChecksums => self.verify_checksums = parse_bool(key, value)?,
        }
        Ok(())
    }
}

fn invalid(key: ConfigKey, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(key: ConfigKey, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_u64(key: ConfigKey, value: &str) -> ConfigResult<u64> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

/// Names of the persisted settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    RepositoryUrl,
    CustomManifestUrl,
    UseRemoteScripts,
    AutoCheckUpdates,
    AutoInstallUpdates,
    UpdateCheckIntervalMinutes,
    LastUpdateCheck,
    AllowInsecureDownloads,
    CacheTimeoutDays,
    VerifyChecksums,
}

impl ConfigKey {
    /// All keys in document order.
    pub const ALL: [ConfigKey; 10] = [
        Self::RepositoryUrl,
        Self::CustomManifestUrl,
        Self::UseRemoteScripts,
        Self::AutoCheckUpdates,
        Self::AutoInstallUpdates,
        Self::UpdateCheckIntervalMinutes,
        Self::LastUpdateCheck,
        Self::AllowInsecureDownloads,
        Self::CacheTimeoutDays,
        Self::VerifyChecksums,
    ];

    /// Returns the key as it appears in the config document.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RepositoryUrl => "repository_url",
            Self::CustomManifestUrl => "custom_manifest_url",
            Self::UseRemoteScripts => "use_remote_scripts",
            Self::AutoCheckUpdates => "auto_check_updates",
            Self::AutoInstallUpdates => "auto_install_updates",
            Self::UpdateCheckIntervalMinutes => "update_check_interval_minutes",
            Self::LastUpdateCheck => "last_update_check",
            Self::AllowInsecureDownloads => "allow_insecure_downloads",
            Self::CacheTimeoutDays => "cache_timeout_days",
            Self::VerifyChecksums => "verify_checksums",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
