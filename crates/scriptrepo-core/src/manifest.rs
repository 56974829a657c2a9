//! Manifest documents and normalized script entries.
//!
//! A manifest is parsed leniently: a malformed entry is dropped with a
//! warning instead of failing the whole document. Only invalid JSON (or a
//! document without a `scripts` array) is a parse error.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::checksum::Checksum;
use crate::fetch::Origin;
use crate::{RepoError, RepoResult};

/// Helper file fetched when a manifest does not list its includes.
pub const DEFAULT_INCLUDES: &[&str] = &["common.sh"];

/// Script category; also the cache subdirectory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Install,
    Tools,
    Exercises,
    Uninstall,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 4] = [
        Self::Install,
        Self::Tools,
        Self::Exercises,
        Self::Uninstall,
    ];

    /// Returns the category's directory and wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Tools => "tools",
            Self::Exercises => "exercises",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RepoError::Parse {
                what: format!("category '{s}'"),
                reason: "expected install, tools, exercises or uninstall".to_string(),
            })
    }
}

/// One installable script, normalized from a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    /// Identifier, unique within its source.
    pub id: String,
    /// Display name.
    pub name: String,
    pub category: Category,
    pub version: String,
    /// File name inside the category directory.
    pub file_name: String,
    /// Path relative to the repository root.
    pub relative_path: String,
    /// Resolved download location.
    pub origin: Origin,
    /// Expected digest, if the manifest declares one.
    pub checksum: Option<Checksum>,
    pub description: String,
    /// Script needs root privileges.
    pub requires_sudo: bool,
    /// Ids of scripts this one depends on.
    pub dependencies: Vec<String>,
    pub tags: Vec<String>,
}

/// Wire format of a manifest document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub repository_version: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Origin root for the includes bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    /// Helper files of the includes bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<String>>,
    pub scripts: Vec<ManifestScript>,
}

/// Wire format of a manifest entry.
///
/// Fields are kept as loose strings so one bad entry cannot reject the
/// document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestScript {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub relative_path: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_sudo: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A parsed manifest with its entries resolved against the manifest origin.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Schema version.
    pub version: String,
    pub repository_version: String,
    pub last_updated: Option<String>,
    /// Root the includes bundle is fetched from.
    pub origin_root: Option<Origin>,
    /// Helper file names of the includes bundle.
    pub includes: Vec<String>,
    pub entries: Vec<ScriptEntry>,
    /// Entries that were dropped, with the reason.
    pub rejected: Vec<String>,
}

impl Manifest {
    /// Parses manifest bytes fetched from `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Parse`] if the bytes are not a manifest document.
    pub fn parse(bytes: &[u8], origin: &Origin) -> RepoResult<Self> {
        let document: ManifestDocument =
            serde_json::from_slice(bytes).map_err(|e| RepoError::Parse {
                what: format!("manifest {origin}"),
                reason: e.to_string(),
            })?;
        Ok(Self::from_document(document, origin))
    }

    /// Normalizes a document fetched from `origin`.
    pub fn from_document(document: ManifestDocument, origin: &Origin) -> Self {
        let origin_root = match document.repository_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => match origin.resolve(url) {
                Ok(root) => Some(root),
                Err(e) => {
                    warn!(%origin, error = %e, "ignoring invalid repository_url");
                    origin.parent()
                }
            },
            _ => origin.parent(),
        };

        let includes = document.includes.unwrap_or_else(|| {
            DEFAULT_INCLUDES
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        });

        let mut entries = Vec::with_capacity(document.scripts.len());
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for script in document.scripts {
            let id = script.id.clone();
            match normalize(script, origin, origin_root.as_ref()) {
                Ok(entry) => {
                    if seen.insert(entry.id.clone()) {
                        entries.push(entry);
                    } else {
                        rejected.push(format!("{id}: duplicate id"));
                    }
                }
                Err(reason) => rejected.push(format!("{id}: {reason}")),
            }
        }

        for reason in &rejected {
            warn!(%origin, "skipping manifest entry {reason}");
        }

        Self {
            version: document.version,
            repository_version: document.repository_version,
            last_updated: document.last_updated,
            origin_root,
            includes,
            entries,
            rejected,
        }
    }
}

fn normalize(
    script: ManifestScript,
    origin: &Origin,
    root: Option<&Origin>,
) -> Result<ScriptEntry, String> {
    let id = script.id.trim().to_string();
    if id.is_empty() {
        return Err("missing id".to_string());
    }

    let file_name = script.file_name.trim().to_string();
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return Err(format!("invalid file_name '{file_name}'"));
    }

    let category: Category = script.category.parse().map_err(|e: RepoError| e.to_string())?;

    let checksum = match script.checksum.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => {
            Some(value.parse::<Checksum>().map_err(|e| e.to_string())?)
        }
        _ => None,
    };

    let download_url = script.download_url.trim();
    let resolved = if download_url.is_empty() {
        let relative = if script.relative_path.trim().is_empty() {
            format!("{category}/{file_name}")
        } else {
            script.relative_path.trim().to_string()
        };
        let root = root.ok_or_else(|| "no download_url and no repository root".to_string())?;
        root.join(&relative)
    } else {
        origin.resolve(download_url)
    };
    let origin = resolved.map_err(|e| e.to_string())?;

    let name = if script.name.trim().is_empty() {
        id.clone()
    } else {
        script.name.trim().to_string()
    };

    Ok(ScriptEntry {
        id,
        name,
        category,
        version: script.version.trim().to_string(),
        file_name,
        relative_path: script.relative_path,
        origin,
        checksum,
        description: script.description,
        requires_sudo: script.requires_sudo,
        dependencies: script.dependencies,
        tags: script.tags,
    })
}
