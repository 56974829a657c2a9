//! Manifest sources and their identity.
//!
//! The active source list is derived from configuration on every resolution:
//! the public repository first, then custom manifests in configuration order.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Duration;
use scriptrepo_config::Config;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::fetch::Origin;

/// Manifest file name appended to a repository root.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Directory (under the cache root) holding last-good manifests.
pub const MANIFESTS_DIR: &str = "manifests";

/// Slug of the public source.
pub const PUBLIC_SLUG: &str = "public";

/// Kind of manifest source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// The configured public repository.
    Public,
    /// A custom manifest served over http(s).
    CustomOnline,
    /// A custom manifest on the local filesystem.
    CustomLocal,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::CustomOnline => "custom-online",
            Self::CustomLocal => "custom-local",
        })
    }
}

/// Identity of a source, attached to every entry it contributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId {
    pub kind: SourceKind,
    pub name: String,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// One configured manifest origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    /// Location of the manifest document.
    pub origin: Origin,
    /// Stable filesystem-safe key derived from the origin.
    pub slug: String,
    /// Where the last good manifest is kept.
    pub manifest_cache: PathBuf,
    /// Maximum age of the cached manifest before it is re-fetched.
    pub freshness: Duration,
}

impl Source {
    /// Returns true if the manifest itself lives on the local filesystem.
    pub fn is_local(&self) -> bool {
        self.origin.is_local()
    }
}

/// A configured source that could not be turned into a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSource {
    pub location: String,
    pub reason: String,
}

/// Builds the active sources for `config`.
///
/// Invalid locations are returned separately and never abort the others.
pub fn active_sources(config: &Config, cache_root: &Path) -> (Vec<Source>, Vec<InvalidSource>) {
    let mut sources = Vec::new();
    let mut invalid = Vec::new();
    let mut names = HashSet::new();
    let manifests_dir = cache_root.join(MANIFESTS_DIR);

    match public_origin(&config.repository_url) {
        Ok(origin) if origin.is_local() || config.use_remote_scripts => {
            names.insert(PUBLIC_SLUG.to_string());
            sources.push(Source {
                id: SourceId {
                    kind: SourceKind::Public,
                    name: PUBLIC_SLUG.to_string(),
                },
                freshness: freshness(&origin, config),
                manifest_cache: manifests_dir.join(format!("{PUBLIC_SLUG}.json")),
                slug: PUBLIC_SLUG.to_string(),
                origin,
            });
        }
        Ok(origin) => debug!(%origin, "remote scripts disabled, skipping public source"),
        Err(e) => invalid.push(InvalidSource {
            location: config.repository_url.clone(),
            reason: e.to_string(),
        }),
    }

    for location in config.custom_manifest_urls() {
        let origin = match Origin::parse(location) {
            Ok(origin) => origin,
            Err(e) => {
                warn!(location, error = %e, "ignoring invalid custom manifest location");
                invalid.push(InvalidSource {
                    location: location.to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !origin.is_local() && !config.use_remote_scripts {
            debug!(%origin, "remote scripts disabled, skipping custom source");
            continue;
        }

        let kind = if origin.is_local() {
            SourceKind::CustomLocal
        } else {
            SourceKind::CustomOnline
        };
        let slug = custom_slug(&origin);
        let name = unique_name(display_name(&origin), &mut names);

        sources.push(Source {
            id: SourceId { kind, name },
            freshness: freshness(&origin, config),
            manifest_cache: manifests_dir.join(format!("{slug}.json")),
            slug,
            origin,
        });
    }

    (sources, invalid)
}

fn public_origin(repository_url: &str) -> crate::RepoResult<Origin> {
    let root = Origin::parse(repository_url)?;
    let is_manifest = match &root {
        Origin::Url(url) => url.path().ends_with(".json"),
        Origin::Path(path) => path.extension().is_some_and(|ext| ext == "json"),
    };
    if is_manifest {
        Ok(root)
    } else {
        root.join(MANIFEST_FILE_NAME)
    }
}

fn freshness(origin: &Origin, config: &Config) -> Duration {
    if origin.is_local() {
        Duration::zero()
    } else {
        config.manifest_freshness()
    }
}

fn custom_slug(origin: &Origin) -> String {
    let digest = Checksum::of(origin.to_string().as_bytes());
    format!("custom-{}", &digest.hex()[..12])
}

fn display_name(origin: &Origin) -> String {
    match origin {
        Origin::Url(url) => url.host_str().unwrap_or("custom").to_string(),
        Origin::Path(path) => path
            .parent()
            .and_then(Path::file_name)
            .map_or_else(|| "local".to_string(), |n| n.to_string_lossy().into_owned()),
    }
}

fn unique_name(base: String, names: &mut HashSet<String>) -> String {
    if names.insert(base.clone()) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| names.insert(candidate.clone()))
        .unwrap_or(base)
}
