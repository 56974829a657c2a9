//! Sources command.

use anyhow::{Context, Result};
use scriptrepo_core::{ScriptRepository, SourceStatus};

/// Lists the active sources with their load status.
pub fn run(repo: &ScriptRepository) -> Result<()> {
    let resolution = repo
        .inspect_sources()
        .context("failed to resolve sources")?;

    if resolution.sources.is_empty() {
        println!("No active sources.");
    }

    for report in &resolution.sources {
        let status = match &report.status {
            SourceStatus::Fetched => "fetched".to_string(),
            SourceStatus::Cached => "cached".to_string(),
            SourceStatus::Stale { error } => format!("stale ({error})"),
            SourceStatus::Failed { error } => format!("failed ({error})"),
        };
        println!("{}", report.source.id);
        println!("  Origin:  {}", report.source.origin);
        println!("  Status:  {status}");
        println!("  Scripts: {}", report.entry_count);
    }

    for warning in &resolution.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
