//! Cache maintenance commands.

use anyhow::{Context, Result, bail};
use scriptrepo_core::{Outcome, ScriptRepository};

/// Deletes every cached script.
pub fn clear(repo: &ScriptRepository) -> Result<()> {
    let result = repo.clear_cache();
    let outcome = Outcome::from_result(&result, |n| format!("Removed {n} cached script(s)"));
    result.context("failed to clear cache")?;
    println!("{outcome}");
    Ok(())
}

/// Synchronizes the includes bundle of every network source.
pub fn sync_includes(repo: &ScriptRepository) -> Result<()> {
    let results = repo
        .sync_includes()
        .context("failed to synchronize includes")?;
    if results.is_empty() {
        println!("No source serves scripts over the network.");
        return Ok(());
    }

    let mut unavailable = 0;
    for result in &results {
        if result.status.is_available() {
            println!("{result}");
        } else {
            eprintln!("error: {result}");
            unavailable += 1;
        }
    }
    if unavailable > 0 {
        bail!("includes unavailable for {unavailable} source(s)");
    }
    Ok(())
}

/// Prints per-category cache statistics.
pub fn stats(repo: &ScriptRepository) -> Result<()> {
    let stats = repo.cache_stats().context("failed to read cache")?;

    println!("Cache: {}", repo.cache().root().display());
    for (category, counts) in &stats.categories {
        println!(
            "  {:<10} {:>4} file(s) {:>10} bytes",
            category.as_str(),
            counts.files,
            counts.bytes
        );
    }
    println!(
        "  {:<10} {:>4} file(s) {:>10} bytes",
        "total",
        stats.total_files(),
        stats.total_bytes()
    );
    Ok(())
}
