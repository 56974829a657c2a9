//! Commands acting on single scripts.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use scriptrepo_core::{Category, EntryFilter, ExecutionState, ResolvedEntry, ScriptRepository};

/// Category argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    /// Installation scripts
    Install,
    /// Utility scripts
    Tools,
    /// Practice exercises
    Exercises,
    /// Removal scripts
    Uninstall,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Install => Category::Install,
            CategoryArg::Tools => Category::Tools,
            CategoryArg::Exercises => Category::Exercises,
            CategoryArg::Uninstall => Category::Uninstall,
        }
    }
}

/// Arguments for the `list` command.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Text to match against id, name and description
    pub query: Option<String>,

    /// Only show one category
    #[arg(short, long, value_enum)]
    pub category: Option<CategoryArg>,

    /// Only show scripts from this source
    #[arg(short, long)]
    pub source: Option<String>,

    /// Only show scripts with this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

/// Arguments for commands that target one script.
#[derive(Debug, Args)]
pub struct EntryArgs {
    /// Script id
    pub id: String,

    /// Source name, when several sources provide the same id
    #[arg(short, long)]
    pub source: Option<String>,
}

fn find(repo: &ScriptRepository, args: &EntryArgs) -> Result<ResolvedEntry> {
    repo.find_entry(&args.id, args.source.as_deref())
        .with_context(|| format!("cannot select {}", args.id))
}

/// Lists scripts grouped by category.
pub fn list(repo: &ScriptRepository, args: &ListArgs) -> Result<()> {
    let filter = EntryFilter {
        category: args.category.map(Category::from),
        source: args.source.clone(),
        tag: args.tag.clone(),
        query: args.query.clone(),
    };
    let entries = repo.list_entries(&filter).context("failed to list scripts")?;

    if entries.is_empty() {
        println!("No scripts match.");
        return Ok(());
    }

    let mut current = None;
    for resolved in &entries {
        let entry = &resolved.entry;
        if current != Some(entry.category) {
            if current.is_some() {
                println!();
            }
            println!("{}:", entry.category);
            current = Some(entry.category);
        }

        let state = repo.get_execution_state(resolved);
        println!(
            "  {:<24} {:<10} {:<7} {} [{}]",
            entry.id,
            entry.version,
            state.label(),
            entry.name,
            resolved.source.id.name
        );
    }

    println!();
    println!("{} script(s)", entries.len());
    Ok(())
}

/// Shows one script's metadata and execution state.
pub fn status(repo: &ScriptRepository, args: &EntryArgs) -> Result<()> {
    let resolved = find(repo, args)?;
    let entry = &resolved.entry;

    println!("{} ({})", entry.id, resolved.source.id);
    println!("  Name:        {}", entry.name);
    println!("  Category:    {}", entry.category);
    println!("  Version:     {}", entry.version);
    println!("  Origin:      {}", entry.origin);
    if let Some(checksum) = &entry.checksum {
        println!("  Checksum:    {checksum}");
    }
    if !entry.description.is_empty() {
        println!("  Description: {}", entry.description);
    }
    if entry.requires_sudo {
        println!("  Requires sudo");
    }
    if !entry.dependencies.is_empty() {
        println!("  Depends on:  {}", entry.dependencies.join(", "));
    }
    if !entry.tags.is_empty() {
        println!("  Tags:        {}", entry.tags.join(", "));
    }

    let state = repo.get_execution_state(&resolved);
    println!("  State:       {state}");
    if matches!(state, ExecutionState::Cached { .. })
        && let Some(record) = repo.cache().record(entry, &resolved.source)
    {
        println!(
            "  Downloaded:  {} (version {})",
            record.downloaded_at.format("%Y-%m-%d %H:%M UTC"),
            record.version
        );
    }
    Ok(())
}

/// Downloads one script.
pub fn download(repo: &ScriptRepository, args: &EntryArgs) -> Result<()> {
    let resolved = find(repo, args)?;
    let download = repo
        .download(&resolved)
        .with_context(|| format!("failed to download {}", args.id))?;

    println!(
        "Downloaded {} ({} bytes) to {}",
        download.record.script_id,
        download.record.length,
        download.record.path.display()
    );
    if download.includes.is_available() {
        println!("{}", download.includes);
    } else {
        eprintln!("warning: {}", download.includes);
    }
    Ok(())
}

/// Removes one script from the cache.
pub fn remove(repo: &ScriptRepository, args: &EntryArgs) -> Result<()> {
    let resolved = find(repo, args)?;
    if repo
        .remove(&resolved)
        .with_context(|| format!("failed to remove {}", args.id))?
    {
        println!("Removed {}", args.id);
    } else {
        println!("{} is not cached", args.id);
    }
    Ok(())
}
