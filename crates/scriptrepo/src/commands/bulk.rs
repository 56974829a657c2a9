//! Commands over every known script.

use anyhow::{Context, Result, bail};
use clap::Args;
use scriptrepo_core::{BulkReport, Outcome, ScheduledCheck, ScriptRepository, UpdateCheck};

/// Arguments for the `check` command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Only check when the configured interval has elapsed, installing
    /// updates if auto_install_updates is on
    #[arg(long)]
    pub scheduled: bool,
}

fn print_report(action: &str, report: &BulkReport) -> Result<()> {
    for failure in &report.failures {
        eprintln!(
            "  {} ({}): {}",
            failure.id, failure.source, failure.message
        );
    }
    for includes in report.includes.iter().filter(|i| !i.status.is_available()) {
        eprintln!("warning: {includes}");
    }

    let outcome = Outcome::from(report);
    println!("{action}: {outcome}");
    if !outcome.success {
        bail!("{} script(s) failed", report.failed);
    }
    Ok(())
}

fn print_check(check: &UpdateCheck) {
    for candidate in &check.candidates {
        println!(
            "  {} [{}]: {}",
            candidate.resolved.entry.id, candidate.resolved.source.id.name, candidate.reason
        );
    }
    println!(
        "{} update(s) available ({} cached script(s) checked)",
        check.count(),
        check.cached
    );
}

/// Re-downloads cached scripts that have updates.
pub fn update(repo: &ScriptRepository) -> Result<()> {
    let report = repo.update_all().context("failed to update scripts")?;
    print_report("Update", &report)
}

/// Downloads every script that is not cached yet.
pub fn download_all(repo: &ScriptRepository) -> Result<()> {
    let report = repo.download_all().context("failed to download scripts")?;
    print_report("Download", &report)
}

/// Removes every cached script.
pub fn remove_all(repo: &ScriptRepository) -> Result<()> {
    let report = repo.remove_all().context("failed to remove scripts")?;
    print_report("Remove", &report)
}

/// Counts available updates.
pub fn check(repo: &ScriptRepository, args: &CheckArgs) -> Result<()> {
    if !args.scheduled {
        let check = repo
            .check_for_updates()
            .context("failed to check for updates")?;
        print_check(&check);
        return Ok(());
    }

    match repo
        .run_scheduled_check()
        .context("failed to run scheduled check")?
    {
        ScheduledCheck::Disabled => println!("Automatic update checks are disabled."),
        ScheduledCheck::NotDue { last_check } => match last_check {
            Some(at) => println!("Not due yet (last check {}).", at.to_rfc3339()),
            None => println!("Not due yet."),
        },
        ScheduledCheck::Checked(check) => print_check(&check),
        ScheduledCheck::Updated(check, report) => {
            print_check(&check);
            print_report("Update", &report)?;
        }
    }
    Ok(())
}
