//! Settings commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use scriptrepo_core::ScriptRepository;

/// Settings commands.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print one setting
    Get {
        /// Setting name (e.g. verify_checksums)
        key: String,
    },

    /// Change one setting
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },

    /// Print every setting
    List,

    /// Print the configuration file path
    Path,
}

/// Runs the config command.
pub fn run(repo: &ScriptRepository, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Get { key } => {
            let value = repo
                .get_config(&key)
                .with_context(|| format!("failed to read {key}"))?;
            println!("{value}");
        }
        ConfigCommand::Set { key, value } => {
            repo.set_config(&key, &value)
                .with_context(|| format!("failed to set {key}"))?;
            println!("{key} = {}", repo.get_config(&key)?);
        }
        ConfigCommand::List => {
            for (key, value) in repo.config_entries().context("failed to load settings")? {
                println!("{:<30} {value}", key.as_str());
            }
        }
        ConfigCommand::Path => println!("{}", repo.store().path().display()),
    }
    Ok(())
}
