//! Configuration CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::PathBuf;

use clap::Subcommand;
use quadpager::config::{config_file_path, PagerConfig};

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show {
        /// Configuration file to read instead of the default
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(),
        ConfigCommands::Show { config } => run_show(config),
        ConfigCommands::Init { force } => run_init(force),
    }
}

fn default_path() -> Result<PathBuf, CliError> {
    config_file_path().ok_or_else(|| {
        CliError::InvalidArgument("no configuration directory on this platform".to_string())
    })
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", default_path()?.display());
    Ok(())
}

/// Print the effective configuration as INI.
fn run_show(config: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config.as_deref())?;
    config.to_ini().write_to(&mut std::io::stdout())?;
    Ok(())
}

/// Write the defaults to the user config file.
fn run_init(force: bool) -> Result<(), CliError> {
    let path = default_path()?;
    if path.exists() && !force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    PagerConfig::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
