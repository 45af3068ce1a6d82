//! Configuration inspection commands.
//!
//! Provides `config show` and `config path` for viewing the configuration the
//! other commands would run with.

use std::path::PathBuf;

use clap::Subcommand;
use tilecore::EngineConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(
    command: ConfigCommands,
    config: &EngineConfig,
    explicit_path: Option<PathBuf>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Path => run_path(explicit_path),
    }
}

/// Show the configuration file path.
fn run_path(explicit_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = explicit_path
        .or_else(EngineConfig::default_path)
        .ok_or_else(|| {
            CliError::InvalidArgument(
                "no configuration directory on this platform; pass --config".to_string(),
            )
        })?;

    let note = if path.exists() { "" } else { " (not present, defaults in use)" };
    println!("{}{}", path.display(), note);
    Ok(())
}
