//! Tilecore CLI - command-line driver for the tile scheduling core
//!
//! Runs a headless render loop against synthetic tiles so the scheduler's
//! frame budgeting and the tile state machines can be observed without a
//! renderer.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tilecore::{init_logging, EngineConfig};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tilecore", version, about = "Tile load and geometry scheduling driver")]
struct Cli {
    /// Configuration file (defaults to <config dir>/tilecore/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a synthetic render loop over a grid of tiles
    Simulate(SimulateArgs),

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    match cli.command {
        Commands::Simulate(args) => {
            let _guard = init_logging(&config.logging)?;
            commands::simulate::run(args, &config)
        }
        Commands::Config { command } => commands::config::run(command, &config, cli.config),
    }
}
