//! CLI error type.

use thiserror::Error;
use tilecore::{ConfigError, LoggingError};

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}
