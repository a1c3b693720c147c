//! Command-line arguments for the CoinDaily service.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use std::path::PathBuf;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML settings file.
    #[clap(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Run a single report cycle and exit instead of scheduling.
    #[clap(long)]
    pub once: bool,
}
