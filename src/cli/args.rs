//! CLI argument parsing
//!
//! ```bash
//! acelerar validate ds_config.json
//! acelerar info ds_config.json
//! acelerar resolve ds_config.json --set optimizer.params.lr=5e-5
//! ```

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Acelerar: ZeRO backend configuration tooling
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "acelerar")]
#[command(author = "PAIML")]
#[command(version)]
#[command(about = "Reconcile and inspect ZeRO training backend configurations")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a backend configuration file
    Validate(ValidateArgs),

    /// Display information about a configuration
    Info(InfoArgs),

    /// Fill `auto` placeholders and print the resolved configuration
    Resolve(ResolveArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to the backend JSON configuration
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to the backend JSON configuration
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the resolve command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ResolveArgs {
    /// Path to the backend JSON configuration
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override a key-path, e.g. --set optimizer.params.lr=5e-5
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Model hidden size for communication buffer sizing
    #[arg(long)]
    pub hidden_size: Option<usize>,

    /// Number of launched processes
    #[arg(long, default_value_t = 1)]
    pub world_size: usize,

    /// Per-device micro-batch size
    #[arg(long)]
    pub micro_batch: Option<usize>,

    /// Gradient accumulation steps
    #[arg(long)]
    pub grad_accum: Option<u64>,
}

/// Parse from an explicit argument vector (testable entry point).
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args)
}
