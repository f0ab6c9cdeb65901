//! Acelerar CLI
//!
//! Configuration tooling for ZeRO backend config files.
//!
//! # Usage
//!
//! ```bash
//! # Validate a backend config
//! acelerar validate ds_config.json
//!
//! # Show config info
//! acelerar info ds_config.json
//!
//! # Fill `auto` placeholders and print the resolved config
//! acelerar resolve ds_config.json --set optimizer.params.lr=5e-5 \
//!     --hidden-size 768 --micro-batch 16 --world-size 2
//! ```

use acelerar::cli::{run_command, Cli};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
