//! CLI module for acelerar
//!
//! Argument parsing, logging helpers, and the command handlers.

mod args;
mod commands;
mod logging;

pub use args::{parse_args, Cli, Command, InfoArgs, ResolveArgs, ValidateArgs};
pub use commands::run_command;
pub use logging::LogLevel;
