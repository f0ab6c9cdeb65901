//! Configuration error types
//!
//! All failures at this layer are fatal to the run; nothing is retried.

use serde_json::Value;
use std::fmt;

/// A key-path whose declared value disagrees with the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// Dotted key-path into the backend document.
    pub key: String,
    /// Value declared in code or on the command line.
    pub declared: Value,
    /// Value the config file holds.
    pub configured: Value,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- config {}={} vs declared {}",
            self.key, self.configured, self.declared
        )
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "config file values disagree with the declared values; correct the following key-paths:\n{}",
        format_mismatches(.0)
    )]
    Conflict(Vec<Mismatch>),

    #[error("`{0}` is set to `auto` in the config file but no override was supplied for it")]
    MissingOverride(String),

    #[error("no data iterable exposes an integer batch size and `train_micro_batch_size_per_gpu` is not set in the config file")]
    BatchSizeUndetermined,

    #[error("a data iterable exposes no batch size; set an integer `train_micro_batch_size_per_gpu` in the config file")]
    BatchSizeUnavailable,

    #[error("config incomplete: {0}")]
    ConfigIncomplete(String),

    #[error("you cannot specify an optimizer in the config file and in the code at the same time")]
    OptimizerConflict,

    #[error("you cannot specify a scheduler in the config file and in the code at the same time")]
    SchedulerConflict,

    #[error("cannot use a placeholder optimizer without an `optimizer` entry in the config file")]
    OptimizerUnconfigured,

    #[error("either specify a scheduler in the config file or set a fallback on the placeholder scheduler")]
    SchedulerUnconfigured,

    #[error("a user-supplied scheduler requires a user-supplied optimizer; use a placeholder scheduler with a fallback instead")]
    SchedulerRequiresPlaceholderOptimizer,

    #[error("the config file has no `zero_optimization` section; specify the ZeRO optimization config")]
    MissingZeroSection,

    #[error("mixed precision cannot be set to `{requested}` when `{configured}` is enabled in the config file")]
    PrecisionMismatch {
        requested: String,
        configured: String,
    },

    #[error(
        "these fields are owned by the config file but were also set explicitly: {}; remove one of the two sources",
        .0.join(", ")
    )]
    AmbiguousConfigSource(Vec<String>),

    #[error("config root must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
