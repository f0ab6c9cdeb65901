//! Derivation of `"auto"` values from runtime context
//!
//! The backend's communication buffers and batch sizes are deterministic
//! functions of the live run: hidden size, per-device micro-batch size,
//! world size, and gradient accumulation. A policy maps each key-path to
//! the resolver deriving its value.

use crate::config::{Overrides, GRAD_ACCUM_PATH, MICRO_BATCH_PATH, TRAIN_BATCH_PATH};
use serde_json::{json, Value};

/// Key-path of the ZeRO gradient reduce bucket size.
pub const REDUCE_BUCKET_PATH: &str = "zero_optimization.reduce_bucket_size";
/// Key-path of the ZeRO-3 parameter prefetch bucket size.
pub const PREFETCH_BUCKET_PATH: &str = "zero_optimization.stage3_prefetch_bucket_size";
/// Key-path of the ZeRO-3 parameter persistence threshold.
pub const PERSISTENCE_THRESHOLD_PATH: &str =
    "zero_optimization.stage3_param_persistence_threshold";

/// Key-paths whose derivation requires the model hidden size.
pub const COMM_BUFFER_PATHS: [&str; 3] = [
    REDUCE_BUCKET_PATH,
    PREFETCH_BUCKET_PATH,
    PERSISTENCE_THRESHOLD_PATH,
];

/// Live values available at prepare time. Fields left `None` simply
/// disable the rules depending on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeContext {
    pub hidden_size: Option<usize>,
    pub micro_batch_size: Option<usize>,
    pub world_size: Option<usize>,
    pub gradient_accumulation_steps: Option<u64>,
}

type Resolver = fn(&RuntimeContext) -> Option<Value>;

/// Ordered key-path to resolver rules for deriving concrete values.
pub struct AutoFillPolicy {
    rules: Vec<(&'static str, Resolver)>,
}

impl Default for AutoFillPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl AutoFillPolicy {
    /// The batch-size and communication-buffer rules the backend
    /// requires:
    ///
    /// - `reduce_bucket_size` = hidden_size²
    /// - `stage3_prefetch_bucket_size` = ⌊0.9 · hidden_size²⌋
    /// - `stage3_param_persistence_threshold` = 10 · hidden_size
    /// - `train_batch_size` = micro-batch · world size · grad accumulation
    pub fn standard() -> Self {
        Self {
            rules: vec![
                (MICRO_BATCH_PATH, |ctx| {
                    ctx.micro_batch_size.map(|batch| json!(batch))
                }),
                (GRAD_ACCUM_PATH, |ctx| {
                    ctx.gradient_accumulation_steps.map(|steps| json!(steps))
                }),
                (TRAIN_BATCH_PATH, |ctx| {
                    let micro = ctx.micro_batch_size?;
                    let world = ctx.world_size?;
                    let accum = ctx.gradient_accumulation_steps? as usize;
                    Some(json!(micro * world * accum))
                }),
                (REDUCE_BUCKET_PATH, |ctx| {
                    ctx.hidden_size.map(|hidden| json!(hidden * hidden))
                }),
                (PREFETCH_BUCKET_PATH, |ctx| {
                    ctx.hidden_size
                        .map(|hidden| json!((0.9 * (hidden * hidden) as f64) as u64))
                }),
                (PERSISTENCE_THRESHOLD_PATH, |ctx| {
                    ctx.hidden_size.map(|hidden| json!(10 * hidden))
                }),
            ],
        }
    }

    /// Derived overrides for this context. Rules missing an input produce
    /// nothing.
    pub fn derive(&self, ctx: &RuntimeContext) -> Overrides {
        let mut overrides = Overrides::new();
        for (path, resolve) in &self.rules {
            if let Some(value) = resolve(ctx) {
                overrides.insert((*path).to_string(), value);
            }
        }
        overrides
    }

    /// Key-paths this policy can fill.
    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|(path, _)| *path)
    }
}
