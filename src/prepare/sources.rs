//! Optimizer and scheduler sources
//!
//! A run either brings its own optimizer/scheduler or defers to the
//! backend's native implementations. Placeholders signal deferral while
//! still carrying the hyperparameter hints needed to fill `"auto"` config
//! fields.

use serde::{Deserialize, Serialize};

/// A user-supplied optimizer, described by its hyperparameters. The
/// optimizer object itself stays with the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSpec {
    pub name: String,
    pub lr: f64,
    #[serde(default)]
    pub weight_decay: f64,
}

impl OptimizerSpec {
    pub fn new(name: impl Into<String>, lr: f64) -> Self {
        Self {
            name: name.into(),
            lr,
            weight_decay: 0.0,
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

/// A user-supplied learning-rate scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSpec {
    pub name: String,
    #[serde(default)]
    pub warmup_num_steps: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_num_steps: Option<u64>,
}

impl SchedulerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            warmup_num_steps: 0,
            total_num_steps: None,
        }
    }

    pub fn with_warmup(mut self, warmup_num_steps: u64) -> Self {
        self.warmup_num_steps = warmup_num_steps;
        self
    }

    pub fn with_total_steps(mut self, total_num_steps: u64) -> Self {
        self.total_num_steps = Some(total_num_steps);
        self
    }
}

/// Defers optimizer construction to the backend. The optional fields fill
/// `optimizer.params.*` placeholders in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderOptimizer {
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
}

impl PlaceholderOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = Some(lr);
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = Some(weight_decay);
        self
    }
}

/// Defers scheduler construction to the backend. The optional fields fill
/// `scheduler.params.*` placeholders; `fallback` is used instead of the
/// backend-native scheduler when the config file declares none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderScheduler {
    pub warmup_num_steps: Option<u64>,
    pub total_num_steps: Option<u64>,
    pub warmup_min_lr: Option<f64>,
    pub warmup_max_lr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<SchedulerSpec>,
}

impl PlaceholderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warmup(mut self, warmup_num_steps: u64) -> Self {
        self.warmup_num_steps = Some(warmup_num_steps);
        self
    }

    pub fn with_total_steps(mut self, total_num_steps: u64) -> Self {
        self.total_num_steps = Some(total_num_steps);
        self
    }

    pub fn with_fallback(mut self, fallback: SchedulerSpec) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Where the optimizer comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerSource {
    UserSupplied(OptimizerSpec),
    BackendNative(PlaceholderOptimizer),
}

impl OptimizerSource {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, OptimizerSource::BackendNative(_))
    }

    /// Learning-rate hint carried by this source, if any.
    pub fn lr_hint(&self) -> Option<f64> {
        match self {
            OptimizerSource::UserSupplied(spec) => Some(spec.lr),
            OptimizerSource::BackendNative(placeholder) => placeholder.lr,
        }
    }
}

/// Where the scheduler comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchedulerSource {
    UserSupplied(SchedulerSpec),
    BackendNative(PlaceholderScheduler),
}

impl SchedulerSource {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, SchedulerSource::BackendNative(_))
    }
}

/// Batch-size view of a data iterable handed to `prepare`. An iterable
/// driven by a batch sampler exposes no size of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLoaderInfo {
    pub batch_size: Option<usize>,
}

impl DataLoaderInfo {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: Some(batch_size),
        }
    }

    pub fn without_batch_size() -> Self {
        Self { batch_size: None }
    }
}
