//! Backend configuration: document, plugin, and reconciliation

mod document;
mod error;
mod plugin;
mod reconcile;

#[cfg(test)]
mod proptests;

pub use document::{TrainingConfig, AUTO};
pub use error::{ConfigError, Mismatch};
pub use plugin::{
    MixedPrecision, OffloadDevice, ZeroPlugin, ZeroPluginBuilder, CONFIG_FIELDS_ENV,
    GRAD_ACCUM_PATH, GRAD_CLIP_PATH, MICRO_BATCH_PATH, OFFLOAD_OPTIMIZER_PATH,
    OFFLOAD_PARAM_PATH, SAVE_16BIT_PATH, TRAIN_BATCH_PATH,
};
pub use reconcile::{ConfigReconciler, Overrides};
