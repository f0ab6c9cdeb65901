//! Configuration reconciliation and dispatch for a ZeRO training backend
//!
//! `acelerar` sits between a user-declared training run and an external
//! mixed-precision/ZeRO training engine. It merges the declared run
//! configuration with the backend's JSON document, fills `"auto"`
//! placeholders from live runtime values, and decides whether the run
//! uses a user-supplied or backend-native optimizer and scheduler before
//! handing control to the engine.
//!
//! Model computation, process launching, and checkpoint formats stay with
//! the external backend; this crate owns only the synchronous
//! configuration resolution performed once per run.
//!
//! # Example
//!
//! ```
//! use acelerar::config::ZeroPluginBuilder;
//!
//! let plugin = ZeroPluginBuilder::new()
//!     .zero_stage(2)
//!     .gradient_accumulation_steps(1)
//!     .gradient_clipping(1.0)
//!     .build()?;
//!
//! assert_eq!(plugin.zero_stage(), 2);
//! assert!(plugin.config().is_auto("train_micro_batch_size_per_gpu"));
//! # Ok::<(), acelerar::config::ConfigError>(())
//! ```

pub mod cli;
pub mod config;
pub mod launch;
pub mod prepare;

pub use config::{
    ConfigError, ConfigReconciler, MixedPrecision, Mismatch, OffloadDevice, Overrides,
    TrainingConfig, ZeroPlugin, ZeroPluginBuilder, AUTO,
};
pub use launch::DistributedEnv;
pub use prepare::{
    AutoFillPolicy, DataLoaderInfo, ModelDescriptor, ModelMetadata, OptimizerBinding,
    OptimizerSource, OptimizerSpec, PlaceholderOptimizer, PlaceholderScheduler, Prepared,
    PreparationDispatcher, RuntimeContext, SchedulerBinding, SchedulerSource, SchedulerSpec,
};
