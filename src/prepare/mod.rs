//! Preparation: autofill policy, model metadata, and dispatch

mod autofill;
mod dispatch;
mod model;
mod sources;

#[cfg(test)]
mod tests;

pub use autofill::{
    AutoFillPolicy, RuntimeContext, COMM_BUFFER_PATHS, PERSISTENCE_THRESHOLD_PATH,
    PREFETCH_BUCKET_PATH, REDUCE_BUCKET_PATH,
};
pub use dispatch::{OptimizerBinding, Prepared, PreparationDispatcher, SchedulerBinding};
pub use model::{ModelDescriptor, ModelMetadata};
pub use sources::{
    DataLoaderInfo, OptimizerSource, OptimizerSpec, PlaceholderOptimizer, PlaceholderScheduler,
    SchedulerSource, SchedulerSpec,
};
