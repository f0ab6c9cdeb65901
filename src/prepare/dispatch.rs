//! Preparation dispatch: optimizer/scheduler selection and config autofill
//!
//! The last synchronous step before the external engine takes over.
//! Validates that exactly one concrete source exists per slot, resolves
//! the batch sizes, derives communication buffers, and reconciles every
//! remaining `"auto"` field.

use super::autofill::{AutoFillPolicy, RuntimeContext, COMM_BUFFER_PATHS};
use super::model::ModelDescriptor;
use super::sources::{
    DataLoaderInfo, OptimizerSource, OptimizerSpec, SchedulerSource, SchedulerSpec,
};
use crate::config::{
    ConfigError, Overrides, TrainingConfig, ZeroPlugin, GRAD_CLIP_PATH, MICRO_BATCH_PATH,
    OFFLOAD_OPTIMIZER_PATH, OFFLOAD_PARAM_PATH, SAVE_16BIT_PATH,
};
use crate::launch::DistributedEnv;
use serde_json::json;

/// The optimizer the run will actually use after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerBinding {
    /// User object, wrapped for the engine.
    Wrapped(OptimizerSpec),
    /// Backend-native implementation built from the config file.
    BackendNative,
}

/// The scheduler the run will actually use after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerBinding {
    /// User object, wrapped for the engine.
    Wrapped(SchedulerSpec),
    /// Backend-native implementation built from the config file.
    BackendNative,
    /// Placeholder fallback, driven by the backend optimizer.
    Fallback(SchedulerSpec),
}

/// Result of preparation: the fully resolved document plus the selected
/// optimizer/scheduler bindings, ready for hand-off to the engine. The
/// config is a snapshot; nothing at this layer mutates it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub config: TrainingConfig,
    pub optimizer: OptimizerBinding,
    pub scheduler: SchedulerBinding,
    pub micro_batch_size: usize,
    pub train_batch_size: usize,
}

/// One-shot dispatcher for a single training run.
#[derive(Debug, Clone)]
pub struct PreparationDispatcher {
    plugin: ZeroPlugin,
    world_size: usize,
}

impl PreparationDispatcher {
    pub fn new(plugin: ZeroPlugin, world_size: usize) -> Self {
        Self { plugin, world_size }
    }

    /// World size taken from the launcher environment.
    pub fn from_env(plugin: ZeroPlugin) -> Self {
        let env = DistributedEnv::from_env();
        Self::new(plugin, env.world_size)
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn plugin(&self) -> &ZeroPlugin {
        &self.plugin
    }

    /// Validate sources, resolve batch sizes, autofill and reconcile the
    /// backend document, and select the optimizer/scheduler bindings.
    pub fn prepare(
        mut self,
        model: &ModelDescriptor,
        optimizer: OptimizerSource,
        scheduler: SchedulerSource,
        loaders: &[DataLoaderInfo],
    ) -> Result<Prepared, ConfigError> {
        self.validate_sources(&optimizer, &scheduler)?;
        let config_has_scheduler = self.plugin.config().contains("scheduler");

        let micro_batch_size = self.resolve_micro_batch(loaders)?;
        let accumulation = self.plugin.gradient_accumulation_steps();
        let train_batch_size = micro_batch_size * self.world_size * accumulation as usize;

        // Hidden size is resolved lazily: only a config that still has
        // `auto` communication buffers needs model metadata at all.
        let hidden_size = if self.needs_hidden_size() {
            Some(model.resolve_hidden_size()?)
        } else {
            None
        };

        let ctx = RuntimeContext {
            hidden_size,
            micro_batch_size: Some(micro_batch_size),
            world_size: Some(self.world_size),
            gradient_accumulation_steps: Some(accumulation),
        };
        let mut overrides = AutoFillPolicy::standard().derive(&ctx);
        self.plugin_overrides(&mut overrides);
        optimizer_overrides(&mut overrides, &optimizer);
        scheduler_overrides(&mut overrides, &scheduler, &optimizer);

        if !optimizer.is_placeholder() {
            self.plugin
                .config_mut()
                .set("zero_allow_untested_optimizer", json!(true));
        }

        self.plugin.reconcile(&overrides)?;

        let optimizer_binding = match optimizer {
            OptimizerSource::UserSupplied(spec) => OptimizerBinding::Wrapped(spec),
            OptimizerSource::BackendNative(_) => OptimizerBinding::BackendNative,
        };
        let scheduler_binding = match scheduler {
            SchedulerSource::UserSupplied(spec) => SchedulerBinding::Wrapped(spec),
            SchedulerSource::BackendNative(placeholder) => match placeholder.fallback {
                Some(spec) if !config_has_scheduler => SchedulerBinding::Fallback(spec),
                _ => SchedulerBinding::BackendNative,
            },
        };

        Ok(Prepared {
            config: self.plugin.into_config(),
            optimizer: optimizer_binding,
            scheduler: scheduler_binding,
            micro_batch_size,
            train_batch_size,
        })
    }

    fn validate_sources(
        &self,
        optimizer: &OptimizerSource,
        scheduler: &SchedulerSource,
    ) -> Result<(), ConfigError> {
        let config = self.plugin.config();
        let config_optimizer = config.contains("optimizer");
        let config_scheduler = config.contains("scheduler");

        match optimizer {
            OptimizerSource::UserSupplied(_) if config_optimizer => {
                return Err(ConfigError::OptimizerConflict)
            }
            OptimizerSource::BackendNative(_) if !config_optimizer => {
                return Err(ConfigError::OptimizerUnconfigured)
            }
            _ => {}
        }
        match scheduler {
            SchedulerSource::UserSupplied(_) if config_scheduler => {
                Err(ConfigError::SchedulerConflict)
            }
            SchedulerSource::UserSupplied(_) if optimizer.is_placeholder() => {
                Err(ConfigError::SchedulerRequiresPlaceholderOptimizer)
            }
            SchedulerSource::BackendNative(placeholder)
                if !config_scheduler && placeholder.fallback.is_none() =>
            {
                Err(ConfigError::SchedulerUnconfigured)
            }
            _ => Ok(()),
        }
    }

    /// Per-device micro-batch size: a concrete config value wins, then the
    /// minimum over the data iterables.
    fn resolve_micro_batch(&self, loaders: &[DataLoaderInfo]) -> Result<usize, ConfigError> {
        if let Some(batch) = self.plugin.config().get_u64(MICRO_BATCH_PATH) {
            return Ok(batch as usize);
        }
        if loaders.is_empty() {
            return Err(ConfigError::BatchSizeUndetermined);
        }
        let mut sizes = Vec::with_capacity(loaders.len());
        for loader in loaders {
            match loader.batch_size {
                Some(batch) => sizes.push(batch),
                None => return Err(ConfigError::BatchSizeUnavailable),
            }
        }
        sizes
            .into_iter()
            .min()
            .ok_or(ConfigError::BatchSizeUndetermined)
    }

    fn needs_hidden_size(&self) -> bool {
        let config = self.plugin.config();
        COMM_BUFFER_PATHS.iter().any(|path| config.is_auto(path))
    }

    /// Overrides carried by the plugin's own fields; these fill config
    /// placeholders for precision, clipping, offload devices, and the
    /// 16-bit save flag even when nothing was declared explicitly.
    fn plugin_overrides(&self, overrides: &mut Overrides) {
        if let Some(norm) = self.plugin.gradient_clipping() {
            overrides.insert(GRAD_CLIP_PATH.to_string(), json!(norm));
        }
        let precision = self.plugin.mixed_precision();
        overrides.insert(
            "fp16.enabled".to_string(),
            json!(precision.section() == Some("fp16")),
        );
        overrides.insert(
            "bf16.enabled".to_string(),
            json!(precision.section() == Some("bf16")),
        );
        overrides.insert(
            SAVE_16BIT_PATH.to_string(),
            json!(self.plugin.zero3_save_16bit_model()),
        );
        overrides.insert(
            OFFLOAD_OPTIMIZER_PATH.to_string(),
            json!(self.plugin.offload_optimizer_device().to_string()),
        );
        overrides.insert(
            OFFLOAD_PARAM_PATH.to_string(),
            json!(self.plugin.offload_param_device().to_string()),
        );
    }
}

fn optimizer_overrides(overrides: &mut Overrides, optimizer: &OptimizerSource) {
    let (lr, weight_decay) = match optimizer {
        OptimizerSource::UserSupplied(spec) => (Some(spec.lr), Some(spec.weight_decay)),
        OptimizerSource::BackendNative(placeholder) => (placeholder.lr, placeholder.weight_decay),
    };
    if let Some(lr) = lr {
        overrides.insert("optimizer.params.lr".to_string(), json!(lr));
    }
    if let Some(weight_decay) = weight_decay {
        overrides.insert("optimizer.params.weight_decay".to_string(), json!(weight_decay));
    }
}

fn scheduler_overrides(
    overrides: &mut Overrides,
    scheduler: &SchedulerSource,
    optimizer: &OptimizerSource,
) {
    let SchedulerSource::BackendNative(placeholder) = scheduler else {
        // A user-supplied scheduler implies no `scheduler` section in the
        // config file, so there is nothing to fill.
        return;
    };
    overrides.insert(
        "scheduler.params.warmup_min_lr".to_string(),
        json!(placeholder.warmup_min_lr.unwrap_or(0.0)),
    );
    if let Some(max_lr) = placeholder.warmup_max_lr.or_else(|| optimizer.lr_hint()) {
        overrides.insert("scheduler.params.warmup_max_lr".to_string(), json!(max_lr));
    }
    overrides.insert(
        "scheduler.params.warmup_num_steps".to_string(),
        json!(placeholder.warmup_num_steps.unwrap_or(0)),
    );
    if let Some(total) = placeholder.total_num_steps {
        overrides.insert("scheduler.params.total_num_steps".to_string(), json!(total));
    }
}
