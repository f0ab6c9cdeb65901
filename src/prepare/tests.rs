//! Unit tests for model metadata, autofill, and dispatch

use super::*;
use crate::config::{
    ConfigError, TrainingConfig, ZeroPlugin, ZeroPluginBuilder, OFFLOAD_OPTIMIZER_PATH,
    OFFLOAD_PARAM_PATH, SAVE_16BIT_PATH,
};
use serde_json::json;

// -------------------------------------------------------------------------
// ModelDescriptor
// -------------------------------------------------------------------------

#[test]
fn test_hidden_size_from_single_field() {
    let model = ModelDescriptor::new("bert").with_hidden_size(768);
    assert_eq!(model.resolve_hidden_size().unwrap(), 768);
}

#[test]
fn test_hidden_size_from_stage_list_takes_max() {
    let model = ModelDescriptor::new("convnext").with_hidden_sizes(vec![96, 192, 384, 768]);
    assert_eq!(model.resolve_hidden_size().unwrap(), 768);
}

#[test]
fn test_hidden_size_without_metadata_fails() {
    let err = ModelDescriptor::new("opaque").resolve_hidden_size().unwrap_err();
    assert!(matches!(err, ConfigError::ConfigIncomplete(ref msg) if msg.contains("opaque")));
}

#[test]
fn test_hidden_size_with_both_fields_is_ambiguous() {
    let model = ModelDescriptor::new("hybrid")
        .with_hidden_size(768)
        .with_hidden_sizes(vec![96, 192]);
    let err = model.resolve_hidden_size().unwrap_err();
    assert!(matches!(err, ConfigError::ConfigIncomplete(ref msg) if msg.contains("both")));
}

#[test]
fn test_hidden_size_empty_metadata_fails() {
    let model = ModelDescriptor::new("empty").with_metadata(ModelMetadata::default());
    assert!(model.resolve_hidden_size().is_err());

    let model = ModelDescriptor::new("empty").with_hidden_sizes(vec![]);
    assert!(model.resolve_hidden_size().is_err());
}

// -------------------------------------------------------------------------
// AutoFillPolicy
// -------------------------------------------------------------------------

#[test]
fn test_autofill_derives_buffers_from_hidden_size() {
    let ctx = RuntimeContext {
        hidden_size: Some(64),
        micro_batch_size: Some(16),
        world_size: Some(2),
        gradient_accumulation_steps: Some(1),
    };
    let overrides = AutoFillPolicy::standard().derive(&ctx);
    assert_eq!(overrides[REDUCE_BUCKET_PATH], json!(4096));
    assert_eq!(overrides[PREFETCH_BUCKET_PATH], json!(3686));
    assert_eq!(overrides[PERSISTENCE_THRESHOLD_PATH], json!(640));
    assert_eq!(overrides["train_micro_batch_size_per_gpu"], json!(16));
    assert_eq!(overrides["train_batch_size"], json!(32));
    assert_eq!(overrides["gradient_accumulation_steps"], json!(1));
}

#[test]
fn test_autofill_skips_rules_missing_inputs() {
    let ctx = RuntimeContext {
        hidden_size: None,
        micro_batch_size: Some(8),
        world_size: None,
        gradient_accumulation_steps: Some(1),
    };
    let overrides = AutoFillPolicy::standard().derive(&ctx);
    assert!(!overrides.contains_key(REDUCE_BUCKET_PATH));
    // train_batch_size needs world size too.
    assert!(!overrides.contains_key("train_batch_size"));
    assert_eq!(overrides["train_micro_batch_size_per_gpu"], json!(8));

    assert!(AutoFillPolicy::standard()
        .derive(&RuntimeContext::default())
        .is_empty());
}

#[test]
fn test_autofill_paths_cover_comm_buffers() {
    let policy = AutoFillPolicy::standard();
    let paths: Vec<&str> = policy.paths().collect();
    for path in COMM_BUFFER_PATHS {
        assert!(paths.contains(&path));
    }
}

// -------------------------------------------------------------------------
// PreparationDispatcher
// -------------------------------------------------------------------------

/// Backend config declaring native optimizer and scheduler, with every
/// engine-owned field left `auto`.
fn full_config() -> TrainingConfig {
    TrainingConfig::from_value(json!({
        "fp16": {"enabled": "auto"},
        "bf16": {"enabled": "auto"},
        "optimizer": {
            "type": "AdamW",
            "params": {"lr": "auto", "weight_decay": "auto"}
        },
        "scheduler": {
            "type": "WarmupLR",
            "params": {
                "warmup_min_lr": "auto",
                "warmup_max_lr": "auto",
                "warmup_num_steps": "auto",
                "total_num_steps": "auto"
            }
        },
        "zero_optimization": {
            "stage": 2,
            "reduce_bucket_size": "auto",
            "stage3_prefetch_bucket_size": "auto",
            "stage3_param_persistence_threshold": "auto",
            "stage3_gather_16bit_weights_on_model_save": false
        },
        "gradient_accumulation_steps": 1,
        "gradient_clipping": "auto",
        "train_batch_size": "auto",
        "train_micro_batch_size_per_gpu": "auto"
    }))
    .unwrap()
}

/// Same document with its `optimizer`/`scheduler` sections removed, for
/// runs bringing their own objects.
fn bare_config() -> TrainingConfig {
    let mut config = full_config();
    config.remove("optimizer");
    config.remove("scheduler");
    config
}

fn plugin_for(config: TrainingConfig) -> ZeroPlugin {
    ZeroPluginBuilder::new()
        .config(config)
        .gradient_clipping(1.0)
        .build()
        .unwrap()
}

fn model() -> ModelDescriptor {
    ModelDescriptor::new("tiny-bert").with_hidden_size(64)
}

fn loaders() -> Vec<DataLoaderInfo> {
    vec![DataLoaderInfo::new(16), DataLoaderInfo::new(32)]
}

fn placeholder_optimizer() -> OptimizerSource {
    OptimizerSource::BackendNative(
        PlaceholderOptimizer::new().with_lr(5e-5).with_weight_decay(1e-4),
    )
}

fn placeholder_scheduler() -> SchedulerSource {
    SchedulerSource::BackendNative(
        PlaceholderScheduler::new().with_warmup(10).with_total_steps(1000),
    )
}

#[test]
fn test_prepare_backend_native_pair_fills_config() {
    let dispatcher = PreparationDispatcher::new(plugin_for(full_config()), 2);
    let prepared = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap();

    assert_eq!(prepared.optimizer, OptimizerBinding::BackendNative);
    assert_eq!(prepared.scheduler, SchedulerBinding::BackendNative);
    // Smallest iterable drives the micro-batch; world size 2, accum 1.
    assert_eq!(prepared.micro_batch_size, 16);
    assert_eq!(prepared.train_batch_size, 32);

    let config = &prepared.config;
    assert!(config.auto_paths().is_empty());
    assert_eq!(config.get_f64("optimizer.params.lr"), Some(5e-5));
    assert_eq!(config.get_f64("optimizer.params.weight_decay"), Some(1e-4));
    assert_eq!(config.get_f64("scheduler.params.warmup_min_lr"), Some(0.0));
    assert_eq!(config.get_f64("scheduler.params.warmup_max_lr"), Some(5e-5));
    assert_eq!(config.get_u64("scheduler.params.warmup_num_steps"), Some(10));
    assert_eq!(config.get_u64("scheduler.params.total_num_steps"), Some(1000));
    assert_eq!(config.get_u64("train_micro_batch_size_per_gpu"), Some(16));
    assert_eq!(config.get_u64("train_batch_size"), Some(32));
    assert_eq!(config.get_u64(REDUCE_BUCKET_PATH), Some(4096));
    assert_eq!(config.get_u64(PREFETCH_BUCKET_PATH), Some(3686));
    assert_eq!(config.get_u64(PERSISTENCE_THRESHOLD_PATH), Some(640));
    assert_eq!(config.get_bool("fp16.enabled"), Some(false));
    assert_eq!(config.get_bool("bf16.enabled"), Some(false));
    assert_eq!(config.get_f64("gradient_clipping"), Some(1.0));
    assert!(!config.contains("zero_allow_untested_optimizer"));
}

#[test]
fn test_prepare_user_pair_wraps_both() {
    let dispatcher = PreparationDispatcher::new(plugin_for(bare_config()), 2);
    let optimizer = OptimizerSpec::new("adamw", 5e-5).with_weight_decay(1e-4);
    let scheduler = SchedulerSpec::new("one_cycle").with_warmup(10);
    let prepared = dispatcher
        .prepare(
            &model(),
            OptimizerSource::UserSupplied(optimizer.clone()),
            SchedulerSource::UserSupplied(scheduler.clone()),
            &loaders(),
        )
        .unwrap();

    assert_eq!(prepared.optimizer, OptimizerBinding::Wrapped(optimizer));
    assert_eq!(prepared.scheduler, SchedulerBinding::Wrapped(scheduler));
    assert_eq!(
        prepared.config.get_bool("zero_allow_untested_optimizer"),
        Some(true)
    );
}

#[test]
fn test_prepare_rejects_user_optimizer_with_config_optimizer() {
    let dispatcher = PreparationDispatcher::new(plugin_for(full_config()), 1);
    let err = dispatcher
        .prepare(
            &model(),
            OptimizerSource::UserSupplied(OptimizerSpec::new("adamw", 5e-5)),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::OptimizerConflict));
}

#[test]
fn test_prepare_rejects_placeholder_optimizer_without_config_optimizer() {
    let dispatcher = PreparationDispatcher::new(plugin_for(bare_config()), 1);
    let err = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::OptimizerUnconfigured));
}

#[test]
fn test_prepare_rejects_user_scheduler_with_config_scheduler() {
    let mut config = bare_config();
    config.set("scheduler", json!({"type": "WarmupLR", "params": {}}));
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let err = dispatcher
        .prepare(
            &model(),
            OptimizerSource::UserSupplied(OptimizerSpec::new("adamw", 5e-5)),
            SchedulerSource::UserSupplied(SchedulerSpec::new("one_cycle")),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::SchedulerConflict));
}

#[test]
fn test_prepare_rejects_user_scheduler_on_placeholder_optimizer() {
    let mut config = full_config();
    config.remove("scheduler");
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let err = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            SchedulerSource::UserSupplied(SchedulerSpec::new("one_cycle")),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::SchedulerRequiresPlaceholderOptimizer));
}

#[test]
fn test_prepare_rejects_placeholder_scheduler_without_config_or_fallback() {
    let mut config = full_config();
    config.remove("scheduler");
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let err = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            SchedulerSource::BackendNative(PlaceholderScheduler::new()),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::SchedulerUnconfigured));
}

#[test]
fn test_prepare_placeholder_scheduler_fallback_binding() {
    let mut config = full_config();
    config.remove("scheduler");
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let fallback = SchedulerSpec::new("cosine").with_total_steps(500);
    let prepared = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            SchedulerSource::BackendNative(
                PlaceholderScheduler::new().with_fallback(fallback.clone()),
            ),
            &loaders(),
        )
        .unwrap();
    assert_eq!(prepared.scheduler, SchedulerBinding::Fallback(fallback));
}

#[test]
fn test_prepare_fallback_ignored_when_config_declares_scheduler() {
    let dispatcher = PreparationDispatcher::new(plugin_for(full_config()), 1);
    let prepared = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            SchedulerSource::BackendNative(
                PlaceholderScheduler::new()
                    .with_warmup(10)
                    .with_total_steps(1000)
                    .with_fallback(SchedulerSpec::new("cosine")),
            ),
            &loaders(),
        )
        .unwrap();
    assert_eq!(prepared.scheduler, SchedulerBinding::BackendNative);
}

#[test]
fn test_prepare_config_micro_batch_wins_over_loaders() {
    let mut config = full_config();
    config.set("train_micro_batch_size_per_gpu", json!(4));
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 2);
    let prepared = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap();
    assert_eq!(prepared.micro_batch_size, 4);
    assert_eq!(prepared.train_batch_size, 8);
}

#[test]
fn test_prepare_without_loaders_or_config_batch_fails() {
    let dispatcher = PreparationDispatcher::new(plugin_for(full_config()), 1);
    let err = dispatcher
        .prepare(&model(), placeholder_optimizer(), placeholder_scheduler(), &[])
        .unwrap_err();
    assert!(matches!(err, ConfigError::BatchSizeUndetermined));
}

#[test]
fn test_prepare_sampler_driven_loader_fails() {
    let dispatcher = PreparationDispatcher::new(plugin_for(full_config()), 1);
    let loaders = vec![DataLoaderInfo::new(16), DataLoaderInfo::without_batch_size()];
    let err = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders,
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::BatchSizeUnavailable));
}

#[test]
fn test_prepare_needs_model_metadata_only_for_auto_buffers() {
    // Auto buffers, opaque model: surfaces the metadata error.
    let dispatcher = PreparationDispatcher::new(plugin_for(full_config()), 1);
    let err = dispatcher
        .prepare(
            &ModelDescriptor::new("opaque"),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::ConfigIncomplete(_)));

    // Concrete buffers: the same model prepares fine.
    let mut config = full_config();
    config.set(REDUCE_BUCKET_PATH, json!(500000));
    config.set(PREFETCH_BUCKET_PATH, json!(500000));
    config.set(PERSISTENCE_THRESHOLD_PATH, json!(100000));
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let prepared = dispatcher
        .prepare(
            &ModelDescriptor::new("opaque"),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap();
    assert_eq!(prepared.config.get_u64(REDUCE_BUCKET_PATH), Some(500000));
}

#[test]
fn test_prepare_unfillable_auto_field_fails() {
    let mut config = full_config();
    config.set("comms_logger.enabled", json!("auto"));
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let err = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingOverride(ref key) if key == "comms_logger.enabled"
    ));
}

#[test]
fn test_prepare_fills_engine_flags_from_plugin_defaults() {
    // No builder declaration: the plugin's own defaults resolve these.
    let mut config = full_config();
    config.set(SAVE_16BIT_PATH, json!("auto"));
    config.set(OFFLOAD_OPTIMIZER_PATH, json!("auto"));
    config.set(OFFLOAD_PARAM_PATH, json!("auto"));
    let dispatcher = PreparationDispatcher::new(plugin_for(config), 1);
    let prepared = dispatcher
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap();
    assert_eq!(prepared.config.get_bool(SAVE_16BIT_PATH), Some(false));
    assert_eq!(prepared.config.get_str(OFFLOAD_OPTIMIZER_PATH), Some("none"));
    assert_eq!(prepared.config.get_str(OFFLOAD_PARAM_PATH), Some("none"));
}

#[test]
fn test_prepare_precision_override_fills_fp16() {
    let mut plugin = plugin_for(full_config());
    plugin
        .set_mixed_precision(crate::config::MixedPrecision::Fp16)
        .unwrap();
    let prepared = PreparationDispatcher::new(plugin, 1)
        .prepare(
            &model(),
            placeholder_optimizer(),
            placeholder_scheduler(),
            &loaders(),
        )
        .unwrap();
    assert_eq!(prepared.config.get_bool("fp16.enabled"), Some(true));
    assert_eq!(prepared.config.get_bool("bf16.enabled"), Some(false));
}
