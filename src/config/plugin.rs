//! Declarative run configuration merged with the backend JSON document
//!
//! [`ZeroPlugin`] holds the run-level training fields (batch accumulation,
//! clipping, ZeRO stage, offload devices, precision) and the backend
//! document they are merged into. Built through [`ZeroPluginBuilder`]:
//! with a config file the file's concrete values win and declared fields
//! only fill `"auto"` entries; without one a document is synthesized from
//! the declared fields.

use super::document::{TrainingConfig, AUTO};
use super::error::ConfigError;
use super::reconcile::{ConfigReconciler, Overrides};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable naming plugin fields already owned by a config
/// file. Setting one of those fields explicitly as well is ambiguous.
pub const CONFIG_FIELDS_ENV: &str = "ACELERAR_CONFIG_FIELDS";

/// Key-path of the per-device micro-batch size.
pub const MICRO_BATCH_PATH: &str = "train_micro_batch_size_per_gpu";
/// Key-path of the global train batch size.
pub const TRAIN_BATCH_PATH: &str = "train_batch_size";
/// Key-path of the gradient accumulation step count.
pub const GRAD_ACCUM_PATH: &str = "gradient_accumulation_steps";
/// Key-path of the gradient clipping norm.
pub const GRAD_CLIP_PATH: &str = "gradient_clipping";

/// Key-path of the optimizer state offload device.
pub const OFFLOAD_OPTIMIZER_PATH: &str = "zero_optimization.offload_optimizer.device";
/// Key-path of the parameter offload device.
pub const OFFLOAD_PARAM_PATH: &str = "zero_optimization.offload_param.device";
/// Key-path of the ZeRO-3 16-bit weight gathering flag.
pub const SAVE_16BIT_PATH: &str = "zero_optimization.stage3_gather_16bit_weights_on_model_save";

const ZERO_SECTION: &str = "zero_optimization";
const ZERO_STAGE_PATH: &str = "zero_optimization.stage";

const DEFAULT_ZERO_STAGE: u8 = 2;
const ZERO3: u8 = 3;

/// Offload target for optimizer state or parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffloadDevice {
    /// Keep everything on the accelerator.
    #[default]
    None,
    /// Offload to host memory.
    Cpu,
    /// Offload to NVMe storage.
    Nvme,
}

impl fmt::Display for OffloadDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OffloadDevice::None => "none",
            OffloadDevice::Cpu => "cpu",
            OffloadDevice::Nvme => "nvme",
        };
        write!(f, "{name}")
    }
}

impl FromStr for OffloadDevice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OffloadDevice::None),
            "cpu" => Ok(OffloadDevice::Cpu),
            "nvme" => Ok(OffloadDevice::Nvme),
            _ => Err(()),
        }
    }
}

/// Mixed-precision mode requested for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixedPrecision {
    /// Full precision.
    #[default]
    No,
    Fp16,
    Bf16,
}

impl MixedPrecision {
    /// Config file section owning this mode, if any.
    pub fn section(self) -> Option<&'static str> {
        match self {
            MixedPrecision::No => None,
            MixedPrecision::Fp16 => Some("fp16"),
            MixedPrecision::Bf16 => Some("bf16"),
        }
    }
}

impl fmt::Display for MixedPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MixedPrecision::No => "no",
            MixedPrecision::Fp16 => "fp16",
            MixedPrecision::Bf16 => "bf16",
        };
        write!(f, "{name}")
    }
}

/// Run configuration for the ZeRO training backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroPlugin {
    gradient_accumulation_steps: u64,
    gradient_clipping: Option<f64>,
    zero_stage: u8,
    offload_optimizer_device: OffloadDevice,
    offload_param_device: OffloadDevice,
    zero3_save_16bit_model: bool,
    zero3_init_flag: bool,
    mixed_precision: MixedPrecision,
    config: TrainingConfig,
}

impl ZeroPlugin {
    /// Start building a plugin.
    pub fn builder() -> ZeroPluginBuilder {
        ZeroPluginBuilder::default()
    }

    /// ZeRO optimization stage (0-3).
    pub fn zero_stage(&self) -> u8 {
        self.zero_stage
    }

    /// Whether ZeRO-3 parameter partitioning is active.
    pub fn is_zero3(&self) -> bool {
        self.zero_stage == ZERO3
    }

    /// Whether models should be constructed directly into partitioned
    /// form. Always `false` outside stage 3.
    pub fn zero3_init_flag(&self) -> bool {
        self.zero3_init_flag
    }

    pub fn gradient_accumulation_steps(&self) -> u64 {
        self.gradient_accumulation_steps
    }

    pub fn gradient_clipping(&self) -> Option<f64> {
        self.gradient_clipping
    }

    pub fn offload_optimizer_device(&self) -> OffloadDevice {
        self.offload_optimizer_device
    }

    pub fn offload_param_device(&self) -> OffloadDevice {
        self.offload_param_device
    }

    pub fn zero3_save_16bit_model(&self) -> bool {
        self.zero3_save_16bit_model
    }

    pub fn mixed_precision(&self) -> MixedPrecision {
        self.mixed_precision
    }

    /// Backend document.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrainingConfig {
        &mut self.config
    }

    /// Consume the plugin, keeping the backend document.
    pub fn into_config(self) -> TrainingConfig {
        self.config
    }

    /// Request a mixed-precision mode. Fills the matching
    /// `fp16.enabled`/`bf16.enabled` entry when it is absent or `"auto"`;
    /// fails when the config file already enables the other mode.
    pub fn set_mixed_precision(&mut self, mode: MixedPrecision) -> Result<(), ConfigError> {
        for other in [MixedPrecision::Fp16, MixedPrecision::Bf16] {
            if other == mode {
                continue;
            }
            if let Some(section) = other.section() {
                let path = format!("{section}.enabled");
                if self.config.get_bool(&path) == Some(true) {
                    return Err(ConfigError::PrecisionMismatch {
                        requested: mode.to_string(),
                        configured: other.to_string(),
                    });
                }
            }
        }
        if let Some(section) = mode.section() {
            let path = format!("{section}.enabled");
            if self.config.needs_value(&path) {
                self.config.set(&path, Value::Bool(true));
            }
        }
        self.mixed_precision = mode;
        Ok(())
    }

    /// Reconcile the backend document with explicitly declared values.
    ///
    /// Strict: every remaining `"auto"` leaf must have an override, and
    /// concrete leaves that disagree with their overrides are reported
    /// together as one conflict.
    pub fn reconcile(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        ConfigReconciler::new().reconcile(&mut self.config, overrides)
    }
}

/// Builder for [`ZeroPlugin`].
#[derive(Debug, Clone, Default)]
pub struct ZeroPluginBuilder {
    gradient_accumulation_steps: Option<u64>,
    gradient_clipping: Option<f64>,
    zero_stage: Option<u8>,
    offload_optimizer_device: Option<OffloadDevice>,
    offload_param_device: Option<OffloadDevice>,
    zero3_save_16bit_model: Option<bool>,
    zero3_init_flag: Option<bool>,
    config: Option<TrainingConfig>,
    config_path: Option<PathBuf>,
}

impl ZeroPluginBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gradient_accumulation_steps(mut self, steps: u64) -> Self {
        self.gradient_accumulation_steps = Some(steps);
        self
    }

    pub fn gradient_clipping(mut self, norm: f64) -> Self {
        self.gradient_clipping = Some(norm);
        self
    }

    pub fn zero_stage(mut self, stage: u8) -> Self {
        self.zero_stage = Some(stage);
        self
    }

    pub fn offload_optimizer_device(mut self, device: OffloadDevice) -> Self {
        self.offload_optimizer_device = Some(device);
        self
    }

    pub fn offload_param_device(mut self, device: OffloadDevice) -> Self {
        self.offload_param_device = Some(device);
        self
    }

    pub fn zero3_save_16bit_model(mut self, enabled: bool) -> Self {
        self.zero3_save_16bit_model = Some(enabled);
        self
    }

    pub fn zero3_init_flag(mut self, enabled: bool) -> Self {
        self.zero3_init_flag = Some(enabled);
        self
    }

    /// Use an in-memory backend document.
    pub fn config(mut self, config: TrainingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the backend document from a JSON file at build time.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ZeroPlugin, ConfigError> {
        self.check_ambiguous_sources()?;

        let ZeroPluginBuilder {
            gradient_accumulation_steps,
            gradient_clipping,
            zero_stage,
            offload_optimizer_device,
            offload_param_device,
            zero3_save_16bit_model,
            zero3_init_flag,
            config,
            config_path,
        } = self;

        let fields = DeclaredFields {
            gradient_accumulation_steps,
            gradient_clipping,
            zero_stage,
            offload_optimizer_device,
            offload_param_device,
            zero3_save_16bit_model,
            zero3_init_flag,
        };

        let document = match (config, config_path) {
            (Some(document), _) => Some(document),
            (None, Some(path)) => Some(TrainingConfig::from_file(path)?),
            (None, None) => None,
        };

        match document {
            Some(document) => build_from_document(fields, document),
            None => Ok(build_synthesized(fields)),
        }
    }

    fn check_ambiguous_sources(&self) -> Result<(), ConfigError> {
        if self.config.is_none() && self.config_path.is_none() {
            return Ok(());
        }
        let Ok(owned) = std::env::var(CONFIG_FIELDS_ENV) else {
            return Ok(());
        };
        let owned: HashSet<&str> = owned.split(',').map(str::trim).collect();
        let declared = [
            ("gradient_accumulation_steps", self.gradient_accumulation_steps.is_some()),
            ("gradient_clipping", self.gradient_clipping.is_some()),
            ("zero_stage", self.zero_stage.is_some()),
            ("offload_optimizer_device", self.offload_optimizer_device.is_some()),
            ("offload_param_device", self.offload_param_device.is_some()),
            ("zero3_save_16bit_model", self.zero3_save_16bit_model.is_some()),
            ("zero3_init_flag", self.zero3_init_flag.is_some()),
        ];
        let offenders: Vec<String> = declared
            .into_iter()
            .filter(|(name, set)| *set && owned.contains(name))
            .map(|(name, _)| name.to_string())
            .collect();
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::AmbiguousConfigSource(offenders))
        }
    }
}

/// Builder fields after destructuring, separated from document handling.
struct DeclaredFields {
    gradient_accumulation_steps: Option<u64>,
    gradient_clipping: Option<f64>,
    zero_stage: Option<u8>,
    offload_optimizer_device: Option<OffloadDevice>,
    offload_param_device: Option<OffloadDevice>,
    zero3_save_16bit_model: Option<bool>,
    zero3_init_flag: Option<bool>,
}

fn build_from_document(
    fields: DeclaredFields,
    mut config: TrainingConfig,
) -> Result<ZeroPlugin, ConfigError> {
    if !config.contains(ZERO_SECTION) {
        return Err(ConfigError::MissingZeroSection);
    }

    // Declared fields fill matching `auto` entries; concrete file values
    // win without conflict at build time.
    let mut overrides = Overrides::new();
    if let Some(v) = fields.gradient_accumulation_steps {
        overrides.insert(GRAD_ACCUM_PATH.to_string(), json!(v));
    }
    if let Some(v) = fields.gradient_clipping {
        overrides.insert(GRAD_CLIP_PATH.to_string(), json!(v));
    }
    if let Some(v) = fields.zero_stage {
        overrides.insert(ZERO_STAGE_PATH.to_string(), json!(v));
    }
    if let Some(v) = fields.offload_optimizer_device {
        overrides.insert(OFFLOAD_OPTIMIZER_PATH.to_string(), json!(v.to_string()));
    }
    if let Some(v) = fields.offload_param_device {
        overrides.insert(OFFLOAD_PARAM_PATH.to_string(), json!(v.to_string()));
    }
    if let Some(v) = fields.zero3_save_16bit_model {
        overrides.insert(SAVE_16BIT_PATH.to_string(), json!(v));
    }
    ConfigReconciler::fill_only().reconcile(&mut config, &overrides)?;

    if !config.contains(GRAD_ACCUM_PATH) {
        config.set(GRAD_ACCUM_PATH, json!(1));
    }

    // Read the reconciled values back so the plugin fields and the
    // document agree from here on.
    let zero_stage = config
        .get_u64(ZERO_STAGE_PATH)
        .and_then(|v| u8::try_from(v).ok())
        .or(fields.zero_stage)
        .unwrap_or(DEFAULT_ZERO_STAGE);
    let gradient_accumulation_steps = config
        .get_u64(GRAD_ACCUM_PATH)
        .or(fields.gradient_accumulation_steps)
        .unwrap_or(1);
    let gradient_clipping = config.get_f64(GRAD_CLIP_PATH).or(fields.gradient_clipping);
    let offload_optimizer_device = parse_offload(config.get_str(OFFLOAD_OPTIMIZER_PATH))
        .or(fields.offload_optimizer_device)
        .unwrap_or_default();
    let offload_param_device = parse_offload(config.get_str(OFFLOAD_PARAM_PATH))
        .or(fields.offload_param_device)
        .unwrap_or_default();
    let zero3_save_16bit_model = config
        .get_bool(SAVE_16BIT_PATH)
        .or(fields.zero3_save_16bit_model)
        .unwrap_or(false);
    let zero3_init_flag = fields.zero3_init_flag.unwrap_or(false) && zero_stage == ZERO3;
    let mixed_precision = infer_mixed_precision(&config);

    Ok(ZeroPlugin {
        gradient_accumulation_steps,
        gradient_clipping,
        zero_stage,
        offload_optimizer_device,
        offload_param_device,
        zero3_save_16bit_model,
        zero3_init_flag,
        mixed_precision,
        config,
    })
}

fn build_synthesized(fields: DeclaredFields) -> ZeroPlugin {
    let zero_stage = fields.zero_stage.unwrap_or(DEFAULT_ZERO_STAGE);
    let gradient_accumulation_steps = fields.gradient_accumulation_steps.unwrap_or(1);
    let offload_optimizer_device = fields.offload_optimizer_device.unwrap_or_default();
    let offload_param_device = fields.offload_param_device.unwrap_or_default();
    let zero3_save_16bit_model = fields.zero3_save_16bit_model.unwrap_or(false);
    let zero3_init_flag = fields.zero3_init_flag.unwrap_or(false) && zero_stage == ZERO3;

    let mut config = TrainingConfig::new();
    config.set(TRAIN_BATCH_PATH, json!(AUTO));
    config.set(MICRO_BATCH_PATH, json!(AUTO));
    config.set(GRAD_ACCUM_PATH, json!(gradient_accumulation_steps));
    config.set(ZERO_STAGE_PATH, json!(zero_stage));
    config.set(
        OFFLOAD_OPTIMIZER_PATH,
        json!(offload_optimizer_device.to_string()),
    );
    config.set(OFFLOAD_PARAM_PATH, json!(offload_param_device.to_string()));
    config.set(SAVE_16BIT_PATH, json!(zero3_save_16bit_model));
    if let Some(norm) = fields.gradient_clipping {
        config.set(GRAD_CLIP_PATH, json!(norm));
    }

    ZeroPlugin {
        gradient_accumulation_steps,
        gradient_clipping: fields.gradient_clipping,
        zero_stage,
        offload_optimizer_device,
        offload_param_device,
        zero3_save_16bit_model,
        zero3_init_flag,
        mixed_precision: MixedPrecision::No,
        config,
    }
}

fn parse_offload(value: Option<&str>) -> Option<OffloadDevice> {
    value.and_then(|s| s.parse().ok())
}

fn infer_mixed_precision(config: &TrainingConfig) -> MixedPrecision {
    if config.get_bool("fp16.enabled") == Some(true) {
        MixedPrecision::Fp16
    } else if config.get_bool("bf16.enabled") == Some(true) {
        MixedPrecision::Bf16
    } else {
        MixedPrecision::No
    }
}
