//! Info command implementation

use crate::cli::logging::log;
use crate::cli::{InfoArgs, LogLevel};
use crate::config::{ZeroPlugin, ZeroPluginBuilder, MICRO_BATCH_PATH, TRAIN_BATCH_PATH};

/// Format the ZeRO section as a string
pub fn format_zero_info(plugin: &ZeroPlugin) -> String {
    let mut lines = vec![
        format!("  ZeRO stage: {}", plugin.zero_stage()),
        format!("  Offload optimizer: {}", plugin.offload_optimizer_device()),
        format!("  Offload params: {}", plugin.offload_param_device()),
    ];
    if plugin.is_zero3() {
        lines.push(format!(
            "  Save 16-bit model: {}",
            plugin.zero3_save_16bit_model()
        ));
    }
    lines.join("\n")
}

/// Format batch and precision settings as a string
pub fn format_run_info(plugin: &ZeroPlugin) -> String {
    let config = plugin.config();
    let batch = |path: &str| match config.get(path) {
        Some(value) => value.to_string(),
        None => "unset".to_string(),
    };
    let mut lines = vec![
        format!("  Micro batch size: {}", batch(MICRO_BATCH_PATH)),
        format!("  Train batch size: {}", batch(TRAIN_BATCH_PATH)),
        format!(
            "  Gradient accumulation: {}",
            plugin.gradient_accumulation_steps()
        ),
        format!("  Mixed precision: {}", plugin.mixed_precision()),
    ];
    if let Some(norm) = plugin.gradient_clipping() {
        lines.push(format!("  Gradient clipping: {norm}"));
    }
    lines.join("\n")
}

/// Display information about a backend configuration
pub fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let plugin = ZeroPluginBuilder::new()
        .config_file(&args.config)
        .build()
        .map_err(|e| e.to_string())?;

    log(
        level,
        LogLevel::Normal,
        &format!("Configuration: {}", args.config.display()),
    );
    log(level, LogLevel::Normal, &format_zero_info(&plugin));
    log(level, LogLevel::Normal, &format_run_info(&plugin));

    let config_sources = [
        ("optimizer", plugin.config().contains("optimizer")),
        ("scheduler", plugin.config().contains("scheduler")),
    ];
    for (name, declared) in config_sources {
        let source = if declared { "config file" } else { "code" };
        log(
            level,
            LogLevel::Verbose,
            &format!("  {name}: declared in {source}"),
        );
    }

    Ok(())
}
