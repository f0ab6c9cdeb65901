//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::{LogLevel, ValidateArgs};
use crate::config::ZeroPluginBuilder;

/// Load a backend config file and run the structural checks
pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    let plugin = ZeroPluginBuilder::new()
        .config_file(&args.config)
        .build()
        .map_err(|e| e.to_string())?;

    log(
        level,
        LogLevel::Normal,
        &format!(
            "✓ {} is a valid ZeRO stage {} configuration",
            args.config.display(),
            plugin.zero_stage()
        ),
    );

    let auto_keys = plugin.config().auto_paths();
    if auto_keys.is_empty() {
        log(level, LogLevel::Normal, "  no auto placeholders remain");
    } else {
        log(
            level,
            LogLevel::Normal,
            &format!("  {} auto placeholder(s) to resolve:", auto_keys.len()),
        );
        for key in &auto_keys {
            log(level, LogLevel::Verbose, &format!("    {key}"));
        }
    }

    Ok(())
}
