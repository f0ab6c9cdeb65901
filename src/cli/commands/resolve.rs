//! Resolve command implementation
//!
//! Fills `auto` placeholders from --set overrides and runtime flags, then
//! prints the resolved document. Placeholders nothing resolves are left
//! in place for a later prepare step.

use crate::cli::logging::log;
use crate::cli::{LogLevel, ResolveArgs};
use crate::config::{ConfigReconciler, Overrides, ZeroPluginBuilder};
use crate::prepare::{AutoFillPolicy, RuntimeContext};
use serde_json::Value;

/// Parse a `KEY=VALUE` override; the value is JSON, falling back to a
/// plain string when it does not parse.
fn parse_override(pair: &str) -> Result<(String, Value), String> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| format!("invalid --set `{pair}`, expected KEY=VALUE"))?;
    let value =
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Fill placeholders and print the resolved configuration
pub fn run_resolve(args: ResolveArgs, level: LogLevel) -> Result<(), String> {
    let mut plugin = ZeroPluginBuilder::new()
        .config_file(&args.config)
        .build()
        .map_err(|e| e.to_string())?;

    let mut overrides = Overrides::new();
    for pair in &args.set {
        let (key, value) = parse_override(pair)?;
        overrides.insert(key, value);
    }

    let ctx = RuntimeContext {
        hidden_size: args.hidden_size,
        micro_batch_size: args.micro_batch,
        world_size: Some(args.world_size),
        gradient_accumulation_steps: args.grad_accum,
    };
    // Explicit --set values win over derived ones
    for (path, value) in AutoFillPolicy::standard().derive(&ctx) {
        overrides.entry(path).or_insert(value);
    }

    ConfigReconciler::fill_only()
        .reconcile(plugin.config_mut(), &overrides)
        .map_err(|e| e.to_string())?;

    let remaining = plugin.config().auto_paths();
    log(level, LogLevel::Normal, &plugin.config().to_json_pretty());
    if !remaining.is_empty() {
        log(
            level,
            LogLevel::Verbose,
            &format!("{} placeholder(s) left unresolved:", remaining.len()),
        );
        for key in &remaining {
            log(level, LogLevel::Verbose, &format!("  {key}"));
        }
    }

    Ok(())
}
