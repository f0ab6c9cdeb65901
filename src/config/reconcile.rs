//! Reconciliation of `"auto"` placeholders with declared values
//!
//! The document drives the walk: every config leaf is visited once and
//! matched against the declared override for its key-path. Overrides
//! whose path has no config node are ignored.

use super::document::{is_auto_value, TrainingConfig};
use super::error::{ConfigError, Mismatch};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared override values keyed by dotted key-path.
pub type Overrides = BTreeMap<String, Value>;

/// Walks a [`TrainingConfig`] and reconciles each leaf against declared
/// overrides, mutating the document in place.
///
/// In strict mode (the default), an `"auto"` leaf without an override
/// fails with [`ConfigError::MissingOverride`], and concrete leaves that
/// disagree with their override are collected across the whole walk and
/// reported together as a single [`ConfigError::Conflict`].
#[derive(Debug, Clone, Copy)]
pub struct ConfigReconciler {
    must_match: bool,
}

impl Default for ConfigReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigReconciler {
    /// Strict reconciler.
    pub fn new() -> Self {
        Self { must_match: true }
    }

    /// Fill-only mode: `"auto"` leaves without an override stay in place
    /// and concrete leaves are never treated as conflicts.
    pub fn fill_only() -> Self {
        Self { must_match: false }
    }

    /// Reconcile `config` against `overrides`.
    pub fn reconcile(
        &self,
        config: &mut TrainingConfig,
        overrides: &Overrides,
    ) -> Result<(), ConfigError> {
        let mut mismatches = Vec::new();
        for path in config.leaf_paths() {
            self.fill_match(config, &path, overrides, &mut mismatches)?;
        }
        if !mismatches.is_empty() {
            return Err(ConfigError::Conflict(mismatches));
        }
        Ok(())
    }

    fn fill_match(
        &self,
        config: &mut TrainingConfig,
        path: &str,
        overrides: &Overrides,
        mismatches: &mut Vec<Mismatch>,
    ) -> Result<(), ConfigError> {
        let current = match config.get(path) {
            Some(value) => value.clone(),
            None => return Ok(()),
        };

        if is_auto_value(&current) {
            return match overrides.get(path) {
                Some(value) => {
                    config.set(path, value.clone());
                    Ok(())
                }
                None if self.must_match => Err(ConfigError::MissingOverride(path.to_string())),
                None => Ok(()),
            };
        }

        if !self.must_match {
            return Ok(());
        }

        if let Some(declared) = overrides.get(path) {
            if !values_agree(&current, declared) {
                mismatches.push(Mismatch {
                    key: path.to_string(),
                    declared: declared.clone(),
                    configured: current,
                });
            }
        }
        Ok(())
    }
}

/// JSON equality with numeric tolerance: `5e5` and `500000` agree even
/// though one is a float and the other an integer.
fn values_agree(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
