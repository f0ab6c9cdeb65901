//! Property tests for placeholder reconciliation

use super::*;
use proptest::prelude::*;
use serde_json::{json, Value};

/// Concrete JSON scalars, never the `"auto"` placeholder.
fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1e6f64..1e6f64).prop_map(|f| json!(f)),
        "[a-z]{1,12}".prop_filter("placeholder is reserved", |s| s != AUTO)
            .prop_map(Value::String),
    ]
}

fn key_path() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z][a-z0-9_]{0,7}", 1..=3).prop_map(|segs| segs.join("."))
}

proptest! {
    /// An `auto` leaf always takes the declared override value verbatim.
    #[test]
    fn prop_auto_leaf_takes_override(path in key_path(), value in scalar_value()) {
        let mut config = TrainingConfig::new();
        config.set(&path, json!(AUTO));

        let mut overrides = Overrides::new();
        overrides.insert(path.clone(), value.clone());

        ConfigReconciler::new().reconcile(&mut config, &overrides).unwrap();
        prop_assert_eq!(config.get(&path), Some(&value));
        prop_assert!(!config.is_auto(&path));
    }

    /// Every disagreeing concrete leaf is named in the single conflict
    /// error, not just the first one found.
    #[test]
    fn prop_conflict_names_every_disagreement(
        keys in proptest::collection::btree_set("[a-z][a-z0-9_]{0,7}", 1..=6),
        offset in 1i64..1000,
    ) {
        let mut config = TrainingConfig::new();
        let mut overrides = Overrides::new();
        for (i, key) in keys.iter().enumerate() {
            config.set(key, json!(i as i64));
            overrides.insert(key.clone(), json!(i as i64 + offset));
        }

        let err = ConfigReconciler::new()
            .reconcile(&mut config, &overrides)
            .unwrap_err();
        let mismatches = match &err {
            ConfigError::Conflict(mismatches) => mismatches,
            other => {
                prop_assert!(false, "expected Conflict, got {other}");
                unreachable!()
            }
        };
        prop_assert_eq!(mismatches.len(), keys.len());
        let message = err.to_string();
        for key in &keys {
            prop_assert!(message.contains(key.as_str()));
        }
    }

    /// Fill-only reconciliation never fails, whatever the inputs.
    #[test]
    fn prop_fill_only_is_infallible(
        leaves in proptest::collection::btree_map(
            "[a-z][a-z0-9_]{0,7}",
            prop_oneof![Just(json!(AUTO)), scalar_value()],
            0..8,
        ),
        overrides in proptest::collection::btree_map(key_path(), scalar_value(), 0..8),
    ) {
        let mut config = TrainingConfig::new();
        for (key, value) in &leaves {
            config.set(key, value.clone());
        }
        ConfigReconciler::fill_only()
            .reconcile(&mut config, &overrides)
            .unwrap();

        // Concrete leaves are untouched in fill-only mode.
        for (key, value) in &leaves {
            if !is_placeholder(value) {
                prop_assert_eq!(config.get(key), Some(value));
            }
        }
    }
}

fn is_placeholder(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == AUTO)
}
