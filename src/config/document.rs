//! Backend configuration document with dotted key-path access
//!
//! The training backend consumes a nested JSON document in which any leaf
//! may hold the placeholder string `"auto"`, to be filled by this layer
//! before hand-off.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Reserved placeholder marker for fields filled at prepare time.
pub const AUTO: &str = "auto";

/// Nested JSON configuration for the training backend.
///
/// Key-paths are dotted: `zero_optimization.reduce_bucket_size` addresses
/// `root["zero_optimization"]["reduce_bucket_size"]`.
///
/// Every leaf is either a concrete JSON scalar/array or the `"auto"`
/// placeholder; [`TrainingConfig::is_auto`] is the sanctioned placeholder
/// test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingConfig {
    root: Map<String, Value>,
}

impl TrainingConfig {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. The root must be an object.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(ConfigError::NotAnObject(json_type_name(&other))),
        }
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Walk `path` and return the object containing the final segment,
    /// together with that segment. `None` when any intermediate node is
    /// missing or not an object.
    pub fn find_node_mut<'p>(
        &mut self,
        path: &'p str,
    ) -> Option<(&mut Map<String, Value>, &'p str)> {
        let (parents, last) = split_path(path);
        let mut node = &mut self.root;
        for segment in parents {
            node = node.get_mut(segment)?.as_object_mut()?;
        }
        Some((node, last))
    }

    /// Value at a dotted key-path, if present.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (parents, last) = split_path(path);
        let mut node = &self.root;
        for segment in parents {
            node = node.get(segment)?.as_object()?;
        }
        node.get(last)
    }

    /// Integer view of the node at `path`. `"auto"` yields `None`.
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    /// Float view of the node at `path`.
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    /// Bool view of the node at `path`.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// String view of the node at `path`.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Set the value at a dotted key-path, creating intermediate objects.
    /// A non-object intermediate is replaced by an object.
    pub fn set(&mut self, path: &str, value: Value) {
        let (parents, last) = split_path(path);
        let mut node = &mut self.root;
        for segment in parents {
            let slot = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            node = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        node.insert(last.to_string(), value);
    }

    /// Remove and return the value at a dotted key-path.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let (node, last) = self.find_node_mut(path)?;
        node.remove(last)
    }

    /// Whether a node exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Whether the node at `path` holds the `"auto"` placeholder.
    pub fn is_auto(&self, path: &str) -> bool {
        self.get(path).is_some_and(is_auto_value)
    }

    /// Whether `path` is missing or still a placeholder.
    pub fn needs_value(&self, path: &str) -> bool {
        match self.get(path) {
            None => true,
            Some(value) => is_auto_value(value),
        }
    }

    /// Dotted key-paths of every leaf (non-object) value, in document
    /// order. This drives the reconciliation walk.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_leaves("", &self.root, &mut paths);
        paths
    }

    /// Leaf key-paths still holding the `"auto"` placeholder.
    pub fn auto_paths(&self) -> Vec<String> {
        self.leaf_paths()
            .into_iter()
            .filter(|path| self.is_auto(path))
            .collect()
    }

    /// Borrow the underlying object map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Snapshot as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.root).unwrap_or_default()
    }
}

/// Whether a JSON value is the `"auto"` placeholder.
pub(crate) fn is_auto_value(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == AUTO)
}

fn split_path(path: &str) -> (impl Iterator<Item = &str>, &str) {
    let (prefix, last) = match path.rsplit_once('.') {
        Some((prefix, last)) => (Some(prefix), last),
        None => (None, path),
    };
    (prefix.into_iter().flat_map(|p| p.split('.')), last)
}

fn collect_leaves(prefix: &str, map: &Map<String, Value>, paths: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => collect_leaves(&path, inner, paths),
            _ => paths.push(path),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
