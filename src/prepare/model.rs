//! Model metadata used to derive communication buffer sizes

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Architecture metadata attached to a model. Vision-style architectures
/// report per-stage `hidden_sizes`; transformer-style ones a single
/// `hidden_size`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_sizes: Option<Vec<usize>>,
}

/// A model as seen by the preparation dispatcher: a name plus optional
/// architecture metadata. The actual parameters stay with the external
/// engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.metadata.get_or_insert_with(Default::default).hidden_size = Some(hidden_size);
        self
    }

    pub fn with_hidden_sizes(mut self, hidden_sizes: Vec<usize>) -> Self {
        self.metadata.get_or_insert_with(Default::default).hidden_sizes = Some(hidden_sizes);
        self
    }

    /// Hidden size used for communication buffer sizing.
    ///
    /// `hidden_sizes` resolves to its largest entry. Carrying both fields
    /// at once is ambiguous and rejected.
    pub fn resolve_hidden_size(&self) -> Result<usize, ConfigError> {
        let metadata = self.metadata.as_ref().ok_or_else(|| {
            ConfigError::ConfigIncomplete(format!(
                "model `{}` carries no architecture metadata; communication buffer sizes cannot be derived",
                self.name
            ))
        })?;
        match (metadata.hidden_size, &metadata.hidden_sizes) {
            (Some(_), Some(_)) => Err(ConfigError::ConfigIncomplete(
                "model metadata sets both `hidden_size` and `hidden_sizes`; remove one".to_string(),
            )),
            (Some(hidden_size), None) => Ok(hidden_size),
            (None, Some(sizes)) => sizes.iter().copied().max().ok_or_else(|| {
                ConfigError::ConfigIncomplete("model metadata `hidden_sizes` is empty".to_string())
            }),
            (None, None) => Err(ConfigError::ConfigIncomplete(
                "model metadata has neither `hidden_size` nor `hidden_sizes`".to_string(),
            )),
        }
    }
}
