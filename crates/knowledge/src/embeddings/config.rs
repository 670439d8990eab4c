//! Embedding provider configuration.

use ragline_core::config::KnowledgeSettings;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Settings needed to construct an embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "gemini", "ollama", "mock"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Custom API base URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Credential for hosted providers
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum texts per provider request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    100
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-embedding-001".to_string(),
            dimensions: 3072,
            endpoint: None,
            api_key: None,
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    /// Deterministic offline provider, used by tests and demos.
    pub fn mock(dimensions: usize) -> Self {
        Self {
            provider: "mock".to_string(),
            model: "hashed-trigram".to_string(),
            dimensions,
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &KnowledgeSettings, api_key: Option<String>) -> Self {
        Self {
            provider: settings.embedding_provider.clone(),
            model: settings.embedding_model.clone(),
            dimensions: settings.embedding_dimensions,
            endpoint: settings.embedding_endpoint.clone(),
            api_key,
            batch_size: settings.batch_size,
        }
    }

    /// Check that vectors from `other` can live in the same index.
    pub fn validate_consistency(&self, other: &Self) -> AppResult<()> {
        if self.dimensions != other.dimensions {
            return Err(AppError::Knowledge(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimensions, other.dimensions
            )));
        }

        if self.model != other.model {
            return Err(AppError::Knowledge(format!(
                "Model mismatch: expected '{}', got '{}'",
                self.model, other.model
            )));
        }

        Ok(())
    }
}
