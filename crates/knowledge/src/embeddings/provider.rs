//! Embedding provider trait and factory.

use crate::embeddings::config::EmbeddingConfig;
use ragline_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for dense embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "gemini", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate document embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }

    /// Embed a search query. Providers with asymmetric models override this.
    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed(text).await
    }
}

/// Create an embedding provider based on configuration.
pub async fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "mock" => {
            let provider = super::providers::mock::MockProvider::new(config.dimensions);
            Ok(Arc::new(provider))
        }

        "ollama" => {
            let provider = super::providers::ollama::OllamaProvider::new(config.clone()).await?;
            Ok(Arc::new(provider))
        }

        "gemini" => {
            let provider = super::providers::gemini::GeminiProvider::new(config.clone())?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: gemini, ollama, mock",
            config.provider
        ))),
    }
}

/// Fail unless every vector has the expected length.
pub fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> AppResult<()> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(AppError::Knowledge(format!(
            "Unexpected embedding dimensions: got {}, expected {}",
            bad.len(),
            expected
        ))),
        None => Ok(()),
    }
}
