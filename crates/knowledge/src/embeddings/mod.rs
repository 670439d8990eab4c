//! Dense embedding providers.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{check_dimensions, create_provider, EmbeddingProvider};
pub use providers::{GeminiProvider, MockProvider, OllamaProvider};
