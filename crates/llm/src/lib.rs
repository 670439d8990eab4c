//! LLM integration crate for ragline.
//!
//! Provider-agnostic chat interface with streaming and tool calling.
//!
//! # Providers
//! - **Gemini**: Google Generative Language API (default)
//! - **Ollama**: Local LLM runtime
//! - **Scripted**: Replays fixed turns, for tests
//!
//! # Example
//! ```no_run
//! use ragline_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::from_prompt("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{GeminiClient, OllamaClient, ScriptedClient, ScriptedTurn};
pub use types::{ChatMessage, ChatRole, ProviderType, ToolCall, ToolSpec};
