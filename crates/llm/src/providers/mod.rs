//! LLM provider implementations.

mod lines;

pub mod gemini;
pub mod ollama;
pub mod scripted;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use scripted::{ScriptedClient, ScriptedTurn};
