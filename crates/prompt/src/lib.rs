//! Prompt system for ragline.
//!
//! - Built-in system prompt for the answer agent
//! - YAML prompt overrides under `.ragline/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::{answer_system_prompt, ANSWER_SYSTEM_PROMPT_ID};
pub use loader::{load_prompt, load_prompt_or_default, prompt_path};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
