//! Error types for ragline.
//!
//! One enum covers configuration, I/O, provider, ingestion, retrieval and
//! generation failures. Per-file ingestion problems are not errors here; the
//! document loader records them as values and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for ragline.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing credential, missing path or invalid setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding, chunking and encoder errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Metadata file does not exist
    #[error("Metadata file not found: {0:?}")]
    MetadataNotFound(PathBuf),

    /// A metadata line could not be parsed
    #[error("Invalid metadata at line {line}: {message}")]
    MetadataFormat { line: usize, message: String },

    /// Filtering left nothing to index
    #[error("No valid chunks to index after filtering")]
    NoValidChunks,

    /// Hybrid index setup or query errors
    #[error("Index error: {0}")]
    Index(String),

    /// Upserting a batch into the hybrid index failed
    #[error("Upload error: {0}")]
    Upload(String),

    /// Retrieval tool failure
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Answer generation failure
    #[error("Generation error: {0}")]
    Generation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Short machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration_error",
            AppError::Io(_) => "io_error",
            AppError::Llm(_) => "llm_error",
            AppError::Knowledge(_) => "knowledge_error",
            AppError::Prompt(_) => "prompt_error",
            AppError::MetadataNotFound(_) => "metadata_not_found",
            AppError::MetadataFormat { .. } => "metadata_format_error",
            AppError::NoValidChunks => "no_valid_chunks",
            AppError::Index(_) => "index_error",
            AppError::Upload(_) => "upload_error",
            AppError::Retrieval(_) => "retrieval_error",
            AppError::Generation(_) => "generation_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Other(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
