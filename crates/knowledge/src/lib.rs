//! Hybrid retrieval knowledge base.
//!
//! Loads PDFs, chunks and filters their pages, encodes every chunk with a
//! fitted BM25 model and a dense embedder, and stores both in a hybrid index.
//! At question time the [`agent::AnswerAgent`] streams an answer while calling
//! the `retrieve_context` tool backed by [`retrieval::RetrievalTool`].

pub mod agent;
pub mod chunker;
pub mod embeddings;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod metadata;
pub mod progress;
pub mod retrieval;
pub mod sparse;
pub mod tools;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use agent::{AgentConfig, AgentOutcome, AgentState, AnswerAgent};
pub use chunker::{ChunkConfig, RecursiveChunker};
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use index::{open_index, HybridIndex, IndexSpec, IndexStats};
pub use ingest::{IngestOptions, IngestPipeline};
pub use loader::DocumentLoader;
pub use progress::{ProgressEvent, ProgressPhase, ProgressReporter};
pub use retrieval::RetrievalTool;
pub use sparse::Bm25Encoder;
pub use tools::Toolbox;
pub use types::{Chunk, IngestReport, Page, PageMetadata};
