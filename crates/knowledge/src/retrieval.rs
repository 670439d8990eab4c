//! Hybrid context retrieval used by the answer agent.

use crate::embeddings::EmbeddingProvider;
use crate::index::{HybridIndex, HybridQuery};
use crate::sparse::Bm25Encoder;
use ragline_core::{AppError, AppResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Separator placed between retrieved passages.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const DEFAULT_TOP_K: usize = 4;

/// Turns a query into the concatenated text of the best matching chunks.
///
/// The BM25 model is read from `encoder_path` on first use and kept for the
/// lifetime of the tool. A failed load is retried on the next call.
pub struct RetrievalTool {
    encoder: OnceCell<Arc<Bm25Encoder>>,
    encoder_path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn HybridIndex>,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(
        encoder_path: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn HybridIndex>,
    ) -> Self {
        Self {
            encoder: OnceCell::new(),
            encoder_path,
            embedder,
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Use an already loaded encoder instead of reading it from disk.
    pub fn with_encoder(self, encoder: Arc<Bm25Encoder>) -> Self {
        Self {
            encoder: OnceCell::new_with(Some(encoder)),
            ..self
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    async fn encoder(&self) -> AppResult<Arc<Bm25Encoder>> {
        self.encoder
            .get_or_try_init(|| async {
                let encoder = Bm25Encoder::load(&self.encoder_path)?;
                tracing::info!(
                    "Loaded BM25 encoder ({} terms) from {:?}",
                    encoder.vocabulary_size(),
                    self.encoder_path
                );
                Ok::<_, AppError>(Arc::new(encoder))
            })
            .await
            .cloned()
    }

    /// Retrieve context for `query`.
    ///
    /// Failures are logged and yield an empty string so the agent can still
    /// answer without context.
    pub async fn retrieve(&self, query: &str) -> String {
        match self.try_retrieve(query).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("Retrieval failed for query {:?}: {}", query, e);
                String::new()
            }
        }
    }

    #[tracing::instrument(skip(self), fields(top_k = self.top_k))]
    pub async fn try_retrieve(&self, query: &str) -> AppResult<String> {
        let encoder = self.encoder().await.map_err(as_retrieval)?;
        let sparse = encoder.encode_queries(query);
        let dense = self
            .embedder
            .embed_query(query)
            .await
            .map_err(as_retrieval)?;

        let results = self
            .index
            .query(&HybridQuery {
                dense,
                sparse,
                top_k: self.top_k,
            })
            .await
            .map_err(as_retrieval)?;

        tracing::debug!(
            "Retrieved {} passages (top score: {:?})",
            results.len(),
            results.first().map(|r| r.score)
        );

        Ok(results
            .into_iter()
            .map(|r| r.text)
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR))
    }
}

fn as_retrieval(e: AppError) -> AppError {
    match e {
        AppError::Retrieval(_) => e,
        other => AppError::Retrieval(other.to_string()),
    }
}
