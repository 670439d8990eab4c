//! One-shot ingestion: PDFs in, hybrid index records out.

use crate::chunker::{ChunkConfig, RecursiveChunker};
use crate::embeddings::{check_dimensions, EmbeddingProvider};
use crate::filter::{filter_chunks, DEFAULT_MIN_CHARS};
use crate::index::{HybridIndex, IndexRecord, IndexSpec};
use crate::loader::DocumentLoader;
use crate::metadata::load_metadata;
use crate::progress::ProgressReporter;
use crate::sparse::Bm25Encoder;
use crate::types::{Chunk, IngestReport};
use chrono::Utc;
use ragline_core::config::AppConfig;
use ragline_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records per upsert request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

const RETRY_BASE_DELAY_MS: u64 = 100;

/// Inputs of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub documents_dir: PathBuf,
    pub metadata_path: PathBuf,
    /// Where the fitted BM25 model is written
    pub encoder_path: PathBuf,
    pub chunk: ChunkConfig,
    pub min_chunk_chars: usize,
    pub batch_size: usize,
    /// Extra attempts per batch after the first failure
    pub upload_retries: u32,
    pub index_spec: IndexSpec,
}

impl IngestOptions {
    pub fn new(documents_dir: PathBuf, encoder_path: PathBuf, index_spec: IndexSpec) -> Self {
        Self {
            metadata_path: documents_dir.join("metadata.jsonl"),
            documents_dir,
            encoder_path,
            chunk: ChunkConfig::default(),
            min_chunk_chars: DEFAULT_MIN_CHARS,
            batch_size: DEFAULT_BATCH_SIZE,
            upload_retries: 3,
            index_spec,
        }
    }

    /// Resolve every path and tunable from the application config.
    pub fn from_config(config: &AppConfig, dimension: usize) -> AppResult<Self> {
        let knowledge = &config.knowledge;
        Ok(Self {
            documents_dir: config.require_documents_path()?,
            metadata_path: config.metadata_path()?,
            encoder_path: config.encoder_path(),
            chunk: ChunkConfig {
                chunk_size: knowledge.chunk_size,
                chunk_overlap: knowledge.chunk_overlap,
            },
            min_chunk_chars: knowledge.min_chunk_chars,
            batch_size: knowledge.batch_size,
            upload_retries: config.index.upload_retries,
            index_spec: IndexSpec::from_settings(&config.index, dimension)?,
        })
    }
}

/// Wires loader, encoders and index together for a run.
pub struct IngestPipeline {
    loader: DocumentLoader,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn HybridIndex>,
    progress: ProgressReporter,
}

impl IngestPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn HybridIndex>) -> Self {
        Self {
            loader: DocumentLoader::new(),
            embedder,
            index,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    #[tracing::instrument(skip(self, options), fields(index = %options.index_spec.name))]
    pub async fn run(&self, options: &IngestOptions) -> AppResult<IngestReport> {
        let start = Instant::now();

        if options.index_spec.dimension != self.embedder.dimensions() {
            return Err(AppError::Config(format!(
                "Index dimension {} does not match embedding dimension {} ({})",
                options.index_spec.dimension,
                self.embedder.dimensions(),
                self.embedder.model_name()
            )));
        }
        let chunker = RecursiveChunker::new(options.chunk)?;

        let table = load_metadata(&options.metadata_path)?;
        tracing::info!("Loaded {} metadata records", table.len());

        let loaded = self
            .loader
            .load_directory(&options.documents_dir, &table)
            .await?;
        let page_count = loaded.page_count();
        self.progress
            .loading(loaded.documents.len() as u64, page_count as u64);

        let chunks = chunker.chunk_pages(loaded.pages());
        let chunk_count = chunks.len();
        let outcome = filter_chunks(chunks, options.min_chunk_chars)?;
        self.progress
            .chunking(outcome.kept.len() as u64, outcome.dropped as u64);
        tracing::info!(
            "Split {} pages into {} chunks ({} dropped)",
            page_count,
            outcome.kept.len(),
            outcome.dropped
        );

        let created = self.index.create_if_absent(&options.index_spec).await?;
        if created {
            tracing::info!("Created index '{}'", options.index_spec.name);
        }

        let mut encoder = if created {
            Bm25Encoder::default()
        } else {
            previous_encoder(&options.encoder_path)
        };
        encoder.update(
            outcome
                .kept
                .iter()
                .map(|c| (c.metadata.source.as_str(), c.text.as_str())),
        );
        encoder.save(&options.encoder_path)?;
        self.progress
            .encoding(encoder.vocabulary_size() as u64, self.embedder.model_name());

        let upserted = self
            .upsert_batched(&outcome.kept, &encoder, options)
            .await?;

        let stats = self.index.describe_stats().await?;
        self.progress.completed(stats.total_vector_count);

        let report = IngestReport {
            files_loaded: loaded.documents.len(),
            pages: page_count,
            chunks: chunk_count,
            dropped_chunks: outcome.dropped,
            upserted,
            file_errors: loaded.errors.iter().map(|f| f.to_string()).collect(),
            total_vector_count: stats.total_vector_count,
            duration_secs: start.elapsed().as_secs_f64(),
            completed_at: Utc::now(),
        };

        tracing::info!(
            "Ingestion completed: {} files, {} records upserted, {} failed files in {:.2}s",
            report.files_loaded,
            report.upserted,
            report.file_errors.len(),
            report.duration_secs
        );

        Ok(report)
    }

    /// Encode and upsert `chunks` in batches, retrying each batch with backoff.
    pub async fn upsert_batched(
        &self,
        chunks: &[Chunk],
        encoder: &Bm25Encoder,
        options: &IngestOptions,
    ) -> AppResult<usize> {
        let batch_size = options.batch_size.max(1);
        let batches = chunks.len().div_ceil(batch_size);
        let mut upserted = 0;

        for (idx, batch) in chunks.chunks(batch_size).enumerate() {
            let records = self.encode_batch(batch, encoder).await?;

            let mut attempt = 0;
            let written = loop {
                match self.index.upsert(records.clone()).await {
                    Ok(written) => break written,
                    Err(e) if attempt < options.upload_retries => {
                        let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Batch {}/{} failed (attempt {}): {}, retrying in {:?}",
                            idx + 1,
                            batches,
                            attempt + 1,
                            e,
                            delay
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        return Err(AppError::Upload(format!(
                            "batch {}/{} failed after {} attempts: {}",
                            idx + 1,
                            batches,
                            attempt + 1,
                            e
                        )))
                    }
                }
            };

            upserted += written;
            self.progress
                .uploading(idx as u64 + 1, batches as u64, upserted as u64);
        }

        Ok(upserted)
    }

    async fn encode_batch(
        &self,
        batch: &[Chunk],
        encoder: &Bm25Encoder,
    ) -> AppResult<Vec<IndexRecord>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let dense = self.embedder.embed_batch(&texts).await?;
        if dense.len() != batch.len() {
            return Err(AppError::Knowledge(format!(
                "Embedder returned {} vectors for {} chunks",
                dense.len(),
                batch.len()
            )));
        }
        check_dimensions(&dense, self.embedder.dimensions())?;

        batch
            .iter()
            .zip(dense)
            .map(|(chunk, vector)| {
                IndexRecord::from_chunk(chunk, vector, encoder.encode_documents(&chunk.text))
            })
            .collect()
    }
}

/// Statistics from earlier runs against the same index, if any were saved.
fn previous_encoder(path: &Path) -> Bm25Encoder {
    if !path.is_file() {
        return Bm25Encoder::default();
    }
    match Bm25Encoder::load(path) {
        Ok(encoder) => encoder,
        Err(e) => {
            tracing::warn!("Ignoring unreadable BM25 encoder: {}", e);
            Bm25Encoder::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockProvider;
    use crate::index::{HybridQuery, InMemoryHybridIndex, IndexStats, Metric, ScoredRecord};
    use crate::loader::{ExtractFailure, PageExtractor};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Reads plain text files, one page per form feed.
    struct TextPages;

    impl PageExtractor for TextPages {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractFailure> {
            std::fs::read_to_string(path)
                .map(|s| s.split('\x0c').map(str::to_string).collect())
                .map_err(|e| ExtractFailure::Corrupt(e.to_string()))
        }
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("abc123.pdf"),
            "Copper exports grew strongly in Chile during the third quarter.\x0c\
             Lithium demand is expected to double by the end of the decade.\x0c\
             ok",
        )
        .unwrap();
        std::fs::write(dir.path().join("empty.pdf"), "").unwrap();
        std::fs::write(
            dir.path().join("metadata.jsonl"),
            r#"{"uuid":"abc123","title":"Mining Outlook","industries":["Mining"],"date":"2024-01-01","country_codes":["CL"]}"#,
        )
        .unwrap();
        dir
    }

    fn options(dir: &Path, dimension: usize) -> IngestOptions {
        IngestOptions::new(
            dir.to_path_buf(),
            dir.join("encoder/bm25.json"),
            IndexSpec {
                name: "test".to_string(),
                dimension,
                metric: Metric::DotProduct,
            },
        )
    }

    fn pipeline(index: Arc<dyn HybridIndex>) -> IngestPipeline {
        IngestPipeline::new(Arc::new(MockProvider::new(16)), index)
            .with_loader(DocumentLoader::with_extractor(Arc::new(TextPages)))
    }

    #[tokio::test]
    async fn test_run_reports_counts() {
        let dir = fixture();
        let index = Arc::new(InMemoryHybridIndex::new("test"));

        let report = pipeline(index.clone())
            .run(&options(dir.path(), 16))
            .await
            .unwrap();

        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.pages, 3);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.dropped_chunks, 1);
        assert_eq!(report.upserted, 2);
        assert_eq!(report.total_vector_count, 2);
        assert_eq!(report.file_errors, vec!["empty.pdf: Empty file".to_string()]);
        assert!(dir.path().join("encoder/bm25.json").exists());
    }

    #[tokio::test]
    async fn test_rerun_does_not_duplicate() {
        let dir = fixture();
        let index = Arc::new(InMemoryHybridIndex::new("test"));
        let pipeline = pipeline(index.clone());

        pipeline.run(&options(dir.path(), 16)).await.unwrap();
        let second = pipeline.run(&options(dir.path(), 16)).await.unwrap();
        assert_eq!(second.total_vector_count, 2);
    }

    #[tokio::test]
    async fn test_second_corpus_keeps_first_run_searchable() {
        let first = TempDir::new().unwrap();
        std::fs::write(first.path().join("a.pdf"), "copper exports rose in chile").unwrap();
        std::fs::write(first.path().join("metadata.jsonl"), "").unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join("b.pdf"), "aardvark banana apple copper zinc").unwrap();
        std::fs::write(second.path().join("metadata.jsonl"), "").unwrap();

        let state = TempDir::new().unwrap();
        let encoder_path = state.path().join("bm25.json");
        let index = Arc::new(InMemoryHybridIndex::new("test"));
        let pipeline = pipeline(index.clone());
        for docs in [&first, &second] {
            let mut opts = options(docs.path(), 16);
            opts.encoder_path = encoder_path.clone();
            pipeline.run(&opts).await.unwrap();
        }

        let encoder = Bm25Encoder::load(&encoder_path).unwrap();
        let sparse_hits = |results: Vec<ScoredRecord>| -> Vec<String> {
            results
                .into_iter()
                .filter(|r| r.sparse_score > 0.0)
                .map(|r| r.metadata["source"].as_str().unwrap_or_default().to_string())
                .collect()
        };
        for (question, source) in [("apple", "b.pdf"), ("chile", "a.pdf")] {
            let results = index
                .query(&HybridQuery {
                    dense: vec![0.0; 16],
                    sparse: encoder.encode_queries(question),
                    top_k: 10,
                })
                .await
                .unwrap();
            assert_eq!(sparse_hits(results), vec![source.to_string()], "query {:?}", question);
        }
    }

    #[tokio::test]
    async fn test_records_carry_metadata() {
        let dir = fixture();
        let index = Arc::new(InMemoryHybridIndex::new("test"));
        pipeline(index.clone())
            .run(&options(dir.path(), 16))
            .await
            .unwrap();

        let results = index
            .query(&HybridQuery {
                dense: vec![0.0; 16],
                sparse: Default::default(),
                top_k: 10,
            })
            .await
            .unwrap();
        assert!(results
            .iter()
            .all(|r| r.metadata["title"] == "Mining Outlook" && r.metadata["country_codes"][0] == "CL"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_config_error() {
        let dir = fixture();
        let index = Arc::new(InMemoryHybridIndex::new("test"));
        let result = pipeline(index).run(&options(dir.path(), 8)).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_no_valid_chunks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tiny.pdf"), "  short  ").unwrap();
        std::fs::write(dir.path().join("metadata.jsonl"), "").unwrap();

        let index = Arc::new(InMemoryHybridIndex::new("test"));
        let result = pipeline(index).run(&options(dir.path(), 16)).await;
        assert!(matches!(result, Err(AppError::NoValidChunks)));
    }

    #[tokio::test]
    async fn test_missing_metadata_is_fatal() {
        let dir = fixture();
        std::fs::remove_file(dir.path().join("metadata.jsonl")).unwrap();
        let index = Arc::new(InMemoryHybridIndex::new("test"));
        let result = pipeline(index).run(&options(dir.path(), 16)).await;
        assert!(matches!(result, Err(AppError::MetadataNotFound(_))));
    }

    /// Fails the first `failures` upserts, then delegates.
    struct FlakyIndex {
        inner: InMemoryHybridIndex,
        failures: AtomicU32,
    }

    #[async_trait::async_trait]
    impl HybridIndex for FlakyIndex {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn create_if_absent(&self, spec: &IndexSpec) -> AppResult<bool> {
            self.inner.create_if_absent(spec).await
        }

        async fn upsert(&self, records: Vec<IndexRecord>) -> AppResult<usize> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Index("service unavailable".to_string()));
            }
            self.inner.upsert(records).await
        }

        async fn query(&self, query: &HybridQuery) -> AppResult<Vec<ScoredRecord>> {
            self.inner.query(query).await
        }

        async fn describe_stats(&self) -> AppResult<IndexStats> {
            self.inner.describe_stats().await
        }
    }

    #[tokio::test]
    async fn test_upload_retries_then_succeeds() {
        let dir = fixture();
        let index = Arc::new(FlakyIndex {
            inner: InMemoryHybridIndex::new("test"),
            failures: AtomicU32::new(2),
        });

        let report = pipeline(index).run(&options(dir.path(), 16)).await.unwrap();
        assert_eq!(report.upserted, 2);
    }

    #[tokio::test]
    async fn test_upload_error_after_retries() {
        let dir = fixture();
        let index = Arc::new(FlakyIndex {
            inner: InMemoryHybridIndex::new("test"),
            failures: AtomicU32::new(10),
        });
        let mut opts = options(dir.path(), 16);
        opts.upload_retries = 1;

        match pipeline(index).run(&opts).await {
            Err(AppError::Upload(message)) => {
                assert!(message.contains("batch 1/1"));
                assert!(message.contains("service unavailable"));
            }
            other => panic!("expected upload error, got {:?}", other.map(|r| r.upserted)),
        }
    }
}
