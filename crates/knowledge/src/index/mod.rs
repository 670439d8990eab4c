//! Hybrid (dense + sparse) index abstraction.
//!
//! A record carries a dense embedding and a BM25 sparse vector. Queries score
//! every record on both, fuse the two scores and return the best `top_k`.

pub mod fusion;
pub mod lance;
pub mod memory;

pub use fusion::{ConvexFusion, Fusion};
pub use lance::LanceDbHybridIndex;
pub use memory::InMemoryHybridIndex;

use crate::metadata::record_id;
use crate::sparse::SparseVector;
use crate::types::Chunk;
use ragline_core::config::IndexSettings;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Dense similarity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    DotProduct,
    Cosine,
}

impl Metric {
    pub fn parse(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "dotproduct" | "dot" => Ok(Metric::DotProduct),
            "cosine" => Ok(Metric::Cosine),
            other => Err(AppError::Config(format!("Unknown index metric: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::DotProduct => "dotproduct",
            Metric::Cosine => "cosine",
        }
    }

    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Metric::DotProduct => dot,
            Metric::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

/// Identity and shape of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl IndexSpec {
    pub fn from_settings(settings: &IndexSettings, dimension: usize) -> AppResult<Self> {
        Ok(Self {
            name: settings.name.clone(),
            dimension,
            metric: Metric::parse(&settings.metric)?,
        })
    }
}

/// A chunk ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub metadata: serde_json::Value,
}

impl IndexRecord {
    /// Build a record with a deterministic id derived from the chunk position.
    pub fn from_chunk(chunk: &Chunk, dense: Vec<f32>, sparse: SparseVector) -> AppResult<Self> {
        let mut metadata = serde_json::to_value(&chunk.metadata)?;
        if let Some(map) = metadata.as_object_mut() {
            map.insert("start_offset".to_string(), chunk.start_offset.into());
        }

        Ok(Self {
            id: record_id(
                &chunk.metadata.source,
                chunk.metadata.page,
                chunk.start_offset,
                &chunk.text,
            ),
            text: chunk.text.clone(),
            dense,
            sparse,
            metadata,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HybridQuery {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub top_k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
    pub dense_score: f32,
    pub sparse_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub total_vector_count: u64,
}

/// Storage backend for hybrid records.
#[async_trait::async_trait]
pub trait HybridIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Create the index unless it exists. Returns `true` when it was created.
    ///
    /// An existing index with a different dimension is an error.
    async fn create_if_absent(&self, spec: &IndexSpec) -> AppResult<bool>;

    /// Insert or overwrite records by id. Returns the number written.
    async fn upsert(&self, records: Vec<IndexRecord>) -> AppResult<usize>;

    /// Records ranked by fused score, highest first; ties broken by id.
    async fn query(&self, query: &HybridQuery) -> AppResult<Vec<ScoredRecord>>;

    async fn describe_stats(&self) -> AppResult<IndexStats>;
}

/// Score one record against a query.
pub(crate) fn score_record(
    record: IndexRecord,
    query: &HybridQuery,
    metric: Metric,
    fusion: &dyn Fusion,
) -> ScoredRecord {
    let dense_score = metric.score(&query.dense, &record.dense);
    let sparse_score = query.sparse.dot(&record.sparse);
    ScoredRecord {
        id: record.id,
        text: record.text,
        metadata: record.metadata,
        score: fusion.fuse(dense_score, sparse_score),
        dense_score,
        sparse_score,
    }
}

/// Sort by score descending, then id ascending, and keep `top_k`.
pub(crate) fn rank(mut scored: Vec<ScoredRecord>, top_k: usize) -> Vec<ScoredRecord> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(top_k);
    scored
}

/// Validate record shapes and keep only the last record per id.
pub(crate) fn prepare_records(
    records: Vec<IndexRecord>,
    dimension: usize,
) -> AppResult<Vec<IndexRecord>> {
    for record in &records {
        if record.dense.len() != dimension {
            return Err(AppError::Index(format!(
                "Record {} has dimension {}, index expects {}",
                record.id,
                record.dense.len(),
                dimension
            )));
        }
        if record.sparse.indices.len() != record.sparse.values.len() {
            return Err(AppError::Index(format!(
                "Record {} has mismatched sparse indices and values",
                record.id
            )));
        }
    }

    let mut last: HashMap<String, usize> = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        last.insert(record.id.clone(), pos);
    }
    Ok(records
        .into_iter()
        .enumerate()
        .filter(|(pos, record)| last.get(&record.id) == Some(pos))
        .map(|(_, record)| record)
        .collect())
}

pub(crate) fn check_query_dimension(query: &HybridQuery, dimension: usize) -> AppResult<()> {
    if query.dense.len() != dimension {
        return Err(AppError::Index(format!(
            "Query embedding dimension mismatch: expected {}, got {}",
            dimension,
            query.dense.len()
        )));
    }
    Ok(())
}

/// Open the configured backend.
pub async fn open_index(settings: &IndexSettings, uri: &Path) -> AppResult<Arc<dyn HybridIndex>> {
    let metric = Metric::parse(&settings.metric)?;
    let fusion: Arc<dyn Fusion> = Arc::new(ConvexFusion::new(settings.alpha)?);

    match settings.backend.as_str() {
        "memory" => Ok(Arc::new(
            InMemoryHybridIndex::new(&settings.name).with_fusion(fusion),
        )),
        "lancedb" => Ok(Arc::new(
            LanceDbHybridIndex::connect(uri, &settings.name, metric, fusion).await?,
        )),
        other => Err(AppError::Config(format!(
            "Unknown index backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageMetadata;

    #[test]
    fn test_metric_parse_and_score() {
        assert_eq!(Metric::parse("DotProduct").unwrap(), Metric::DotProduct);
        assert!(Metric::parse("euclidean").is_err());

        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert_eq!(Metric::DotProduct.score(&a, &b), 2.0);
        assert_eq!(Metric::Cosine.score(&a, &b), 1.0);
        assert_eq!(Metric::Cosine.score(&a, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_record_from_chunk_is_deterministic() {
        let chunk = Chunk {
            text: "Copper output rose".to_string(),
            start_offset: 800,
            metadata: PageMetadata {
                source: "abc123.pdf".to_string(),
                page: 2,
                identifier: "abc123".to_string(),
                ..Default::default()
            },
        };

        let a = IndexRecord::from_chunk(&chunk, vec![0.0], SparseVector::default()).unwrap();
        let b = IndexRecord::from_chunk(&chunk, vec![1.0], SparseVector::default()).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.metadata["start_offset"], 800);
        assert_eq!(a.metadata["page"], 2);
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let scored = |id: &str, score: f32| ScoredRecord {
            id: id.to_string(),
            text: String::new(),
            metadata: serde_json::Value::Null,
            score,
            dense_score: 0.0,
            sparse_score: 0.0,
        };

        let ranked = rank(
            vec![scored("b", 0.5), scored("c", 0.9), scored("a", 0.5)],
            2,
        );
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_prepare_records_keeps_last_duplicate() {
        let record = |id: &str, text: &str| IndexRecord {
            id: id.to_string(),
            text: text.to_string(),
            dense: vec![0.0; 2],
            sparse: SparseVector::default(),
            metadata: serde_json::Value::Null,
        };

        let prepared = prepare_records(
            vec![record("x", "old"), record("y", "y"), record("x", "new")],
            2,
        )
        .unwrap();
        let texts: Vec<_> = prepared.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["y", "new"]);

        assert!(prepare_records(vec![record("z", "bad")], 3).is_err());
    }
}
