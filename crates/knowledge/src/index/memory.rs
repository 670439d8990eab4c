//! In-process hybrid index.

use super::{
    check_query_dimension, prepare_records, rank, score_record, ConvexFusion, Fusion,
    HybridIndex, HybridQuery, IndexRecord, IndexSpec, IndexStats, ScoredRecord,
};
use ragline_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

struct State {
    spec: IndexSpec,
    records: BTreeMap<String, IndexRecord>,
}

/// Hybrid index held in memory. Contents are lost when dropped.
pub struct InMemoryHybridIndex {
    name: String,
    fusion: Arc<dyn Fusion>,
    state: RwLock<Option<State>>,
}

impl InMemoryHybridIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fusion: Arc::new(ConvexFusion::default()),
            state: RwLock::new(None),
        }
    }

    pub fn with_fusion(mut self, fusion: Arc<dyn Fusion>) -> Self {
        self.fusion = fusion;
        self
    }

    fn missing(&self) -> AppError {
        AppError::Index(format!("Index '{}' does not exist", self.name))
    }
}

fn poisoned() -> AppError {
    AppError::Index("in-memory index lock poisoned".to_string())
}

#[async_trait::async_trait]
impl HybridIndex for InMemoryHybridIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_absent(&self, spec: &IndexSpec) -> AppResult<bool> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if let Some(existing) = state.as_ref() {
            if existing.spec.dimension != spec.dimension {
                return Err(AppError::Index(format!(
                    "Index '{}' exists with dimension {}, requested {}",
                    self.name, existing.spec.dimension, spec.dimension
                )));
            }
            if existing.spec.metric != spec.metric {
                return Err(AppError::Index(format!(
                    "Index '{}' exists with metric {}, requested {}",
                    self.name,
                    existing.spec.metric.as_str(),
                    spec.metric.as_str()
                )));
            }
            return Ok(false);
        }

        *state = Some(State {
            spec: spec.clone(),
            records: BTreeMap::new(),
        });
        tracing::info!("Created in-memory index '{}'", self.name);
        Ok(true)
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> AppResult<usize> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        let state = guard.as_mut().ok_or_else(|| self.missing())?;

        let records = prepare_records(records, state.spec.dimension)?;
        let count = records.len();
        for record in records {
            state.records.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn query(&self, query: &HybridQuery) -> AppResult<Vec<ScoredRecord>> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        let state = guard.as_ref().ok_or_else(|| self.missing())?;
        check_query_dimension(query, state.spec.dimension)?;

        let scored = state
            .records
            .values()
            .map(|record| {
                score_record(
                    record.clone(),
                    query,
                    state.spec.metric,
                    self.fusion.as_ref(),
                )
            })
            .collect();
        Ok(rank(scored, query.top_k))
    }

    async fn describe_stats(&self) -> AppResult<IndexStats> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        let state = guard.as_ref().ok_or_else(|| self.missing())?;
        Ok(IndexStats {
            name: self.name.clone(),
            dimension: state.spec.dimension,
            metric: state.spec.metric,
            total_vector_count: state.records.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Metric;
    use crate::sparse::SparseVector;

    fn spec(dimension: usize) -> IndexSpec {
        IndexSpec {
            name: "test".to_string(),
            dimension,
            metric: Metric::DotProduct,
        }
    }

    fn record(id: &str, dense: Vec<f32>, sparse: (Vec<u32>, Vec<f32>)) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            text: format!("text of {}", id),
            dense,
            sparse: SparseVector {
                indices: sparse.0,
                values: sparse.1,
            },
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let index = InMemoryHybridIndex::new("test");
        assert!(index.create_if_absent(&spec(2)).await.unwrap());
        assert!(!index.create_if_absent(&spec(2)).await.unwrap());
        assert!(matches!(
            index.create_if_absent(&spec(3)).await,
            Err(AppError::Index(_))
        ));
        let cosine = IndexSpec {
            metric: Metric::Cosine,
            ..spec(2)
        };
        assert!(matches!(
            index.create_if_absent(&cosine).await,
            Err(AppError::Index(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_before_create_fail() {
        let index = InMemoryHybridIndex::new("test");
        assert!(index.describe_stats().await.is_err());
        assert!(index.upsert(vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_hybrid_match_ranks_first() {
        let index = InMemoryHybridIndex::new("test");
        index.create_if_absent(&spec(2)).await.unwrap();
        index
            .upsert(vec![
                record("both", vec![0.9, 0.1], (vec![1], vec![1.0])),
                record("dense-only", vec![1.0, 0.0], (vec![7], vec![1.0])),
                record("sparse-only", vec![0.0, 1.0], (vec![1], vec![1.0])),
            ])
            .await
            .unwrap();

        let results = index
            .query(&HybridQuery {
                dense: vec![1.0, 0.0],
                sparse: SparseVector {
                    indices: vec![1],
                    values: vec![1.0],
                },
                top_k: 2,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "both");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_reupsert_overwrites() {
        let index = InMemoryHybridIndex::new("test");
        index.create_if_absent(&spec(2)).await.unwrap();

        let batch = || vec![record("a", vec![1.0, 0.0], (vec![], vec![]))];
        index.upsert(batch()).await.unwrap();
        index.upsert(batch()).await.unwrap();

        assert_eq!(index.describe_stats().await.unwrap().total_vector_count, 1);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let index = InMemoryHybridIndex::new("test");
        index.create_if_absent(&spec(2)).await.unwrap();
        let result = index
            .query(&HybridQuery {
                dense: vec![1.0],
                sparse: SparseVector::default(),
                top_k: 4,
            })
            .await;
        assert!(matches!(result, Err(AppError::Index(_))));
    }
}
