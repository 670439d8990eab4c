//! LanceDB-backed hybrid index.
//!
//! One table per index: `id`, `text`, `dense` (fixed-size float list),
//! `sparse` and `metadata` (JSON strings). The dense metric is stored in the
//! table's schema metadata. Upsert deletes matching ids before appending.
//!
//! A query gathers candidates from two sides: LanceDB's vector search for the
//! dense side and a scan of the `id`/`sparse` columns for the lexical side.
//! Only the candidates are loaded in full and fused in process, with the same
//! scoring as the in-memory backend.

use super::{
    check_query_dimension, prepare_records, rank, score_record, Fusion, HybridIndex,
    HybridQuery, IndexRecord, IndexSpec, IndexStats, Metric, ScoredRecord,
};
use crate::sparse::SparseVector;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use ragline_core::{AppError, AppResult};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Schema metadata key holding the dense metric.
const METRIC_KEY: &str = "ragline.metric";

/// Candidates taken from each side per requested result.
const CANDIDATES_PER_RESULT: usize = 4;

#[derive(Clone)]
struct TableHandle {
    table: Table,
    dimension: usize,
    metric: Metric,
}

impl Metric {
    fn distance_type(&self) -> DistanceType {
        match self {
            Metric::DotProduct => DistanceType::Dot,
            Metric::Cosine => DistanceType::Cosine,
        }
    }
}

pub struct LanceDbHybridIndex {
    name: String,
    metric: Metric,
    fusion: Arc<dyn Fusion>,
    conn: Connection,
    table: RwLock<Option<TableHandle>>,
}

fn index_err<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> AppError {
    move |e| AppError::Index(format!("{}: {}", context, e))
}

impl LanceDbHybridIndex {
    /// Connect to the database directory, opening the table if it exists.
    pub async fn connect(
        db_path: &Path,
        name: &str,
        metric: Metric,
        fusion: Arc<dyn Fusion>,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            AppError::Index(format!("Failed to create index directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(index_err("Failed to connect to LanceDB"))?;

        let existing = Self::open_existing(&conn, name).await?;
        if let Some(handle) = &existing {
            check_metric(name, handle.metric, metric)?;
        }
        tracing::debug!(
            "Connected to LanceDB at {:?} (table '{}' {})",
            db_path,
            name,
            if existing.is_some() { "found" } else { "absent" }
        );

        Ok(Self {
            name: name.to_string(),
            metric,
            fusion,
            conn,
            table: RwLock::new(existing),
        })
    }

    async fn open_existing(conn: &Connection, name: &str) -> AppResult<Option<TableHandle>> {
        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(index_err("Failed to list tables"))?;
        if !table_names.iter().any(|t| t == name) {
            return Ok(None);
        }

        let table = conn
            .open_table(name)
            .execute()
            .await
            .map_err(index_err("Failed to open table"))?;
        let schema = table
            .schema()
            .await
            .map_err(index_err("Failed to read table schema"))?;
        let dimension = dense_dimension(&schema)?;
        let metric = stored_metric(&schema)?;

        Ok(Some(TableHandle {
            table,
            dimension,
            metric,
        }))
    }

    fn schema(dimension: usize, metric: Metric) -> Arc<Schema> {
        let metadata = HashMap::from([(METRIC_KEY.to_string(), metric.as_str().to_string())]);
        let fields = vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "dense",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("sparse", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ];
        Arc::new(Schema::new_with_metadata(fields, metadata))
    }

    async fn handle(&self) -> AppResult<TableHandle> {
        self.table
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Index(format!("Index '{}' does not exist", self.name)))
    }

    fn to_batch(records: &[IndexRecord], handle: &TableHandle) -> AppResult<RecordBatch> {
        let dimension = handle.dimension;
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let flat: Vec<f32> = records.iter().flat_map(|r| r.dense.iter().copied()).collect();
        let sparse = records
            .iter()
            .map(|r| serde_json::to_string(&r.sparse))
            .collect::<Result<Vec<_>, _>>()?;
        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<Vec<_>, _>>()?;

        let dense = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension as i32,
            Arc::new(Float32Array::from(flat)),
            None,
        )
        .map_err(|e| AppError::Index(format!("Failed to build dense column: {}", e)))?;

        RecordBatch::try_new(
            Self::schema(dimension, handle.metric),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(dense),
                Arc::new(StringArray::from(sparse)),
                Arc::new(StringArray::from(metadata)),
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to create RecordBatch: {}", e)))
    }

    fn read_records(batch: &RecordBatch) -> AppResult<Vec<IndexRecord>> {
        let ids = string_column(batch, "id")?;
        let texts = string_column(batch, "text")?;
        let sparse = string_column(batch, "sparse")?;
        let metadata = string_column(batch, "metadata")?;
        let dense = batch
            .column_by_name("dense")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| AppError::Index("Invalid dense column".to_string()))?;

        (0..batch.num_rows())
            .map(|row| -> AppResult<IndexRecord> {
                let values = dense.value(row);
                let values = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| AppError::Index("Invalid dense values".to_string()))?;

                let sparse: SparseVector = serde_json::from_str(sparse.value(row))?;
                Ok(IndexRecord {
                    id: ids.value(row).to_string(),
                    text: texts.value(row).to_string(),
                    dense: values.values().iter().copied().collect(),
                    sparse,
                    metadata: serde_json::from_str(metadata.value(row))?,
                })
            })
            .collect()
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Index(format!("Invalid {} column", name)))
}

fn dense_dimension(schema: &Schema) -> AppResult<usize> {
    match schema.field_with_name("dense").map(|f| f.data_type()) {
        Ok(DataType::FixedSizeList(_, size)) => Ok(*size as usize),
        _ => Err(AppError::Index(
            "Existing table has no fixed-size dense column".to_string(),
        )),
    }
}

/// Metric recorded at creation. Tables without the key predate it and are
/// treated as dot product.
fn stored_metric(schema: &Schema) -> AppResult<Metric> {
    match schema.metadata().get(METRIC_KEY) {
        Some(value) => Metric::parse(value)
            .map_err(|e| AppError::Index(format!("Invalid stored metric: {}", e))),
        None => Ok(Metric::DotProduct),
    }
}

fn check_metric(name: &str, stored: Metric, requested: Metric) -> AppResult<()> {
    if stored != requested {
        return Err(AppError::Index(format!(
            "Index '{}' exists with metric {}, requested {}",
            name,
            stored.as_str(),
            requested.as_str()
        )));
    }
    Ok(())
}

fn id_filter<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    format!(
        "id IN ({})",
        ids.into_iter().map(quote).collect::<Vec<_>>().join(", ")
    )
}

fn quote(id: &str) -> String {
    format!("'{}'", id.replace('\'', "''"))
}

#[async_trait::async_trait]
impl HybridIndex for LanceDbHybridIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_absent(&self, spec: &IndexSpec) -> AppResult<bool> {
        let mut guard = self.table.write().await;
        if let Some(handle) = guard.as_ref() {
            if handle.dimension != spec.dimension {
                return Err(AppError::Index(format!(
                    "Index '{}' exists with dimension {}, requested {}",
                    self.name, handle.dimension, spec.dimension
                )));
            }
            check_metric(&self.name, handle.metric, spec.metric)?;
            return Ok(false);
        }
        check_metric(&self.name, self.metric, spec.metric)?;

        let schema = Self::schema(spec.dimension, spec.metric);
        let empty = RecordBatch::new_empty(schema.clone());
        let table = self
            .conn
            .create_table(
                &self.name,
                RecordBatchIterator::new(vec![Ok(empty)], schema),
            )
            .execute()
            .await
            .map_err(index_err("Failed to create table"))?;

        tracing::info!(
            "Created LanceDB index '{}' (dimension {}, {})",
            self.name,
            spec.dimension,
            spec.metric.as_str()
        );
        *guard = Some(TableHandle {
            table,
            dimension: spec.dimension,
            metric: spec.metric,
        });
        Ok(true)
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> AppResult<usize> {
        let handle = self.handle().await?;
        let records = prepare_records(records, handle.dimension)?;
        if records.is_empty() {
            return Ok(0);
        }

        let predicate = id_filter(records.iter().map(|r| r.id.as_str()));
        handle
            .table
            .delete(&predicate)
            .await
            .map_err(index_err("Failed to delete existing ids"))?;

        let batch = Self::to_batch(&records, &handle)?;
        let schema = batch.schema();
        handle
            .table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(index_err("Failed to add records"))?;

        tracing::debug!("Upserted {} records into '{}'", records.len(), self.name);
        Ok(records.len())
    }

    async fn query(&self, query: &HybridQuery) -> AppResult<Vec<ScoredRecord>> {
        let handle = self.handle().await?;
        check_query_dimension(query, handle.dimension)?;
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let pool = query.top_k * CANDIDATES_PER_RESULT;
        let mut candidates = dense_candidates(&handle, &query.dense, pool).await?;
        candidates.extend(sparse_candidates(&handle, &query.sparse, pool).await?);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = handle
            .table
            .query()
            .only_if(id_filter(candidates.iter().map(String::as_str)))
            .limit(candidates.len())
            .execute()
            .await
            .map_err(index_err("Failed to load candidates"))?
            .try_collect()
            .await
            .map_err(index_err("Failed to collect results"))?;

        let mut scored = Vec::with_capacity(candidates.len());
        for batch in &batches {
            for record in Self::read_records(batch)? {
                scored.push(score_record(record, query, handle.metric, self.fusion.as_ref()));
            }
        }

        tracing::debug!(
            "Scored {} candidates, returning top {}",
            scored.len(),
            query.top_k
        );
        Ok(rank(scored, query.top_k))
    }

    async fn describe_stats(&self) -> AppResult<IndexStats> {
        let handle = self.handle().await?;
        let count = handle
            .table
            .count_rows(None)
            .await
            .map_err(index_err("Failed to count rows"))?;

        Ok(IndexStats {
            name: self.name.clone(),
            dimension: handle.dimension,
            metric: handle.metric,
            total_vector_count: count as u64,
        })
    }
}

/// Ids of the `pool` nearest rows by the table's metric.
async fn dense_candidates(
    handle: &TableHandle,
    dense: &[f32],
    pool: usize,
) -> AppResult<BTreeSet<String>> {
    let batches: Vec<RecordBatch> = handle
        .table
        .query()
        .nearest_to(dense)
        .map_err(index_err("Invalid query vector"))?
        .distance_type(handle.metric.distance_type())
        .select(Select::columns(&["id"]))
        .limit(pool)
        .execute()
        .await
        .map_err(index_err("Failed to execute vector search"))?
        .try_collect()
        .await
        .map_err(index_err("Failed to collect vector search"))?;

    let mut ids = BTreeSet::new();
    for batch in &batches {
        let column = string_column(batch, "id")?;
        ids.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
    }
    Ok(ids)
}

/// Ids of the `pool` rows with the highest positive sparse overlap.
async fn sparse_candidates(
    handle: &TableHandle,
    sparse: &SparseVector,
    pool: usize,
) -> AppResult<BTreeSet<String>> {
    if sparse.is_empty() {
        return Ok(BTreeSet::new());
    }

    let batches: Vec<RecordBatch> = handle
        .table
        .query()
        .select(Select::columns(&["id", "sparse"]))
        .execute()
        .await
        .map_err(index_err("Failed to scan sparse vectors"))?
        .try_collect()
        .await
        .map_err(index_err("Failed to collect sparse vectors"))?;

    let mut hits: Vec<(f32, String)> = Vec::new();
    for batch in &batches {
        let ids = string_column(batch, "id")?;
        let vectors = string_column(batch, "sparse")?;
        for row in 0..batch.num_rows() {
            let vector: SparseVector = serde_json::from_str(vectors.value(row))?;
            let score = sparse.dot(&vector);
            if score > 0.0 {
                hits.push((score, ids.value(row).to_string()));
            }
        }
    }

    hits.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(hits.into_iter().take(pool).map(|(_, id)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ConvexFusion;
    use tempfile::TempDir;

    fn spec() -> IndexSpec {
        IndexSpec {
            name: "hybrid".to_string(),
            dimension: 3,
            metric: Metric::DotProduct,
        }
    }

    fn record(id: &str, dense: [f32; 3], term: u32) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            text: format!("passage {}", id),
            dense: dense.to_vec(),
            sparse: SparseVector {
                indices: vec![term],
                values: vec![1.0],
            },
            metadata: serde_json::json!({ "source": format!("{}.pdf", id) }),
        }
    }

    async fn connect(dir: &Path) -> LanceDbHybridIndex {
        LanceDbHybridIndex::connect(
            dir,
            "hybrid",
            Metric::DotProduct,
            Arc::new(ConvexFusion::default()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_query_and_reopen() {
        let temp = TempDir::new().unwrap();
        let index = connect(temp.path()).await;

        assert!(index.create_if_absent(&spec()).await.unwrap());
        assert!(!index.create_if_absent(&spec()).await.unwrap());

        index
            .upsert(vec![
                record("a", [1.0, 0.0, 0.0], 1),
                record("b", [0.0, 1.0, 0.0], 2),
            ])
            .await
            .unwrap();
        // Same ids again must not grow the table
        index
            .upsert(vec![record("a", [1.0, 0.0, 0.0], 1)])
            .await
            .unwrap();
        assert_eq!(index.describe_stats().await.unwrap().total_vector_count, 2);

        let results = index
            .query(&HybridQuery {
                dense: vec![1.0, 0.0, 0.0],
                sparse: SparseVector {
                    indices: vec![1],
                    values: vec![1.0],
                },
                top_k: 1,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].metadata["source"], "a.pdf");

        drop(index);
        let reopened = connect(temp.path()).await;
        let stats = reopened.describe_stats().await.unwrap();
        assert_eq!(stats.dimension, 3);
        assert_eq!(stats.total_vector_count, 2);
    }

    #[tokio::test]
    async fn test_dimension_conflict_on_existing_table() {
        let temp = TempDir::new().unwrap();
        let index = connect(temp.path()).await;
        index.create_if_absent(&spec()).await.unwrap();

        let other = IndexSpec {
            dimension: 4,
            ..spec()
        };
        assert!(matches!(
            index.create_if_absent(&other).await,
            Err(AppError::Index(_))
        ));
    }

    #[tokio::test]
    async fn test_sparse_match_outside_dense_neighbours() {
        let temp = TempDir::new().unwrap();
        let index = connect(temp.path()).await;
        index.create_if_absent(&spec()).await.unwrap();

        let mut records: Vec<_> = (0..9)
            .map(|i| record(&format!("near{}", i), [0.3, 0.0, 0.0], 9))
            .collect();
        records.push(record("lexical", [0.0, 1.0, 0.0], 1));
        index.upsert(records).await.unwrap();

        let results = index
            .query(&HybridQuery {
                dense: vec![1.0, 0.0, 0.0],
                sparse: SparseVector {
                    indices: vec![1],
                    values: vec![1.0],
                },
                top_k: 1,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "lexical");
        assert!((results[0].sparse_score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_metric_is_stored_and_enforced() {
        let temp = TempDir::new().unwrap();
        let index = connect(temp.path()).await;
        index.create_if_absent(&spec()).await.unwrap();

        let cosine = IndexSpec {
            metric: Metric::Cosine,
            ..spec()
        };
        assert!(matches!(
            index.create_if_absent(&cosine).await,
            Err(AppError::Index(_))
        ));
        drop(index);

        let reopened = LanceDbHybridIndex::connect(
            temp.path(),
            "hybrid",
            Metric::Cosine,
            Arc::new(ConvexFusion::default()),
        )
        .await;
        assert!(matches!(reopened, Err(AppError::Index(_))));

        let reopened = connect(temp.path()).await;
        assert_eq!(
            reopened.describe_stats().await.unwrap().metric,
            Metric::DotProduct
        );
    }

    #[tokio::test]
    async fn test_new_table_rejects_other_metric() {
        let temp = TempDir::new().unwrap();
        let index = connect(temp.path()).await;
        let cosine = IndexSpec {
            metric: Metric::Cosine,
            ..spec()
        };
        assert!(matches!(
            index.create_if_absent(&cosine).await,
            Err(AppError::Index(_))
        ));
    }

    #[tokio::test]
    async fn test_query_without_table_fails() {
        let temp = TempDir::new().unwrap();
        let index = connect(temp.path()).await;
        let result = index
            .query(&HybridQuery {
                dense: vec![0.0; 3],
                sparse: SparseVector::default(),
                top_k: 4,
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("it's"), "'it''s'");
    }
}
