//! Gemini embedding provider.
//!
//! Uses `models/{model}:batchEmbedContents`. Corpus texts are embedded with
//! the `RETRIEVAL_DOCUMENT` task type and queries with `RETRIEVAL_QUERY`.

use crate::embeddings::provider::check_dimensions;
use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use ragline_core::{AppError, AppResult};
use ragline_llm::providers::gemini::DEFAULT_GEMINI_URL;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Texts per `batchEmbedContents` call accepted by the API.
const MAX_BATCH: usize = 100;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiProvider {
    pub fn new(config: EmbeddingConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "Gemini embeddings require an API key. Set RAGLINE_API_KEY or GOOGLE_API_KEY"
                        .to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.trim_start_matches("models/").to_string(),
            dimensions: config.dimensions,
        })
    }

    fn batch_request(&self, texts: &[String], task: TaskType) -> BatchRequest {
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    task_type: task.as_str(),
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        }
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_with_retries(&self, texts: &[String], task: TaskType) -> AppResult<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.embed_once(texts, task).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                    warn!(
                        "Gemini embedding failed (attempt {}/{}), retrying in {}ms: {}",
                        attempt, MAX_RETRIES, backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn embed_once(&self, texts: &[String], task: TaskType) -> AppResult<Vec<Vec<f32>>> {
        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.batch_request(texts, task))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Gemini: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Gemini embedding error ({}): {}",
                status, error_text
            )));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Gemini response: {}", e)))?;

        if body.embeddings.len() != texts.len() {
            return Err(AppError::Knowledge(format!(
                "Gemini returned {} embeddings for {} texts",
                body.embeddings.len(),
                texts.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = body
            .embeddings
            .into_iter()
            .map(|e| normalize(e.values))
            .collect();
        check_dimensions(&vectors, self.dimensions)?;
        Ok(vectors)
    }

    async fn embed_all(&self, texts: &[String], task: TaskType) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            vectors.extend(self.embed_with_retries(batch, task).await?);
        }
        debug!("Embedded {} texts with {}", vectors.len(), self.model);
        Ok(vectors)
    }
}

/// Truncated Gemini embeddings are not unit length.
fn normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_all(texts, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_all(&[text.to_string()], TaskType::Query)
            .await?
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}
