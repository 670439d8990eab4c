//! Tools the answer agent may call.

use crate::retrieval::RetrievalTool;
use ragline_llm::ToolSpec;
use serde::Deserialize;
use std::sync::Arc;

pub const RETRIEVE_CONTEXT: &str = "retrieve_context";

const RETRIEVE_CONTEXT_DESCRIPTION: &str =
    "Retrieve the most relevant context passages from the vector database for a given user query.";

#[derive(Debug, Deserialize)]
struct RetrieveArgs {
    query: String,
}

/// Closed set of tools exposed to the model.
#[derive(Clone)]
pub struct Toolbox {
    retrieval: Arc<RetrievalTool>,
}

impl Toolbox {
    pub fn new(retrieval: Arc<RetrievalTool>) -> Self {
        Self { retrieval }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: RETRIEVE_CONTEXT.to_string(),
            description: RETRIEVE_CONTEXT_DESCRIPTION.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find relevant context"
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    /// Run a tool and return the text handed back to the model.
    ///
    /// Unknown tools and malformed arguments produce an error message
    /// instead of failing the conversation.
    pub async fn invoke(&self, name: &str, arguments: &serde_json::Value) -> String {
        match name {
            RETRIEVE_CONTEXT => match RetrieveArgs::deserialize(arguments) {
                Ok(args) => {
                    tracing::info!("Tool call {}({:?})", name, args.query);
                    self.retrieval.retrieve(&args.query).await
                }
                Err(e) => {
                    tracing::warn!("Invalid arguments for {}: {}", name, e);
                    format!("Error: invalid arguments for {}: {}", name, e)
                }
            },
            other => {
                tracing::warn!("Model requested unknown tool {}", other);
                format!("Error: unknown tool '{}'", other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockProvider;
    use crate::index::{HybridIndex, InMemoryHybridIndex, IndexSpec, Metric};
    use crate::sparse::Bm25Encoder;
    use std::path::PathBuf;

    async fn toolbox() -> Toolbox {
        let index = InMemoryHybridIndex::new("test");
        index
            .create_if_absent(&IndexSpec {
                name: "test".to_string(),
                dimension: 8,
                metric: Metric::DotProduct,
            })
            .await
            .unwrap();
        let retrieval = RetrievalTool::new(
            PathBuf::new(),
            Arc::new(MockProvider::new(8)),
            Arc::new(index),
        )
        .with_encoder(Arc::new(Bm25Encoder::default()));
        Toolbox::new(Arc::new(retrieval))
    }

    #[tokio::test]
    async fn test_specs_require_query() {
        let specs = toolbox().await.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "retrieve_context");
        assert_eq!(specs[0].parameters["required"][0], "query");
        assert_eq!(specs[0].parameters["properties"]["query"]["type"], "string");
    }

    #[tokio::test]
    async fn test_invoke_retrieve_on_empty_index() {
        let result = toolbox()
            .await
            .invoke(RETRIEVE_CONTEXT, &serde_json::json!({"query": "gdp"}))
            .await;
        assert_eq!(result, "");
    }

    #[tokio::test]
    async fn test_invoke_errors_are_messages() {
        let tools = toolbox().await;
        let unknown = tools.invoke("delete_everything", &serde_json::json!({})).await;
        assert!(unknown.contains("unknown tool"));

        let bad = tools
            .invoke(RETRIEVE_CONTEXT, &serde_json::json!({"query": 42}))
            .await;
        assert!(bad.starts_with("Error: invalid arguments"));
    }
}
