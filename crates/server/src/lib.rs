//! HTTP surface for the answer agent.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Stream an answer as server-sent events |
//! | `GET`  | `/` | Chat page |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /ask` takes `{"question": "..."}` and emits one
//! `data: {"chunk": "...", "done": false}` event per fragment followed by
//! `data: {"done": true}`. Closing the connection stops generation.
//!
//! All origins, methods, and headers are permitted.

pub mod error;
mod routes;

pub use error::ApiError;

use axum::{
    routing::{get, post},
    Router,
};
use ragline_core::{AppError, AppResult};
use ragline_knowledge::AnswerAgent;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<AnswerAgent>,
}

impl AppState {
    pub fn new(agent: Arc<AnswerAgent>) -> Self {
        Self { agent }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::handle_index))
        .route("/ask", post(routes::handle_ask))
        .route("/health", get(routes::handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, bind: &str) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind {}: {}", bind, e)))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_knowledge::embeddings::MockProvider;
    use ragline_knowledge::index::{HybridIndex, InMemoryHybridIndex, IndexSpec, Metric};
    use ragline_knowledge::{AgentConfig, Bm25Encoder, RetrievalTool, Toolbox};
    use ragline_llm::{ScriptedClient, ScriptedTurn};
    use std::path::PathBuf;

    async fn spawn(turns: Vec<ScriptedTurn>) -> String {
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
        let agent = AnswerAgent::new(
            Arc::new(ScriptedClient::new(turns).with_fallback("fallback answer")),
            Toolbox::new(Arc::new(retrieval)),
            AgentConfig::default(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState::new(Arc::new(agent)));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// JSON payloads of the `data:` lines of an SSE body.
    fn data_events(body: &str) -> Vec<serde_json::Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_ask_streams_fragments_then_done() {
        let base = spawn(vec![ScriptedTurn::fragments(["Hello", " world", "!"])]).await;

        let response = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({"question": "Say hello"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));
        assert_eq!(response.headers()["cache-control"], "no-cache");

        let events = data_events(&response.text().await.unwrap());
        assert_eq!(
            events,
            vec![
                serde_json::json!({"chunk": "Hello", "done": false}),
                serde_json::json!({"chunk": " world", "done": false}),
                serde_json::json!({"chunk": "!", "done": false}),
                serde_json::json!({"done": true}),
            ]
        );
    }

    #[tokio::test]
    async fn test_ask_uses_fallback_when_model_is_silent() {
        let base = spawn(vec![]).await;

        let body = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({"question": "anything"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let events = data_events(&body);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["chunk"], "fallback answer");
        assert_eq!(events[1], serde_json::json!({"done": true}));
    }

    #[tokio::test]
    async fn test_ask_rejects_bad_bodies() {
        let base = spawn(vec![]).await;
        let client = reqwest::Client::new();

        for body in [
            serde_json::json!({}),
            serde_json::json!({"question": 42}),
            serde_json::json!({"question": "   "}),
        ] {
            let response = client
                .post(format!("{}/ask", base))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 422, "body {}", body);
            let error: serde_json::Value = response.json().await.unwrap();
            assert_eq!(error["error"]["code"], "invalid_request");
        }

        let malformed = client
            .post(format!("{}/ask", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), 422);
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let base = spawn(vec![]).await;

        let health: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

        let page = reqwest::get(format!("{}/", base)).await.unwrap();
        assert_eq!(page.status(), 200);
        assert!(page.text().await.unwrap().contains("/ask"));
    }
}
