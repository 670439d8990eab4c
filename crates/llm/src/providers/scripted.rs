//! Scripted LLM client.
//!
//! Replays a fixed sequence of turns instead of calling a model. Used to
//! drive the answer agent and HTTP layer deterministically in tests and
//! offline demos.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::types::ToolCall;
use ragline_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply to a `stream` call.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Text fragments, emitted in order
    Fragments(Vec<String>),
    /// A round that only requests tool calls
    ToolCalls(Vec<ToolCall>),
    /// `stream` fails before producing anything
    Error(String),
}

impl ScriptedTurn {
    pub fn fragments<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fragments(parts.into_iter().map(Into::into).collect())
    }

    /// A single `retrieve_context` style call with a `query` argument.
    pub fn tool_call(name: &str, query: &str) -> Self {
        Self::ToolCalls(vec![ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({ "query": query }),
        }])
    }
}

/// LLM client that replays scripted turns.
///
/// Once the script is exhausted, `stream` yields an empty stream. `complete`
/// returns the configured fallback reply.
pub struct ScriptedClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    fallback: Mutex<Result<String, String>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            fallback: Mutex::new(Err("no fallback scripted".to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply returned by `complete`.
    pub fn with_fallback(self, reply: impl Into<String>) -> Self {
        if let Ok(mut slot) = self.fallback.lock() {
            *slot = Ok(reply.into());
        }
        self
    }

    /// Make `complete` fail with `message`.
    pub fn with_failing_fallback(self, message: impl Into<String>) -> Self {
        if let Ok(mut slot) = self.fallback.lock() {
            *slot = Err(message.into());
        }
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: &LlmRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.record(request);

        let reply = self
            .fallback
            .lock()
            .map_err(|_| AppError::Llm("scripted client poisoned".to_string()))?
            .clone();

        match reply {
            Ok(content) => Ok(LlmResponse {
                content,
                tool_calls: Vec::new(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            }),
            Err(message) => Err(AppError::Llm(message)),
        }
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.record(request);

        let turn = self
            .turns
            .lock()
            .map_err(|_| AppError::Llm("scripted client poisoned".to_string()))?
            .pop_front();

        let model = request.model.clone();
        let chunks: Vec<AppResult<LlmStreamChunk>> = match turn {
            None => Vec::new(),
            Some(ScriptedTurn::Error(message)) => return Err(AppError::Llm(message)),
            Some(ScriptedTurn::Fragments(parts)) => {
                let mut chunks: Vec<_> = parts
                    .into_iter()
                    .map(|part| Ok(LlmStreamChunk::text(part, model.clone())))
                    .collect();
                chunks.push(Ok(LlmStreamChunk {
                    done: true,
                    ..LlmStreamChunk::text("", model)
                }));
                chunks
            }
            Some(ScriptedTurn::ToolCalls(calls)) => vec![Ok(LlmStreamChunk {
                tool_calls: calls,
                done: true,
                ..LlmStreamChunk::text("", model)
            })],
        };

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
