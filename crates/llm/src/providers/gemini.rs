//! Google Gemini LLM provider implementation.
//!
//! Talks to the Generative Language REST API (`generateContent` and
//! `streamGenerateContent?alt=sse`) with function calling.

use super::lines::line_stream;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::types::{ChatMessage, ChatRole, ToolCall, ToolSpec};
use futures::StreamExt;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Default Generative Language API root.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: GeminiContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Text, tool calls and completion flag extracted from one response body.
struct Extracted {
    text: String,
    calls: Vec<(String, serde_json::Value)>,
    done: bool,
    usage: Option<LlmUsage>,
    model: Option<String>,
}

impl GeminiResponse {
    fn extract(self) -> Extracted {
        let mut text = String::new();
        let mut calls = Vec::new();
        let mut done = false;

        if let Some(candidate) = self.candidates.into_iter().next() {
            done = candidate.finish_reason.is_some();
            for part in candidate.content.parts {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(call) = part.function_call {
                    calls.push((call.name, call.args));
                }
            }
        }

        Extracted {
            text,
            calls,
            done,
            usage: self
                .usage_metadata
                .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count)),
            model: self.model_version,
        }
    }
}

/// Gemini LLM client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client against the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_GEMINI_URL, api_key)
    }

    /// Create a client against a custom endpoint.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_gemini_request(&self, request: &LlmRequest) -> GeminiRequest {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for message in &request.messages {
            match message.role {
                ChatRole::System => system_parts.push(text_part(&message.content)),
                ChatRole::User => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![text_part(&message.content)],
                }),
                ChatRole::Assistant => contents.push(assistant_content(message)),
                ChatRole::Tool => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart {
                        function_response: Some(FunctionResponse {
                            name: message.name.clone().unwrap_or_default(),
                            response: serde_json::json!({ "content": message.content }),
                        }),
                        ..GeminiPart::default()
                    }],
                }),
            }
        }

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTools {
                function_declarations: request.tools.iter().map(to_declaration).collect(),
            }]
        };

        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some()
        {
            Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GeminiRequest {
            system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system_parts,
            }),
            contents,
            tools,
            generation_config,
        }
    }

    async fn post(&self, model: &str, action: &str, body: &GeminiRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/models/{}:{}", self.base_url, model, action);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Gemini: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: Some(text.to_string()),
        ..GeminiPart::default()
    }
}

fn assistant_content(message: &ChatMessage) -> GeminiContent {
    let mut parts = Vec::new();
    if !message.content.is_empty() {
        parts.push(text_part(&message.content));
    }
    for call in &message.tool_calls {
        parts.push(GeminiPart {
            function_call: Some(FunctionCall {
                name: call.name.clone(),
                args: call.arguments.clone(),
            }),
            ..GeminiPart::default()
        });
    }

    GeminiContent {
        role: Some("model".to_string()),
        parts,
    }
}

fn to_declaration(spec: &ToolSpec) -> FunctionDeclaration {
    FunctionDeclaration {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: spec.parameters.clone(),
    }
}

fn to_tool_calls(calls: Vec<(String, serde_json::Value)>, offset: usize) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(i, (name, arguments))| ToolCall {
            id: format!("call_{}", offset + i),
            name,
            arguments,
        })
        .collect()
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to Gemini");
        tracing::debug!("Request: {:?}", request);

        let body = self.to_gemini_request(request);
        let response = self.post(&request.model, "generateContent", &body).await?;

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Gemini response: {}", e)))?;
        let extracted = parsed.extract();

        tracing::info!("Received completion from Gemini");

        Ok(LlmResponse {
            content: extracted.text,
            tool_calls: to_tool_calls(extracted.calls, 0),
            model: extracted.model.unwrap_or_else(|| request.model.clone()),
            usage: extracted.usage.unwrap_or_default(),
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::info!("Starting streaming request to Gemini");
        tracing::debug!("Request: {:?}", request);

        let body = self.to_gemini_request(request);
        let response = self
            .post(&request.model, "streamGenerateContent?alt=sse", &body)
            .await?;

        let model = request.model.clone();
        let mut calls_seen = 0usize;

        // SSE: only `data:` lines carry payloads
        let stream = line_stream(response.bytes_stream())
            .filter_map(|line| {
                let item = match line {
                    Ok(text) => text
                        .strip_prefix("data:")
                        .map(|payload| Ok(payload.trim().to_string())),
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(item)
            })
            .map(move |payload| -> AppResult<LlmStreamChunk> {
                let payload = payload?;
                let parsed: GeminiResponse = serde_json::from_str(&payload)
                    .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;
                let extracted = parsed.extract();

                let tool_calls = to_tool_calls(extracted.calls, calls_seen);
                calls_seen += tool_calls.len();

                Ok(LlmStreamChunk {
                    content: extracted.text,
                    tool_calls,
                    model: extracted.model.unwrap_or_else(|| model.clone()),
                    done: extracted.done,
                    usage: if extracted.done { extracted.usage } else { None },
                })
            });

        Ok(Box::pin(stream))
    }
}
