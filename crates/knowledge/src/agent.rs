//! Tool-calling answer agent.
//!
//! Drives the model round by round: text deltas are forwarded to the caller
//! as they arrive, tool calls are executed through the [`Toolbox`] and fed
//! back, and a blocking completion is tried when streaming produced nothing.
//!
//! Generation failures never surface as errors. The caller always receives
//! at least one fragment unless it hangs up first.

use crate::tools::Toolbox;
use futures::StreamExt;
use ragline_core::AppError;
use ragline_llm::{ChatMessage, LlmClient, LlmRequest, ToolCall};
use ragline_prompt::{answer_system_prompt, build_prompt, PromptDefinition};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

const ERROR_PREFIX: &str = "Sorry, I couldn't generate an answer";

/// Position of the agent in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Start,
    StreamingAnswer,
    ToolCall,
    ToolResult,
    FallbackInvoke,
    Done,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    /// Rounds in which tools are offered; later rounds are text only
    pub max_tool_rounds: usize,
    pub channel_capacity: usize,
    pub temperature: Option<f32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-lite".to_string(),
            max_tool_rounds: 4,
            channel_capacity: 32,
            temperature: None,
        }
    }
}

/// Summary of one answer, for logging and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutcome {
    pub fragments: usize,
    pub tool_calls: usize,
    pub used_fallback: bool,
    pub cancelled: bool,
    pub final_state: AgentState,
}

impl Default for AgentOutcome {
    fn default() -> Self {
        Self {
            fragments: 0,
            tool_calls: 0,
            used_fallback: false,
            cancelled: false,
            final_state: AgentState::Start,
        }
    }
}

enum RoundEnd {
    Completed {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Failed(AppError),
    Cancelled,
}

pub struct AnswerAgent {
    llm: Arc<dyn LlmClient>,
    toolbox: Toolbox,
    prompt: PromptDefinition,
    config: AgentConfig,
}

impl AnswerAgent {
    pub fn new(llm: Arc<dyn LlmClient>, toolbox: Toolbox, config: AgentConfig) -> Self {
        Self {
            llm,
            toolbox,
            prompt: answer_system_prompt(),
            config,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptDefinition) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Start answering in the background and return the fragment receiver.
    ///
    /// Dropping the receiver stops generation.
    pub fn answer(self: &Arc<Self>, question: impl Into<String>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let agent = Arc::clone(self);
        let question = question.into();
        tokio::spawn(async move {
            let outcome = agent.run(&question, tx).await;
            tracing::debug!(?outcome, "Answer finished");
        });
        rx
    }

    /// Answer `question`, sending fragments to `tx` as they are produced.
    #[tracing::instrument(skip(self, tx), fields(model = %self.config.model))]
    pub async fn run(&self, question: &str, tx: mpsc::Sender<String>) -> AgentOutcome {
        let mut outcome = AgentOutcome::default();

        let built = match build_prompt(&self.prompt, question, HashMap::new()) {
            Ok(built) => built,
            Err(e) => {
                let _ = tx.send(format!("{}: {}", ERROR_PREFIX, e)).await;
                outcome.fragments = 1;
                outcome.final_state = AgentState::Done;
                return outcome;
            }
        };
        let mut messages = vec![
            ChatMessage::system(built.system),
            ChatMessage::user(built.user),
        ];

        let mut rounds = 0;
        loop {
            if tx.is_closed() {
                return cancelled(outcome);
            }

            let offer_tools = rounds < self.config.max_tool_rounds;
            let mut request = LlmRequest::new(&self.config.model, messages.clone()).with_streaming();
            if offer_tools {
                request = request.with_tools(self.toolbox.specs());
            }
            if let Some(temperature) = self.config.temperature {
                request = request.with_temperature(temperature);
            }

            outcome.final_state = AgentState::StreamingAnswer;
            match self.stream_round(&request, &tx, &mut outcome).await {
                RoundEnd::Cancelled => return cancelled(outcome),
                RoundEnd::Failed(e) if outcome.fragments > 0 => {
                    tracing::warn!("Stream failed after {} fragments: {}", outcome.fragments, e);
                    let _ = tx.send(format!("\n\n{}: {}", ERROR_PREFIX, e)).await;
                    outcome.final_state = AgentState::Done;
                    return outcome;
                }
                RoundEnd::Failed(e) => {
                    tracing::warn!("Stream failed before any output: {}", e);
                    break;
                }
                RoundEnd::Completed {
                    content,
                    tool_calls,
                } if offer_tools && !tool_calls.is_empty() => {
                    outcome.final_state = AgentState::ToolCall;
                    messages.push(ChatMessage::assistant_tool_calls(content, tool_calls.clone()));

                    for call in &tool_calls {
                        let result = self.toolbox.invoke(&call.name, &call.arguments).await;
                        outcome.tool_calls += 1;
                        messages.push(ChatMessage::tool_result(call, result));
                    }
                    outcome.final_state = AgentState::ToolResult;
                    rounds += 1;
                }
                RoundEnd::Completed { .. } => break,
            }
        }

        if outcome.fragments == 0 {
            if tx.is_closed() {
                return cancelled(outcome);
            }
            self.fallback(messages, &tx, &mut outcome).await;
        }

        outcome.final_state = AgentState::Done;
        outcome
    }

    async fn stream_round(
        &self,
        request: &LlmRequest,
        tx: &mpsc::Sender<String>,
        outcome: &mut AgentOutcome,
    ) -> RoundEnd {
        let mut stream = match self.llm.stream(request).await {
            Ok(stream) => stream,
            Err(e) => return RoundEnd::Failed(e),
        };

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return RoundEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Err(e)) => return RoundEnd::Failed(e),
                Some(Ok(chunk)) => {
                    tool_calls.extend(chunk.tool_calls);
                    if !chunk.content.is_empty() {
                        content.push_str(&chunk.content);
                        if tx.send(chunk.content).await.is_err() {
                            return RoundEnd::Cancelled;
                        }
                        outcome.fragments += 1;
                    }
                    if chunk.done {
                        break;
                    }
                }
            }
        }

        RoundEnd::Completed {
            content,
            tool_calls,
        }
    }

    /// One blocking completion without tools. Always emits one fragment.
    async fn fallback(
        &self,
        messages: Vec<ChatMessage>,
        tx: &mpsc::Sender<String>,
        outcome: &mut AgentOutcome,
    ) {
        outcome.final_state = AgentState::FallbackInvoke;
        outcome.used_fallback = true;
        tracing::info!("No streamed output, falling back to a blocking completion");

        let mut request = LlmRequest::new(&self.config.model, messages);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        let fragment = match self.llm.complete(&request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => format!(
                "{}: {}",
                ERROR_PREFIX,
                AppError::Generation("the model returned an empty response".to_string())
            ),
            Err(e) => {
                let e = AppError::Generation(e.to_string());
                tracing::warn!("Fallback completion failed: {}", e);
                format!("{}: {}", ERROR_PREFIX, e)
            }
        };

        if tx.send(fragment).await.is_ok() {
            outcome.fragments += 1;
        } else {
            outcome.cancelled = true;
        }
    }
}

fn cancelled(mut outcome: AgentOutcome) -> AgentOutcome {
    tracing::info!("Answer consumer disconnected, stopping generation");
    outcome.cancelled = true;
    outcome.final_state = AgentState::Done;
    outcome
}
