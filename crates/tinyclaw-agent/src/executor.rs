//! LLM executor — the tool-calling state machine.
//!
//! One `execute` call drives a full `chat → tool calls → tool results →
//! chat` cycle under an iteration budget. Persistence invariants:
//!
//! - the user message lands in the session exactly once, before the first
//!   provider call
//! - every assistant message carrying tool calls and every tool result
//!   land in both the in-flight list and the session before the next
//!   provider call
//! - the final assistant text lands in the session exactly once
//!
//! Tool calls within one assistant turn run strictly in the order the
//! model returned them.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use tinyclaw_core::error::ProviderError;
use tinyclaw_core::session::SessionStore;
use tinyclaw_core::types::Message;
use tinyclaw_providers::{ChunkSink, LlmProvider, LlmRequestConfig};

use crate::tools::registry::ToolRegistry;

/// Default maximum provider calls per user message.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Final assistant text when the iteration budget runs out while the
/// model keeps asking for tools.
pub const ITERATION_LIMIT_NOTICE: &str = "Reached tool-iteration limit";

/// Options for one executor instance.
#[derive(Clone, Debug)]
pub struct ExecutorOptions {
    pub max_iterations: usize,
    pub request: LlmRequestConfig,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request: LlmRequestConfig::default(),
        }
    }
}

/// Drives the LLM ⇄ tool loop for one session turn.
pub struct LlmExecutor {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    model: String,
    options: ExecutorOptions,
}

impl LlmExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        model: impl Into<String>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            provider,
            tools,
            sessions,
            model: model.into(),
            options,
        }
    }

    /// Run the state machine for one user turn and return the final
    /// assistant text.
    ///
    /// `messages` is the prepared context (system prompt, summary, history
    /// tail, and the user message last); `user_message` is persisted to the
    /// session before the first provider call.
    pub async fn execute(
        &self,
        session_key: &str,
        messages: Vec<Message>,
        user_message: Message,
    ) -> Result<String, ProviderError> {
        self.run_machine(session_key, messages, user_message, None)
            .await
    }

    /// Streaming variant: identical machine, with assistant text chunks
    /// forwarded to `on_chunk` as they arrive.
    pub async fn execute_stream(
        &self,
        session_key: &str,
        messages: Vec<Message>,
        user_message: Message,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String, ProviderError> {
        self.run_machine(session_key, messages, user_message, Some(on_chunk))
            .await
    }

    async fn run_machine(
        &self,
        session_key: &str,
        mut messages: Vec<Message>,
        user_message: Message,
        on_chunk: Option<ChunkSink<'_>>,
    ) -> Result<String, ProviderError> {
        // User turn persists once, before INIT.
        if let Err(e) = self.sessions.append(session_key, user_message) {
            warn!(error = %e, "failed to persist user message, continuing in memory");
        }

        let tool_defs = self.tools.definitions();

        for iteration in 0..self.options.max_iterations {
            debug!(session_key, iteration, "provider call");

            let response = match on_chunk {
                Some(sink) => {
                    self.provider
                        .chat_stream(
                            &messages,
                            Some(&tool_defs),
                            &self.model,
                            &self.options.request,
                            sink,
                        )
                        .await?
                }
                None => {
                    self.provider
                        .chat(&messages, Some(&tool_defs), &self.model, &self.options.request)
                        .await?
                }
            };

            if !response.has_tool_calls() {
                let text = response
                    .content
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "(no response)".to_string());
                if let Err(e) = self
                    .sessions
                    .append(session_key, Message::assistant(text.clone()))
                {
                    warn!(error = %e, "failed to persist assistant reply");
                }
                return Ok(text);
            }

            // Tool turn: run each call in order, then persist the whole
            // group before the next provider call.
            let assistant =
                Message::assistant_tool_calls(response.content.clone(), response.tool_calls.clone());
            messages.push(assistant.clone());
            let mut group = vec![assistant];

            for call in &response.tool_calls {
                let params: HashMap<String, Value> =
                    serde_json::from_str(&call.function.arguments).unwrap_or_default();

                info!(
                    tool = %call.function.name,
                    iteration,
                    "executing tool call"
                );
                let result = self.tools.execute(&call.function.name, params).await;
                debug!(tool = %call.function.name, result_len = result.len(), "tool result");

                let tool_message = Message::tool_result(&call.id, &result);
                messages.push(tool_message.clone());
                group.push(tool_message);
            }

            if let Err(e) = self.sessions.append_all(session_key, group) {
                warn!(error = %e, "failed to persist tool-call group");
            }
        }

        // Budget exhausted while the model still wants tools.
        info!(session_key, "iteration limit reached");
        if let Err(e) = self
            .sessions
            .append(session_key, Message::assistant(ITERATION_LIMIT_NOTICE))
        {
            warn!(error = %e, "failed to persist iteration-limit notice");
        }
        Ok(ITERATION_LIMIT_NOTICE.to_string())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
