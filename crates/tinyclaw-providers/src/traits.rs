//! LLM provider abstraction.
//!
//! Everything that can answer a chat completion implements [`LlmProvider`].
//! The production implementation is [`crate::HttpProvider`], which covers
//! any OpenAI-compatible endpoint; tests substitute scripted mocks.

use async_trait::async_trait;
use tinyclaw_core::error::ProviderError;
use tinyclaw_core::types::{LlmResponse, Message, ToolDefinition};

/// Per-call request options.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.7,
        }
    }
}

/// Callback receiving assistant text chunks as they stream in.
pub type ChunkSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Trait all LLM providers implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// `messages` is the full conversation in wire order; `tools` the
    /// definitions the model may call. Provider/transport failures are
    /// returned as `ProviderError` and abort the caller's current turn.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError>;

    /// Streaming variant: assistant text is pushed to `on_chunk` as it
    /// arrives; the returned response carries the reassembled full content
    /// and tool calls.
    ///
    /// The default implementation falls back to a buffered `chat` call and
    /// emits the content as one chunk — fine for providers (and mocks)
    /// without streaming support.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
        on_chunk: ChunkSink<'_>,
    ) -> Result<LlmResponse, ProviderError> {
        let response = self.chat(messages, tools, model, config).await?;
        if let Some(content) = &response.content {
            if !content.is_empty() {
                on_chunk(content);
            }
        }
        Ok(response)
    }

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
