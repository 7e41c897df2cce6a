//! Generic HTTP client for OpenAI-compatible `/chat/completions` APIs.
//!
//! One implementation serves every supported backend — OpenAI, OpenRouter,
//! DeepSeek, Groq, ZhiPu, local Ollama — differing only in base URL, key,
//! and the occasional field rename handled by the registry.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error};

use tinyclaw_core::config::ProviderConfig;
use tinyclaw_core::error::ProviderError;
use tinyclaw_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ToolDefinition,
};

use crate::registry::{
    match_provider, resolve_model_name, uses_completion_tokens_field, ProviderSpec,
};
use crate::stream::{SseParser, StreamChunk, ToolCallAssembler, SSE_DONE};
use crate::traits::{ChunkSink, LlmProvider, LlmRequestConfig};

/// Read timeout for a whole completion call.
const READ_TIMEOUT_S: u64 = 120;
/// Connection establishment timeout.
const CONNECT_TIMEOUT_S: u64 = 30;

/// An LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication. Empty = no auth header.
    api_key: String,
    /// Default model for this provider instance.
    default_model: String,
    /// Static spec for model resolution and logging.
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new provider from a config entry and its static spec.
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec, model: &str) -> Self {
        let api_base = config
            .api_base
            .clone()
            .or_else(|| spec.default_api_base.map(String::from))
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(READ_TIMEOUT_S))
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_S))
            .build()
            .expect("failed to build HTTP client");

        HttpProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            spec,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Build the request body, routing the token budget to the field the
    /// model family expects.
    fn build_request(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
        stream: bool,
    ) -> ChatCompletionRequest {
        let (max_tokens, max_completion_tokens) = if uses_completion_tokens_field(model) {
            (None, Some(config.max_tokens))
        } else {
            (Some(config.max_tokens), None)
        };

        ChatCompletionRequest {
            model: resolve_model_name(model, self.spec),
            messages: messages.to_vec(),
            tools: tools.filter(|t| !t.is_empty()).map(|t| t.to_vec()),
            tool_choice: tools
                .filter(|t| !t.is_empty())
                .map(|_| "auto".to_string()),
            max_tokens,
            max_completion_tokens,
            temperature: Some(config.temperature),
            stream: stream.then_some(true),
        }
    }

    async fn post(
        &self,
        body: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.client.post(self.completions_url()).json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = self.spec.display_name, error = %e, "HTTP request failed");
            ProviderError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            error!(
                provider = self.spec.display_name,
                status = %status,
                body = %body,
                "API error"
            );
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        debug!(
            provider = self.spec.display_name,
            model = %model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            "calling LLM"
        );

        let body = self.build_request(messages, tools, model, config, false);
        let response = self.post(&body).await?;

        let chat_resp: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let llm_resp: LlmResponse = chat_resp.into();
        debug!(
            provider = self.spec.display_name,
            has_content = llm_resp.content.is_some(),
            tool_calls = llm_resp.tool_calls.len(),
            finish_reason = llm_resp.finish_reason.as_deref().unwrap_or("?"),
            "LLM response received"
        );
        Ok(llm_resp)
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
        on_chunk: ChunkSink<'_>,
    ) -> Result<LlmResponse, ProviderError> {
        debug!(
            provider = self.spec.display_name,
            model = %model,
            "calling LLM (streaming)"
        );

        let body = self.build_request(messages, tools, model, config, true);
        let response = self.post(&body).await?;

        let mut parser = SseParser::new();
        let mut assembler = ToolCallAssembler::new();
        let mut content = String::new();
        let mut finish_reason = None;
        let mut done = false;

        let mut byte_stream = response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;

            for payload in parser.push(&bytes) {
                if payload == SSE_DONE {
                    done = true;
                    break;
                }
                let parsed: StreamChunk = match serde_json::from_str(&payload) {
                    Ok(c) => c,
                    Err(e) => {
                        // Tolerate malformed keep-alive frames; real damage
                        // shows up as a parse failure at [DONE] anyway.
                        debug!(error = %e, "skipping unparsable stream frame");
                        continue;
                    }
                };

                for choice in &parsed.choices {
                    if let Some(text) = &choice.delta.content {
                        if !text.is_empty() {
                            content.push_str(text);
                            on_chunk(text);
                        }
                    }
                    if let Some(deltas) = &choice.delta.tool_calls {
                        for delta in deltas {
                            assembler.push(delta);
                        }
                    }
                    if let Some(reason) = &choice.finish_reason {
                        finish_reason = Some(reason.clone());
                    }
                }
            }

            if done {
                break;
            }
        }

        if !done {
            return Err(ProviderError::Stream(
                "stream closed before [DONE]".to_string(),
            ));
        }

        Ok(LlmResponse {
            content: (!content.is_empty()).then_some(content),
            tool_calls: assembler.finish(),
            finish_reason,
            usage: None,
        })
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

/// Build an [`HttpProvider`] from a model name and the configured providers.
pub fn create_provider(
    model: &str,
    providers: &std::collections::HashMap<String, ProviderConfig>,
) -> Result<HttpProvider, String> {
    let (config, spec) = match_provider(model, providers).ok_or_else(|| {
        format!(
            "No configured provider found for model '{model}'. \
             Set an API key (e.g. OPENAI_API_KEY, OPENROUTER_API_KEY) or configure one."
        )
    })?;

    debug!(
        provider = spec.display_name,
        model = model,
        api_base = config.api_base.as_deref().unwrap_or("default"),
        "creating LLM provider"
    );

    Ok(HttpProvider::new(config, spec, model))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
