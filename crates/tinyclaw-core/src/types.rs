//! Core data model — chat messages, tool calls, and sessions.
//!
//! Messages follow the OpenAI chat-completions wire format so they can be
//! serialized straight into provider requests and session files. The enum is
//! tagged by `role`, which keeps illegal combinations (a `tool` message
//! without a `tool_call_id`, say) unrepresentable.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// A single turn in a conversation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: MessageContent },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },

    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a user message with plain text content.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with multipart content (text + images).
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Message::User {
            content: MessageContent::Parts(parts),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content,
            tool_calls: Some(tool_calls),
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// The tool calls carried by this message, if it is an assistant turn.
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match self {
            Message::Assistant {
                tool_calls: Some(calls),
                ..
            } => Some(calls),
            _ => None,
        }
    }

    /// Whether this is a `role=tool` result message.
    pub fn is_tool_result(&self) -> bool {
        matches!(self, Message::Tool { .. })
    }

    /// Rough size of this message in estimated tokens (chars / 4).
    ///
    /// Used for context budgeting and summarizer triggers; intentionally
    /// cheap rather than exact.
    pub fn estimated_tokens(&self) -> usize {
        let chars = match self {
            Message::System { content } => content.chars().count(),
            Message::User { content } => match content {
                MessageContent::Text(t) => t.chars().count(),
                MessageContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => text.chars().count(),
                        // Image payloads are billed separately by providers;
                        // count them flat.
                        ContentPart::ImageUrl { .. } => 256,
                    })
                    .sum(),
            },
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let text = content.as_deref().map_or(0, |c| c.chars().count());
                let calls: usize = tool_calls
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(|tc| tc.function.name.len() + tc.function.arguments.chars().count())
                    .sum();
                text + calls
            }
            Message::Tool { content, .. } => content.chars().count(),
        };
        chars / 4 + 1
    }
}

/// User message content — plain text or multipart (for vision input).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multipart user message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image payload for a multipart message part.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ─────────────────────────────────────────────
// Media attachments
// ─────────────────────────────────────────────

/// A media attachment (photo, voice, document) carried by a channel message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MediaAttachment {
    /// MIME type (e.g. "image/jpeg", "audio/ogg").
    pub mime_type: String,
    /// Local file path or URL to the media.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

// ─────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────

/// An LLM-initiated request to invoke a named tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Opaque id, unique within a conversation; tool results echo it back.
    pub id: String,
    /// Always `"function"` on the current wire format.
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus raw JSON argument text.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments. Parsed defensively by each tool.
    pub arguments: String,
}

// ─────────────────────────────────────────────
// Tool definitions (sent to the LLM)
// ─────────────────────────────────────────────

/// Schema advertisement for one tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the accepted arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─────────────────────────────────────────────
// Provider request / response DTOs
// ─────────────────────────────────────────────

/// Response from a chat completion call, normalized across providers.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Assistant text (None when the turn is tool calls only).
    pub content: Option<String>,
    /// Tool calls requested by the assistant, in execution order.
    pub tool_calls: Vec<ToolCall>,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token accounting, when the provider reports it.
    pub usage: Option<UsageInfo>,
}

impl LlmResponse {
    /// Whether the assistant asked for any tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage block from the provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw `/chat/completions` response body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl From<ChatCompletionResponse> for LlmResponse {
    fn from(resp: ChatCompletionResponse) -> Self {
        match resp.choices.into_iter().next() {
            Some(c) => LlmResponse {
                content: c.message.content,
                tool_calls: c.message.tool_calls.unwrap_or_default(),
                finish_reason: c.finish_reason,
                usage: resp.usage,
            },
            None => LlmResponse {
                content: Some("No choices in response".into()),
                ..Default::default()
            },
        }
    }
}

/// Request body for an OpenAI-compatible chat completion API.
///
/// Exactly one of `max_tokens` / `max_completion_tokens` is set per request;
/// some model families (glm, o1) reject the legacy field name.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// One durable conversation, keyed by `<channel>:<chat_id>`.
///
/// Serialized shape matches the on-disk session file:
/// `{createdAtMs, updatedAtMs, summary, history: [...]}` plus the key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub key: String,
    /// Ordered message history.
    #[serde(default)]
    pub history: Vec<Message>,
    /// Prose summary of compacted earlier turns. Empty until the
    /// summarizer has run.
    #[serde(default)]
    pub summary: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Session {
    /// Create a new empty session.
    pub fn new(key: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Session {
            key: key.into(),
            history: Vec::new(),
            summary: String::new(),
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Estimated token footprint of the whole history.
    pub fn estimated_tokens(&self) -> usize {
        self.history.iter().map(Message::estimated_tokens).sum()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
