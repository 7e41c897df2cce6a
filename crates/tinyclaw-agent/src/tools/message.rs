//! Message tool — lets the agent proactively post to any channel.
//!
//! Publishes an `OutboundMessage` to the bus for an arbitrary
//! `(channel, chat_id)`; defaults to the conversation the agent is
//! currently serving.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use tinyclaw_core::bus::{MessageBus, OutboundMessage};

use super::base::{optional_string, require_string, Tool};

/// Allows the agent to send messages to channels.
///
/// The agent loop calls `set_context` before each interaction to set the
/// default channel/chat_id for the current conversation.
pub struct MessageTool {
    bus: Arc<MessageBus>,
    /// Default (channel, chat_id), set per-interaction by the agent loop.
    context: Mutex<(String, String)>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            context: Mutex::new(("cli".into(), "default".into())),
        }
    }

    /// Set the current conversation context.
    pub async fn set_context(&self, channel: &str, chat_id: &str) {
        let mut ctx = self.context.lock().await;
        *ctx = (channel.to_string(), chat_id.to_string());
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to a channel. By default sends to the current conversation; \
         pass channel and chat_id to target a different one."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message content to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Target channel (optional, defaults to current)"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Target chat ID (optional, defaults to current)"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let content = require_string(&params, "content")?;
        let param_channel = optional_string(&params, "channel");
        let param_chat_id = optional_string(&params, "chat_id");

        let (default_channel, default_chat_id) = {
            let ctx = self.context.lock().await;
            ctx.clone()
        };
        let channel = param_channel.unwrap_or(default_channel);
        let chat_id = param_chat_id.unwrap_or(default_chat_id);

        debug!(channel = %channel, chat_id = %chat_id, "sending message via tool");

        self.bus
            .publish_outbound(OutboundMessage::new(&channel, &chat_id, &content))
            .map_err(|e| anyhow::anyhow!("failed to send message: {e}"))?;

        Ok(format!("Message sent to {channel}:{chat_id}"))
    }
}
