//! Bus event types — messages flowing between channels and the agent loop.

use crate::types::MediaAttachment;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Channel name reserved for scheduler/heartbeat-originated messages.
pub const SYSTEM_CHANNEL: &str = "system";

/// Metadata key a system message sets to request outbound delivery.
pub const DELIVER_KEY: &str = "deliver";

/// An inbound message from a channel to the agent.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Channel name (e.g. "cli", "web", "system").
    pub channel: String,
    /// Sender identifier within the channel.
    pub sender_id: String,
    /// Chat/conversation identifier.
    pub chat_id: String,
    /// Text content of the message.
    pub content: String,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    /// Attached media (photos, voice, documents).
    pub media: Vec<MediaAttachment>,
    /// Channel-specific metadata (e.g. message_id, job id, origin).
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Create a new inbound message with minimal required fields.
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Session key combining channel and chat id (e.g. `"cli:default"`).
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Whether this message originated from the scheduler or heartbeat.
    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }

    /// Whether a system message asked for its reply to be delivered.
    pub fn wants_delivery(&self) -> bool {
        self.metadata
            .get(DELIVER_KEY)
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

/// An outbound message from the agent to a channel.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    /// Target channel name.
    pub channel: String,
    /// Target chat/conversation identifier.
    pub chat_id: String,
    /// Text content to send.
    pub content: String,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("web", "user_42", "sid_9", "Hello!");

        assert_eq!(msg.channel, "web");
        assert_eq!(msg.sender_id, "user_42");
        assert_eq!(msg.chat_id, "sid_9");
        assert_eq!(msg.content, "Hello!");
        assert!(msg.media.is_empty());
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_session_key_format() {
        let msg = InboundMessage::new("cli", "local", "default", "hello");
        assert_eq!(msg.session_key(), "cli:default");
    }

    #[test]
    fn test_system_detection() {
        let msg = InboundMessage::new(SYSTEM_CHANNEL, "cron", "default", "tick");
        assert!(msg.is_system());
        assert!(!msg.wants_delivery());
    }

    #[test]
    fn test_wants_delivery() {
        let mut msg = InboundMessage::new(SYSTEM_CHANNEL, "cron", "default", "tick");
        msg.metadata.insert(DELIVER_KEY.into(), "true".into());
        assert!(msg.wants_delivery());

        msg.metadata.insert(DELIVER_KEY.into(), "false".into());
        assert!(!msg.wants_delivery());
    }

    #[test]
    fn test_outbound_message_creation() {
        let msg = OutboundMessage::new("cli", "default", "Here's your answer!");

        assert_eq!(msg.channel, "cli");
        assert_eq!(msg.chat_id, "default");
        assert_eq!(msg.content, "Here's your answer!");
    }
}
