//! Channel trait — the capability set every inbound/outbound adapter
//! implements.
//!
//! A channel owns its SDK threads and touches the runtime only through
//! the bus: it publishes `InboundMessage`s and receives
//! `OutboundMessage`s via the manager's dispatcher.

use async_trait::async_trait;
use tinyclaw_core::bus::OutboundMessage;

/// Every chat channel implements this trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name (e.g. "cli", "web").
    ///
    /// Must match `OutboundMessage.channel` for routing.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    ///
    /// Long-running; publishes inbound messages to the bus until `stop()`
    /// is called.
    async fn start(&self) -> anyhow::Result<()>;

    /// Graceful shutdown.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver an outbound message to this channel.
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;

    /// Whether a sender may talk to the agent through this channel.
    ///
    /// Default: everyone. Adapters with allowlists override this and drop
    /// disallowed senders before publishing.
    fn is_allowed(&self, _sender_id: &str) -> bool {
        true
    }
}
