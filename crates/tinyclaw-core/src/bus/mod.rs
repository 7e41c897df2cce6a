//! Message bus — bounded inbound/outbound queues between channels and agent.

pub mod queue;
pub mod types;

pub use queue::{MessageBus, DEFAULT_BUS_CAPACITY};
pub use types::{InboundMessage, OutboundMessage, DELIVER_KEY, SYSTEM_CHANNEL};
