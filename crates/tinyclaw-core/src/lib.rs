//! TinyClaw core — data model, message bus, sessions, sandbox, and config.
//!
//! This crate contains everything the rest of the workspace builds on:
//! - **types**: chat messages, tool calls, sessions, provider DTOs
//! - **bus**: bounded inbound/outbound queues between channels and agent
//! - **session**: per-conversation JSON persistence
//! - **guard**: path confinement + command blacklist
//! - **heartbeat**: periodic self-prompt service
//! - **config**: schema and loader
//! - **error**: shared error kinds

pub mod bus;
pub mod config;
pub mod error;
pub mod guard;
pub mod heartbeat;
pub mod session;
pub mod types;
pub mod utils;

pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use error::{BusOverflow, ConfigError, ProviderError, SandboxDenied, SessionIoError};
pub use guard::SecurityGuard;
pub use session::SessionStore;
pub use types::{Message, Session, ToolCall, ToolDefinition};
