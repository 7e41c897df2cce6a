//! Channel adapters for TinyClaw.
//!
//! Concrete chat-platform SDKs live outside this workspace; they
//! implement [`base::Channel`] and are registered with the
//! [`manager::ChannelManager`], which owns lifecycle and outbound
//! routing.

pub mod base;
pub mod manager;

pub use base::Channel;
pub use manager::ChannelManager;
