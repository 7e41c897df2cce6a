//! LLM provider layer for TinyClaw.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — trait all providers implement (chat +
//!   streaming)
//! - [`registry`] — model-name → provider selection over static specs
//! - [`stream`] — SSE framing and tool-call delta reassembly
//! - [`http_provider::HttpProvider`] — generic OpenAI-compatible client
//! - [`http_provider::create_provider`] — builder from model name + config

pub mod http_provider;
pub mod registry;
pub mod stream;
pub mod traits;

pub use http_provider::{create_provider, HttpProvider};
pub use registry::{find_by_name, match_provider, ProviderSpec, PROVIDERS};
pub use stream::{SseParser, ToolCallAssembler};
pub use traits::{ChunkSink, LlmProvider, LlmRequestConfig};
