//! Error kinds shared across the runtime.
//!
//! Each kind maps to a different recovery policy: config errors are fatal at
//! startup, provider errors abort the current turn, sandbox denials and tool
//! failures become `error: …` tool results the model can react to, session
//! I/O failures are logged while the in-memory copy keeps the conversation
//! going, and bus overflow just drops the message.

use thiserror::Error;

/// Fatal configuration problem detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure talking to the LLM provider. Recoverable per turn.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("stream ended unexpectedly: {0}")]
    Stream(String),
}

/// A sandbox check rejected a path or command.
///
/// The `Display` form starts with `Access denied:` so tool results surface
/// the denial verbatim to the model.
#[derive(Debug, Error)]
#[error("Access denied: {0}")]
pub struct SandboxDenied(pub String);

/// Session persistence failed; the in-memory copy is still valid.
#[derive(Debug, Error)]
#[error("session {key} persistence failed: {source}")]
pub struct SessionIoError {
    pub key: String,
    #[source]
    pub source: std::io::Error,
}

/// A bounded bus queue was full and the message was dropped.
#[derive(Debug, Error)]
#[error("bus queue '{queue}' full, message dropped")]
pub struct BusOverflow {
    pub queue: &'static str,
}
