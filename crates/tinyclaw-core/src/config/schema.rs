//! Configuration schema.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case, bridged with
//! `#[serde(rename_all = "camelCase")]`. Every section has defaults so a
//! missing or partial config file still yields a runnable setup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::utils;

// ─────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.tinyclaw/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub bus: BusConfig,
    pub providers: HashMap<String, ProviderConfig>,
    pub tools: ToolsConfig,
    pub security: SecurityConfig,
    pub summarizer: SummarizerConfig,
    pub heartbeat: HeartbeatConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Resolved workspace directory (tilde-expanded).
    pub fn workspace_path(&self) -> PathBuf {
        utils::expand_home(&self.agent.workspace)
    }

    /// Sessions directory under the workspace.
    pub fn sessions_path(&self) -> PathBuf {
        self.workspace_path().join("sessions")
    }

    /// Cron store file under the workspace.
    pub fn cron_store_path(&self) -> PathBuf {
        self.workspace_path().join("cron").join("jobs.json")
    }
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Core agent settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Workspace directory (docs, memory, skills, sessions).
    pub workspace: String,
    /// Agent display name (used in the system prompt).
    pub name: String,
    /// Default LLM model identifier.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum tool-calling iterations per user message.
    pub max_tool_iterations: usize,
    /// Model context window, in tokens (drives context budgeting and
    /// summarizer triggers).
    pub context_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: "~/.tinyclaw/workspace".to_string(),
            name: "TinyClaw".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            context_window: 128_000,
        }
    }
}

// ─────────────────────────────────────────────
// Bus / gateway
// ─────────────────────────────────────────────

/// Message bus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Capacity of each bounded queue.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Gateway (long-running service) settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Number of agent workers pulling from the inbound queue.
    pub workers: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Settings for one LLM provider (keyed by provider name).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key (empty string means unauthenticated/local endpoint).
    pub api_key: String,
    /// Base URL override (e.g. a proxy or a local server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

/// Built-in tool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Shell command timeout in seconds.
    pub exec_timeout_s: u64,
    /// Per-tool-call timeout in seconds (applies to every tool).
    pub tool_timeout_s: u64,
    /// Brave Search API key for the web_search tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_api_key: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec_timeout_s: 60,
            tool_timeout_s: 120,
            web_search_api_key: None,
        }
    }
}

// ─────────────────────────────────────────────
// Security
// ─────────────────────────────────────────────

/// Sandbox settings for the security guard.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    /// Confine file tools and exec working dirs to the workspace.
    pub restrict_to_workspace: bool,
    /// Custom command blacklist. Fully replaces the defaults when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_blacklist: Option<Vec<String>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            restrict_to_workspace: true,
            command_blacklist: None,
        }
    }
}

// ─────────────────────────────────────────────
// Summarizer
// ─────────────────────────────────────────────

/// Session summarizer thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizerConfig {
    /// Compress once history exceeds this many messages.
    pub message_threshold: usize,
    /// ...or once estimated tokens exceed this fraction of the context
    /// window.
    pub token_percentage: f64,
    /// How many recent messages survive compression verbatim.
    pub recent_messages_to_keep: usize,
    /// Character budget per summarization batch.
    pub batch_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            message_threshold: 40,
            token_percentage: 0.8,
            recent_messages_to_keep: 10,
            batch_chars: 24_000,
        }
    }
}

// ─────────────────────────────────────────────
// Heartbeat
// ─────────────────────────────────────────────

/// Heartbeat settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Seconds between ticks.
    pub interval_s: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_s: 30 * 60,
        }
    }
}
