//! Heartbeat — periodic self-prompt that wakes the agent.
//!
//! On each tick the agent is handed a synthesized user turn pointing it at
//! `memory/HEARTBEAT.md`. An empty file (or one containing only headers,
//! comments, and blank checkboxes) skips the tick entirely, so an idle
//! agent costs nothing. A reply of `HEARTBEAT_OK` means nothing needed
//! attention and is never delivered anywhere.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Default interval: 30 minutes.
pub const DEFAULT_HEARTBEAT_INTERVAL_S: u64 = 30 * 60;

/// The prompt synthesized as a user turn on each heartbeat tick.
pub const HEARTBEAT_PROMPT: &str = r#"Read memory/HEARTBEAT.md in your workspace (if it exists).
Follow any instructions or tasks listed there.
If nothing needs attention, reply with just: HEARTBEAT_OK"#;

/// Token that indicates "nothing to do".
const HEARTBEAT_OK_TOKEN: &str = "HEARTBEAT_OK";

/// Callback invoked on each heartbeat tick.
///
/// Receives the heartbeat prompt and returns the agent's response text —
/// in practice a thin wrapper over the agent loop's direct path.
pub type OnHeartbeatFn = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>> + Send + Sync,
>;

/// Periodic heartbeat service.
pub struct HeartbeatService {
    /// Workspace root (where `memory/HEARTBEAT.md` lives).
    workspace: PathBuf,
    /// Callback to invoke per tick.
    on_heartbeat: Option<OnHeartbeatFn>,
    /// Seconds between ticks.
    interval_s: u64,
    /// Whether the service is enabled.
    enabled: bool,
    /// Shutdown signal.
    shutdown: Arc<Notify>,
}

impl HeartbeatService {
    /// Create a new heartbeat service.
    pub fn new(
        workspace: PathBuf,
        on_heartbeat: Option<OnHeartbeatFn>,
        interval_s: Option<u64>,
        enabled: bool,
    ) -> Self {
        Self {
            workspace,
            on_heartbeat,
            interval_s: interval_s.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_S),
            enabled,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Set the heartbeat callback after construction (breaks the
    /// construction cycle with the agent loop).
    pub fn set_on_heartbeat(&mut self, callback: OnHeartbeatFn) {
        self.on_heartbeat = Some(callback);
    }

    fn heartbeat_file(&self) -> PathBuf {
        self.workspace.join("memory").join("HEARTBEAT.md")
    }

    fn read_heartbeat_file(&self) -> Option<String> {
        let path = self.heartbeat_file();
        if path.exists() {
            std::fs::read_to_string(&path).ok()
        } else {
            None
        }
    }

    /// Whether the heartbeat file has no actionable content.
    ///
    /// Blank lines, headers, HTML comments, and empty checkboxes don't
    /// count as actionable.
    fn is_heartbeat_empty(content: Option<&str>) -> bool {
        let content = match content {
            Some(c) if !c.is_empty() => c,
            _ => return true,
        };

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed.starts_with("<!--")
                || trimmed == "- [ ]"
                || trimmed == "* [ ]"
                || trimmed == "- [x]"
                || trimmed == "* [x]"
            {
                continue;
            }
            return false;
        }

        true
    }

    /// Run the heartbeat loop until `stop()` is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        if !self.enabled {
            info!("heartbeat disabled");
            self.shutdown.notified().await;
            return Ok(());
        }

        info!(interval_s = self.interval_s, "heartbeat service started");

        loop {
            let sleep = std::time::Duration::from_secs(self.interval_s);
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {
                    self.tick().await;
                }
                _ = self.shutdown.notified() => {
                    info!("heartbeat service shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Stop the heartbeat service.
    pub fn stop(&self) {
        info!("stopping heartbeat service");
        self.shutdown.notify_waiters();
    }

    /// Execute a single heartbeat tick.
    async fn tick(&self) {
        let content = self.read_heartbeat_file();
        if Self::is_heartbeat_empty(content.as_deref()) {
            debug!("heartbeat: no tasks");
            return;
        }

        info!("heartbeat: checking for tasks");

        if let Some(ref callback) = self.on_heartbeat {
            match callback(HEARTBEAT_PROMPT.to_string()).await {
                Ok(response) => {
                    if response.to_uppercase().contains(HEARTBEAT_OK_TOKEN) {
                        info!("heartbeat: OK (no action needed)");
                    } else {
                        info!("heartbeat: completed task");
                    }
                }
                Err(e) => {
                    error!(error = %e, "heartbeat execution failed");
                }
            }
        }
    }

    /// Manually trigger a heartbeat (for CLI or testing).
    pub async fn trigger_now(&self) -> Option<anyhow::Result<String>> {
        if let Some(ref callback) = self.on_heartbeat {
            Some(callback(HEARTBEAT_PROMPT.to_string()).await)
        } else {
            None
        }
    }
}
