//! Session summarizer — asynchronous, single-flight history compression.
//!
//! Long histories get compressed in the background: the oldest messages
//! are batch-summarized through the same LLM, merged with any prior
//! summary, and the session is left with `[summary + recent tail]`. The
//! per-session lock is held only while snapshotting and while applying the
//! result, never across provider calls. One compression per key at a time;
//! duplicate triggers are no-ops. Failures leave the session untouched.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use tinyclaw_core::config::SummarizerConfig;
use tinyclaw_core::error::ProviderError;
use tinyclaw_core::session::SessionStore;
use tinyclaw_core::types::{Message, MessageContent};
use tinyclaw_providers::{LlmProvider, LlmRequestConfig};

use crate::locks::SessionLocks;

const BATCH_PROMPT: &str = "Summarize this conversation segment concisely. Preserve facts, \
     decisions, names, dates, and open tasks. Reply with prose only.";

const MERGE_PROMPT: &str = "Merge these partial conversation summaries into one concise \
     summary. Preserve facts, decisions, names, dates, and open tasks. Reply with prose only.";

/// Background history compressor.
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    sessions: Arc<SessionStore>,
    locks: Arc<SessionLocks>,
    model: String,
    request: LlmRequestConfig,
    config: SummarizerConfig,
    /// Model context window; combined with `config.token_percentage` for
    /// the token trigger.
    context_window: usize,
    /// Keys with a compression in flight.
    inflight: StdMutex<HashSet<String>>,
    tx: mpsc::UnboundedSender<String>,
    shutdown: Notify,
}

impl Summarizer {
    /// Create the summarizer and spawn its worker task.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        provider: Arc<dyn LlmProvider>,
        sessions: Arc<SessionStore>,
        locks: Arc<SessionLocks>,
        model: impl Into<String>,
        request: LlmRequestConfig,
        config: SummarizerConfig,
        context_window: usize,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::new(Self {
            provider,
            sessions,
            locks,
            model: model.into(),
            request,
            config,
            context_window,
            inflight: StdMutex::new(HashSet::new()),
            tx,
            shutdown: Notify::new(),
        });

        let worker = this.clone();
        tokio::spawn(async move { worker.run(rx).await });
        this
    }

    /// Trigger compression for `key` if it exceeds a threshold and no run
    /// is already in flight. Cheap; called after every completed turn.
    pub fn maybe_trigger(&self, key: &str) {
        let session = self.sessions.get_or_create(key);

        let over_messages = session.history.len() > self.config.message_threshold;
        let token_budget =
            (self.context_window as f64 * self.config.token_percentage) as usize;
        let over_tokens = session.estimated_tokens() > token_budget;
        if !over_messages && !over_tokens {
            return;
        }

        {
            let mut inflight = self.inflight.lock().unwrap();
            if !inflight.insert(key.to_string()) {
                debug!(key, "summarization already in flight");
                return;
            }
        }

        debug!(
            key,
            messages = session.history.len(),
            "queueing summarization"
        );
        if self.tx.send(key.to_string()).is_err() {
            self.inflight.lock().unwrap().remove(key);
        }
    }

    /// Stop the worker after the current job.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<String>) {
        info!("summarizer worker started");
        loop {
            tokio::select! {
                key = rx.recv() => {
                    let Some(key) = key else { break };
                    if let Err(e) = self.summarize(&key).await {
                        // Non-fatal: session left unchanged.
                        warn!(key = %key, error = %e, "summarization failed");
                    }
                    self.inflight.lock().unwrap().remove(&key);
                }
                _ = self.shutdown.notified() => {
                    info!("summarizer worker shutting down");
                    break;
                }
            }
        }
    }

    /// One compression pass for `key`.
    pub async fn summarize(&self, key: &str) -> Result<(), ProviderError> {
        // Snapshot under the session lock, then release it for the slow part.
        let lock = self.locks.lock_for(key);
        let snapshot = {
            let _guard = lock.lock().await;
            self.sessions.get_or_create(key)
        };

        let history = snapshot.history;
        let snapshot_len = history.len();
        let keep = self.config.recent_messages_to_keep;
        if snapshot_len <= keep {
            return Ok(());
        }

        // Expand the keep-window backward so no tool-call group splits.
        let mut split = snapshot_len - keep;
        while split > 0 && history[split].is_tool_result() {
            split -= 1;
        }
        if split == 0 {
            return Ok(());
        }

        let (old, tail) = history.split_at(split);

        // Batch the old messages by character budget and summarize each.
        let mut parts: Vec<String> = Vec::new();
        if !snapshot.summary.is_empty() {
            parts.push(snapshot.summary.clone());
        }
        for batch in batch_by_chars(old, self.config.batch_chars) {
            let summary = self.ask(BATCH_PROMPT, &batch).await?;
            parts.push(summary);
        }

        let merged = if parts.len() == 1 {
            parts.pop().unwrap_or_default()
        } else {
            self.ask(MERGE_PROMPT, &parts.join("\n\n---\n\n")).await?
        };

        // Apply under the lock; appends that arrived meanwhile survive.
        {
            let _guard = lock.lock().await;
            if let Err(e) =
                self.sessions
                    .replace_history(key, merged, tail.to_vec(), snapshot_len)
            {
                warn!(key, error = %e, "failed to persist compressed session");
            }
        }

        info!(
            key,
            compressed = split,
            kept = tail.len(),
            "session summarized"
        );
        Ok(())
    }

    async fn ask(&self, instruction: &str, body: &str) -> Result<String, ProviderError> {
        let messages = vec![
            Message::system(instruction),
            Message::user(body.to_string()),
        ];
        let response = self
            .provider
            .chat(&messages, None, &self.model, &self.request)
            .await?;
        Ok(response.content.unwrap_or_default())
    }
}

// ─────────────────────────────────────────────
// Rendering helpers
// ─────────────────────────────────────────────

/// Render messages as a plain transcript and cut it into batches of at
/// most `max_chars` characters (at least one message per batch).
fn batch_by_chars(messages: &[Message], max_chars: usize) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for msg in messages {
        let line = render_message(msg);
        if !current.is_empty() && current.len() + line.len() > max_chars {
            batches.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn render_message(msg: &Message) -> String {
    match msg {
        Message::System { content } => format!("System: {content}"),
        Message::User { content } => match content {
            MessageContent::Text(t) => format!("User: {t}"),
            MessageContent::Parts(_) => "User: (message with attachments)".to_string(),
        },
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let mut out = String::from("Assistant:");
            if let Some(text) = content {
                out.push(' ');
                out.push_str(text);
            }
            if let Some(calls) = tool_calls {
                for call in calls {
                    out.push_str(&format!(
                        " [calls {}({})]",
                        call.function.name, call.function.arguments
                    ));
                }
            }
            out
        }
        Message::Tool { content, .. } => format!("Tool result: {content}"),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
