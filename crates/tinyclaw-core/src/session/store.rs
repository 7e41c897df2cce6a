//! Session store — in-memory cache with write-through JSON persistence.
//!
//! Thread-safe via `RwLock`. Disk writes are atomic (write-to-temp +
//! rename) so a crash mid-write never corrupts a session file. A failed
//! write is reported but the in-memory copy is still updated, so the
//! conversation continues on the cached state.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::SessionIoError;
use crate::types::{Message, Session};
use crate::utils;

/// Maps `session_key → Session`, persisted one JSON file per key.
pub struct SessionStore {
    /// Directory where session files are stored.
    sessions_dir: PathBuf,
    /// In-memory cache of active sessions.
    cache: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create a new session store rooted at `sessions_dir`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(sessions_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&sessions_dir)?;
        Ok(SessionStore {
            sessions_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get an existing session or create a new empty one.
    ///
    /// 1. Check the in-memory cache
    /// 2. Try to load from disk
    /// 3. Fall back to a fresh empty session
    pub fn get_or_create(&self, key: &str) -> Session {
        {
            let cache = self.cache.read().unwrap();
            if let Some(session) = cache.get(key) {
                return session.clone();
            }
        }

        let session = self.load_from_disk(key).unwrap_or_else(|| Session::new(key));
        let mut cache = self.cache.write().unwrap();
        cache
            .entry(key.to_string())
            .or_insert(session)
            .clone()
    }

    /// Append one message to a session and persist.
    pub fn append(&self, key: &str, message: Message) -> Result<(), SessionIoError> {
        self.append_all(key, vec![message])
    }

    /// Append a batch of messages (e.g. an assistant tool-call turn plus its
    /// results) and persist once.
    ///
    /// The in-memory copy is always updated; a disk failure is returned for
    /// logging but does not lose the turn.
    pub fn append_all(&self, key: &str, messages: Vec<Message>) -> Result<(), SessionIoError> {
        let snapshot = {
            let mut cache = self.cache.write().unwrap();
            let session = cache
                .entry(key.to_string())
                .or_insert_with(|| Session::new(key));
            session.history.extend(messages);
            session.updated_at_ms = utils::now_ms();
            session.clone()
        };
        self.persist(&snapshot)
    }

    /// Replace a session's compacted history. Used only by the summarizer.
    ///
    /// `snapshot_len` is the history length the summarizer observed when it
    /// snapshotted. Messages appended after that point are preserved
    /// verbatim after the new tail.
    pub fn replace_history(
        &self,
        key: &str,
        summary: String,
        tail: Vec<Message>,
        snapshot_len: usize,
    ) -> Result<(), SessionIoError> {
        let snapshot = {
            let mut cache = self.cache.write().unwrap();
            let session = cache
                .entry(key.to_string())
                .or_insert_with(|| Session::new(key));

            let appended_since: Vec<Message> = if session.history.len() > snapshot_len {
                session.history[snapshot_len..].to_vec()
            } else {
                Vec::new()
            };

            session.history = tail;
            session.history.extend(appended_since);
            session.summary = summary;
            session.updated_at_ms = utils::now_ms();
            session.clone()
        };
        self.persist(&snapshot)
    }

    /// Return the newest history suffix fitting `max_tokens` (chars/4
    /// estimate) without splitting a tool-call group.
    ///
    /// An assistant message carrying `tool_calls` and its `role=tool`
    /// answers are kept together or dropped together.
    pub fn truncate_for_context(&self, key: &str, max_tokens: usize) -> Vec<Message> {
        let session = self.get_or_create(key);
        truncate_history(&session.history, max_tokens)
    }

    /// Clear all messages and the summary (reset conversation).
    pub fn clear(&self, key: &str) -> Result<(), SessionIoError> {
        let snapshot = {
            let mut cache = self.cache.write().unwrap();
            let session = cache
                .entry(key.to_string())
                .or_insert_with(|| Session::new(key));
            session.history.clear();
            session.summary.clear();
            session.updated_at_ms = utils::now_ms();
            session.clone()
        };
        self.persist(&snapshot)
    }

    /// Delete a session entirely (cache and disk).
    ///
    /// Returns `true` if the session file existed on disk.
    pub fn delete(&self, key: &str) -> bool {
        {
            let mut cache = self.cache.write().unwrap();
            cache.remove(key);
        }

        let path = self.session_path(key);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(key = %key, error = %e, "failed to delete session file");
                return false;
            }
            true
        } else {
            false
        }
    }

    /// List all sessions on disk, newest first.
    pub fn list_sessions(&self) -> Vec<SessionSummaryInfo> {
        let mut summaries = Vec::new();

        let entries = match std::fs::read_dir(&self.sessions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to read sessions directory");
                return summaries;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Ok(data) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(session) = serde_json::from_str::<Session>(&data) {
                summaries.push(SessionSummaryInfo {
                    key: session.key,
                    message_count: session.history.len(),
                    has_summary: !session.summary.is_empty(),
                    updated_at_ms: session.updated_at_ms,
                    path,
                });
            }
        }

        summaries.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        summaries
    }

    // ─────────────────────────────────────────
    // Disk I/O
    // ─────────────────────────────────────────

    /// The JSON file path for a session key (`:` escaped for portability).
    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", utils::safe_filename(key)))
    }

    fn load_from_disk(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key);
        if !path.exists() {
            return None;
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to open session file");
                return None;
            }
        };

        let mut session: Session = match serde_json::from_str(&data) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to parse session file");
                return None;
            }
        };

        session.key = key.to_string();
        let dropped = repair_history(&mut session.history);
        if dropped > 0 {
            warn!(key = %key, dropped = dropped, "discarded orphan tool messages on reload");
        }
        debug!(key = %key, messages = session.history.len(), "loaded session from disk");
        Some(session)
    }

    /// Atomic write: serialize to a temp file in the same directory, then
    /// rename over the target.
    fn persist(&self, session: &Session) -> Result<(), SessionIoError> {
        let io_err = |source| SessionIoError {
            key: session.key.clone(),
            source,
        };

        let path = self.session_path(&session.key);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }
}

/// Summary of a session for listing purposes.
#[derive(Clone, Debug)]
pub struct SessionSummaryInfo {
    pub key: String,
    pub message_count: usize,
    pub has_summary: bool,
    pub updated_at_ms: i64,
    pub path: PathBuf,
}

// ─────────────────────────────────────────────
// History helpers
// ─────────────────────────────────────────────

/// Drop `role=tool` messages whose `tool_call_id` was never announced by a
/// preceding assistant message. Returns how many were dropped.
pub fn repair_history(history: &mut Vec<Message>) -> usize {
    let mut announced: HashSet<String> = HashSet::new();
    let before = history.len();

    history.retain(|msg| match msg {
        Message::Assistant {
            tool_calls: Some(calls),
            ..
        } => {
            for call in calls {
                announced.insert(call.id.clone());
            }
            true
        }
        Message::Tool { tool_call_id, .. } => announced.contains(tool_call_id),
        _ => true,
    });

    before - history.len()
}

/// Newest suffix of `history` fitting `max_tokens`, aligned so it never
/// starts inside a tool-call group.
pub fn truncate_history(history: &[Message], max_tokens: usize) -> Vec<Message> {
    let mut budget = max_tokens as i64;
    let mut start = history.len();
    while start > 0 {
        let cost = history[start - 1].estimated_tokens() as i64;
        if budget - cost < 0 {
            break;
        }
        budget -= cost;
        start -= 1;
    }

    // A suffix beginning with tool results would orphan them from their
    // assistant turn; drop the split group's remnants instead.
    while start < history.len() && history[start].is_tool_result() {
        start += 1;
    }

    history[start..].to_vec()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
