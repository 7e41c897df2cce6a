//! Cron type system — schedules, payloads, job state, and the store.
//!
//! All types serialize with `camelCase` keys; the job table persists as a
//! single JSON document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────
// Schedule
// ─────────────────────────────────────────────

/// When a job fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CronSchedule {
    /// Fire every `seconds` seconds.
    Interval { seconds: u64 },
    /// One-shot: fire once at a Unix-epoch-milliseconds timestamp.
    #[serde(rename_all = "camelCase")]
    At { epoch_ms: i64 },
    /// Standard 5-field cron expression (e.g. `"0 9 * * *"`).
    Cron { expr: String },
}

/// A cron expression failed to parse; the owning job gets disabled.
#[derive(Debug, Error)]
#[error("invalid cron expression '{expr}': {detail}")]
pub struct SchedulerParseError {
    pub expr: String,
    pub detail: String,
}

/// Compute the next firing strictly after `now_ms`.
///
/// - `Interval` → `now + seconds*1000`
/// - `At` → the timestamp itself (one-shot; the service clears it after
///   the run)
/// - `Cron` → next matching instant of the expression
pub fn compute_next_run(
    schedule: &CronSchedule,
    now_ms: i64,
) -> Result<Option<i64>, SchedulerParseError> {
    match schedule {
        CronSchedule::Interval { seconds } => Ok(Some(now_ms + (*seconds as i64) * 1000)),
        CronSchedule::At { epoch_ms } => Ok(Some(*epoch_ms)),
        CronSchedule::Cron { expr } => {
            let parsed: cron::Schedule =
                normalize_cron_expr(expr)
                    .parse()
                    .map_err(|e: cron::error::Error| SchedulerParseError {
                        expr: expr.clone(),
                        detail: e.to_string(),
                    })?;
            let now: DateTime<Utc> =
                DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now);
            Ok(parsed.after(&now).next().map(|t| t.timestamp_millis()))
        }
    }
}

/// The `cron` crate wants a seconds field; standard 5-field expressions
/// get `0` prepended so they fire at second zero of the matching minute.
fn normalize_cron_expr(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

// ─────────────────────────────────────────────
// Payload & state
// ─────────────────────────────────────────────

/// What a job does when it fires.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronPayload {
    /// Channel the response is delivered to (when `deliver`).
    pub channel: String,
    /// Chat id the prompt is attributed to.
    pub chat_id: String,
    /// Prompt text sent to the agent.
    pub content: String,
    /// Whether to deliver the agent's response to `channel`.
    pub deliver: bool,
}

/// Run status of a job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Error,
    Skipped,
}

/// Mutable per-job state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronJobState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    /// Completed runs since creation.
    pub run_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ─────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────

/// A scheduled job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// Short unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub payload: CronPayload,
    #[serde(default)]
    pub state: CronJobState,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
    /// Remove the job after a single run (one-shots).
    #[serde(default)]
    pub delete_after_run: bool,
}

fn default_true() -> bool {
    true
}

impl CronJob {
    /// Create a new job with a generated id.
    pub fn new(name: impl Into<String>, schedule: CronSchedule, payload: CronPayload) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            name: name.into(),
            enabled: true,
            schedule,
            payload,
            state: CronJobState::default(),
            created_at_ms: now,
            updated_at_ms: now,
            delete_after_run: false,
        }
    }

    /// Whether the job should fire at `now_ms`.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.enabled
            && self
                .state
                .next_run_at_ms
                .map(|next| now_ms >= next)
                .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────

/// Persistent job table (one JSON file).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronStore {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub jobs: Vec<CronJob>,
}

fn default_version() -> u32 {
    1
}

impl CronStore {
    pub fn new() -> Self {
        Self {
            version: 1,
            jobs: Vec::new(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&CronJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut CronJob> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn add(&mut self, job: CronJob) {
        self.jobs.push(job);
    }

    /// Remove a job by id. Returns whether it was found.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.id != id);
        self.jobs.len() < before
    }

    /// Ids of jobs due at `now_ms`.
    pub fn due_ids(&self, now_ms: i64) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|j| j.is_due(now_ms))
            .map(|j| j.id.clone())
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
