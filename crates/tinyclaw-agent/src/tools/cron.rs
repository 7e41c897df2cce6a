//! Cron tool — lets the agent manage its own scheduled jobs.
//!
//! CRUD over the scheduler's job store: list, add, remove, enable,
//! disable. Schedules come in the three service variants (interval,
//! one-shot timestamp, cron expression).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use tinyclaw_cron::{CronJob, CronPayload, CronSchedule, CronService};
use tokio::sync::Mutex;

use super::base::{optional_bool, optional_i64, optional_string, require_string, Tool};

/// Schedule or inspect time-triggered jobs.
pub struct CronTool {
    service: Arc<CronService>,
    /// Current conversation, used as the default job target.
    context: Mutex<(String, String)>,
}

impl CronTool {
    pub fn new(service: Arc<CronService>) -> Self {
        Self {
            service,
            context: Mutex::new(("cli".into(), "default".into())),
        }
    }

    /// Set the current conversation context.
    pub async fn set_context(&self, channel: &str, chat_id: &str) {
        let mut ctx = self.context.lock().await;
        *ctx = (channel.to_string(), chat_id.to_string());
    }

    fn parse_schedule(params: &HashMap<String, Value>) -> anyhow::Result<CronSchedule> {
        if let Some(seconds) = optional_i64(params, "every_seconds") {
            if seconds <= 0 {
                anyhow::bail!("every_seconds must be positive");
            }
            return Ok(CronSchedule::Interval {
                seconds: seconds as u64,
            });
        }
        if let Some(at_ms) = optional_i64(params, "at_ms") {
            return Ok(CronSchedule::At { epoch_ms: at_ms });
        }
        if let Some(expr) = optional_string(params, "cron") {
            return Ok(CronSchedule::Cron { expr });
        }
        anyhow::bail!("schedule required: one of every_seconds, at_ms, or cron")
    }

    fn render_job(job: &CronJob) -> String {
        let schedule = match &job.schedule {
            CronSchedule::Interval { seconds } => format!("every {seconds}s"),
            CronSchedule::At { epoch_ms } => format!("once at {epoch_ms}"),
            CronSchedule::Cron { expr } => format!("cron '{expr}'"),
        };
        let state = if job.enabled { "enabled" } else { "disabled" };
        format!(
            "[{}] {} ({schedule}, {state}, runs: {}{})",
            job.id,
            job.name,
            job.state.run_count,
            job.state
                .last_error
                .as_deref()
                .map(|e| format!(", last error: {e}"))
                .unwrap_or_default()
        )
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Manage scheduled jobs: action=list|add|remove|enable|disable. \
         For add, provide name, message, and one of every_seconds, at_ms (epoch), \
         or cron (5-field expression); set deliver=true to send the result back \
         to this conversation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "add", "remove", "enable", "disable"],
                    "description": "What to do"
                },
                "name": {
                    "type": "string",
                    "description": "Job name (for add)"
                },
                "message": {
                    "type": "string",
                    "description": "Prompt the agent receives when the job fires (for add)"
                },
                "every_seconds": {
                    "type": "integer",
                    "description": "Interval schedule in seconds (for add)"
                },
                "at_ms": {
                    "type": "integer",
                    "description": "One-shot schedule: Unix epoch ms (for add)"
                },
                "cron": {
                    "type": "string",
                    "description": "Cron expression schedule, 5 fields (for add)"
                },
                "deliver": {
                    "type": "boolean",
                    "description": "Deliver the job's response to the current conversation (for add)"
                },
                "id": {
                    "type": "string",
                    "description": "Job id (for remove/enable/disable)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let action = require_string(&params, "action")?;

        match action.as_str() {
            "list" => {
                let jobs = self.service.list_jobs().await;
                if jobs.is_empty() {
                    Ok("No scheduled jobs.".into())
                } else {
                    Ok(jobs.iter().map(Self::render_job).collect::<Vec<_>>().join("\n"))
                }
            }
            "add" => {
                let name = require_string(&params, "name")?;
                let message = require_string(&params, "message")?;
                let schedule = Self::parse_schedule(&params)?;
                let deliver = optional_bool(&params, "deliver");

                let (channel, chat_id) = {
                    let ctx = self.context.lock().await;
                    ctx.clone()
                };

                let mut job = CronJob::new(
                    name,
                    schedule,
                    CronPayload {
                        channel,
                        chat_id,
                        content: message,
                        deliver,
                    },
                );
                // One-shots clean themselves up.
                if matches!(job.schedule, CronSchedule::At { .. }) {
                    job.delete_after_run = true;
                }

                let id = self.service.add_job(job).await?;
                Ok(format!("Scheduled job {id}"))
            }
            "remove" => {
                let id = require_string(&params, "id")?;
                if self.service.remove_job(&id).await? {
                    Ok(format!("Removed job {id}"))
                } else {
                    anyhow::bail!("no job with id {id}")
                }
            }
            "enable" | "disable" => {
                let id = require_string(&params, "id")?;
                let enabled = action == "enable";
                if self.service.set_enabled(&id, enabled).await? {
                    Ok(format!("Job {id} {action}d"))
                } else {
                    anyhow::bail!("no job with id {id}")
                }
            }
            other => anyhow::bail!("unknown action: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyclaw_core::bus::MessageBus;

    fn make_tool(dir: &tempfile::TempDir) -> CronTool {
        let bus = Arc::new(MessageBus::new(8));
        let service = Arc::new(CronService::new(bus, dir.path().join("jobs.json")));
        CronTool::new(service)
    }

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);
        tool.set_context("cli", "default").await;

        let result = tool
            .execute(params(&[
                ("action", json!("add")),
                ("name", json!("standup")),
                ("message", json!("post the standup reminder")),
                ("every_seconds", json!(3600)),
                ("deliver", json!(true)),
            ]))
            .await
            .unwrap();
        assert!(result.starts_with("Scheduled job "));

        let listing = tool
            .execute(params(&[("action", json!("list"))]))
            .await
            .unwrap();
        assert!(listing.contains("standup"));
        assert!(listing.contains("every 3600s"));
    }

    #[tokio::test]
    async fn test_add_requires_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);

        let err = tool
            .execute(params(&[
                ("action", json!("add")),
                ("name", json!("x")),
                ("message", json!("y")),
            ]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("schedule required"));
    }

    #[tokio::test]
    async fn test_oneshot_marks_delete_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MessageBus::new(8));
        let service = Arc::new(CronService::new(bus, dir.path().join("jobs.json")));
        let tool = CronTool::new(service.clone());

        tool.execute(params(&[
            ("action", json!("add")),
            ("name", json!("once")),
            ("message", json!("fire once")),
            ("at_ms", json!(4_102_444_800_000_i64)),
        ]))
        .await
        .unwrap();

        let jobs = service.list_jobs().await;
        assert!(jobs[0].delete_after_run);
    }

    #[tokio::test]
    async fn test_remove_and_disable() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MessageBus::new(8));
        let service = Arc::new(CronService::new(bus, dir.path().join("jobs.json")));
        let tool = CronTool::new(service.clone());

        tool.execute(params(&[
            ("action", json!("add")),
            ("name", json!("j")),
            ("message", json!("m")),
            ("every_seconds", json!(60)),
        ]))
        .await
        .unwrap();
        let id = service.list_jobs().await[0].id.clone();

        tool.execute(params(&[("action", json!("disable")), ("id", json!(id.clone()))]))
            .await
            .unwrap();
        assert!(!service.get_job(&id).await.unwrap().enabled);

        tool.execute(params(&[("action", json!("remove")), ("id", json!(id.clone()))]))
            .await
            .unwrap();
        assert!(service.get_job(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);
        let err = tool
            .execute(params(&[("action", json!("explode"))]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown action"));
    }

    #[tokio::test]
    async fn test_list_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);
        let result = tool
            .execute(params(&[("action", json!("list"))]))
            .await
            .unwrap();
        assert_eq!(result, "No scheduled jobs.");
    }
}
