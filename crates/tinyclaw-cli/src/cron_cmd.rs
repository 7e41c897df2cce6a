//! `tinyclaw cron` — manage scheduled jobs from the command line.
//!
//! Operates on the same `cron/jobs.json` the gateway's scheduler uses;
//! changes are picked up on the next tick.

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use tinyclaw_core::bus::MessageBus;
use tinyclaw_core::config::load_config;
use tinyclaw_cron::{CronJob, CronPayload, CronSchedule, CronService};

#[derive(Subcommand)]
pub enum CronCommands {
    /// List all jobs
    List,

    /// Add a job
    Add {
        /// Job name
        name: String,

        /// Prompt the agent receives when the job fires
        #[arg(short, long)]
        message: String,

        /// Interval schedule in seconds
        #[arg(long, conflicts_with_all = ["at_ms", "cron"])]
        every: Option<u64>,

        /// One-shot schedule: Unix epoch milliseconds
        #[arg(long, conflicts_with_all = ["every", "cron"])]
        at_ms: Option<i64>,

        /// Cron expression schedule (5 fields)
        #[arg(long, conflicts_with_all = ["every", "at_ms"])]
        cron: Option<String>,

        /// Deliver the response to this channel
        #[arg(long, default_value = "cli")]
        channel: String,

        /// Chat id the response goes to
        #[arg(long, default_value = "default")]
        to: String,

        /// Deliver the response (otherwise it is discarded)
        #[arg(long, default_value_t = false)]
        deliver: bool,
    },

    /// Remove a job by id
    Remove { id: String },

    /// Enable a job by id
    Enable { id: String },

    /// Disable a job by id
    Disable { id: String },
}

/// Dispatch a cron subcommand.
pub async fn dispatch(action: CronCommands) -> Result<()> {
    let config = load_config(None)?;
    // The bus is only needed for delivery inside the gateway; CLI
    // management never publishes.
    let bus = Arc::new(MessageBus::new(1));
    let service = CronService::new(bus, config.cron_store_path());
    service.load().await?;

    match action {
        CronCommands::List => {
            let jobs = service.list_jobs().await;
            if jobs.is_empty() {
                println!("No scheduled jobs.");
                return Ok(());
            }
            for job in jobs {
                print_job(&job);
            }
            Ok(())
        }
        CronCommands::Add {
            name,
            message,
            every,
            at_ms,
            cron,
            channel,
            to,
            deliver,
        } => {
            let schedule = match (every, at_ms, cron) {
                (Some(seconds), None, None) => CronSchedule::Interval { seconds },
                (None, Some(epoch_ms), None) => CronSchedule::At { epoch_ms },
                (None, None, Some(expr)) => CronSchedule::Cron { expr },
                _ => anyhow::bail!("provide exactly one of --every, --at-ms, --cron"),
            };

            let mut job = CronJob::new(
                name,
                schedule,
                CronPayload {
                    channel,
                    chat_id: to,
                    content: message,
                    deliver,
                },
            );
            if matches!(job.schedule, CronSchedule::At { .. }) {
                job.delete_after_run = true;
            }

            let id = service.add_job(job).await?;
            println!("Added job {}", id.green());
            Ok(())
        }
        CronCommands::Remove { id } => {
            if service.remove_job(&id).await? {
                println!("Removed job {id}");
                Ok(())
            } else {
                anyhow::bail!("no job with id {id}")
            }
        }
        CronCommands::Enable { id } => {
            if service.set_enabled(&id, true).await? {
                println!("Enabled job {id}");
                Ok(())
            } else {
                anyhow::bail!("no job with id {id}")
            }
        }
        CronCommands::Disable { id } => {
            if service.set_enabled(&id, false).await? {
                println!("Disabled job {id}");
                Ok(())
            } else {
                anyhow::bail!("no job with id {id}")
            }
        }
    }
}

fn print_job(job: &CronJob) {
    let schedule = match &job.schedule {
        CronSchedule::Interval { seconds } => format!("every {seconds}s"),
        CronSchedule::At { epoch_ms } => format!("once at {epoch_ms}"),
        CronSchedule::Cron { expr } => format!("cron '{expr}'"),
    };
    let state = if job.enabled {
        "enabled".green().to_string()
    } else {
        "disabled".red().to_string()
    };

    println!(
        "  {} {} — {schedule} [{state}] runs: {}",
        job.id.cyan(),
        job.name.bold(),
        job.state.run_count
    );
    if let Some(err) = &job.state.last_error {
        println!("      last error: {}", err.red());
    }
}
