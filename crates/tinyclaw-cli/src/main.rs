//! TinyClaw CLI — entry point.
//!
//! # Commands
//!
//! - `tinyclaw agent [-m MESSAGE] [-s SESSION]` — chat (single-shot or REPL)
//! - `tinyclaw gateway` — long-running service: bus, agent loop, channels,
//!   scheduler, heartbeat
//! - `tinyclaw cron <list|add|remove|enable|disable>` — manage jobs
//! - `tinyclaw status` — show configuration and provider status
//! - `tinyclaw onboard` — initialize config + workspace
//!
//! Exit code 0 on success, 1 on any uncaught error.

mod cron_cmd;
mod gateway;
mod helpers;
mod onboard;
mod repl;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tinyclaw_agent::{AgentLoop, SessionLocks};
use tinyclaw_core::bus::{InboundMessage, MessageBus};
use tinyclaw_core::config::{load_config, Config};
use tinyclaw_core::session::SessionStore;
use tinyclaw_providers::create_provider;

/// 🦀 TinyClaw — long-running personal AI agent
#[derive(Parser)]
#[command(name = "tinyclaw", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single-shot or interactive REPL)
    Agent {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session identifier (format: "channel:id")
        #[arg(short, long, default_value = "cli:default")]
        session: String,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Start the gateway (channels + agent loop + scheduler + heartbeat)
    Gateway {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Manage scheduled jobs
    Cron {
        #[command(subcommand)]
        action: cron_cmd::CronCommands,
    },

    /// Show configuration and provider status
    Status,

    /// Initialize configuration and workspace
    Onboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Agent {
            message,
            session,
            logs,
        } => {
            init_logging(logs);
            run_agent(message, session).await
        }
        Commands::Gateway { logs } => {
            init_logging(logs);
            gateway::run().await
        }
        Commands::Cron { action } => {
            init_logging(false);
            cron_cmd::dispatch(action).await
        }
        Commands::Status => status::run(),
        Commands::Onboard => onboard::run(),
    }
}

// ─────────────────────────────────────────────
// Agent command
// ─────────────────────────────────────────────

async fn run_agent(message: Option<String>, session: String) -> Result<()> {
    let config = load_config(None)?;
    let agent = build_agent_loop(&config)?;
    let (channel, chat_id) = helpers::parse_session(&session);

    match message {
        Some(text) => {
            let msg = InboundMessage::new(&channel, "user", &chat_id, &text);
            let response = agent
                .process_direct(&msg)
                .await
                .context("agent processing failed")?;
            helpers::print_response(&response);
            Ok(())
        }
        None => repl::run(agent, &channel, &chat_id).await,
    }
}

/// Build a standalone `AgentLoop` (no scheduler/summarizer) from config.
fn build_agent_loop(config: &Config) -> Result<Arc<AgentLoop>> {
    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;

    let provider =
        create_provider(&config.agent.model, &config.providers).map_err(|e| anyhow::anyhow!(e))?;

    let bus = Arc::new(MessageBus::new(config.bus.capacity));
    let sessions = Arc::new(
        SessionStore::new(config.sessions_path()).context("failed to create session store")?,
    );
    let locks = Arc::new(SessionLocks::new());

    Ok(AgentLoop::new(
        bus,
        Arc::new(provider),
        sessions,
        config,
        None,
        None,
        locks,
    ))
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("tinyclaw=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
