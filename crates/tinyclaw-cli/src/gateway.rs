//! Gateway command — the long-running service.
//!
//! Startup sequence:
//! 1. Load config, resolve workspace
//! 2. Create bus, session store, per-session locks
//! 3. Create provider, summarizer, cron service
//! 4. Create agent loop, wire the scheduler + heartbeat callbacks
//! 5. Run everything under `tokio::spawn`, wait for Ctrl+C
//! 6. Signal shutdown; workers exit after their current turn

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use tinyclaw_agent::{AgentLoop, SessionLocks, Summarizer};
use tinyclaw_channels::ChannelManager;
use tinyclaw_core::bus::MessageBus;
use tinyclaw_core::config::load_config;
use tinyclaw_core::heartbeat::HeartbeatService;
use tinyclaw_core::session::SessionStore;
use tinyclaw_cron::CronService;
use tinyclaw_providers::{create_provider, LlmRequestConfig};

use crate::helpers;

/// Run the gateway until Ctrl+C.
pub async fn run() -> Result<()> {
    println!();
    helpers::print_banner();
    println!("  Mode: Gateway");
    println!();

    let config = load_config(None)?;

    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;

    let bus = Arc::new(MessageBus::new(config.bus.capacity));
    let sessions = Arc::new(
        SessionStore::new(config.sessions_path()).context("failed to create session store")?,
    );
    let locks = Arc::new(SessionLocks::new());

    let provider = Arc::new(
        create_provider(&config.agent.model, &config.providers).map_err(|e| anyhow::anyhow!(e))?,
    );

    let summarizer = Summarizer::spawn(
        provider.clone(),
        sessions.clone(),
        locks.clone(),
        config.agent.model.clone(),
        LlmRequestConfig {
            max_tokens: config.agent.max_tokens,
            temperature: config.agent.temperature,
        },
        config.summarizer.clone(),
        config.agent.context_window,
    );

    let cron = Arc::new(CronService::new(bus.clone(), config.cron_store_path()));

    let agent = AgentLoop::new(
        bus.clone(),
        provider,
        sessions,
        &config,
        Some(cron.clone()),
        Some(summarizer.clone()),
        locks,
    );

    // Scheduler and heartbeat re-enter the loop through one-shot
    // callbacks, not back-references.
    cron.set_on_job(agent.job_callback()).await;

    let mut heartbeat = HeartbeatService::new(
        workspace.clone(),
        None,
        Some(config.heartbeat.interval_s),
        config.heartbeat.enabled,
    );
    heartbeat.set_on_heartbeat(agent.heartbeat_callback());
    let heartbeat = Arc::new(heartbeat);

    // Channel adapters register here; SDK integrations live outside this
    // workspace and are compiled in by downstream builds.
    let channels = Arc::new(ChannelManager::new(bus.clone()));

    info!(workspace = %workspace.display(), "gateway starting");

    let cron_task = {
        let cron = cron.clone();
        tokio::spawn(async move { cron.start().await })
    };
    let heartbeat_task = {
        let heartbeat = heartbeat.clone();
        tokio::spawn(async move { heartbeat.start().await })
    };
    let channels_task = {
        let channels = channels.clone();
        tokio::spawn(async move { channels.start_all().await })
    };
    let agent_task = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run().await })
    };

    println!("  Gateway running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.context("signal handler")?;
    println!("\n  Shutting down...");

    agent.stop();
    cron.stop();
    heartbeat.stop();
    summarizer.stop();
    channels.stop_all();

    let _ = agent_task.await;
    cron_task.abort();
    heartbeat_task.abort();
    channels_task.abort();

    info!("gateway stopped");
    Ok(())
}
