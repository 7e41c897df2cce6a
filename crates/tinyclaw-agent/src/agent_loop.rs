//! Agent loop — the single entry point tying everything together.
//!
//! Workers pull inbound messages off the bus and run each through
//! `process_direct`: load session, build context, drive the executor,
//! maybe trigger the summarizer, reply. A per-session-key mutex map
//! serializes turns within one conversation while distinct keys run in
//! parallel (subject to the worker pool, default size 1).

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use tinyclaw_core::bus::{InboundMessage, MessageBus, OutboundMessage, SYSTEM_CHANNEL};
use tinyclaw_core::config::Config;
use tinyclaw_core::guard::SecurityGuard;
use tinyclaw_core::session::SessionStore;
use tinyclaw_cron::CronService;
use tinyclaw_providers::{ChunkSink, LlmProvider, LlmRequestConfig};

use crate::context::ContextBuilder;
use crate::executor::{ExecutorOptions, LlmExecutor};
use crate::locks::SessionLocks;
use crate::subagent::SubagentManager;
use crate::summarizer::Summarizer;
use crate::tools::cron::CronTool;
use crate::tools::filesystem::{
    AppendFileTool, EditFileTool, ListDirTool, ReadFileTool, WriteFileTool,
};
use crate::tools::message::MessageTool;
use crate::tools::registry::ToolRegistry;
use crate::tools::shell::ExecTool;
use crate::tools::skills_tool::SkillsTool;
use crate::tools::spawn::SpawnTool;
use crate::tools::web::{WebFetchTool, WebSearchTool};

/// The main agent loop.
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    sessions: Arc<SessionStore>,
    tools: Arc<ToolRegistry>,
    context: ContextBuilder,
    executor: LlmExecutor,
    locks: Arc<SessionLocks>,
    summarizer: Option<Arc<Summarizer>>,
    message_tool: Arc<MessageTool>,
    spawn_tool: Arc<SpawnTool>,
    cron_tool: Option<Arc<CronTool>>,
    workers: usize,
    /// Token budget for the history tail in each prompt.
    history_budget: usize,
    shutdown: Notify,
    /// Set once `stop()` is called; workers check it between turns so a
    /// signal arriving mid-turn isn't lost.
    stopping: std::sync::atomic::AtomicBool,
}

impl AgentLoop {
    /// Build the loop and its tool registry from config.
    pub fn new(
        bus: Arc<MessageBus>,
        provider: Arc<dyn LlmProvider>,
        sessions: Arc<SessionStore>,
        config: &Config,
        cron: Option<Arc<CronService>>,
        summarizer: Option<Arc<Summarizer>>,
        locks: Arc<SessionLocks>,
    ) -> Arc<Self> {
        let workspace = config.workspace_path();
        let guard = Arc::new(SecurityGuard::new(
            config
                .security
                .restrict_to_workspace
                .then(|| workspace.clone()),
            config.security.command_blacklist.as_deref(),
        ));

        let request = LlmRequestConfig {
            max_tokens: config.agent.max_tokens,
            temperature: config.agent.temperature,
        };
        let options = ExecutorOptions {
            max_iterations: config.agent.max_tool_iterations,
            request: request.clone(),
        };

        let tools = Arc::new(ToolRegistry::with_timeout(
            std::time::Duration::from_secs(config.tools.tool_timeout_s),
        ));
        tools.register(Arc::new(ReadFileTool::new(guard.clone())));
        tools.register(Arc::new(WriteFileTool::new(guard.clone())));
        tools.register(Arc::new(AppendFileTool::new(guard.clone())));
        tools.register(Arc::new(EditFileTool::new(guard.clone())));
        tools.register(Arc::new(ListDirTool::new(guard.clone())));
        tools.register(Arc::new(ExecTool::new(
            workspace.clone(),
            Some(config.tools.exec_timeout_s),
            guard.clone(),
        )));
        tools.register(Arc::new(WebSearchTool::new(
            config.tools.web_search_api_key.clone(),
        )));
        tools.register(Arc::new(WebFetchTool::new()));
        tools.register(Arc::new(SkillsTool::new(&workspace, guard.clone())));

        let message_tool = Arc::new(MessageTool::new(bus.clone()));
        tools.register(message_tool.clone());

        let subagents = Arc::new(SubagentManager::new(
            provider.clone(),
            sessions.clone(),
            bus.clone(),
            guard,
            workspace.clone(),
            config.agent.model.clone(),
            request,
            config.agent.max_tool_iterations,
            config.tools.exec_timeout_s,
            config.tools.web_search_api_key.clone(),
        ));
        let spawn_tool = Arc::new(SpawnTool::new(subagents));
        tools.register(spawn_tool.clone());

        let cron_tool = cron.map(|service| {
            let tool = Arc::new(CronTool::new(service));
            tools.register(tool.clone());
            tool
        });

        let executor = LlmExecutor::new(
            provider,
            tools.clone(),
            sessions.clone(),
            config.agent.model.clone(),
            options,
        );

        info!(
            model = %config.agent.model,
            tools = tools.len(),
            workers = config.gateway.workers,
            "agent loop initialized"
        );

        Arc::new(Self {
            bus,
            sessions,
            tools,
            context: ContextBuilder::new(workspace, config.agent.name.clone()),
            executor,
            locks,
            summarizer,
            message_tool,
            spawn_tool,
            cron_tool,
            workers: config.gateway.workers.max(1),
            history_budget: config.agent.context_window / 2,
            shutdown: Notify::new(),
            stopping: std::sync::atomic::AtomicBool::new(false),
        })
    }

    // ─────────────────────────────────────────
    // Bus consumption
    // ─────────────────────────────────────────

    /// Run the worker pool until `stop()` is called or the bus closes.
    pub async fn run(self: Arc<Self>) {
        info!(workers = self.workers, "agent loop started");

        let mut handles = Vec::new();
        for worker_id in 0..self.workers {
            let agent = self.clone();
            handles.push(tokio::spawn(async move { agent.worker(worker_id).await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("agent loop exited");
    }

    /// Signal all workers to exit after their current turn.
    pub fn stop(&self) {
        info!("stopping agent loop");
        self.stopping
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    async fn worker(&self, worker_id: usize) {
        debug!(worker_id, "worker started");
        loop {
            if self.stopping.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = self.shutdown.notified() => break,
                msg = self.bus.consume_inbound() => {
                    let Some(msg) = msg else { break };
                    self.handle_message(msg).await;
                }
            }
        }
        debug!(worker_id, "worker exited");
    }

    async fn handle_message(&self, msg: InboundMessage) {
        let session_key = self.target_session_key(&msg);
        debug!(session_key = %session_key, channel = %msg.channel, "received message");

        let reply = match self.process_direct(&msg).await {
            Ok(text) => text,
            Err(e) => {
                error!(session_key = %session_key, error = %e, "message processing error");
                format!("Error: {e}")
            }
        };

        if let Some((channel, chat_id)) = self.reply_route(&msg) {
            if let Err(e) = self
                .bus
                .publish_outbound(OutboundMessage::new(channel, chat_id, reply))
            {
                error!(error = %e, "failed to publish reply");
            }
        }
    }

    // ─────────────────────────────────────────
    // Direct processing
    // ─────────────────────────────────────────

    /// Process one inbound message synchronously and return the reply
    /// text. Provider failures surface as a one-line `LLM error: …` reply
    /// while the session keeps the user turn for the next retry.
    pub async fn process_direct(&self, msg: &InboundMessage) -> Result<String> {
        self.process_inner(msg, None).await
    }

    /// Streaming variant: assistant text chunks go to `on_chunk` as the
    /// provider emits them.
    pub async fn process_direct_stream(
        &self,
        msg: &InboundMessage,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String> {
        self.process_inner(msg, Some(on_chunk)).await
    }

    async fn process_inner(
        &self,
        msg: &InboundMessage,
        on_chunk: Option<ChunkSink<'_>>,
    ) -> Result<String> {
        let session_key = self.target_session_key(msg);
        // Tools that target "the current conversation" aim at the origin
        // channel for system-originated turns, not the system channel.
        let reply_channel = msg
            .metadata
            .get("origin")
            .filter(|o| msg.is_system() && !o.is_empty())
            .cloned()
            .unwrap_or_else(|| msg.channel.clone());
        let reply_chat = msg.chat_id.clone();

        // One turn at a time per conversation; held across the whole
        // tool-calling machine.
        let lock = self.locks.lock_for(&session_key);
        let guard = lock.lock().await;

        self.message_tool
            .set_context(&reply_channel, &reply_chat)
            .await;
        self.spawn_tool
            .set_context(&reply_channel, &reply_chat)
            .await;
        if let Some(cron_tool) = &self.cron_tool {
            cron_tool.set_context(&reply_channel, &reply_chat).await;
        }

        let session = self.sessions.get_or_create(&session_key);
        let tail = self
            .sessions
            .truncate_for_context(&session_key, self.history_budget);

        let media: Vec<String> = msg.media.iter().map(|m| m.path.clone()).collect();
        let user_message = ContextBuilder::user_message(&msg.content, &media);
        let messages = self.context.build_messages(
            &self.tools.summaries(),
            &session.summary,
            &tail,
            &user_message,
            &msg.channel,
            &session_key,
        );

        let result = match on_chunk {
            Some(sink) => {
                self.executor
                    .execute_stream(&session_key, messages, user_message, sink)
                    .await
            }
            None => self.executor.execute(&session_key, messages, user_message).await,
        };
        drop(guard);

        match result {
            Ok(text) => {
                if let Some(summarizer) = &self.summarizer {
                    summarizer.maybe_trigger(&session_key);
                }
                Ok(text)
            }
            Err(e) => {
                error!(session_key = %session_key, error = %e, "provider failure");
                Ok(format!("LLM error: {e}"))
            }
        }
    }

    // ─────────────────────────────────────────
    // Routing
    // ─────────────────────────────────────────

    /// The session a message belongs to.
    ///
    /// Scheduler and subagent messages arrive on the `system` channel with
    /// an `origin` channel in metadata; they fold into the originating
    /// conversation instead of a detached `system:*` session.
    fn target_session_key(&self, msg: &InboundMessage) -> String {
        if msg.is_system() {
            if let Some(origin) = msg.metadata.get("origin") {
                if !origin.is_empty() {
                    return format!("{origin}:{}", msg.chat_id);
                }
            }
        }
        msg.session_key()
    }

    /// Where (if anywhere) the reply should be delivered.
    ///
    /// System messages are silent unless they ask for delivery and name an
    /// origin channel.
    fn reply_route(&self, msg: &InboundMessage) -> Option<(String, String)> {
        if msg.channel == SYSTEM_CHANNEL {
            if msg.wants_delivery() {
                return msg
                    .metadata
                    .get("origin")
                    .filter(|o| !o.is_empty())
                    .map(|origin| (origin.clone(), msg.chat_id.clone()));
            }
            return None;
        }
        Some((msg.channel.clone(), msg.chat_id.clone()))
    }

    // ─────────────────────────────────────────
    // Service callbacks
    // ─────────────────────────────────────────

    /// Callback for the cron service: runs the synthetic message through
    /// the normal direct path.
    pub fn job_callback(self: &Arc<Self>) -> tinyclaw_cron::OnJobFn {
        let agent = self.clone();
        Arc::new(move |msg: InboundMessage| {
            let agent = agent.clone();
            Box::pin(async move { agent.process_direct(&msg).await })
        })
    }

    /// Callback for the heartbeat service: the prompt becomes a synthetic
    /// user turn on the system channel.
    pub fn heartbeat_callback(self: &Arc<Self>) -> tinyclaw_core::heartbeat::OnHeartbeatFn {
        let agent = self.clone();
        Arc::new(move |prompt: String| {
            let agent = agent.clone();
            Box::pin(async move {
                let msg = InboundMessage::new(SYSTEM_CHANNEL, "heartbeat", "heartbeat", prompt);
                agent.process_direct(&msg).await
            })
        })
    }

    /// The tool registry (for tests and extensions).
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
