//! Subagent manager — background task delegation.
//!
//! A spawned subagent gets its own session key, a restricted tool set
//! (files, shell, web), and the same iteration budget as the main loop.
//! When it finishes, the result re-enters the agent via a `system`
//! inbound message routed back to the originating conversation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use tinyclaw_core::bus::{InboundMessage, MessageBus, DELIVER_KEY, SYSTEM_CHANNEL};
use tinyclaw_core::guard::SecurityGuard;
use tinyclaw_core::session::SessionStore;
use tinyclaw_core::types::Message;
use tinyclaw_providers::{LlmProvider, LlmRequestConfig};

use crate::executor::{ExecutorOptions, LlmExecutor};
use crate::tools::filesystem::{
    AppendFileTool, EditFileTool, ListDirTool, ReadFileTool, WriteFileTool,
};
use crate::tools::registry::ToolRegistry;
use crate::tools::shell::ExecTool;
use crate::tools::web::{WebFetchTool, WebSearchTool};

/// Spawns and tracks background subagent tasks.
pub struct SubagentManager {
    provider: Arc<dyn LlmProvider>,
    sessions: Arc<SessionStore>,
    bus: Arc<MessageBus>,
    /// Restricted registry shared by all subagents.
    tools: Arc<ToolRegistry>,
    model: String,
    options: ExecutorOptions,
    /// Labels of currently running tasks.
    active: Mutex<Vec<String>>,
}

impl SubagentManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        sessions: Arc<SessionStore>,
        bus: Arc<MessageBus>,
        guard: Arc<SecurityGuard>,
        workspace: PathBuf,
        model: impl Into<String>,
        request: LlmRequestConfig,
        max_iterations: usize,
        exec_timeout_s: u64,
        web_search_api_key: Option<String>,
    ) -> Self {
        // Subagents get the side-effect basics but cannot message
        // channels, schedule jobs, or spawn further subagents directly.
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(ReadFileTool::new(guard.clone())));
        tools.register(Arc::new(WriteFileTool::new(guard.clone())));
        tools.register(Arc::new(AppendFileTool::new(guard.clone())));
        tools.register(Arc::new(EditFileTool::new(guard.clone())));
        tools.register(Arc::new(ListDirTool::new(guard.clone())));
        tools.register(Arc::new(ExecTool::new(
            workspace,
            Some(exec_timeout_s),
            guard,
        )));
        tools.register(Arc::new(WebSearchTool::new(web_search_api_key)));
        tools.register(Arc::new(WebFetchTool::new()));

        Self {
            provider,
            sessions,
            bus,
            tools,
            model: model.into(),
            options: ExecutorOptions {
                max_iterations,
                request,
            },
            active: Mutex::new(Vec::new()),
        }
    }

    /// Number of currently running subagent tasks.
    pub async fn task_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Launch a background subagent for `task`. Returns an immediate
    /// confirmation string for the calling LLM.
    pub async fn spawn(
        self: &Arc<Self>,
        task: String,
        label: Option<String>,
        origin_channel: String,
        origin_chat_id: String,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let label = label.unwrap_or_else(|| {
            tinyclaw_core::utils::truncate_string(&task, 40)
        });

        {
            let mut active = self.active.lock().await;
            active.push(label.clone());
        }

        let manager = self.clone();
        let task_label = label.clone();
        tokio::spawn(async move {
            manager
                .run_task(id, task, task_label, origin_channel, origin_chat_id)
                .await;
        });

        format!("Subagent [{label}] started. I'll report back when it completes.")
    }

    async fn run_task(
        self: Arc<Self>,
        id: String,
        task: String,
        label: String,
        origin_channel: String,
        origin_chat_id: String,
    ) {
        info!(id = %id, label = %label, "subagent started");

        let session_key = format!("spawn:{id}");
        let executor = LlmExecutor::new(
            self.provider.clone(),
            self.tools.clone(),
            self.sessions.clone(),
            self.model.clone(),
            self.options.clone(),
        );

        let system = format!(
            "You are a focused background subagent. Complete the assigned task \
             using your tools, then reply with a concise report of what you did \
             and found. Tools available:\n\n{}",
            self.tools.summaries()
        );
        let user = Message::user(task.clone());
        let messages = vec![Message::system(system), user.clone()];

        let report = match executor.execute(&session_key, messages, user).await {
            Ok(text) => text,
            Err(e) => {
                error!(id = %id, error = %e, "subagent failed");
                format!("Subagent [{label}] failed: {e}")
            }
        };

        {
            let mut active = self.active.lock().await;
            active.retain(|l| l != &label);
        }

        // Announce the result back through the bus; the main loop folds it
        // into the originating conversation and delivers the reply there.
        let mut announce = InboundMessage::new(
            SYSTEM_CHANNEL,
            "subagent",
            &origin_chat_id,
            format!("## Subagent result [{label}]\n\nTask: {task}\n\n{report}"),
        );
        announce
            .metadata
            .insert("origin".into(), origin_channel.clone());
        announce.metadata.insert(DELIVER_KEY.into(), "true".into());

        if self.bus.publish_inbound(announce).is_err() {
            error!(id = %id, "failed to announce subagent result (queue full)");
        }
        info!(id = %id, label = %label, "subagent finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tinyclaw_core::error::ProviderError;
    use tinyclaw_core::types::{LlmResponse, ToolDefinition};

    struct MockProvider;

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> Result<LlmResponse, ProviderError> {
            Ok(LlmResponse {
                content: Some("Task complete.".into()),
                ..Default::default()
            })
        }

        fn default_model(&self) -> &str {
            "mock"
        }
        fn display_name(&self) -> &str {
            "Mock"
        }
    }

    fn make_manager(dir: &tempfile::TempDir) -> (Arc<SubagentManager>, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new(16));
        let sessions = Arc::new(SessionStore::new(dir.path().join("sessions")).unwrap());
        let guard = Arc::new(SecurityGuard::new(None, None));
        let manager = Arc::new(SubagentManager::new(
            Arc::new(MockProvider),
            sessions,
            bus.clone(),
            guard,
            dir.path().to_path_buf(),
            "mock",
            LlmRequestConfig::default(),
            5,
            10,
            None,
        ));
        (manager, bus)
    }

    #[tokio::test]
    async fn test_spawn_confirms_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _bus) = make_manager(&dir);

        let confirmation = manager
            .spawn(
                "count the files".into(),
                Some("files".into()),
                "cli".into(),
                "default".into(),
            )
            .await;
        assert!(confirmation.contains("Subagent [files] started"));
    }

    #[tokio::test]
    async fn test_result_announced_on_bus_with_origin() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, bus) = make_manager(&dir);

        manager
            .spawn("do a thing".into(), None, "web".into(), "sid_3".into())
            .await;

        let announce = bus
            .consume_inbound_timeout(std::time::Duration::from_secs(5))
            .await
            .expect("expected subagent announcement");
        assert_eq!(announce.channel, SYSTEM_CHANNEL);
        assert_eq!(announce.sender_id, "subagent");
        assert_eq!(announce.chat_id, "sid_3");
        assert!(announce.content.contains("Subagent result"));
        assert!(announce.content.contains("Task complete."));
        assert_eq!(announce.metadata.get("origin").unwrap(), "web");
        assert!(announce.wants_delivery());
    }

    #[tokio::test]
    async fn test_label_defaults_to_task_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _bus) = make_manager(&dir);

        let confirmation = manager
            .spawn("short task".into(), None, "cli".into(), "default".into())
            .await;
        assert!(confirmation.contains("Subagent [short task] started"));
    }

    #[tokio::test]
    async fn test_restricted_toolset() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _bus) = make_manager(&dir);

        let names = manager.tools.tool_names();
        assert!(names.contains(&"read_file".to_string()));
        assert!(names.contains(&"exec".to_string()));
        assert!(!names.contains(&"message".to_string()));
        assert!(!names.contains(&"spawn".to_string()));
        assert!(!names.contains(&"cron".to_string()));
    }
}
