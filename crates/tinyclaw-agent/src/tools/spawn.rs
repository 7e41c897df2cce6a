//! Spawn tool — delegate a task to a background subagent.
//!
//! Returns an immediate confirmation to the LLM; the subagent's report
//! re-enters the loop via the bus when it finishes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::base::{optional_string, require_string, Tool};
use crate::subagent::SubagentManager;

/// Launch background subagent tasks.
pub struct SpawnTool {
    manager: Arc<SubagentManager>,
    /// Origin (channel, chat_id), set per-interaction so results route
    /// back to the right conversation.
    context: Mutex<(String, String)>,
}

impl SpawnTool {
    pub fn new(manager: Arc<SubagentManager>) -> Self {
        Self {
            manager,
            context: Mutex::new(("cli".into(), "default".into())),
        }
    }

    /// Set the current conversation context.
    pub async fn set_context(&self, channel: &str, chat_id: &str) {
        let mut ctx = self.context.lock().await;
        *ctx = (channel.to_string(), chat_id.to_string());
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to handle a task in the background. Use this for \
         complex or slow work that can run independently; the subagent \
         reports back here when done."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the subagent to complete"
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for the task"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let task = require_string(&params, "task")?;
        let label = optional_string(&params, "label");

        let (origin_channel, origin_chat_id) = {
            let ctx = self.context.lock().await;
            ctx.clone()
        };

        Ok(self
            .manager
            .spawn(task, label, origin_channel, origin_chat_id)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tinyclaw_core::bus::MessageBus;
    use tinyclaw_core::error::ProviderError;
    use tinyclaw_core::guard::SecurityGuard;
    use tinyclaw_core::session::SessionStore;
    use tinyclaw_core::types::{LlmResponse, Message, ToolDefinition};
    use tinyclaw_providers::{LlmProvider, LlmRequestConfig};

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
                content: Some("done".into()),
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

    fn make_tool(dir: &tempfile::TempDir) -> SpawnTool {
        let bus = Arc::new(MessageBus::new(16));
        let sessions = Arc::new(SessionStore::new(dir.path().join("sessions")).unwrap());
        let guard = Arc::new(SecurityGuard::new(None, None));
        let manager = Arc::new(SubagentManager::new(
            Arc::new(MockProvider),
            sessions,
            bus,
            guard,
            dir.path().to_path_buf(),
            "mock",
            LlmRequestConfig::default(),
            5,
            10,
            None,
        ));
        SpawnTool::new(manager)
    }

    #[tokio::test]
    async fn test_execute_returns_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);
        tool.set_context("web", "sid_1").await;

        let mut params = HashMap::new();
        params.insert("task".into(), json!("index the notes"));
        params.insert("label".into(), json!("indexing"));

        let result = tool.execute(params).await.unwrap();
        assert!(result.contains("Subagent [indexing] started"));
    }

    #[tokio::test]
    async fn test_missing_task_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);
        assert!(tool.execute(HashMap::new()).await.is_err());
    }

    #[test]
    fn test_definition_shape() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);
        let params = tool.parameters();
        let required = params["required"].as_array().unwrap();
        assert!(required.contains(&json!("task")));
        assert!(!required.contains(&json!("label")));
    }
}
