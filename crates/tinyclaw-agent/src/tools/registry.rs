//! Tool registry — thread-safe `name → Tool` map with uniform dispatch.
//!
//! Execution always hands the LLM a string back: missing tools, failures,
//! and timeouts all become `error: …` tool results so the model can react
//! and recover. Long outputs are capped with a truncation marker; each
//! call's duration is recorded in the logs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use tinyclaw_core::types::ToolDefinition;
use tracing::{debug, info, warn};

use super::base::Tool;

/// Maximum characters returned from one tool call.
const MAX_OUTPUT_CHARS: usize = 10_000;

/// Default per-call timeout.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Stores tools keyed by name and dispatches calls.
///
/// Writes (register/unregister) happen once at startup; reads are the hot
/// path, so a `RwLock` fits.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    /// Create an empty registry with the default call timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT)
    }

    /// Create an empty registry with a specific per-call timeout.
    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "registered tool");
        self.tools
            .write()
            .unwrap()
            .insert(tool.name().to_string(), tool);
    }

    /// Unregister a tool by name. Returns the removed tool, if any.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let removed = self.tools.write().unwrap().remove(name);
        if removed.is_some() {
            info!(tool = name, "unregistered tool");
        }
        removed
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.read().unwrap().contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// LLM-facing definitions for all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .unwrap()
            .values()
            .map(|t| t.to_definition())
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Textual catalog for the system prompt, one `name — description`
    /// line per tool, sorted by name.
    pub fn summaries(&self) -> String {
        let tools = self.tools.read().unwrap();
        let mut lines: Vec<String> = tools
            .values()
            .map(|t| format!("- {} — {}", t.name(), t.description()))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// Execute a tool by name with the given parameters.
    ///
    /// The result is always a string for the LLM:
    /// - unknown tool → `error: unknown tool <name>`
    /// - tool failure → `error: <msg>`
    /// - per-call timeout → `error: timeout`
    /// - success → output, capped at [`MAX_OUTPUT_CHARS`]
    pub async fn execute(&self, name: &str, params: HashMap<String, Value>) -> String {
        let tool = match self.get(name) {
            Some(t) => t,
            None => {
                warn!(tool = name, "tool not found");
                return format!("error: unknown tool {name}");
            }
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.call_timeout, tool.execute(params)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                debug!(tool = name, elapsed_ms, output_len = output.len(), "tool ok");
                cap_output(output)
            }
            Ok(Err(e)) => {
                warn!(tool = name, elapsed_ms, error = %e, "tool failed");
                format!("error: {e}")
            }
            Err(_) => {
                warn!(tool = name, elapsed_ms, "tool timed out");
                "error: timeout".to_string()
            }
        }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.read().unwrap().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.read().unwrap().is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cap long tool output, marking how much was cut.
fn cap_output(output: String) -> String {
    if output.chars().count() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let kept: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
    let cut = output.chars().count() - MAX_OUTPUT_CHARS;
    format!("{kept}\n... (truncated, {cut} more chars)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "t": { "type": "string" } },
                "required": ["t"]
            })
        }
        async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
            Ok(params
                .get("t")
                .and_then(|v| v.as_str())
                .unwrap_or("(empty)")
                .to_string())
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
            anyhow::bail!("intentional failure")
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps past the call timeout"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    struct BigTool;

    #[async_trait]
    impl Tool for BigTool {
        fn name(&self) -> &str {
            "big"
        }
        fn description(&self) -> &str {
            "Returns a huge output"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
            Ok("x".repeat(MAX_OUTPUT_CHARS + 500))
        }
    }

    #[test]
    fn test_register_lookup_unregister() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.has("echo"));
        assert_eq!(reg.len(), 1);

        assert!(reg.unregister("echo").is_some());
        assert!(!reg.has("echo"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_definitions_sorted() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));
        reg.register(Arc::new(EchoTool));
        let defs = reg.definitions();
        assert_eq!(defs[0].function.name, "echo");
        assert_eq!(defs[1].function.name, "fail");
    }

    #[test]
    fn test_summaries_catalog() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(FailTool));
        let catalog = reg.summaries();
        assert!(catalog.contains("- echo — Echoes back the input"));
        assert!(catalog.contains("- fail — Always fails"));
        // Sorted order.
        assert!(catalog.find("echo").unwrap() < catalog.find("fail").unwrap());
    }

    #[tokio::test]
    async fn test_execute_success() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let mut params = HashMap::new();
        params.insert("t".into(), json!("hello"));
        assert_eq!(reg.execute("echo", params).await, "hello");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let reg = ToolRegistry::new();
        let result = reg.execute("missing", HashMap::new()).await;
        assert_eq!(result, "error: unknown tool missing");
    }

    #[tokio::test]
    async fn test_execute_failure_becomes_error_string() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));
        let result = reg.execute("fail", HashMap::new()).await;
        assert_eq!(result, "error: intentional failure");
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let reg = ToolRegistry::with_timeout(Duration::from_millis(50));
        reg.register(Arc::new(SlowTool));
        let result = reg.execute("slow", HashMap::new()).await;
        assert_eq!(result, "error: timeout");
    }

    #[tokio::test]
    async fn test_long_output_capped() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(BigTool));
        let result = reg.execute("big", HashMap::new()).await;
        assert!(result.len() < MAX_OUTPUT_CHARS + 100);
        assert!(result.contains("truncated"));
    }

    #[tokio::test]
    async fn test_concurrent_reads() {
        let reg = Arc::new(ToolRegistry::new());
        reg.register(Arc::new(EchoTool));

        let mut handles = Vec::new();
        for i in 0..8 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                let mut params = HashMap::new();
                params.insert("t".into(), json!(format!("{i}")));
                reg.execute("echo", params).await
            }));
        }
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap(), format!("{i}"));
        }
    }
}
