//! Shell tool — execute commands in a subprocess.
//!
//! The command passes the guard's blacklist and the working directory
//! passes confinement before anything is spawned. Stdout and stderr are
//! merged and length-capped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::info;

use tinyclaw_core::guard::SecurityGuard;

use super::base::{optional_string, require_string, Tool};

/// Maximum output length before truncation (characters).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Execute shell commands in a subprocess.
pub struct ExecTool {
    /// Default working directory for commands.
    working_dir: PathBuf,
    /// Command timeout.
    timeout: Duration,
    /// Sandbox checks for the command text and working directory.
    guard: Arc<SecurityGuard>,
}

impl ExecTool {
    /// Create a new `ExecTool`.
    pub fn new(working_dir: PathBuf, timeout_secs: Option<u64>, guard: Arc<SecurityGuard>) -> Self {
        Self {
            working_dir,
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            guard,
        }
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. \
         Use this for running builds, tests, git, or any CLI tool."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory (defaults to the workspace root)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let command = require_string(&params, "command")?;

        // Both checks run before any spawn.
        self.guard.check_command(&command)?;
        let cwd = match optional_string(&params, "working_dir") {
            Some(dir) => self.guard.check_working_dir(std::path::Path::new(&dir))?,
            None => self.working_dir.clone(),
        };

        info!(command = %command, cwd = %cwd.display(), "executing shell command");

        let child = Command::new(if cfg!(target_os = "windows") { "cmd" } else { "sh" })
            .args(if cfg!(target_os = "windows") {
                vec!["/C", &command]
            } else {
                vec!["-c", &command]
            })
            .current_dir(&cwd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn command: {e}"))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let code = output.status.code().unwrap_or(-1);

                let mut parts = Vec::new();
                if !stdout.is_empty() {
                    parts.push(stdout);
                }
                if !stderr.is_empty() {
                    parts.push(format!("STDERR:\n{stderr}"));
                }
                if code != 0 {
                    parts.push(format!("Exit code: {code}"));
                }

                let mut combined = if parts.is_empty() {
                    "(no output)".to_string()
                } else {
                    parts.join("\n")
                };

                if combined.len() > MAX_OUTPUT_LEN {
                    let cut = combined.len() - MAX_OUTPUT_LEN;
                    combined.truncate(MAX_OUTPUT_LEN);
                    combined.push_str(&format!("\n... (truncated, {cut} more chars)"));
                }

                Ok(combined)
            }
            Ok(Err(e)) => anyhow::bail!("command failed: {e}"),
            Err(_) => Ok(format!(
                "error: command timed out after {} seconds",
                self.timeout.as_secs()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_params(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn open_guard() -> Arc<SecurityGuard> {
        Arc::new(SecurityGuard::new(None, None))
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool::new(dir.path().to_path_buf(), Some(10), open_guard());
        let result = tool
            .execute(make_params(&[("command", "echo hello")]))
            .await
            .unwrap();
        assert!(result.contains("hello"));
    }

    #[tokio::test]
    async fn test_exec_merges_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool::new(dir.path().to_path_buf(), Some(10), open_guard());
        let result = tool
            .execute(make_params(&[("command", "echo out; echo err 1>&2; exit 3")]))
            .await
            .unwrap();
        assert!(result.contains("out"));
        assert!(result.contains("STDERR:"));
        assert!(result.contains("err"));
        assert!(result.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn test_exec_blocked_command_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let tool = ExecTool::new(dir.path().to_path_buf(), Some(10), open_guard());

        let cmd = format!("sudo touch {}", marker.display());
        let err = tool
            .execute(make_params(&[("command", &cmd)]))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Access denied:"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_exec_working_dir_confined() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        let guard = Arc::new(SecurityGuard::new(Some(ws.clone()), None));
        let tool = ExecTool::new(ws.clone(), Some(10), guard);

        let mut params = make_params(&[("command", "pwd")]);
        params.insert("working_dir".into(), json!("/"));
        let err = tool.execute(params).await.unwrap_err();
        assert!(err.to_string().starts_with("Access denied:"));
    }

    #[tokio::test]
    async fn test_exec_working_dir_override_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let guard = Arc::new(SecurityGuard::new(Some(dir.path().to_path_buf()), None));
        let tool = ExecTool::new(dir.path().to_path_buf(), Some(10), guard);

        let mut params = make_params(&[("command", "pwd")]);
        params.insert("working_dir".into(), json!(sub.to_str().unwrap()));
        let result = tool.execute(params).await.unwrap();
        assert!(result.contains("sub"));
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool::new(dir.path().to_path_buf(), Some(1), open_guard());
        let result = tool
            .execute(make_params(&[("command", "sleep 30")]))
            .await
            .unwrap();
        assert!(result.contains("timed out"));
    }

    #[tokio::test]
    async fn test_exec_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool::new(dir.path().to_path_buf(), Some(10), open_guard());
        let result = tool
            .execute(make_params(&[("command", "true")]))
            .await
            .unwrap();
        assert_eq!(result, "(no output)");
    }

    #[test]
    fn test_tool_definition() {
        let tool = ExecTool::new(PathBuf::from("/tmp"), None, open_guard());
        let def = tool.to_definition();
        assert_eq!(def.function.name, "exec");
        assert_eq!(def.tool_type, "function");
    }
}
