//! Filesystem tools — read, write, append, edit, list directory.
//!
//! Every path argument goes through the security guard before any
//! filesystem syscall; with workspace confinement enabled, escapes outside
//! the workspace come back as `Access denied` tool errors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use tinyclaw_core::guard::SecurityGuard;

use super::base::{require_string, Tool};

// ─────────────────────────────────────────────
// read_file
// ─────────────────────────────────────────────

/// Reads and returns the entire content of a file.
pub struct ReadFileTool {
    guard: Arc<SecurityGuard>,
}

impl ReadFileTool {
    pub fn new(guard: Arc<SecurityGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path. Returns the full text content."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let path_str = require_string(&params, "path")?;
        let path = self.guard.check_file_path(&path_str)?;

        if !path.is_file() {
            anyhow::bail!("file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        Ok(content)
    }
}

// ─────────────────────────────────────────────
// write_file
// ─────────────────────────────────────────────

/// Creates or overwrites a file with the given content.
pub struct WriteFileTool {
    guard: Arc<SecurityGuard>,
}

impl WriteFileTool {
    pub fn new(guard: Arc<SecurityGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if missing or overwriting if present. \
         Parent directories are created automatically."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path for the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let path_str = require_string(&params, "path")?;
        let content = require_string(&params, "content")?;
        let path = self.guard.check_file_path(&path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!("failed to create directory {}: {e}", parent.display())
                })?;
            }
        }

        let bytes = content.len();
        std::fs::write(&path, &content)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        Ok(format!("Wrote {bytes} bytes to {}", path.display()))
    }
}

// ─────────────────────────────────────────────
// append_file
// ─────────────────────────────────────────────

/// Appends content to the end of a file, creating it if missing.
pub struct AppendFileTool {
    guard: Arc<SecurityGuard>,
}

impl AppendFileTool {
    pub fn new(guard: Arc<SecurityGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "append_file"
    }

    fn description(&self) -> &str {
        "Append content to the end of a file, creating it (and parent directories) if missing. \
         Useful for logs and running notes."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to append to"
                },
                "content": {
                    "type": "string",
                    "description": "Content to append"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        use std::io::Write;

        let path_str = require_string(&params, "path")?;
        let content = require_string(&params, "content")?;
        let path = self.guard.check_file_path(&path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!("failed to create directory {}: {e}", parent.display())
                })?;
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;
        file.write_all(content.as_bytes())
            .map_err(|e| anyhow::anyhow!("failed to append to {}: {e}", path.display()))?;

        Ok(format!(
            "Appended {} bytes to {}",
            content.len(),
            path.display()
        ))
    }
}

// ─────────────────────────────────────────────
// edit_file
// ─────────────────────────────────────────────

/// Replaces a text snippet within a file (first occurrence).
pub struct EditFileTool {
    guard: Arc<SecurityGuard>,
}

impl EditFileTool {
    pub fn new(guard: Arc<SecurityGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing the first occurrence of `old_text` with `new_text`. \
         Include enough context in `old_text` to uniquely identify the replacement site."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "Exact text to find (include surrounding context for uniqueness)"
                },
                "new_text": {
                    "type": "string",
                    "description": "Text to replace old_text with"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let path_str = require_string(&params, "path")?;
        let old_text = require_string(&params, "old_text")?;
        let new_text = require_string(&params, "new_text")?;
        let path = self.guard.check_file_path(&path_str)?;

        if !path.is_file() {
            anyhow::bail!("file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;

        let count = content.matches(&old_text).count();
        if count == 0 {
            anyhow::bail!("old_text not found in {}", path.display());
        }

        let mut notice = String::new();
        if count > 1 {
            notice = format!(
                "Warning: old_text appears {count} times; only the first occurrence was replaced. "
            );
        }

        let updated = content.replacen(&old_text, &new_text, 1);
        std::fs::write(&path, &updated)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;

        Ok(format!("{notice}Edited {}", path.display()))
    }
}

// ─────────────────────────────────────────────
// list_dir
// ─────────────────────────────────────────────

/// Lists the contents of a directory.
pub struct ListDirTool {
    guard: Arc<SecurityGuard>,
}

impl ListDirTool {
    pub fn new(guard: Arc<SecurityGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory. Returns file and folder names with type markers."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory to list"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let path_str = require_string(&params, "path")?;
        let path = self.guard.check_file_path(&path_str)?;

        if !path.is_dir() {
            anyhow::bail!("not a directory: {}", path.display());
        }

        let mut dir_entries: Vec<_> = std::fs::read_dir(&path)
            .map_err(|e| anyhow::anyhow!("failed to read directory {}: {e}", path.display()))?
            .filter_map(|e| e.ok())
            .collect();
        dir_entries.sort_by_key(|e| e.file_name());

        let mut entries = Vec::new();
        for entry in dir_entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            if is_dir {
                entries.push(format!("{name}/"));
            } else {
                entries.push(name);
            }
        }

        if entries.is_empty() {
            Ok("(empty directory)".into())
        } else {
            Ok(entries.join("\n"))
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn make_params(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn open_guard() -> Arc<SecurityGuard> {
        Arc::new(SecurityGuard::new(None, None))
    }

    fn confined_guard(root: &Path) -> Arc<SecurityGuard> {
        Arc::new(SecurityGuard::new(Some(root.to_path_buf()), None))
    }

    // ── read_file ──

    #[tokio::test]
    async fn test_read_file_success() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "Hello, TinyClaw!").unwrap();

        let tool = ReadFileTool::new(open_guard());
        let result = tool
            .execute(make_params(&[("path", file.to_str().unwrap())]))
            .await
            .unwrap();
        assert_eq!(result, "Hello, TinyClaw!");
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let tool = ReadFileTool::new(open_guard());
        let result = tool
            .execute(make_params(&[("path", "/tmp/definitely_not_here_12345.txt")]))
            .await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_read_file_denied_outside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "nope").unwrap();

        let tool = ReadFileTool::new(confined_guard(&ws));
        let err = tool
            .execute(make_params(&[("path", secret.to_str().unwrap())]))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Access denied:"));
    }

    // ── write_file ──

    #[tokio::test]
    async fn test_write_file_create_and_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sub").join("deep").join("file.txt");

        let tool = WriteFileTool::new(open_guard());
        let result = tool
            .execute(make_params(&[
                ("path", file.to_str().unwrap()),
                ("content", "deep content"),
            ]))
            .await
            .unwrap();
        assert!(result.contains("Wrote"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "deep content");
    }

    #[tokio::test]
    async fn test_write_file_denied_no_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        let outside = dir.path().join("escape.txt");

        let tool = WriteFileTool::new(confined_guard(&ws));
        let err = tool
            .execute(make_params(&[
                ("path", outside.to_str().unwrap()),
                ("content", "x"),
            ]))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Access denied:"));
        assert!(!outside.exists());
    }

    // ── append_file ──

    #[tokio::test]
    async fn test_append_file_creates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.txt");

        let tool = AppendFileTool::new(open_guard());
        tool.execute(make_params(&[
            ("path", file.to_str().unwrap()),
            ("content", "line 1\n"),
        ]))
        .await
        .unwrap();
        tool.execute(make_params(&[
            ("path", file.to_str().unwrap()),
            ("content", "line 2\n"),
        ]))
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "line 1\nline 2\n");
    }

    // ── edit_file ──

    #[tokio::test]
    async fn test_edit_file_success() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("edit.txt");
        std::fs::write(&file, "Hello World").unwrap();

        let tool = EditFileTool::new(open_guard());
        let result = tool
            .execute(make_params(&[
                ("path", file.to_str().unwrap()),
                ("old_text", "World"),
                ("new_text", "TinyClaw"),
            ]))
            .await
            .unwrap();
        assert!(result.contains("Edited"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "Hello TinyClaw");
    }

    #[tokio::test]
    async fn test_edit_file_old_text_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("edit.txt");
        std::fs::write(&file, "ABC").unwrap();

        let tool = EditFileTool::new(open_guard());
        let result = tool
            .execute(make_params(&[
                ("path", file.to_str().unwrap()),
                ("old_text", "XYZ"),
                ("new_text", "123"),
            ]))
            .await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_edit_file_multiple_occurrences_warns() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("multi.txt");
        std::fs::write(&file, "aaa bbb aaa").unwrap();

        let tool = EditFileTool::new(open_guard());
        let result = tool
            .execute(make_params(&[
                ("path", file.to_str().unwrap()),
                ("old_text", "aaa"),
                ("new_text", "ccc"),
            ]))
            .await
            .unwrap();
        assert!(result.contains("Warning"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "ccc bbb aaa");
    }

    // ── list_dir ──

    #[tokio::test]
    async fn test_list_dir_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file_a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let tool = ListDirTool::new(open_guard());
        let result = tool
            .execute(make_params(&[("path", dir.path().to_str().unwrap())]))
            .await
            .unwrap();
        assert!(result.contains("file_a.txt"));
        assert!(result.contains("subdir/"));
    }

    #[tokio::test]
    async fn test_list_dir_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool::new(open_guard());
        let result = tool
            .execute(make_params(&[("path", dir.path().to_str().unwrap())]))
            .await
            .unwrap();
        assert_eq!(result, "(empty directory)");
    }

    #[tokio::test]
    async fn test_list_dir_on_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "").unwrap();

        let tool = ListDirTool::new(open_guard());
        assert!(tool
            .execute(make_params(&[("path", file.to_str().unwrap())]))
            .await
            .is_err());
    }

    // ── definitions ──

    #[test]
    fn test_tool_names() {
        let guard = open_guard();
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(ReadFileTool::new(guard.clone())),
            Box::new(WriteFileTool::new(guard.clone())),
            Box::new(AppendFileTool::new(guard.clone())),
            Box::new(EditFileTool::new(guard.clone())),
            Box::new(ListDirTool::new(guard)),
        ];
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec!["read_file", "write_file", "append_file", "edit_file", "list_dir"]
        );
        for tool in &tools {
            let def = tool.to_definition();
            assert_eq!(def.tool_type, "function");
            assert!(!def.function.description.is_empty());
        }
    }
}
