//! Memory — long-term notes and daily files the agent reads and writes.
//!
//! File-based, inside the workspace:
//! - **Long-term**: `memory/MEMORY.md` — persistent facts and preferences
//! - **Daily notes**: `memory/YYYY-MM-DD.md` — ephemeral daily context
//!
//! The context builder reads memory on every prompt build; the agent
//! writes it through the ordinary file tools.

use std::path::{Path, PathBuf};

use chrono::Utc;

/// File-based memory store.
pub struct MemoryStore {
    memory_dir: PathBuf,
    memory_file: PathBuf,
}

impl MemoryStore {
    /// Create a store rooted at `workspace/memory/` without touching the
    /// filesystem; directories appear on first write.
    pub fn new(workspace: &Path) -> Self {
        let memory_dir = workspace.join("memory");
        let memory_file = memory_dir.join("MEMORY.md");
        Self {
            memory_dir,
            memory_file,
        }
    }

    /// Path to the long-term memory file.
    pub fn memory_file(&self) -> &Path {
        &self.memory_file
    }

    /// Read the long-term memory file. Empty string if absent.
    pub fn read_long_term(&self) -> String {
        std::fs::read_to_string(&self.memory_file).unwrap_or_default()
    }

    /// Overwrite the long-term memory file.
    pub fn write_long_term(&self, content: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.memory_dir)?;
        std::fs::write(&self.memory_file, content)
    }

    /// Path to today's daily notes file.
    pub fn today_file(&self) -> PathBuf {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.memory_dir.join(format!("{today}.md"))
    }

    /// Read today's daily notes. Empty string if absent.
    pub fn read_today(&self) -> String {
        std::fs::read_to_string(self.today_file()).unwrap_or_default()
    }

    /// Append to today's notes, creating the file with a date header.
    pub fn append_today(&self, content: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.memory_dir)?;
        let path = self.today_file();
        if path.exists() {
            let mut existing = std::fs::read_to_string(&path)?;
            existing.push('\n');
            existing.push_str(content);
            std::fs::write(&path, existing)
        } else {
            let today = Utc::now().format("%Y-%m-%d").to_string();
            std::fs::write(&path, format!("# {today}\n\n{content}"))
        }
    }

    /// Build the memory block for the system prompt, or `None` when no
    /// memory exists yet.
    pub fn get_memory_context(&self) -> Option<String> {
        let mut sections = Vec::new();

        let long_term = self.read_long_term();
        if !long_term.trim().is_empty() {
            sections.push(format!("## Long-term Memory\n\n{long_term}"));
        }

        let today = self.read_today();
        if !today.trim().is_empty() {
            let date = Utc::now().format("%Y-%m-%d");
            sections.push(format!("## Today's Notes ({date})\n\n{today}"));
        }

        if sections.is_empty() {
            None
        } else {
            Some(format!("# Memory\n\n{}", sections.join("\n\n")))
        }
    }
}
