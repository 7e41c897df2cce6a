//! Context builder — assembles the message list sent to the LLM.
//!
//! Composition order, per request:
//! 1. one system message: identity, workspace persona docs, session
//!    metadata (time, channel, key), tool catalog, skills catalog, memory
//! 2. a second system message with the session summary, when one exists
//! 3. the token-budgeted history tail
//! 4. the new user message

use std::path::PathBuf;

use base64::Engine;
use chrono::Utc;
use tracing::debug;

use tinyclaw_core::types::{ContentPart, ImageUrl, Message};

use crate::memory::MemoryStore;
use crate::skills::SkillsLoader;

/// Persona files injected into the system prompt when present in the
/// workspace root. Missing files are treated as empty.
const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "IDENTITY.md"];

/// Builds system prompts and full message lists for the agent loop.
pub struct ContextBuilder {
    workspace: PathBuf,
    agent_name: String,
    memory: MemoryStore,
    skills: SkillsLoader,
}

impl ContextBuilder {
    pub fn new(workspace: impl Into<PathBuf>, agent_name: impl Into<String>) -> Self {
        let workspace = workspace.into();
        let memory = MemoryStore::new(&workspace);
        let skills = SkillsLoader::new(&workspace, None);
        Self {
            workspace,
            agent_name: agent_name.into(),
            memory,
            skills,
        }
    }

    /// Use a built-in skills directory alongside the workspace one.
    pub fn with_builtin_skills(mut self, path: PathBuf) -> Self {
        self.skills = SkillsLoader::new(&self.workspace, Some(path));
        self
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn skills(&self) -> &SkillsLoader {
        &self.skills
    }

    // ────────────── System prompt ──────────────

    /// Build the full system prompt.
    pub fn build_system_prompt(&self, tool_catalog: &str, channel: &str, session_key: &str) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(self.build_identity(channel, session_key));

        for filename in BOOTSTRAP_FILES {
            let path = self.workspace.join(filename);
            if path.is_file() {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    debug!(file = filename, "loaded persona file");
                    parts.push(format!("## {filename}\n\n{content}"));
                }
            }
        }

        if !tool_catalog.is_empty() {
            parts.push(format!(
                "# Tools\n\nYou can call these tools:\n\n{tool_catalog}"
            ));
        }

        let always_skills = self.skills.always_skills_content();
        if !always_skills.is_empty() {
            parts.push(format!("# Active Skills\n\n{always_skills}"));
        }

        let skills_summary = self.skills.build_skills_summary();
        if !skills_summary.is_empty() {
            parts.push(format!(
                "# Skills\n\n\
                 The following skills extend your capabilities. \
                 To use one, read its SKILL.md with the `read_file` tool.\n\
                 Skills with available=\"false\" need dependencies installed first.\n\n\
                 {skills_summary}"
            ));
        }

        if let Some(memory) = self.memory.get_memory_context() {
            parts.push(memory);
        }

        parts.join("\n\n---\n\n")
    }

    /// Core identity block with session metadata.
    fn build_identity(&self, channel: &str, session_key: &str) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let workspace = self.workspace.display();
        let memory_file = self.memory.memory_file().display();

        format!(
            "# Identity\n\n\
             You are **{name}**, a personal AI assistant.\n\n\
             - **Date/time**: {now}\n\
             - **Channel**: {channel}\n\
             - **Session**: {session_key}\n\
             - **Workspace**: `{workspace}`\n\n\
             Use your tools to read and write files, run commands, search the \
             web, schedule jobs, and message channels. Prefer tools over \
             guessing. Be concise and helpful.\n\n\
             ## Memory\n\n\
             When you learn something important about the user or an ongoing \
             task, persist it to `{memory_file}` with the file tools.",
            name = self.agent_name,
        )
    }

    // ────────────── Message building ──────────────

    /// Build the full message list for one LLM call.
    pub fn build_messages(
        &self,
        tool_catalog: &str,
        summary: &str,
        history: &[Message],
        user_message: &Message,
        channel: &str,
        session_key: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 3);

        messages.push(Message::system(self.build_system_prompt(
            tool_catalog,
            channel,
            session_key,
        )));

        if !summary.is_empty() {
            messages.push(Message::system(format!(
                "Summary of earlier conversation: {summary}"
            )));
        }

        messages.extend_from_slice(history);
        messages.push(user_message.clone());
        messages
    }

    /// Build the user message, inlining image attachments as base64 data
    /// URIs. Audio files are skipped; their transcription is assumed to be
    /// in the text already.
    pub fn user_message(text: &str, media_paths: &[String]) -> Message {
        if media_paths.is_empty() {
            return Message::user(text);
        }

        let mut parts = Vec::new();
        for path in media_paths {
            if is_audio_extension(path) {
                continue;
            }
            if let Ok(data) = std::fs::read(path) {
                let mime = guess_mime(path);
                let b64 = base64::engine::general_purpose::STANDARD.encode(&data);
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{mime};base64,{b64}"),
                        detail: None,
                    },
                });
            }
        }

        if parts.is_empty() {
            return Message::user(text);
        }

        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
        Message::user_parts(parts)
    }
}

fn is_audio_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    [
        ".ogg", ".oga", ".opus", ".mp3", ".m4a", ".wav", ".flac", ".aac", ".wma",
    ]
    .iter()
    .any(|ext| lower.ends_with(ext))
}

fn guess_mime(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_contains_session_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ContextBuilder::new(dir.path(), "TinyClaw");
        let prompt = ctx.build_system_prompt("", "cli", "cli:default");
        assert!(prompt.contains("TinyClaw"));
        assert!(prompt.contains("**Channel**: cli"));
        assert!(prompt.contains("**Session**: cli:default"));
    }

    #[test]
    fn test_persona_files_injected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "# Agent rules\nBe helpful.").unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "Dry wit.").unwrap();

        let ctx = ContextBuilder::new(dir.path(), "TinyClaw");
        let prompt = ctx.build_system_prompt("", "cli", "cli:default");
        assert!(prompt.contains("## AGENTS.md"));
        assert!(prompt.contains("Be helpful."));
        assert!(prompt.contains("Dry wit."));
    }

    #[test]
    fn test_tool_catalog_injected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ContextBuilder::new(dir.path(), "TinyClaw");
        let prompt =
            ctx.build_system_prompt("- read_file — Read a file", "cli", "cli:default");
        assert!(prompt.contains("# Tools"));
        assert!(prompt.contains("- read_file — Read a file"));
    }

    #[test]
    fn test_memory_injected_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mem_dir = dir.path().join("memory");
        std::fs::create_dir(&mem_dir).unwrap();
        std::fs::write(mem_dir.join("MEMORY.md"), "User prefers dark mode.").unwrap();

        let ctx = ContextBuilder::new(dir.path(), "TinyClaw");
        let prompt = ctx.build_system_prompt("", "cli", "cli:default");
        assert!(prompt.contains("User prefers dark mode."));
    }

    #[test]
    fn test_message_order_without_summary() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ContextBuilder::new(dir.path(), "TinyClaw");
        let history = vec![Message::user("q1"), Message::assistant("a1")];
        let user = Message::user("q2");

        let msgs = ctx.build_messages("", "", &history, &user, "cli", "cli:default");
        // system + 2 history + user
        assert_eq!(msgs.len(), 4);
        assert!(matches!(msgs[0], Message::System { .. }));
        assert_eq!(msgs[3], user);
    }

    #[test]
    fn test_summary_becomes_second_system_message() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ContextBuilder::new(dir.path(), "TinyClaw");
        let user = Message::user("q");

        let msgs = ctx.build_messages("", "we discussed crabs", &[], &user, "cli", "cli:default");
        assert_eq!(msgs.len(), 3);
        match &msgs[1] {
            Message::System { content } => {
                assert!(content.starts_with("Summary of earlier conversation:"));
                assert!(content.contains("we discussed crabs"));
            }
            other => panic!("expected system summary, got {other:?}"),
        }
    }

    #[test]
    fn test_user_message_plain_text() {
        let msg = ContextBuilder::user_message("hello", &[]);
        assert_eq!(msg, Message::user("hello"));
    }

    #[test]
    fn test_user_message_with_image() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("photo.png");
        std::fs::write(&img, [137, 80, 78, 71]).unwrap();

        let msg =
            ContextBuilder::user_message("what is this?", &[img.to_string_lossy().to_string()]);
        match msg {
            Message::User {
                content: tinyclaw_core::types::MessageContent::Parts(parts),
            } => {
                assert_eq!(parts.len(), 2);
                match &parts[0] {
                    ContentPart::ImageUrl { image_url } => {
                        assert!(image_url.url.starts_with("data:image/png;base64,"));
                    }
                    other => panic!("expected image part, got {other:?}"),
                }
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn test_user_message_audio_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("voice.ogg");
        std::fs::write(&audio, [0u8; 4]).unwrap();

        let msg = ContextBuilder::user_message(
            "transcribed text",
            &[audio.to_string_lossy().to_string()],
        );
        // Audio-only media degrades to a plain text message.
        assert_eq!(msg, Message::user("transcribed text"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("a.png"), "image/png");
        assert_eq!(guess_mime("a.GIF"), "image/gif");
        assert_eq!(guess_mime("a.webp"), "image/webp");
        assert_eq!(guess_mime("a.unknown"), "image/jpeg");
    }
}
