//! Skills loader — discovers and loads skill files.
//!
//! Skills are Markdown files (`SKILL.md`) that teach the agent how to
//! combine existing tools for specific domains. They do not register new
//! tools.
//!
//! ## Two-tier loading
//!
//! 1. **Always-on skills** (`always: true` in frontmatter) — full content
//!    injected into every system prompt.
//! 2. **On-demand skills** — only an XML summary (name, description,
//!    path, availability) is injected; the LLM uses `read_file` to load
//!    the full `SKILL.md` when it decides a skill is relevant.
//!
//! ## Discovery order
//!
//! 1. `workspace/skills/<name>/SKILL.md` (user custom, highest priority)
//! 2. Built-in skills directory (overridden by name)
//!
//! ## SKILL.md frontmatter
//!
//! ```text
//! ---
//! name: github
//! description: "Interact with GitHub using the gh CLI"
//! always: false
//! requires_bins: gh
//! requires_env: GITHUB_TOKEN
//! ---
//! ```

use std::path::{Path, PathBuf};

/// Where a skill was discovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkillSource {
    /// User's workspace `skills/` directory.
    Workspace,
    /// Bundled with the binary.
    Builtin,
}

/// A discovered skill.
#[derive(Clone, Debug)]
pub struct SkillInfo {
    /// Skill name (directory name).
    pub name: String,
    /// Path to the `SKILL.md` file.
    pub path: PathBuf,
    pub source: SkillSource,
}

/// Parsed frontmatter of one skill.
#[derive(Clone, Debug, Default)]
pub struct SkillMeta {
    pub description: Option<String>,
    /// If true, the full body goes into every system prompt.
    pub always: bool,
    /// CLI binaries that must be on PATH.
    pub requires_bins: Vec<String>,
    /// Environment variables that must be set.
    pub requires_env: Vec<String>,
}

/// Discovers and loads skill files from workspace and built-in trees.
pub struct SkillsLoader {
    workspace_skills: PathBuf,
    builtin_skills: Option<PathBuf>,
}

impl SkillsLoader {
    pub fn new(workspace: &Path, builtin_skills: Option<PathBuf>) -> Self {
        Self {
            workspace_skills: workspace.join("skills"),
            builtin_skills,
        }
    }

    /// The workspace skills directory.
    pub fn skills_dir(&self) -> &Path {
        &self.workspace_skills
    }

    // ────────────── Discovery ──────────────

    /// List all discovered skills, workspace entries shadowing built-ins
    /// by name.
    pub fn list_skills(&self) -> Vec<SkillInfo> {
        let mut skills = Vec::new();

        if self.workspace_skills.is_dir() {
            scan_skill_dirs(&self.workspace_skills, SkillSource::Workspace, &mut skills);
        }

        if let Some(builtin) = &self.builtin_skills {
            if builtin.is_dir() {
                let existing: Vec<String> = skills.iter().map(|s| s.name.clone()).collect();
                let mut found = Vec::new();
                scan_skill_dirs(builtin, SkillSource::Builtin, &mut found);
                for skill in found {
                    if !existing.contains(&skill.name) {
                        skills.push(skill);
                    }
                }
            }
        }

        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    // ────────────── Loading ──────────────

    /// Load the raw content of a skill by name (workspace first).
    pub fn load_skill(&self, name: &str) -> Option<String> {
        let ws_path = self.workspace_skills.join(name).join("SKILL.md");
        if ws_path.is_file() {
            return std::fs::read_to_string(&ws_path).ok();
        }

        if let Some(builtin) = &self.builtin_skills {
            let bi_path = builtin.join(name).join("SKILL.md");
            if bi_path.is_file() {
                return std::fs::read_to_string(&bi_path).ok();
            }
        }

        None
    }

    /// Parse a skill's frontmatter.
    pub fn skill_meta(&self, name: &str) -> SkillMeta {
        match self.load_skill(name) {
            Some(content) => parse_meta(&content),
            None => SkillMeta::default(),
        }
    }

    /// Full bodies of the always-on skills, frontmatter stripped, for the
    /// system prompt.
    pub fn always_skills_content(&self) -> String {
        let parts: Vec<String> = self
            .list_skills()
            .iter()
            .filter(|s| {
                let meta = self.skill_meta(&s.name);
                meta.always && requirements_met(&meta)
            })
            .filter_map(|s| {
                let content = self.load_skill(&s.name)?;
                let body = strip_frontmatter(&content);
                if body.is_empty() {
                    return None;
                }
                Some(format!("### Skill: {}\n\n{body}", s.name))
            })
            .collect();
        parts.join("\n\n---\n\n")
    }

    /// XML catalog of all skills for the system prompt.
    ///
    /// The LLM reads this to decide which `SKILL.md` files to open on
    /// demand via `read_file`.
    pub fn build_skills_summary(&self) -> String {
        let all = self.list_skills();
        if all.is_empty() {
            return String::new();
        }

        let mut lines = vec!["<skills>".to_string()];
        for skill in &all {
            let meta = self.skill_meta(&skill.name);
            let available = requirements_met(&meta);
            let desc = meta.description.as_deref().unwrap_or(&skill.name);
            let source = match skill.source {
                SkillSource::Workspace => "workspace",
                SkillSource::Builtin => "builtin",
            };

            lines.push(format!(
                "  <skill available=\"{available}\" source=\"{source}\">"
            ));
            lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
            lines.push(format!(
                "    <description>{}</description>",
                escape_xml(desc)
            ));
            lines.push(format!("    <path>{}</path>", skill.path.display()));
            if !available {
                let mut missing = Vec::new();
                for bin in &meta.requires_bins {
                    if !binary_on_path(bin) {
                        missing.push(format!("bin:{bin}"));
                    }
                }
                for env in &meta.requires_env {
                    if std::env::var(env).is_err() {
                        missing.push(format!("env:{env}"));
                    }
                }
                lines.push(format!(
                    "    <missing>{}</missing>",
                    escape_xml(&missing.join(", "))
                ));
            }
            lines.push("  </skill>".to_string());
        }
        lines.push("</skills>".to_string());
        lines.join("\n")
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

fn scan_skill_dirs(dir: &Path, source: SkillSource, out: &mut Vec<SkillInfo>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let skill_file = path.join("SKILL.md");
        if skill_file.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                out.push(SkillInfo {
                    name: name.to_string(),
                    path: skill_file,
                    source: source.clone(),
                });
            }
        }
    }
}

/// Parse the `--- ... ---` frontmatter block into a [`SkillMeta`].
fn parse_meta(content: &str) -> SkillMeta {
    let mut meta = SkillMeta::default();

    let Some(block) = frontmatter_block(content) else {
        return meta;
    };

    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key {
            "description" => meta.description = Some(value.to_string()),
            "always" => meta.always = value == "true",
            "requires_bins" => {
                meta.requires_bins = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }
            "requires_env" => {
                meta.requires_env = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }
            _ => {}
        }
    }

    meta
}

fn frontmatter_block(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

/// Body of a skill file with the frontmatter removed.
fn strip_frontmatter(content: &str) -> String {
    match content.strip_prefix("---") {
        Some(rest) => match rest.find("\n---") {
            Some(end) => {
                let after = &rest[end + 4..];
                after.trim_start_matches('\n').trim().to_string()
            }
            None => content.trim().to_string(),
        },
        None => content.trim().to_string(),
    }
}

fn requirements_met(meta: &SkillMeta) -> bool {
    meta.requires_bins.iter().all(|b| binary_on_path(b))
        && meta.requires_env.iter().all(|e| std::env::var(e).is_ok())
}

fn binary_on_path(name: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
