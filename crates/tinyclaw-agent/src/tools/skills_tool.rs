//! Skills tool — manage the workspace skills tree.
//!
//! list/show/create/edit/remove over `workspace/skills/<name>/SKILL.md`.
//! Paths go through the guard like every other filesystem access.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use tinyclaw_core::guard::SecurityGuard;

use super::base::{optional_string, require_string, Tool};
use crate::skills::SkillsLoader;

/// Inspect and edit skill files.
pub struct SkillsTool {
    loader: SkillsLoader,
    skills_dir: PathBuf,
    guard: Arc<SecurityGuard>,
}

impl SkillsTool {
    pub fn new(workspace: &std::path::Path, guard: Arc<SecurityGuard>) -> Self {
        let loader = SkillsLoader::new(workspace, None);
        let skills_dir = loader.skills_dir().to_path_buf();
        Self {
            loader,
            skills_dir,
            guard,
        }
    }

    fn skill_file(&self, name: &str) -> anyhow::Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            anyhow::bail!("invalid skill name: {name}");
        }
        let path = self.skills_dir.join(name).join("SKILL.md");
        Ok(self.guard.check_file_path(&path.to_string_lossy())?)
    }
}

#[async_trait]
impl Tool for SkillsTool {
    fn name(&self) -> &str {
        "skills"
    }

    fn description(&self) -> &str {
        "Manage skills: action=list|show|create|edit|remove. Skills are SKILL.md \
         files teaching you domain workflows; create takes name + content, edit \
         takes name + old_text + new_text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "show", "create", "edit", "remove"],
                    "description": "What to do"
                },
                "name": {
                    "type": "string",
                    "description": "Skill name (directory under skills/)"
                },
                "content": {
                    "type": "string",
                    "description": "Full SKILL.md content (for create)"
                },
                "old_text": {
                    "type": "string",
                    "description": "Text to replace (for edit)"
                },
                "new_text": {
                    "type": "string",
                    "description": "Replacement text (for edit)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let action = require_string(&params, "action")?;

        match action.as_str() {
            "list" => {
                let summary = self.loader.build_skills_summary();
                if summary.is_empty() {
                    Ok("No skills installed.".into())
                } else {
                    Ok(summary)
                }
            }
            "show" => {
                let name = require_string(&params, "name")?;
                self.loader
                    .load_skill(&name)
                    .ok_or_else(|| anyhow::anyhow!("no skill named {name}"))
            }
            "create" => {
                let name = require_string(&params, "name")?;
                let content = require_string(&params, "content")?;
                let path = self.skill_file(&name)?;

                if path.exists() {
                    anyhow::bail!("skill {name} already exists; use edit");
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, &content)?;
                Ok(format!("Created skill {name}"))
            }
            "edit" => {
                let name = require_string(&params, "name")?;
                let old_text = require_string(&params, "old_text")?;
                let new_text = optional_string(&params, "new_text").unwrap_or_default();
                let path = self.skill_file(&name)?;

                if !path.is_file() {
                    anyhow::bail!("no skill named {name}");
                }
                let content = std::fs::read_to_string(&path)?;
                if !content.contains(&old_text) {
                    anyhow::bail!("old_text not found in skill {name}");
                }
                let updated = content.replacen(&old_text, &new_text, 1);
                std::fs::write(&path, updated)?;
                Ok(format!("Edited skill {name}"))
            }
            "remove" => {
                let name = require_string(&params, "name")?;
                let path = self.skill_file(&name)?;
                let dir = path.parent().unwrap_or(&self.skills_dir).to_path_buf();

                if !path.exists() {
                    anyhow::bail!("no skill named {name}");
                }
                std::fs::remove_dir_all(&dir)?;
                Ok(format!("Removed skill {name}"))
            }
            other => anyhow::bail!("unknown action: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tool(dir: &tempfile::TempDir) -> SkillsTool {
        let guard = Arc::new(SecurityGuard::new(Some(dir.path().to_path_buf()), None));
        SkillsTool::new(dir.path(), guard)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_create_show_edit_remove_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);

        tool.execute(params(&[
            ("action", "create"),
            ("name", "weather"),
            ("content", "---\ndescription: weather checks\n---\n\nUse wttr.in"),
        ]))
        .await
        .unwrap();

        let shown = tool
            .execute(params(&[("action", "show"), ("name", "weather")]))
            .await
            .unwrap();
        assert!(shown.contains("wttr.in"));

        tool.execute(params(&[
            ("action", "edit"),
            ("name", "weather"),
            ("old_text", "wttr.in"),
            ("new_text", "open-meteo"),
        ]))
        .await
        .unwrap();
        let shown = tool
            .execute(params(&[("action", "show"), ("name", "weather")]))
            .await
            .unwrap();
        assert!(shown.contains("open-meteo"));

        tool.execute(params(&[("action", "remove"), ("name", "weather")]))
            .await
            .unwrap();
        assert!(tool
            .execute(params(&[("action", "show"), ("name", "weather")]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_includes_created_skill() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);

        assert_eq!(
            tool.execute(params(&[("action", "list")])).await.unwrap(),
            "No skills installed."
        );

        tool.execute(params(&[
            ("action", "create"),
            ("name", "notes"),
            ("content", "---\ndescription: note keeping\n---\n\nBody"),
        ]))
        .await
        .unwrap();

        let listing = tool.execute(params(&[("action", "list")])).await.unwrap();
        assert!(listing.contains("<name>notes</name>"));
        assert!(listing.contains("note keeping"));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);

        let p = params(&[("action", "create"), ("name", "dup"), ("content", "x")]);
        tool.execute(p.clone()).await.unwrap();
        assert!(tool.execute(p).await.is_err());
    }

    #[tokio::test]
    async fn test_path_traversal_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(&dir);

        let err = tool
            .execute(params(&[
                ("action", "create"),
                ("name", "../escape"),
                ("content", "x"),
            ]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid skill name"));
    }
}
