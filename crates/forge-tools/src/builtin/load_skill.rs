// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use forge_skills::SkillSource;

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct LoadSkillTool {
    pub skills: Arc<dyn SkillSource>,
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn description(&self) -> &str {
        "Load the full instructions of a skill by its slug. Use the skill \
         catalog in the system prompt to pick the slug."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": {
                    "type": "string",
                    "description": "Skill slug from the catalog"
                }
            },
            "required": ["slug"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let slug = match call.args.get("slug").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolOutput::err(&call.id, "missing required parameter 'slug'"),
        };

        debug!(slug = %slug, "load_skill tool");

        match self.skills.load_content(slug).await {
            Some(content) => ToolOutput::ok(&call.id, content),
            None => ToolOutput::err(
                &call.id,
                format!("skill {slug:?} has no content; check the slug against the catalog"),
            ),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use forge_skills::FsSkillSource;

    use super::*;

    fn setup() -> (tempfile::TempDir, LoadSkillTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("git-helper")).unwrap();
        std::fs::write(dir.path().join("git-helper/SKILL.md"), "# Git workflows\n").unwrap();
        let skills = Arc::new(FsSkillSource::new(dir.path()));
        (dir, LoadSkillTool { skills })
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "k1".into(), name: "load_skill".into(), args }
    }

    #[tokio::test]
    async fn loads_existing_skill_content() {
        let (_dir, t) = setup();
        let out = t.execute(&call(json!({"slug": "git-helper"}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("# Git workflows"));
    }

    #[tokio::test]
    async fn missing_skill_returns_readable_error() {
        let (_dir, t) = setup();
        let out = t.execute(&call(json!({"slug": "ghost"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("ghost"));
        assert!(out.content.contains("no content"));
    }

    #[tokio::test]
    async fn missing_slug_parameter_is_error() {
        let (_dir, t) = setup();
        let out = t.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("'slug'"));
    }
}
