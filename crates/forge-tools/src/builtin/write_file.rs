// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::workspace::Workspace;

pub struct WriteFileTool {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content. Parent directories \
         are created as needed. Prefer edit_file for changing existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content to write"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing required parameter 'content'"),
        };

        debug!(path = %path, bytes = content.len(), "write_file tool");

        let resolved = match self.workspace.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("create parent dirs: {e}"));
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("file written: {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup() -> (tempfile::TempDir, WriteFileTool) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::new(dir.path()).unwrap());
        (dir, WriteFileTool { workspace: ws })
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "w1".into(), name: "write_file".into(), args }
    }

    #[tokio::test]
    async fn writes_file_and_reports_path() {
        let (dir, t) = setup();
        let out = t
            .execute(&call(json!({"path": "out.txt", "content": "hello"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(out.content, "file written: out.txt");
        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let (dir, t) = setup();
        let out = t
            .execute(&call(json!({"path": "a/b/c/deep.txt", "content": "nested"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/c/deep.txt")).unwrap(),
            "nested"
        );
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let (dir, t) = setup();
        std::fs::write(dir.path().join("f.txt"), "old").unwrap();
        let out = t
            .execute(&call(json!({"path": "f.txt", "content": "new"})))
            .await;
        assert!(!out.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn escaping_path_is_rejected_without_side_effects() {
        let (_dir, t) = setup();
        let out = t
            .execute(&call(json!({"path": "../escape.txt", "content": "nope"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("path outside project root"));
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let (_dir, t) = setup();
        let out = t.execute(&call(json!({"path": "x.txt"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("'content'"));
    }
}
