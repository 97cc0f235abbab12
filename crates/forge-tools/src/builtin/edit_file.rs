// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::workspace::Workspace;

/// Exact-substring file editor.
///
/// The replacement applies only when `old_str` occurs exactly once; zero or
/// multiple occurrences leave the file byte-identical and return a
/// descriptive error, so the model can re-read and retry with more context.
pub struct EditFileTool {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one exact occurrence of old_str with new_str in a file. \
         old_str must match the file content exactly (including whitespace) \
         and must be unique — include surrounding lines to disambiguate."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to find (must occur exactly once)"
                },
                "new_str": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_str", "new_str"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let old_str = match call.args.get("old_str").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolOutput::err(&call.id, "missing required parameter 'old_str'"),
        };
        let new_str = match call.args.get("new_str").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolOutput::err(&call.id, "missing required parameter 'new_str'"),
        };
        if old_str.is_empty() {
            return ToolOutput::err(&call.id, "old_str must not be empty");
        }

        debug!(path = %path, "edit_file tool");

        let resolved = match self.workspace.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        match content.matches(old_str).count() {
            0 => ToolOutput::err(&call.id, "no match; verify old text"),
            1 => {
                let updated = content.replacen(old_str, new_str, 1);
                match tokio::fs::write(&resolved, updated).await {
                    Ok(_) => ToolOutput::ok(&call.id, format!("file edited: {path}")),
                    Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
                }
            }
            n => ToolOutput::err(
                &call.id,
                format!("{n} matches; provide more context to disambiguate"),
            ),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup(content: &str) -> (tempfile::TempDir, EditFileTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.ts"), content).unwrap();
        let ws = Arc::new(Workspace::new(dir.path()).unwrap());
        (dir, EditFileTool { workspace: ws })
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "edit_file".into(), args }
    }

    #[tokio::test]
    async fn unique_match_is_replaced() {
        let (dir, t) = setup("fn foo() {\n    old();\n}\n");
        let out = t
            .execute(&call(json!({"path": "x.ts", "old_str": "old()", "new_str": "new()"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let result = std::fs::read_to_string(dir.path().join("x.ts")).unwrap();
        assert_eq!(result, "fn foo() {\n    new();\n}\n");
    }

    #[tokio::test]
    async fn zero_matches_is_error_and_file_untouched() {
        let original = "alpha\nbeta\n";
        let (dir, t) = setup(original);
        let out = t
            .execute(&call(json!({"path": "x.ts", "old_str": "gamma", "new_str": "delta"})))
            .await;
        assert!(out.is_error);
        assert_eq!(out.content, "no match; verify old text");
        assert_eq!(std::fs::read_to_string(dir.path().join("x.ts")).unwrap(), original);
    }

    #[tokio::test]
    async fn ambiguous_match_is_error_and_file_untouched() {
        let original = "foo\nfoo\n";
        let (dir, t) = setup(original);
        let out = t
            .execute(&call(json!({"path": "x.ts", "old_str": "foo", "new_str": "bar"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("2 matches"), "{}", out.content);
        assert!(out.content.contains("disambiguate"), "{}", out.content);
        assert_eq!(std::fs::read_to_string(dir.path().join("x.ts")).unwrap(), original);
    }

    #[tokio::test]
    async fn multiline_old_str_matches_across_lines() {
        let (dir, t) = setup("a\nb\nc\n");
        let out = t
            .execute(&call(json!({"path": "x.ts", "old_str": "a\nb", "new_str": "A\nB"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(dir.path().join("x.ts")).unwrap(), "A\nB\nc\n");
    }

    #[tokio::test]
    async fn empty_old_str_is_error() {
        let (_dir, t) = setup("abc");
        let out = t
            .execute(&call(json!({"path": "x.ts", "old_str": "", "new_str": "x"})))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let (_dir, t) = setup("abc");
        let out = t
            .execute(&call(json!({"path": "ghost.ts", "old_str": "a", "new_str": "b"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("read error"));
    }

    #[tokio::test]
    async fn escaping_path_is_rejected() {
        let (_dir, t) = setup("abc");
        let out = t
            .execute(&call(json!({"path": "../x.ts", "old_str": "a", "new_str": "b"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("path outside project root"));
    }
}
