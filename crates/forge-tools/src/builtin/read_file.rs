// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::workspace::Workspace;

/// Hard character ceiling on the formatted output.  Whatever fits under the
/// cap is returned with a truncation footer naming how much was shown.
const MAX_OUTPUT_CHARS: usize = 10_000;

pub struct ReadFileTool {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the project. Lines are returned as '{n} | {content}' \
         with 1-based numbering. Optional start_line/end_line select an \
         inclusive range. Long output is truncated at 10,000 characters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "start_line": {
                    "type": "integer",
                    "description": "1-based first line to read (default 1)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "1-based last line to read, inclusive (default: end of file)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let start_line = call.args.get("start_line").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
        let end_line = call.args.get("end_line").and_then(|v| v.as_u64()).map(|v| v as usize);

        debug!(path = %path, start_line, "read_file tool");

        let resolved = match self.workspace.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let text = match tokio::fs::read_to_string(&resolved).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let all_lines: Vec<&str> = text.lines().collect();
        if all_lines.is_empty() {
            return ToolOutput::ok(&call.id, "(empty file)");
        }
        let start = start_line.max(1);
        let end = end_line.unwrap_or(all_lines.len()).min(all_lines.len());
        if start > end {
            return ToolOutput::err(
                &call.id,
                format!("empty range: start_line {start} > end_line {end}"),
            );
        }

        let total = end - start + 1;
        let mut out = String::new();
        let mut shown = 0usize;
        let mut truncated = false;
        for (i, line) in all_lines[start - 1..end].iter().enumerate() {
            let formatted = format!("{} | {}", start + i, line);
            let needed = formatted.len() + usize::from(!out.is_empty());
            if out.len() + needed > MAX_OUTPUT_CHARS {
                truncated = true;
                break;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&formatted);
            shown += 1;
        }

        if truncated {
            out.push_str(&format!("\n…(truncated, showing {shown} of {total} lines)"));
        }

        ToolOutput::ok(&call.id, out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
