// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::workspace::Workspace;

const TIMEOUT_SECS: u64 = 30;

/// Substrings that unconditionally block a command, matched
/// case-insensitively.  This is a last-resort tripwire, not a policy engine.
const DENYLIST: &[&str] = &[
    "rm -rf /",
    "format",
    "shutdown",
    "del /f /s /q",
    "rmdir /s /q c:",
];

pub struct RunTerminalTool {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Tool for RunTerminalTool {
    fn name(&self) -> &str {
        "run_terminal"
    }

    fn description(&self) -> &str {
        "Run a shell command under the project root and return combined \
         stdout and stderr. Commands are killed after 30 seconds; output \
         captured up to that point is returned with a timeout notice."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'command'"),
        };

        let lowered = command.to_lowercase();
        for blocked in DENYLIST {
            if lowered.contains(blocked) {
                return ToolOutput::err(
                    &call.id,
                    format!("command refused by safety policy (contains {blocked:?})"),
                );
            }
        }

        debug!(cmd = %command, "run_terminal tool");

        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("spawn error: {e}")),
        };

        // Readers run independently so partial output survives a timeout kill.
        let (mut stdout_pipe, mut stderr_pipe) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return ToolOutput::err(&call.id, "child pipes unavailable"),
        };
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let status = tokio::time::timeout(Duration::from_secs(TIMEOUT_SECS), child.wait()).await;

        let timed_out = status.is_err();
        if timed_out {
            let _ = child.kill().await;
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let mut content = String::from_utf8_lossy(&stdout).into_owned();
        let stderr_text = String::from_utf8_lossy(&stderr);
        if !stderr_text.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&stderr_text);
        }

        if timed_out {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&format!("…(command timed out after {TIMEOUT_SECS}s)"));
            return ToolOutput::ok(&call.id, content);
        }

        match status {
            Ok(Ok(exit)) if exit.success() => ToolOutput::ok(&call.id, content),
            Ok(Ok(exit)) => {
                let code = exit.code().unwrap_or(-1);
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&format!("[exit {code}]"));
                ToolOutput::err(&call.id, content)
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("wait error: {e}")),
            Err(_) => unreachable!("timeout handled above"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
