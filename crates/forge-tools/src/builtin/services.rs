// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Long-running service management tools.
//!
//! The core does not manage processes beyond single terminal commands; a
//! host-provided [`ServiceManager`] owns dev servers, watchers, and the
//! like.  The three tools delegate verbatim and render whatever the
//! manager reports.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// The host's service manager seam.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Start a named service; `command` is only needed on first start.
    async fn start_service(&self, name: &str, command: Option<&str>) -> anyhow::Result<String>;
    /// Report the status (and recent output) of a named service.
    async fn check_service(&self, name: &str) -> anyhow::Result<String>;
    /// Stop a named service.
    async fn stop_service(&self, name: &str) -> anyhow::Result<String>;
}

fn name_arg(call: &ToolCall) -> Result<&str, ToolOutput> {
    call.args
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolOutput::err(&call.id, "missing required parameter 'name'"))
}

pub struct StartServiceTool {
    pub manager: Arc<dyn ServiceManager>,
}

#[async_trait]
impl Tool for StartServiceTool {
    fn name(&self) -> &str {
        "start_service"
    }

    fn description(&self) -> &str {
        "Start a long-running background service (dev server, watcher). \
         Provide the launch command on first start."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Service name" },
                "command": { "type": "string", "description": "Launch command (first start only)" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match name_arg(call) {
            Ok(n) => n,
            Err(out) => return out,
        };
        let command = call.args.get("command").and_then(|v| v.as_str());
        match self.manager.start_service(name, command).await {
            Ok(report) => ToolOutput::ok(&call.id, report),
            Err(e) => ToolOutput::err(&call.id, format!("start_service failed: {e}")),
        }
    }
}

pub struct CheckServiceTool {
    pub manager: Arc<dyn ServiceManager>,
}

#[async_trait]
impl Tool for CheckServiceTool {
    fn name(&self) -> &str {
        "check_service"
    }

    fn description(&self) -> &str {
        "Check the status and recent output of a background service."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Service name" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match name_arg(call) {
            Ok(n) => n,
            Err(out) => return out,
        };
        match self.manager.check_service(name).await {
            Ok(report) => ToolOutput::ok(&call.id, report),
            Err(e) => ToolOutput::err(&call.id, format!("check_service failed: {e}")),
        }
    }
}

pub struct StopServiceTool {
    pub manager: Arc<dyn ServiceManager>,
}

#[async_trait]
impl Tool for StopServiceTool {
    fn name(&self) -> &str {
        "stop_service"
    }

    fn description(&self) -> &str {
        "Stop a background service started with start_service."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Service name" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match name_arg(call) {
            Ok(n) => n,
            Err(out) => return out,
        };
        match self.manager.stop_service(name).await {
            Ok(report) => ToolOutput::ok(&call.id, report),
            Err(e) => ToolOutput::err(&call.id, format!("stop_service failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Fake manager recording the last delegated call.
    #[derive(Default)]
    struct FakeManager {
        fail: bool,
    }

    #[async_trait]
    impl ServiceManager for FakeManager {
        async fn start_service(&self, name: &str, command: Option<&str>) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("no such service");
            }
            Ok(format!("started {name} ({})", command.unwrap_or("resumed")))
        }
        async fn check_service(&self, name: &str) -> anyhow::Result<String> {
            Ok(format!("{name}: running"))
        }
        async fn stop_service(&self, name: &str) -> anyhow::Result<String> {
            Ok(format!("{name}: stopped"))
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall { id: "svc1".into(), name: name.into(), args }
    }

    #[tokio::test]
    async fn start_delegates_name_and_command() {
        let t = StartServiceTool { manager: Arc::new(FakeManager::default()) };
        let out = t
            .execute(&call("start_service", json!({"name": "web", "command": "npm run dev"})))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "started web (npm run dev)");
    }

    #[tokio::test]
    async fn check_and_stop_delegate() {
        let mgr: Arc<dyn ServiceManager> = Arc::new(FakeManager::default());
        let check = CheckServiceTool { manager: Arc::clone(&mgr) };
        let stop = StopServiceTool { manager: mgr };

        let out = check.execute(&call("check_service", json!({"name": "web"}))).await;
        assert_eq!(out.content, "web: running");

        let out = stop.execute(&call("stop_service", json!({"name": "web"}))).await;
        assert_eq!(out.content, "web: stopped");
    }

    #[tokio::test]
    async fn manager_failure_becomes_tool_error() {
        let t = StartServiceTool { manager: Arc::new(FakeManager { fail: true }) };
        let out = t.execute(&call("start_service", json!({"name": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("no such service"));
    }

    #[tokio::test]
    async fn missing_name_is_error() {
        let t = CheckServiceTool { manager: Arc::new(FakeManager::default()) };
        let out = t.execute(&call("check_service", json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("'name'"));
    }
}
