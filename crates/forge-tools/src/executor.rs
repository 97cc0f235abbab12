// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::registry::{ToolRegistry, ToolSchema};
use crate::tool::{ToolCall, ToolOutput};

/// The MCP routing seam.
///
/// The executor never talks JSON-RPC itself; the driver injects something
/// that routes a prefixed `mcp_{server}_{tool}` name to the right server.
/// `Err` carries a human-readable message (server missing, not ready, call
/// failed) which becomes the textual tool result.
#[async_trait]
pub trait McpDispatch: Send + Sync {
    async fn dispatch(&self, prefixed_name: &str, args: Value) -> Result<String, String>;
}

/// Uniform dispatcher for built-in and MCP-proxied tools.
///
/// The MCP dispatch function is a late-bound injection point: the driver
/// sets it once the server fabric for the current config has connected.
pub struct ToolExecutor {
    registry: ToolRegistry,
    mcp: Mutex<Option<Arc<dyn McpDispatch>>>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry, mcp: Mutex::new(None) }
    }

    /// Install (or replace) the MCP dispatch function.
    pub fn set_mcp_dispatch(&self, dispatch: Arc<dyn McpDispatch>) {
        *self.mcp.lock().unwrap() = Some(dispatch);
    }

    /// Schemas of the built-in tools (MCP tool schemas come from the fabric).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    /// Execute one call and return its textual result.
    ///
    /// Never panics and never returns `Err`: every failure — bad arguments,
    /// sandbox violation, unknown tool, MCP server not ready — is a
    /// [`ToolOutput`] with `is_error` set.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: normalize_args(call.args.clone()),
        };

        if call.name.starts_with("mcp_") {
            let dispatch = self.mcp.lock().unwrap().clone();
            return match dispatch {
                Some(d) => {
                    debug!(tool = %call.name, "routing MCP tool call");
                    match d.dispatch(&call.name, call.args.clone()).await {
                        Ok(text) => ToolOutput::ok(&call.id, text),
                        Err(msg) => ToolOutput::err(&call.id, msg),
                    }
                }
                None => ToolOutput::err(
                    &call.id,
                    format!("MCP is not connected; cannot dispatch {}", call.name),
                ),
            };
        }

        self.registry.execute(&call).await
    }
}

/// Accept arguments delivered as either a parsed object or a JSON string.
///
/// Some providers hand the accumulated argument bytes through as a string;
/// a string that parses as JSON is unwrapped, anything else passes through
/// untouched so the tool can report its own argument error.
pub fn normalize_args(args: Value) -> Value {
    match args {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(s),
        },
        other => other,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::Tool;

    struct ArgsEchoTool;

    #[async_trait]
    impl Tool for ArgsEchoTool {
        fn name(&self) -> &str {
            "args_echo"
        }
        fn description(&self) -> &str {
            "echoes parsed args"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, call.args.to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(ArgsEchoTool);
        ToolExecutor::new(reg)
    }

    #[test]
    fn normalize_unwraps_json_string_objects() {
        let v = normalize_args(json!(r#"{"path":"a.txt"}"#));
        assert_eq!(v["path"], "a.txt");
    }

    #[test]
    fn normalize_passes_objects_through() {
        let v = normalize_args(json!({"x": 1}));
        assert_eq!(v["x"], 1);
    }

    #[test]
    fn normalize_keeps_non_json_strings() {
        let v = normalize_args(json!("just text"));
        assert_eq!(v, json!("just text"));
    }

    #[tokio::test]
    async fn stringified_arguments_reach_tool_parsed() {
        let ex = executor();
        let call = ToolCall {
            id: "c1".into(),
            name: "args_echo".into(),
            args: json!(r#"{"key":"value"}"#),
        };
        let out = ex.execute(&call).await;
        assert!(out.content.contains("\"key\":\"value\""), "{}", out.content);
    }

    #[tokio::test]
    async fn unknown_tool_is_textual_error() {
        let ex = executor();
        let call = ToolCall { id: "c2".into(), name: "nope".into(), args: json!({}) };
        let out = ex.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn mcp_call_without_dispatch_is_error_not_block() {
        let ex = executor();
        let call = ToolCall {
            id: "c3".into(),
            name: "mcp_browser_navigate".into(),
            args: json!({}),
        };
        let out = ex.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("MCP is not connected"));
    }

    #[tokio::test]
    async fn mcp_call_routes_through_injected_dispatch() {
        struct FakeDispatch;
        #[async_trait]
        impl McpDispatch for FakeDispatch {
            async fn dispatch(&self, name: &str, args: Value) -> Result<String, String> {
                Ok(format!("dispatched {name} with {args}"))
            }
        }

        let ex = executor();
        ex.set_mcp_dispatch(Arc::new(FakeDispatch));
        let call = ToolCall {
            id: "c4".into(),
            name: "mcp_browser_navigate".into(),
            args: json!({"url": "https://example.com"}),
        };
        let out = ex.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("dispatched mcp_browser_navigate"));
    }

    #[tokio::test]
    async fn mcp_dispatch_error_becomes_tool_error() {
        struct FailingDispatch;
        #[async_trait]
        impl McpDispatch for FailingDispatch {
            async fn dispatch(&self, _: &str, _: Value) -> Result<String, String> {
                Err("MCP server browser is not ready (status: Connecting)".into())
            }
        }

        let ex = executor();
        ex.set_mcp_dispatch(Arc::new(FailingDispatch));
        let call = ToolCall {
            id: "c5".into(),
            name: "mcp_browser_navigate".into(),
            args: json!({}),
        };
        let out = ex.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("not ready"));
    }
}
