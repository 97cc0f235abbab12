// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Newline-delimited JSON-RPC 2.0 framing for the MCP wire format.
//!
//! Requests carry a per-connection monotonic integer `id`; notifications
//! omit it.  Responses are matched back to requests by `id`.  These are
//! pure, stateless functions — the connection owns all state.

use serde::Deserialize;
use serde_json::{json, Value};

/// MCP protocol revision sent in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serialize a request to one newline-terminated wire line.
pub(crate) fn request_line(id: u64, method: &str, params: Value) -> String {
    let mut line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string();
    line.push('\n');
    line
}

/// Serialize a notification (no `id`) to one newline-terminated wire line.
pub(crate) fn notification_line(method: &str, params: Value) -> String {
    let mut line = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
    .to_string();
    line.push('\n');
    line
}

/// One parsed incoming wire line.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// A response to a request, matched by id.  Exactly one of
    /// `result` / `error` is set on a well-formed response.
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<String>,
    },
    /// A server-initiated notification; parsed and otherwise ignored.
    Notification { method: String },
    /// Anything that does not parse as a JSON-RPC object — silently dropped.
    Noise,
}

/// Parse one stdout line.  Lines that are not JSON objects are [`Incoming::Noise`].
pub(crate) fn parse_line(line: &str) -> Incoming {
    let v: Value = match serde_json::from_str(line) {
        Ok(Value::Object(m)) => Value::Object(m),
        _ => return Incoming::Noise,
    };
    if let Some(id) = v["id"].as_u64() {
        let error = v.get("error").filter(|e| !e.is_null()).map(|e| {
            e["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        });
        let result = v.get("result").filter(|r| !r.is_null()).cloned();
        Incoming::Response { id, result, error }
    } else if let Some(method) = v["method"].as_str() {
        Incoming::Notification { method: method.to_string() }
    } else {
        Incoming::Noise
    }
}

/// One tool advertised by a server's `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// Extract the tool list from a `tools/list` result.
pub(crate) fn parse_tool_list(result: &Value) -> Vec<McpToolInfo> {
    result["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a `tools/call` result to text.
///
/// When the result carries a `content` array, the `text` of each element is
/// concatenated with newlines (elements without text are JSON-serialized);
/// any other result shape is serialized whole.
pub(crate) fn render_tool_result(result: &Value) -> String {
    match result["content"].as_array() {
        Some(content) => content
            .iter()
            .map(|c| {
                c["text"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| c.to_string())
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => result.to_string(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
