// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! MCP client fabric: one stdio JSON-RPC connection per configured server.
//!
//! Each connection is a spawned child process speaking newline-delimited
//! JSON-RPC 2.0.  A per-connection reader task consumes stdout and
//! completes pending request futures by id; timeouts bound every request
//! (initialize/list 10 s, call 30 s).  Tools are exposed to the executor
//! under `mcp_{server}_{tool}` names.

mod client;
mod connection;
mod protocol;

pub use client::{McpClient, McpToolDefinition};
pub use connection::ConnectionStatus;
pub use protocol::{McpToolInfo, PROTOCOL_VERSION};

/// Errors produced by the MCP fabric.
///
/// The executor renders these as textual tool results — they never
/// terminate a run.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("failed to spawn MCP server: {0}")]
    Spawn(String),
    #[error("MCP I/O error: {0}")]
    Io(String),
    #[error("MCP request {method} timed out after {secs}s")]
    Timeout { method: String, secs: u64 },
    #[error("MCP server error: {0}")]
    Server(String),
    #[error("MCP connection closed")]
    ConnectionClosed,
    #[error("MCP server {server} is not ready (status: {status})")]
    NotReady { server: String, status: String },
    #[error("unknown MCP server: {0}")]
    UnknownServer(String),
    #[error("not an MCP tool name: {0}")]
    UnknownTool(String),
}
