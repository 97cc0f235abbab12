// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use forge_config::McpServerConfig;

use crate::connection::{Connection, ConnectionStatus};
use crate::protocol::{self, McpToolInfo, PROTOCOL_VERSION};
use crate::McpError;

const INIT_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// An MCP tool as exposed to the executor, under its prefixed name.
#[derive(Debug, Clone)]
pub struct McpToolDefinition {
    /// Prefixed name: `mcp_{server}_{tool}`.
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Multi-server MCP client.
///
/// Owns one [`Connection`] per configured server plus the exact
/// prefixed-name table used to route `call_tool`.  Recording every exposed
/// name at discovery time keeps the `mcp_{server}_{tool}` round-trip intact
/// even when server names themselves contain underscores.
pub struct McpClient {
    connections: Mutex<HashMap<String, std::sync::Arc<Connection>>>,
    /// prefixed name → (server name, original tool name)
    routes: Mutex<HashMap<String, (String, String)>>,
    /// Tool definitions per server, kept for `tool_definitions()`.
    tools: Mutex<HashMap<String, Vec<McpToolInfo>>>,
}

impl McpClient {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            tools: Mutex::new(HashMap::new()),
        }
    }

    /// The prefixed tool name for `server` / `tool`.
    pub fn prefixed_name(server: &str, tool: &str) -> String {
        format!("mcp_{server}_{tool}")
    }

    /// Connect one server: spawn, initialize, discover tools, mark ready.
    ///
    /// Any failure kills the child, marks the connection `Error`, and
    /// propagates — the caller decides whether that is fatal (the driver
    /// connects best-effort and just logs).
    pub async fn connect(&self, cfg: &McpServerConfig) -> Result<Vec<McpToolDefinition>, McpError> {
        let conn = Connection::spawn(cfg)?;

        let handshake = async {
            let init_params = json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "forge",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            });
            conn.request("initialize", init_params, INIT_TIMEOUT).await?;
            conn.notify("notifications/initialized", json!({})).await;
            let listed = conn.request("tools/list", json!({}), LIST_TIMEOUT).await?;
            Ok::<_, McpError>(protocol::parse_tool_list(&listed))
        };

        let tools = match handshake.await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %cfg.name, error = %e, "MCP handshake failed");
                conn.set_status(ConnectionStatus::Error);
                conn.kill("handshake failed").await;
                return Err(e);
            }
        };

        conn.set_status(ConnectionStatus::Ready);
        info!(server = %cfg.name, tool_count = tools.len(), "MCP server ready");

        let definitions: Vec<McpToolDefinition> = tools
            .iter()
            .map(|t| McpToolDefinition {
                name: Self::prefixed_name(&cfg.name, &t.name),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        {
            let mut routes = self.routes.lock().unwrap();
            for t in &tools {
                routes.insert(
                    Self::prefixed_name(&cfg.name, &t.name),
                    (cfg.name.clone(), t.name.clone()),
                );
            }
        }
        self.tools.lock().unwrap().insert(cfg.name.clone(), tools);

        // Replacing an existing entry (reconnect) drops the old child.
        if let Some(old) = self
            .connections
            .lock()
            .unwrap()
            .insert(cfg.name.clone(), conn)
        {
            old.reject_all_pending("connection replaced");
        }

        Ok(definitions)
    }

    /// All tool definitions from `Ready` connections, prefixed.
    pub fn tool_definitions(&self) -> Vec<McpToolDefinition> {
        let connections = self.connections.lock().unwrap();
        let tools = self.tools.lock().unwrap();
        let mut defs = Vec::new();
        for (server, conn) in connections.iter() {
            if conn.status() != ConnectionStatus::Ready {
                continue;
            }
            if let Some(server_tools) = tools.get(server) {
                for t in server_tools {
                    defs.push(McpToolDefinition {
                        name: Self::prefixed_name(server, &t.name),
                        description: t.description.clone(),
                        input_schema: t.input_schema.clone(),
                    });
                }
            }
        }
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Resolve a prefixed name to `(server, tool)`.
    ///
    /// Exact route-table lookup first; names that were never discovered fall
    /// back to splitting on the first `_` after the `mcp_` prefix.
    fn resolve(&self, prefixed: &str) -> Result<(String, String), McpError> {
        if let Some((server, tool)) = self.routes.lock().unwrap().get(prefixed) {
            return Ok((server.clone(), tool.clone()));
        }
        let rest = prefixed
            .strip_prefix("mcp_")
            .ok_or_else(|| McpError::UnknownTool(prefixed.to_string()))?;
        let (server, tool) = rest
            .split_once('_')
            .ok_or_else(|| McpError::UnknownTool(prefixed.to_string()))?;
        Ok((server.to_string(), tool.to_string()))
    }

    /// Invoke an MCP tool by its prefixed name and return the textual result.
    ///
    /// Rejects immediately — never blocks — when the server is not `Ready`.
    pub async fn call_tool(
        &self,
        prefixed: &str,
        args: serde_json::Value,
    ) -> Result<String, McpError> {
        let (server, tool) = self.resolve(prefixed)?;
        let conn = self
            .connections
            .lock()
            .unwrap()
            .get(&server)
            .cloned()
            .ok_or_else(|| McpError::UnknownServer(server.clone()))?;

        let status = conn.status();
        if status != ConnectionStatus::Ready {
            return Err(McpError::NotReady {
                server: server.clone(),
                status: format!("{status:?}"),
            });
        }

        debug!(server = %server, tool = %tool, "dispatching MCP tool call");
        let result = conn
            .request(
                "tools/call",
                json!({ "name": tool, "arguments": args }),
                CALL_TIMEOUT,
            )
            .await?;
        Ok(protocol::render_tool_result(&result))
    }

    /// Status of a named connection, if it exists.
    pub fn status(&self, server: &str) -> Option<ConnectionStatus> {
        self.connections
            .lock()
            .unwrap()
            .get(server)
            .map(|c| c.status())
    }

    /// Number of live (non-`Closed`) connections.
    pub fn active_connections(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.status() != ConnectionStatus::Closed)
            .count()
    }

    /// Tear everything down: reject pending requests, kill children, drop
    /// all entries.  Idempotent — a second call is a no-op.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut connections = self.connections.lock().unwrap();
            connections.drain().collect()
        };
        for (name, conn) in drained {
            debug!(server = %name, "shutting down MCP connection");
            conn.kill("connection closing").await;
        }
        self.routes.lock().unwrap().clear();
        self.tools.lock().unwrap().clear();
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
