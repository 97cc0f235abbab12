// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use forge_config::McpServerConfig;

use crate::protocol::{self, Incoming};
use crate::McpError;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Ready,
    Error,
    Closed,
}

type Waiter = oneshot::Sender<Result<Value, McpError>>;
type PendingMap = Arc<Mutex<HashMap<u64, Waiter>>>;

/// One spawned MCP server process with its reader task.
///
/// The pending-request map is the only state shared with the reader task;
/// it is mutex-guarded because a response can arrive while the request
/// submission is still registering its waiter.
pub(crate) struct Connection {
    pub name: String,
    status: Mutex<ConnectionStatus>,
    next_id: AtomicU64,
    pending: PendingMap,
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
}

impl Connection {
    /// Spawn the server process and start its stdout/stderr reader tasks.
    ///
    /// The connection starts in `Connecting`; the caller drives the
    /// initialize handshake and promotes it to `Ready`.
    pub fn spawn(cfg: &McpServerConfig) -> Result<Arc<Self>, McpError> {
        let mut command = Command::new(&cfg.command);
        command
            .args(&cfg.args)
            .envs(&cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| McpError::Spawn(format!("{}: {e}", cfg.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Spawn("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Spawn("child stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        let conn = Arc::new(Self {
            name: cfg.name.clone(),
            status: Mutex::new(ConnectionStatus::Connecting),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
        });

        // Stdout reader: routes responses to waiters until the pipe closes.
        let reader_conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        warn!(server = %reader_conn.name, error = %e, "stdout framing error");
                        break;
                    }
                };
                match protocol::parse_line(&line) {
                    Incoming::Response { id, result, error } => {
                        let waiter = reader_conn.pending.lock().unwrap().remove(&id);
                        match waiter {
                            Some(tx) => {
                                let outcome = match error {
                                    Some(msg) => Err(McpError::Server(msg)),
                                    None => Ok(result.unwrap_or(Value::Null)),
                                };
                                let _ = tx.send(outcome);
                            }
                            None => {
                                debug!(server = %reader_conn.name, id, "response for unknown request id");
                            }
                        }
                    }
                    Incoming::Notification { method } => {
                        debug!(server = %reader_conn.name, %method, "server notification");
                    }
                    Incoming::Noise => {}
                }
            }
            // Stdout closed: the process is gone or going.
            debug!(server = %reader_conn.name, "stdout closed; marking connection closed");
            reader_conn.mark_closed();
            reader_conn.reject_all_pending("connection closed");
        });

        // Stderr reader: log whatever the server prints.
        if let Some(stderr) = stderr {
            let server = cfg.name.clone();
            tokio::spawn(async move {
                let mut lines = FramedRead::new(stderr, LinesCodec::new());
                while let Some(Ok(line)) = lines.next().await {
                    debug!(server = %server, "stderr: {line}");
                }
            });
        }

        Ok(conn)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Transition to `Closed` unless a fatal `Error` was already recorded —
    /// a failed handshake must stay visible as `Error`, not be clobbered by
    /// the reader task noticing the killed process.
    fn mark_closed(&self) {
        let mut status = self.status.lock().unwrap();
        if *status != ConnectionStatus::Error {
            *status = ConnectionStatus::Closed;
        }
    }

    /// Send a request and await its correlated response.
    ///
    /// The waiter is registered *before* the line is written so a fast
    /// response cannot race past the registration.  On timeout the waiter is
    /// removed, so a late response is dropped as an unknown id.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let line = protocol::request_line(id, method, params);
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().unwrap().remove(&id);
                return Err(McpError::Io(format!("write to {}: {e}", self.name)));
            }
            let _ = stdin.flush().await;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Send a notification.  Fire-and-forget; write errors are logged only.
    pub async fn notify(&self, method: &str, params: Value) {
        let line = protocol::notification_line(method, params);
        let mut stdin = self.stdin.lock().await;
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(server = %self.name, method, error = %e, "notification write failed");
        }
        let _ = stdin.flush().await;
    }

    /// Reject every pending request with the given reason.
    pub fn reject_all_pending(&self, reason: &str) {
        let waiters: Vec<Waiter> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in waiters {
            let _ = tx.send(Err(McpError::Server(reason.to_string())));
        }
    }

    /// Kill the child process and reject all pending requests.
    pub async fn kill(&self, reason: &str) {
        self.reject_all_pending(reason);
        self.mark_closed();
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(server = %self.name, error = %e, "kill failed (already exited?)");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn sh_server(script: &str) -> McpServerConfig {
        McpServerConfig {
            name: "test".into(),
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: StdHashMap::new(),
            enabled: true,
        }
    }

    /// A fake server that answers any request line with a matching-id result.
    /// sed pulls the numeric id back out of the request so the correlation
    /// logic is exercised for real.
    const ECHO_ID_SERVER: &str = r#"
        while read -r line; do
            id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
            printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":true}}\n' "$id"
        done
    "#;

    #[tokio::test]
    async fn spawn_starts_in_connecting() {
        let conn = Connection::spawn(&sh_server("sleep 5")).unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
        conn.kill("test over").await;
    }

    #[tokio::test]
    async fn request_is_correlated_by_id() {
        let conn = Connection::spawn(&sh_server(ECHO_ID_SERVER)).unwrap();
        let result = conn
            .request("initialize", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["echo"], true);
        conn.kill("test over").await;
    }

    #[tokio::test]
    async fn sequential_requests_use_monotonic_ids() {
        let conn = Connection::spawn(&sh_server(ECHO_ID_SERVER)).unwrap();
        for _ in 0..3 {
            let result = conn
                .request("tools/list", serde_json::json!({}), Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(result["echo"], true);
        }
        assert!(conn.next_id.load(Ordering::Relaxed) >= 4);
        conn.kill("test over").await;
    }

    #[tokio::test]
    async fn server_error_field_rejects_request() {
        let script = r#"
            while read -r line; do
                id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
                printf '{"jsonrpc":"2.0","id":%s,"error":{"message":"boom"}}\n' "$id"
            done
        "#;
        let conn = Connection::spawn(&sh_server(script)).unwrap();
        let err = conn
            .request("tools/call", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Server(msg) if msg == "boom"));
        conn.kill("test over").await;
    }

    #[tokio::test]
    async fn unparseable_lines_are_dropped_silently() {
        // Server prints noise before the real response.
        let script = r#"
            while read -r line; do
                id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
                printf 'warning: something irrelevant\n'
                printf '{"jsonrpc":"2.0","id":%s,"result":{"fine":1}}\n' "$id"
            done
        "#;
        let conn = Connection::spawn(&sh_server(script)).unwrap();
        let result = conn
            .request("initialize", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["fine"], 1);
        conn.kill("test over").await;
    }

    #[tokio::test]
    async fn timeout_removes_pending_entry() {
        // Server never answers.
        let conn = Connection::spawn(&sh_server("while read -r line; do :; done")).unwrap();
        let err = conn
            .request("tools/call", serde_json::json!({}), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
        assert!(conn.pending.lock().unwrap().is_empty(), "waiter must be removed");
        conn.kill("test over").await;
    }

    #[tokio::test]
    async fn process_exit_rejects_pending_and_closes() {
        // Server exits immediately; the in-flight request must be rejected.
        let conn = Connection::spawn(&sh_server("exit 0")).unwrap();
        let err = conn
            .request("initialize", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, McpError::Server(_) | McpError::ConnectionClosed | McpError::Io(_)),
            "unexpected error: {err:?}"
        );
        // Reader task marks the connection closed once stdout drains.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(conn.status(), ConnectionStatus::Closed);
    }
}
