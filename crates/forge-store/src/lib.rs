// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Persistence interface consumed by the agent core.
//!
//! The core never implements durable storage itself; the host process hands
//! it something that satisfies [`Store`].  [`MemoryStore`] is the reference
//! implementation used by the test suite and by embedders that do not need
//! a database.  Store implementations must serialize writes per session —
//! [`MemoryStore`] does so with a single async mutex.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One tool invocation recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// A persisted conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    /// "system" | "user" | "assistant" | "tool"
    pub role: String,
    pub content: String,
    /// Set on `tool` messages: the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on assistant messages that requested tool invocations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Data-URL image attachments on user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence operations the core depends on.
///
/// Session CRUD is used only around lifecycle boundaries; the hot path is
/// `add_message` / `get_messages` plus the session-memory pair.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a message to a session's ordered history; returns its id.
    async fn add_message(&self, session_id: &str, msg: NewMessage) -> anyhow::Result<u64>;

    /// The full ordered history of a session (empty for unknown sessions).
    async fn get_messages(&self, session_id: &str) -> anyhow::Result<Vec<StoredMessage>>;

    /// Append to the tool audit log.  Separate from the message history.
    async fn add_tool_log(
        &self,
        session_id: &str,
        name: &str,
        args_json: &str,
        result_text: &str,
    ) -> anyhow::Result<()>;

    /// The compressed session memory summary, if any.
    async fn get_session_memory(&self, session_id: &str) -> anyhow::Result<Option<String>>;

    /// Persist (replace) the session memory summary.
    async fn save_session_memory(&self, session_id: &str, summary: &str) -> anyhow::Result<()>;

    async fn create_session(&self, session_id: &str) -> anyhow::Result<()>;

    async fn delete_session(&self, session_id: &str) -> anyhow::Result<()>;
}

/// Input record for [`Store::add_message`].
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub images: Vec<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into(), ..Self::default() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into(), ..Self::default() }
    }

    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_calls: calls,
            ..Self::default()
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::default()
        }
    }
}

/// One entry in the tool audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLogEntry {
    pub name: String,
    pub args_json: String,
    pub result_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionData {
    messages: Vec<StoredMessage>,
    tool_log: Vec<ToolLogEntry>,
    memory: Option<String>,
}

/// In-memory [`Store`] implementation.
///
/// A single mutex over the session table keeps writes serialized per
/// session, which is the ordering guarantee the core assumes of any store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, SessionData>>,
    next_id: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of entries in a session's tool audit log (test helper).
    pub async fn tool_log_len(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|s| s.tool_log.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_message(&self, session_id: &str, msg: NewMessage) -> anyhow::Result<u64> {
        let id = {
            let mut n = self.next_id.lock().await;
            *n += 1;
            *n
        };
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        session.messages.push(StoredMessage {
            id,
            role: msg.role,
            content: msg.content,
            tool_call_id: msg.tool_call_id,
            tool_calls: msg.tool_calls,
            images: msg.images,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_messages(&self, session_id: &str) -> anyhow::Result<Vec<StoredMessage>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default())
    }

    async fn add_tool_log(
        &self,
        session_id: &str,
        name: &str,
        args_json: &str,
        result_text: &str,
    ) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        session.tool_log.push(ToolLogEntry {
            name: name.to_string(),
            args_json: args_json.to_string(),
            result_text: result_text.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_session_memory(&self, session_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .and_then(|s| s.memory.clone()))
    }

    async fn save_session_memory(&self, session_id: &str, summary: &str) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        session.memory = Some(summary.to_string());
        Ok(())
    }

    async fn create_session(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.lock().await.remove(session_id);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
