// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in the conversation history.
///
/// Tool calls are stored one per message (easier to work with internally);
/// each wire-format builder coalesces consecutive tool-call messages into
/// whatever grouping its provider dialect requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    /// Data-URL (`data:<mime>;base64,<b64>`) image attachments.
    /// Only meaningful on user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()), images: vec![] }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()), images: vec![] }
    }

    pub fn user_with_images(text: impl Into<String>, images: Vec<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()), images }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()), images: vec![] }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: id.into(),
                function: FunctionCall { name: name.into(), arguments: arguments.into() },
            },
            images: vec![],
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
            },
            images: vec![],
        }
    }

    /// Return the plain text of this message, if it is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The content of a message.
///
/// - `Text` – plain string (most messages)
/// - `ToolCall` – the assistant requests a tool invocation
/// - `ToolResult` – the textual result of a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        tool_call_id: String,
        function: FunctionCall,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

// ─── Stream events ────────────────────────────────────────────────────────────

/// A single normalized event streamed from a model provider.
///
/// Sequencing contract: zero or more `Text` / `Thinking` events in wire
/// order, interleaved with `ToolCall` events whose arguments are already
/// complete (drivers accumulate incremental argument bytes internally), and
/// exactly one terminal `Done` or `Error` — nothing follows the terminal.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Text(String),
    Thinking(String),
    /// A complete tool invocation request.  `id` is `None` when the provider
    /// did not assign one; the caller generates a unique id in that case.
    /// `arguments` is always a structured value — drivers that fail to parse
    /// the accumulated argument bytes wrap them as `{"raw": "<bytes>"}`.
    ToolCall {
        id: Option<String>,
        name: String,
        arguments: Value,
    },
    /// Final usage statistics, when the provider reports them.
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// The stream finished normally.
    Done,
    /// The stream finished abnormally.
    Error(String),
}

impl StreamEvent {
    /// True for the two terminal variants.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

// ─── Data URL helpers ─────────────────────────────────────────────────────────

/// Parse a data URL of the form `data:<mime>;base64,<b64>` and return
/// `Ok((mime_type, base64_string))`.  Returns `Err` for non-data-URLs so
/// callers can fall back to treating the string as a plain HTTPS URL.
pub fn parse_data_url_parts(url: &str) -> Result<(String, String), &'static str> {
    let rest = url.strip_prefix("data:").ok_or("not a data URL")?;
    let (meta, b64) = rest.split_once(',').ok_or("malformed data URL")?;
    let mime = meta.strip_suffix(";base64").unwrap_or(meta).to_string();
    Ok((mime, b64.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.as_text(), Some("hello"));
    }

    #[test]
    fn message_tool_result_sets_role_and_content() {
        let m = Message::tool_result("id-1", "output");
        assert_eq!(m.role, Role::Tool);
        assert!(m.as_text().is_none(), "tool_result has no text accessor");
        match &m.content {
            MessageContent::ToolResult { tool_call_id, content } => {
                assert_eq!(tool_call_id, "id-1");
                assert_eq!(content, "output");
            }
            _ => panic!("wrong content variant"),
        }
    }

    #[test]
    fn message_tool_call_carries_function() {
        let m = Message::tool_call("c1", "read_file", r#"{"path":"a"}"#);
        assert_eq!(m.role, Role::Assistant);
        match &m.content {
            MessageContent::ToolCall { tool_call_id, function } => {
                assert_eq!(tool_call_id, "c1");
                assert_eq!(function.name, "read_file");
            }
            _ => panic!("wrong content variant"),
        }
    }

    #[test]
    fn user_with_images_attaches_urls() {
        let m = Message::user_with_images("look", vec!["data:image/png;base64,AA".into()]);
        assert_eq!(m.images.len(), 1);
        assert_eq!(m.as_text(), Some("look"));
    }

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::user("test payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role, Role::User);
        assert_eq!(decoded.as_text(), Some("test payload"));
    }

    #[test]
    fn terminal_events_identified() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error("x".into()).is_terminal());
        assert!(!StreamEvent::Text("t".into()).is_terminal());
        assert!(
            !StreamEvent::ToolCall {
                id: None,
                name: "t".into(),
                arguments: serde_json::json!({})
            }
            .is_terminal()
        );
    }

    #[test]
    fn parse_data_url_valid() {
        let (mime, data) = parse_data_url_parts("data:image/png;base64,AAAA").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, "AAAA");
    }

    #[test]
    fn parse_data_url_rejects_https() {
        assert!(parse_data_url_parts("https://example.com/a.png").is_err());
    }
}
