// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    openai_compat::{error_stream, flush_pending, PendingToolCall},
    provider::EventStream,
    retry, sse, CompletionRequest, Message, MessageContent, Role, StreamEvent,
};

pub struct AnthropicProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".into()),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature: temperature.unwrap_or(0.2),
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/messages") {
            base.to_string()
        } else {
            format!("{base}/v1/messages")
        }
    }
}

#[async_trait]
impl crate::ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<EventStream> {
        let key = self
            .api_key
            .clone()
            .context("ANTHROPIC_API_KEY not set")?;

        let (system_text, messages) = build_anthropic_messages(&req.messages);

        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
        });
        if !system_text.is_empty() {
            body["system"] = json!(system_text);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(model = %self.model, tool_count = tools.len(), "sending anthropic request");

        let client = self.client.clone();
        let url = self.messages_url();
        let build = move || {
            client
                .post(&url)
                .header("x-api-key", &key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
        };

        let resp = match retry::send_with_retry("anthropic", build).await {
            Ok(r) => r,
            Err(e) => return Ok(error_stream(e.to_string())),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Ok(error_stream(format!("Anthropic error {status}: {text}")));
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        tokio::spawn(decode_stream(resp, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Reader task for the Anthropic event stream.
///
/// Tool-use argument bytes accumulate per content-block index and each call
/// is emitted at its `content_block_stop` — the earliest point at which the
/// arguments are known to be complete.
async fn decode_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut bytes = resp.bytes_stream();
    let mut buf = String::new();
    let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(format!("stream error: {e}"))).await;
                return;
            }
        };
        buf.push_str(&String::from_utf8_lossy(&chunk));
        for payload in sse::drain_data_lines(&mut buf) {
            let v: Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let (events, done) = parse_anthropic_event(&v, &mut pending);
            for ev in events {
                if tx.send(ev).await.is_err() {
                    return;
                }
            }
            if done {
                for ev in flush_pending(std::mem::take(&mut pending)) {
                    if tx.send(ev).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
        }
    }

    for ev in flush_pending(std::mem::take(&mut pending)) {
        if tx.send(ev).await.is_err() {
            return;
        }
    }
    let _ = tx.send(StreamEvent::Done).await;
}

/// Parse one Anthropic SSE event.  Returns `(events, stream_finished)`.
pub(crate) fn parse_anthropic_event(
    v: &Value,
    pending: &mut HashMap<u32, PendingToolCall>,
) -> (Vec<StreamEvent>, bool) {
    let event_type = v["type"].as_str().unwrap_or("");
    match event_type {
        "content_block_start" => {
            let index = v["index"].as_u64().unwrap_or(0) as u32;
            let block = &v["content_block"];
            if block["type"].as_str() == Some("tool_use") {
                pending.insert(
                    index,
                    PendingToolCall {
                        id: block["id"].as_str().unwrap_or("").to_string(),
                        name: block["name"].as_str().unwrap_or("").to_string(),
                        args_buf: String::new(),
                    },
                );
            }
            (vec![], false)
        }
        "content_block_delta" => {
            let index = v["index"].as_u64().unwrap_or(0) as u32;
            let delta = &v["delta"];
            match delta["type"].as_str().unwrap_or("") {
                "text_delta" => {
                    let text = delta["text"].as_str().unwrap_or("");
                    if text.is_empty() {
                        (vec![], false)
                    } else {
                        (vec![StreamEvent::Text(text.to_string())], false)
                    }
                }
                "input_json_delta" => {
                    let partial = delta["partial_json"].as_str().unwrap_or("");
                    pending.entry(index).or_default().args_buf.push_str(partial);
                    (vec![], false)
                }
                "thinking_delta" => {
                    let thinking = delta["thinking"].as_str().unwrap_or("");
                    if thinking.is_empty() {
                        (vec![], false)
                    } else {
                        (vec![StreamEvent::Thinking(thinking.to_string())], false)
                    }
                }
                // The encrypted signature blob at the end of a thinking block
                // is not human-readable and must never surface as text.
                "signature_delta" => (vec![], false),
                _ => (vec![], false),
            }
        }
        "content_block_stop" => {
            // Arguments for this block are complete — emit the call now.
            let index = v["index"].as_u64().unwrap_or(0) as u32;
            if let Some(ptc) = pending.remove(&index) {
                if ptc.name.is_empty() {
                    warn!(tool_call_id = %ptc.id, "dropping tool_use block with empty name");
                    (vec![], false)
                } else {
                    (vec![ptc.finish()], false)
                }
            } else {
                (vec![], false)
            }
        }
        "message_start" => {
            if let Some(usage) = v["message"].get("usage") {
                return (
                    vec![StreamEvent::Usage {
                        input_tokens: usage["input_tokens"].as_u64().unwrap_or(0) as u32,
                        output_tokens: 0,
                    }],
                    false,
                );
            }
            (vec![], false)
        }
        "message_delta" => {
            if let Some(usage) = v.get("usage") {
                return (
                    vec![StreamEvent::Usage {
                        input_tokens: 0,
                        output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
                    }],
                    false,
                );
            }
            (vec![], false)
        }
        "message_stop" => (vec![], true),
        _ => (vec![], false),
    }
}

/// Convert a slice of [`Message`]s into the Anthropic wire format.
///
/// Returns `(system_text, conversation_messages)`.  The first system
/// message becomes the top-level `system` field.  Anthropic requires strict
/// user/assistant alternation, so adjacent same-role messages are merged
/// into one message with a combined content-block array (which also groups
/// parallel tool_use and tool_result blocks the way the API expects), and a
/// `"(continue)"` user placeholder is prepended when the history would
/// otherwise start with an assistant turn.
pub(crate) fn build_anthropic_messages(messages: &[Message]) -> (String, Vec<Value>) {
    let mut system_text = String::new();
    // (role, blocks) pairs before the merge pass.
    let mut staged: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for m in messages {
        if m.role == Role::System {
            if system_text.is_empty() {
                if let Some(t) = m.as_text() {
                    system_text = t.to_string();
                }
            } else if let Some(t) = m.as_text() {
                // Later system messages (e.g. the session-memory injection)
                // fold into the system field rather than the conversation.
                system_text.push_str("\n\n");
                system_text.push_str(t);
            }
            continue;
        }
        let (role, blocks): (&'static str, Vec<Value>) = match &m.content {
            MessageContent::Text(t) => {
                let mut blocks = vec![json!({ "type": "text", "text": t })];
                for url in &m.images {
                    blocks.push(image_block(url));
                }
                let role = if m.role == Role::Assistant { "assistant" } else { "user" };
                (role, blocks)
            }
            MessageContent::ToolCall { tool_call_id, function } => (
                "assistant",
                vec![json!({
                    "type": "tool_use",
                    "id": tool_call_id,
                    "name": function.name,
                    "input": serde_json::from_str::<Value>(&function.arguments)
                        .unwrap_or(json!({})),
                })],
            ),
            MessageContent::ToolResult { tool_call_id, content } => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                })],
            ),
        };
        match staged.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => {
                last_blocks.extend(blocks);
            }
            _ => staged.push((role, blocks)),
        }
    }

    let mut out: Vec<Value> = Vec::with_capacity(staged.len() + 1);
    if staged.first().map(|(r, _)| *r) == Some("assistant") {
        out.push(json!({ "role": "user", "content": "(continue)" }));
    }
    for (role, blocks) in staged {
        out.push(json!({ "role": role, "content": blocks }));
    }
    (system_text, out)
}

fn image_block(url: &str) -> Value {
    if let Ok((mime, data)) = crate::types::parse_data_url_parts(url) {
        json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime, "data": data }
        })
    } else {
        json!({
            "type": "image",
            "source": { "type": "url", "url": url }
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
