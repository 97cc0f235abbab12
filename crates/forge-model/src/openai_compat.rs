// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared base implementation for OpenAI-compatible chat completion APIs.
//!
//! A large family of providers speaks the same `/chat/completions` SSE wire
//! format.  This module provides a single `OpenAICompatProvider` that every
//! such driver configures with its own defaults (URL, auth style, headers).
//!
//! # Auth styles
//! - `Bearer` — `Authorization: Bearer <key>` (most providers)
//! - `ApiKeyHeader` — `api-key: <key>` header
//! - `None` — no authentication (local servers like Ollama / LM Studio)

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    provider::EventStream, retry, sse, CompletionRequest, Message, MessageContent, Role,
    StreamEvent,
};

/// How to send the API key in HTTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` — standard for most providers.
    Bearer,
    /// `api-key: <key>` header.
    ApiKeyHeader,
    /// No authentication header — local servers.
    None,
}

/// OpenAI-compatible chat completion provider.
pub struct OpenAICompatProvider {
    /// Provider id returned by `ModelProvider::name()`.
    driver_name: &'static str,
    /// Model id forwarded to the API.
    model: String,
    /// API key (pre-resolved from config or env).
    api_key: Option<String>,
    /// Full chat completions URL.
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
    /// Additional HTTP headers (e.g. `HTTP-Referer` for OpenRouter).
    extra_headers: Vec<(String, String)>,
    auth_style: AuthStyle,
}

impl OpenAICompatProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver_name: &'static str,
        model: String,
        api_key: Option<String>,
        base_url: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        extra_headers: Vec<(String, String)>,
        auth_style: AuthStyle,
    ) -> Self {
        Self {
            driver_name,
            model,
            api_key,
            chat_url: resolve_chat_url(base_url),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature: temperature.unwrap_or(0.2),
            client: reqwest::Client::new(),
            extra_headers,
            auth_style,
        }
    }
}

/// Derive the chat completions URL from a configured base.
///
/// `/chat/completions` is appended unless the base already ends in a
/// completions or messages endpoint (users sometimes configure the full
/// path, and Anthropic-style proxies expose `/v1/messages`).
pub(crate) fn resolve_chat_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/completions") || base.ends_with("/messages") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        self.driver_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<EventStream> {
        let messages = build_openai_messages(&req.messages);
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream_options": { "include_usage": true },
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let key = match self.auth_style {
            AuthStyle::None => None,
            AuthStyle::Bearer | AuthStyle::ApiKeyHeader => Some(
                self.api_key
                    .clone()
                    .context("API key not set; provide api_key or api_key_env in config")?,
            ),
        };

        debug!(
            driver = %self.driver_name,
            model = %self.model,
            tool_count = tools.len(),
            message_count = messages.len(),
            "sending completion request"
        );

        let client = self.client.clone();
        let chat_url = self.chat_url.clone();
        let auth_style = self.auth_style;
        let extra_headers = self.extra_headers.clone();
        let build = move || {
            let mut http_req = client.post(&chat_url).json(&body);
            http_req = match (auth_style, key.as_deref()) {
                (AuthStyle::Bearer, Some(k)) => http_req.bearer_auth(k),
                (AuthStyle::ApiKeyHeader, Some(k)) => http_req.header("api-key", k),
                _ => http_req,
            };
            for (name, val) in &extra_headers {
                http_req = http_req.header(name.as_str(), val.as_str());
            }
            http_req
        };

        let resp = match retry::send_with_retry(self.driver_name, build).await {
            Ok(r) => r,
            Err(e) => return Ok(error_stream(e.to_string())),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Ok(error_stream(format!(
                "{} error {status}: {text}",
                self.driver_name
            )));
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        tokio::spawn(decode_stream(resp, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// A stream that carries a single terminal error event.
pub(crate) fn error_stream(msg: String) -> EventStream {
    Box::pin(futures::stream::iter(vec![StreamEvent::Error(msg)]))
}

/// Per-index accumulator for a streamed tool call.
///
/// OpenAI interleaves argument fragments for parallel tool calls, keyed by
/// an `index` field; a call is only complete once the stream closes.
#[derive(Debug, Default)]
pub(crate) struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub args_buf: String,
}

impl PendingToolCall {
    /// Resolve the accumulated argument bytes into a structured value.
    ///
    /// Empty bytes become `{}`; bytes that fail to parse are wrapped as
    /// `{"raw": "<bytes>"}` so the dispatcher still sees a structured value.
    pub fn finish(self) -> StreamEvent {
        let arguments = if self.args_buf.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&self.args_buf) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        tool_name = %self.name,
                        error = %e,
                        "tool call arguments failed to parse; wrapping raw bytes"
                    );
                    json!({ "raw": self.args_buf })
                }
            }
        };
        StreamEvent::ToolCall {
            id: if self.id.is_empty() { None } else { Some(self.id) },
            name: self.name,
            arguments,
        }
    }
}

/// Flush accumulated tool calls in provider index order.
///
/// Calls with an empty name cannot be dispatched and are dropped — keeping
/// them would corrupt the conversation history sent back on the next turn.
pub(crate) fn flush_pending(pending: HashMap<u32, PendingToolCall>) -> Vec<StreamEvent> {
    let mut sorted: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
    sorted.sort_by_key(|(idx, _)| *idx);
    sorted
        .into_iter()
        .filter_map(|(_, ptc)| {
            if ptc.name.is_empty() {
                warn!(tool_call_id = %ptc.id, "dropping tool call with empty name");
                None
            } else {
                Some(ptc.finish())
            }
        })
        .collect()
}

/// Reader task: decode the SSE byte stream into normalized events.
///
/// Terminates with exactly one `Done` or `Error`; a receiver drop aborts
/// decoding silently (cancellation closes the channel).
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
            if payload == "[DONE]" {
                for ev in flush_pending(std::mem::take(&mut pending)) {
                    if tx.send(ev).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
            let v: Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(_) => continue,
            };
            for ev in parse_sse_chunk(&v, &mut pending) {
                if tx.send(ev).await.is_err() {
                    return;
                }
            }
        }
    }

    // Server closed without a [DONE] sentinel — still terminate cleanly.
    for ev in flush_pending(std::mem::take(&mut pending)) {
        if tx.send(ev).await.is_err() {
            return;
        }
    }
    let _ = tx.send(StreamEvent::Done).await;
}

/// Parse one SSE JSON payload, accumulating tool-call fragments into
/// `pending` and returning any immediately-emittable events.
pub(crate) fn parse_sse_chunk(
    v: &Value,
    pending: &mut HashMap<u32, PendingToolCall>,
) -> Vec<StreamEvent> {
    // Usage-only chunk (emitted when stream_options.include_usage = true).
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        return vec![StreamEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        }];
    }

    let delta = &v["choices"][0]["delta"];

    // Tool call fragment — route by index into the accumulator.
    if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tool_calls {
            let index = tc["index"].as_u64().unwrap_or(0) as u32;
            let ptc = pending.entry(index).or_default();
            if let Some(id) = tc["id"].as_str().filter(|s| !s.is_empty()) {
                ptc.id = id.to_string();
            }
            if let Some(name) = tc["function"]["name"].as_str().filter(|s| !s.is_empty()) {
                ptc.name = name.to_string();
            }
            if let Some(args) = tc["function"]["arguments"].as_str() {
                ptc.args_buf.push_str(args);
            }
        }
        return vec![];
    }

    // Thinking delta — `reasoning_content` (llama.cpp, DeepSeek-R1, Qwen3)
    // or `reasoning` (OpenRouter).  Both carry readable CoT text.
    let thinking = delta
        .get("reasoning_content")
        .and_then(|c| c.as_str())
        .or_else(|| delta.get("reasoning").and_then(|c| c.as_str()));
    if let Some(t) = thinking.filter(|t| !t.is_empty()) {
        return vec![StreamEvent::Thinking(t.to_string())];
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            return vec![StreamEvent::Text(text.to_string())];
        }
    }

    vec![]
}

fn role_str(r: &Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Convert a slice of [`Message`]s into the OpenAI wire-format JSON array.
///
/// **Parallel tool call coalescing**: OpenAI requires that all tool calls
/// from one assistant turn appear inside a *single* assistant message as a
/// `tool_calls` array.  Tool calls are stored one per message internally,
/// so consecutive `ToolCall` messages are merged here.
pub(crate) fn build_openai_messages(messages: &[Message]) -> Vec<Value> {
    fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
        json!({
            "id": tool_call_id,
            "type": "function",
            "function": {
                "name": function.name,
                "arguments": function.arguments,
            }
        })
    }

    let mut result: Vec<Value> = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let m = &messages[i];

        if let MessageContent::ToolCall { tool_call_id, function } = &m.content {
            let mut calls = vec![tool_call_to_json(tool_call_id, function)];
            i += 1;
            while i < messages.len() {
                if let MessageContent::ToolCall { tool_call_id, function } = &messages[i].content {
                    calls.push(tool_call_to_json(tool_call_id, function));
                    i += 1;
                } else {
                    break;
                }
            }
            result.push(json!({ "role": "assistant", "tool_calls": calls }));
            continue;
        }

        let v = match &m.content {
            MessageContent::Text(t) if !m.images.is_empty() => {
                let mut content: Vec<Value> = vec![json!({ "type": "text", "text": t })];
                for url in &m.images {
                    content.push(json!({
                        "type": "image_url",
                        "image_url": { "url": url },
                    }));
                }
                json!({ "role": role_str(&m.role), "content": content })
            }
            MessageContent::Text(t) => json!({
                "role": role_str(&m.role),
                "content": t,
            }),
            MessageContent::ToolCall { .. } => unreachable!("handled above"),
            MessageContent::ToolResult { tool_call_id, content } => {
                json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content })
            }
        };
        result.push(v);
        i += 1;
    }

    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
