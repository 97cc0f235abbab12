// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Google Gemini driver — native Generative Language API.
//!
//! Uses the `streamGenerateContent` endpoint with SSE framing.  Tool calls
//! arrive as complete `functionCall` parts (no incremental argument bytes),
//! and results are sent back as `functionResponse` parts matched by
//! function *name*, not by an opaque call id.
//!
//! # Endpoint pattern
//! `POST https://generativelanguage.googleapis.com/v1beta/models/{model}:streamGenerateContent?alt=sse`

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::{
    openai_compat::error_stream, provider::EventStream, retry, sse, CompletionRequest, Message,
    MessageContent, Role, StreamEvent,
};

pub struct GoogleProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl GoogleProvider {
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
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".into()),
            max_tokens: max_tokens.unwrap_or(8192),
            temperature: temperature.unwrap_or(0.2),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<EventStream> {
        let key = self.api_key.clone().context("GEMINI_API_KEY not set")?;

        let (system_parts, contents) = build_gemini_contents(&req.messages);

        let tools_section: Option<Value> = if req.tools.is_empty() {
            None
        } else {
            let function_declarations: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            Some(json!([{ "functionDeclarations": function_declarations }]))
        };

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
            }
        });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }
        if let Some(tools) = tools_section {
            body["tools"] = tools;
        }

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            key
        );

        debug!(model = %self.model, "sending Google Gemini request");

        let client = self.client.clone();
        let build = move || client.post(&url).json(&body);

        let resp = match retry::send_with_retry("google", build).await {
            Ok(r) => r,
            Err(e) => return Ok(error_stream(e.to_string())),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Ok(error_stream(format!("Google Gemini error {status}: {text}")));
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        tokio::spawn(decode_stream(resp, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

async fn decode_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut bytes = resp.bytes_stream();
    let mut buf = String::new();

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
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
            let v: Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let (events, done) = parse_gemini_chunk(&v);
            for ev in events {
                if tx.send(ev).await.is_err() {
                    return;
                }
            }
            if done {
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
        }
    }

    let _ = tx.send(StreamEvent::Done).await;
}

/// Parse one Gemini SSE payload.  Returns `(events, stream_finished)`.
pub(crate) fn parse_gemini_chunk(v: &Value) -> (Vec<StreamEvent>, bool) {
    if let Some(meta) = v.get("usageMetadata") {
        return (
            vec![StreamEvent::Usage {
                input_tokens: meta["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                output_tokens: meta["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            }],
            // usageMetadata arrives on the final chunk alongside finishReason;
            // finish handling below still decides termination when both exist.
            v["candidates"][0]["finishReason"].as_str().is_some(),
        );
    }

    let candidate = &v["candidates"][0];
    let finished = candidate["finishReason"].as_str().is_some();
    let mut events = Vec::new();

    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            // Thinking / reasoning delta
            if part.get("thought").and_then(|t| t.as_bool()) == Some(true) {
                if let Some(text) = part["text"].as_str() {
                    events.push(StreamEvent::Thinking(text.to_string()));
                }
                continue;
            }
            // Function call — arrives complete; Gemini assigns no call id.
            if let Some(fc) = part.get("functionCall") {
                let name = fc["name"].as_str().unwrap_or("").to_string();
                if !name.is_empty() {
                    events.push(StreamEvent::ToolCall {
                        id: None,
                        name,
                        arguments: fc["args"].clone(),
                    });
                }
                continue;
            }
            if let Some(text) = part["text"].as_str() {
                if !text.is_empty() {
                    events.push(StreamEvent::Text(text.to_string()));
                }
            }
        }
    }

    (events, finished)
}

/// Convert messages into `(system_instruction_parts, contents)`.
///
/// Gemini matches `functionResponse` parts to `functionCall`s by function
/// name, so a `tool_call_id → function_name` map is built first and used to
/// label every tool result.
pub(crate) fn build_gemini_contents(messages: &[Message]) -> (Vec<Value>, Vec<Value>) {
    let mut tc_name_map: HashMap<String, String> = HashMap::new();
    for m in messages {
        if let MessageContent::ToolCall { tool_call_id, function } = &m.content {
            tc_name_map.insert(tool_call_id.clone(), function.name.clone());
        }
    }

    let mut system_parts: Vec<Value> = Vec::new();
    let mut contents: Vec<Value> = Vec::new();

    for m in messages {
        match m.role {
            Role::System => {
                if let Some(t) = m.as_text() {
                    system_parts.push(json!({ "text": t }));
                }
            }
            Role::User | Role::Tool => {
                let parts = message_to_gemini_parts(m, &tc_name_map);
                contents.push(json!({ "role": "user", "parts": parts }));
            }
            Role::Assistant => {
                let parts = message_to_gemini_parts(m, &tc_name_map);
                contents.push(json!({ "role": "model", "parts": parts }));
            }
        }
    }

    (system_parts, contents)
}

fn message_to_gemini_parts(m: &Message, tc_name_map: &HashMap<String, String>) -> Vec<Value> {
    match &m.content {
        MessageContent::Text(t) => {
            let mut parts = vec![json!({ "text": t })];
            for url in &m.images {
                if let Ok((mime, data)) = crate::types::parse_data_url_parts(url) {
                    parts.push(json!({
                        "inline_data": { "mime_type": mime, "data": data }
                    }));
                } else {
                    parts.push(json!({ "file_data": { "file_uri": url } }));
                }
            }
            parts
        }
        MessageContent::ToolCall { tool_call_id: _, function } => {
            let input: Value = serde_json::from_str(&function.arguments).unwrap_or(json!({}));
            vec![json!({
                "functionCall": {
                    "name": function.name,
                    "args": input,
                }
            })]
        }
        MessageContent::ToolResult { tool_call_id, content } => {
            let fn_name = tc_name_map
                .get(tool_call_id)
                .map(|s| s.as_str())
                .unwrap_or(tool_call_id); // fallback to ID if name unknown
            vec![json!({
                "functionResponse": {
                    "name": fn_name,
                    "response": { "output": content },
                }
            })]
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
