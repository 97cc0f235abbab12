// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model-assisted history compression.
//!
//! When the window fills past the trigger, everything older than the kept
//! tail is summarised into the session memory string.  The model does the
//! summarising; a deterministic local fallback guarantees compression
//! still happens when the model call fails or returns nothing.

use futures::StreamExt;
use tracing::warn;

use forge_model::{
    CompletionRequest, Message, MessageContent, ModelProvider, Role, StreamEvent,
};

use crate::context::{estimate_message_tokens, estimate_tokens, KEEP_FRACTION};

/// Fixed system prompt for the compression turn.
const COMPRESSOR_SYSTEM_PROMPT: &str = "\
You are the memory compressor for a coding agent. Summarise the conversation \
transcript you are given into a dense, factual working summary the agent can \
rely on in place of the original history. Use EXACTLY these four Markdown \
sections:

## Project Info
Languages, frameworks, layout, build/test commands — anything structural.

## Completed Actions
What has been done: files read/written/edited, commands run, their outcomes.

## Key Findings
Facts discovered that remain relevant: APIs, constraints, error causes, \
decisions made.

## Outstanding Items
Work that is planned or incomplete, and open questions.

Be specific: keep file paths, symbol names, and exact commands. Do not add \
commentary about the summarisation itself.";

const MERGE_INSTRUCTION: &str = "\
An earlier summary of this session exists below. Merge it with the new \
transcript into one updated summary — keep still-relevant facts, drop \
superseded ones.";

/// Cap applied to tool results when rendering the compression transcript.
const TRANSCRIPT_TOOL_RESULT_CAP: usize = 1000;

/// Cap per extracted line in the deterministic fallback summary.
const FALLBACK_ITEM_CAP: usize = 200;

/// Compress the oldest part of `messages` into a summary string.
///
/// Returns `(summary, kept_messages)` where `kept_messages` is the system
/// messages plus the newest non-system tail fitting under 50 % of
/// `max_tokens`.  When nothing is old enough to compress, the existing
/// summary and the untouched message list come back unchanged.
pub async fn compress_with_model(
    messages: &[Message],
    existing_summary: Option<&str>,
    provider: &dyn ModelProvider,
    max_tokens: usize,
) -> (String, Vec<Message>) {
    let system: Vec<Message> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();
    let rest: Vec<Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    // Walk the non-system history newest-first, keeping while it fits.
    let budget = (max_tokens as f32 * KEEP_FRACTION) as usize;
    let mut used = estimate_tokens(&system);
    let mut keep_from = rest.len();
    while keep_from > 0 {
        let cost = estimate_message_tokens(&rest[keep_from - 1]);
        if used + cost > budget {
            break;
        }
        used += cost;
        keep_from -= 1;
    }

    let to_compress = &rest[..keep_from];
    if to_compress.is_empty() {
        return (
            existing_summary.unwrap_or("").to_string(),
            messages.to_vec(),
        );
    }

    let transcript = format_transcript(to_compress);
    let user_text = match existing_summary.filter(|s| !s.is_empty()) {
        Some(prior) => format!(
            "{MERGE_INSTRUCTION}\n\n--- previous summary ---\n{prior}\n\n--- transcript ---\n{transcript}"
        ),
        None => format!("--- transcript ---\n{transcript}"),
    };

    let summary = match run_compression_turn(provider, &user_text).await {
        Some(s) if !s.trim().is_empty() => s,
        _ => {
            warn!("compression model call failed or returned nothing; using local fallback");
            local_summary(to_compress)
        }
    };

    let mut kept = system;
    kept.extend(rest[keep_from..].iter().cloned());
    (summary, kept)
}

/// One tool-free model turn against the compressor prompt.
async fn run_compression_turn(provider: &dyn ModelProvider, user_text: &str) -> Option<String> {
    let req = CompletionRequest {
        messages: vec![
            Message::system(COMPRESSOR_SYSTEM_PROMPT),
            Message::user(user_text),
        ],
        tools: vec![],
    };
    let mut stream = match provider.stream(req).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "compression request failed");
            return None;
        }
    };
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Text(delta) => text.push_str(&delta),
            StreamEvent::Done => break,
            StreamEvent::Error(e) => {
                warn!(error = %e, "compression stream error");
                return None;
            }
            _ => {}
        }
    }
    Some(text)
}

/// Render messages as a human-readable transcript for the compressor.
fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| match &m.content {
            MessageContent::Text(t) => match m.role {
                Role::User => format!("User: {t}"),
                Role::Assistant => format!("Assistant: {t}"),
                _ => format!("{t}"),
            },
            MessageContent::ToolCall { function, .. } => {
                format!("[tool_call: {}({})]", function.name, function.arguments)
            }
            MessageContent::ToolResult { content, .. } => {
                format!("[tool_result: {}]", head(content, TRANSCRIPT_TOOL_RESULT_CAP))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic fallback: a bulleted digest extracted from the history.
fn local_summary(messages: &[Message]) -> String {
    let mut lines = vec!["Session summary (auto-generated):".to_string()];
    for m in messages {
        match &m.content {
            MessageContent::Text(t) if m.role == Role::User => {
                lines.push(format!("- user: {}", head(t, FALLBACK_ITEM_CAP)));
            }
            MessageContent::Text(t) if m.role == Role::Assistant => {
                lines.push(format!("- assistant: {}", head(t, FALLBACK_ITEM_CAP)));
            }
            MessageContent::ToolCall { function, .. } => {
                lines.push(format!(
                    "- tool {}({})",
                    function.name,
                    head(&function.arguments, FALLBACK_ITEM_CAP)
                ));
            }
            MessageContent::ToolResult { content, .. } => {
                lines.push(format!("- result: {}", head(content, FALLBACK_ITEM_CAP)));
            }
            _ => {}
        }
    }
    lines.join("\n")
}

/// First `cap` characters on a char boundary, single-line.
fn head(s: &str, cap: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.len() <= cap {
        return flat;
    }
    let mut end = cap;
    while end > 0 && !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &flat[..end])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
