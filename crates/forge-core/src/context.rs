// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Budget-aware message-window management.
//!
//! One estimator serves all budgeting decisions: ceil(chars / 3), plus a
//! flat 255 tokens per image, plus the raw name+argument length of each
//! tool call.  It deliberately over-counts — every trigger derived from it
//! (80 % compression, 95 % emergency truncation) fires early rather than
//! late.

use forge_model::{Message, MessageContent, Role};

/// Default context budget when neither config nor model supplies one.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 128_000;

/// Fraction of the budget at which compression triggers.
pub const COMPRESS_THRESHOLD: f32 = 0.8;

/// Fraction of the budget the kept tail may occupy after trimming.
pub const KEEP_FRACTION: f32 = 0.5;

/// Fraction of the budget at which the step loop emergency-truncates.
pub const EMERGENCY_THRESHOLD: f32 = 0.95;

/// Non-system messages preserved by an emergency truncation.
pub const EMERGENCY_KEEP_RECENT: usize = 6;

/// Tool results longer than this are elided before being sent to the model.
const TOOL_RESULT_ELIDE_OVER: usize = 3000;
const TOOL_RESULT_HEAD: usize = 2000;
const TOOL_RESULT_TAIL: usize = 500;

/// Flat token weight per attached image.
const IMAGE_TOKENS: usize = 255;

/// Approximate token count of one message.
pub fn estimate_message_tokens(m: &Message) -> usize {
    let (chars, extra) = match &m.content {
        MessageContent::Text(t) => (t.len(), 0),
        MessageContent::ToolResult { content, .. } => (content.len(), 0),
        MessageContent::ToolCall { function, .. } => {
            (0, function.name.len() + function.arguments.len())
        }
    };
    let text_tokens = chars.div_ceil(3);
    text_tokens + extra + m.images.len() * IMAGE_TOKENS
}

/// Approximate token count of a message list.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Prepare a message list for one model turn.
///
/// 1. Inject the session-memory summary (when present) as a synthetic
///    system message right after the first system message.
/// 2. Elide over-long tool results to head + tail with a byte-count notice.
/// 3. If the estimate exceeds 80 % of `max_tokens`, keep all system
///    messages plus the newest non-system suffix that fits under 50 %.
pub fn prepare(messages: Vec<Message>, memory_summary: Option<&str>, max_tokens: usize) -> Vec<Message> {
    let mut messages = messages;

    if let Some(summary) = memory_summary.filter(|s| !s.is_empty()) {
        let memory_msg = Message::system(format!("[session memory]\n{summary}"));
        let insert_at = messages
            .iter()
            .position(|m| m.role == Role::System)
            .map(|p| p + 1)
            .unwrap_or(0);
        messages.insert(insert_at, memory_msg);
    }

    for m in &mut messages {
        if let MessageContent::ToolResult { content, .. } = &mut m.content {
            if content.len() > TOOL_RESULT_ELIDE_OVER {
                *content = elide(content);
            }
        }
    }

    let budget = (max_tokens as f32 * COMPRESS_THRESHOLD) as usize;
    if estimate_tokens(&messages) <= budget {
        return messages;
    }

    trim_to_fraction(messages, max_tokens, KEEP_FRACTION)
}

/// Keep all system messages plus the newest non-system messages that fit
/// within `fraction` of `max_tokens` (system tokens included in the sum).
/// The dropped messages always form a contiguous prefix of the non-system
/// suffix.
fn trim_to_fraction(messages: Vec<Message>, max_tokens: usize, fraction: f32) -> Vec<Message> {
    let budget = (max_tokens as f32 * fraction) as usize;
    let system: Vec<Message> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();
    let non_system: Vec<Message> = messages
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect();

    let mut used = estimate_tokens(&system);
    let mut kept_rev: Vec<Message> = Vec::new();
    for m in non_system.into_iter().rev() {
        let cost = estimate_message_tokens(&m);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept_rev.push(m);
    }
    kept_rev.reverse();

    let mut out = system;
    out.extend(kept_rev);
    out
}

/// Emergency truncation for the step loop: system messages plus the last
/// six non-system messages, everything else dropped without a model call.
pub fn emergency_truncate(messages: &mut Vec<Message>) {
    let system: Vec<Message> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();
    let non_system: Vec<Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    let keep_from = non_system.len().saturating_sub(EMERGENCY_KEEP_RECENT);
    let mut out = system;
    out.extend(non_system[keep_from..].iter().cloned());
    *messages = out;
}

fn elide(content: &str) -> String {
    let elided = content.len().saturating_sub(TOOL_RESULT_HEAD + TOOL_RESULT_TAIL);
    let head_end = floor_char_boundary(content, TOOL_RESULT_HEAD);
    let tail_start = ceil_char_boundary(content, content.len() - TOOL_RESULT_TAIL);
    format!(
        "{}…(elided {elided} chars)…{}",
        &content[..head_end],
        &content[tail_start..]
    )
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
