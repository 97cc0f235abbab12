// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

/// Events emitted by the agent during a single run.
///
/// The vocabulary mirrors the model adapter's stream plus `ToolResult`; a
/// run always ends with exactly one `Done`, preceded by an `Error` when it
/// terminated abnormally.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// A text delta streamed from the model
    Text(String),
    /// A thinking/reasoning delta from the model
    Thinking(String),
    /// The model has requested a tool call (id already made unique)
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    /// A tool call finished; results are emitted in input order
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// The run finished
    Done,
    /// The run terminated abnormally (followed by `Done`)
    Error(String),
}
