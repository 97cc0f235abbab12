// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Server-sent-events line framing shared by the streaming drivers.
//!
//! SSE events can be split across TCP packets, so each driver keeps a
//! persistent buffer across chunks and only parses complete
//! `\n`-terminated lines.  Anything left over is prepended to the next
//! chunk.  Without this, an event split mid-JSON would be dropped on both
//! sides of the split and parallel tool-call streams would corrupt.

/// Drain all complete `\n`-terminated `data:` payloads from `buf`.
///
/// The trailing incomplete line (bytes not yet terminated by `\n`) is left
/// in `buf`.  Comment lines, `event:` lines, and blank lines are skipped.
pub(crate) fn drain_data_lines(buf: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        // Strip the optional Windows-style \r before \n.
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        // Advance buffer past the consumed line including the \n.
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() {
                payloads.push(data.to_string());
            }
        }
    }
    payloads
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
