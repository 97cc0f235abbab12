// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::workspace::Workspace;

/// Hard cap on matches rendered into one tool result.
const MAX_MATCHES: usize = 50;

/// Options forwarded to the search worker.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Optional file glob, e.g. `*.rs`.
    pub pattern: Option<String>,
    /// Treat the query as a regular expression.
    pub is_regex: bool,
}

/// One match returned by the search worker.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub path: String,
    /// 1-based line number of the matched line.
    pub line_number: usize,
    pub line: String,
    /// Up to two lines of context preceding the match.
    pub before: Vec<String>,
    /// Up to two lines of context following the match.
    pub after: Vec<String>,
}

/// The search worker seam.
///
/// The core never implements search itself — the host injects whatever
/// worker it runs (ripgrep subprocess, indexer, …).  The contract is just
/// `(cwd, query, opts) → (matches, truncated)`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        cwd: &Path,
        query: &str,
        opts: &SearchOptions,
    ) -> anyhow::Result<(Vec<SearchMatch>, bool)>;
}

pub struct SearchFilesTool {
    pub workspace: Arc<Workspace>,
    pub provider: Arc<dyn SearchProvider>,
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search file contents in the project. Returns up to 50 matches with \
         file path, line number, and two lines of context on each side. \
         Optional pattern narrows files (e.g. '*.rs'); is_regex treats the \
         query as a regular expression."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text or regex to search for"
                },
                "pattern": {
                    "type": "string",
                    "description": "Optional file glob filter, e.g. '*.rs'"
                },
                "is_regex": {
                    "type": "boolean",
                    "description": "Treat query as a regular expression (default false)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q,
            None => return ToolOutput::err(&call.id, "missing required parameter 'query'"),
        };
        let opts = SearchOptions {
            pattern: call
                .args
                .get("pattern")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            is_regex: call
                .args
                .get("is_regex")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        };

        let (matches, provider_truncated) = match self
            .provider
            .search(self.workspace.root(), query, &opts)
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("search error: {e}")),
        };

        if matches.is_empty() {
            return ToolOutput::ok(&call.id, format!("no matches for {query:?}"));
        }

        let total = matches.len();
        let shown = total.min(MAX_MATCHES);
        let mut out = String::new();
        for m in matches.iter().take(MAX_MATCHES) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format_match(m));
        }
        if total > MAX_MATCHES || provider_truncated {
            out.push_str(&format!(
                "\n…(results truncated, showing {shown} of {}{} matches)",
                total,
                if provider_truncated { "+" } else { "" }
            ));
        }

        ToolOutput::ok(&call.id, out)
    }
}

/// Render one match with its numbered context window.
fn format_match(m: &SearchMatch) -> String {
    let mut s = format!("{}:{}", m.path, m.line_number);
    let before_start = m.line_number.saturating_sub(m.before.len());
    for (i, line) in m.before.iter().enumerate() {
        s.push_str(&format!("\n  {} | {}", before_start + i, line));
    }
    s.push_str(&format!("\n> {} | {}", m.line_number, m.line));
    for (i, line) in m.after.iter().enumerate() {
        s.push_str(&format!("\n  {} | {}", m.line_number + 1 + i, line));
    }
    s
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Scripted fake: returns a fixed match list regardless of query.
    struct FakeSearch {
        matches: Vec<SearchMatch>,
        truncated: bool,
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn search(
            &self,
            _cwd: &Path,
            _query: &str,
            _opts: &SearchOptions,
        ) -> anyhow::Result<(Vec<SearchMatch>, bool)> {
            Ok((self.matches.clone(), self.truncated))
        }
    }

    fn one_match(path: &str, line_number: usize) -> SearchMatch {
        SearchMatch {
            path: path.into(),
            line_number,
            line: "let x = 1;".into(),
            before: vec!["// setup".into(), "fn main() {".into()],
            after: vec!["    use_x(x);".into(), "}".into()],
        }
    }

    fn tool_with(matches: Vec<SearchMatch>, truncated: bool) -> (tempfile::TempDir, SearchFilesTool) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::new(dir.path()).unwrap());
        let t = SearchFilesTool {
            workspace: ws,
            provider: Arc::new(FakeSearch { matches, truncated }),
        };
        (dir, t)
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "s1".into(), name: "search_files".into(), args }
    }

    #[tokio::test]
    async fn match_includes_path_line_and_context() {
        let (_dir, t) = tool_with(vec![one_match("src/main.rs", 10)], false);
        let out = t.execute(&call(json!({"query": "let x"}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("src/main.rs:10"), "{}", out.content);
        assert!(out.content.contains("> 10 | let x = 1;"), "{}", out.content);
        assert!(out.content.contains("8 | // setup"), "{}", out.content);
        assert!(out.content.contains("11 |     use_x(x);"), "{}", out.content);
    }

    #[tokio::test]
    async fn no_matches_reported_plainly() {
        let (_dir, t) = tool_with(vec![], false);
        let out = t.execute(&call(json!({"query": "nothing"}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("no matches"));
    }

    #[tokio::test]
    async fn over_fifty_matches_truncated_with_notice() {
        let matches: Vec<_> = (1..=80).map(|i| one_match("a.rs", i)).collect();
        let (_dir, t) = tool_with(matches, false);
        let out = t.execute(&call(json!({"query": "x"}))).await;
        assert!(out.content.contains("showing 50 of 80 matches"), "{}", out.content);
        // Exactly 50 match headers rendered.
        let headers = out.content.matches("a.rs:").count();
        assert_eq!(headers, 50);
    }

    #[tokio::test]
    async fn provider_truncation_flag_noted() {
        let (_dir, t) = tool_with(vec![one_match("a.rs", 1)], true);
        let out = t.execute(&call(json!({"query": "x"}))).await;
        assert!(out.content.contains("truncated"), "{}", out.content);
    }

    #[tokio::test]
    async fn missing_query_is_error() {
        let (_dir, t) = tool_with(vec![], false);
        let out = t.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("'query'"));
    }

    #[tokio::test]
    async fn options_forwarded() {
        struct AssertOpts;
        #[async_trait]
        impl SearchProvider for AssertOpts {
            async fn search(
                &self,
                _cwd: &Path,
                query: &str,
                opts: &SearchOptions,
            ) -> anyhow::Result<(Vec<SearchMatch>, bool)> {
                assert_eq!(query, "fn main");
                assert_eq!(opts.pattern.as_deref(), Some("*.rs"));
                assert!(opts.is_regex);
                Ok((vec![], false))
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let t = SearchFilesTool {
            workspace: Arc::new(Workspace::new(dir.path()).unwrap()),
            provider: Arc::new(AssertOpts),
        };
        let out = t
            .execute(&call(json!({"query": "fn main", "pattern": "*.rs", "is_regex": true})))
            .await;
        assert!(!out.is_error);
    }
}
