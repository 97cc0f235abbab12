// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use forge_config::{AgentConfig, ModelConfig};
use forge_mcp::McpClient;
use forge_model::{CompletionRequest, Message, ModelProvider, Role, StreamEvent, ToolSchema};
use forge_skills::{SkillEntry, SkillSource};
use forge_store::{NewMessage, Store, StoredMessage, ToolCallRecord};
use forge_tools::{
    builtin_registry, McpDispatch, SearchProvider, ServiceManager, ToolCall, ToolExecutor,
    ToolOutput, Workspace,
};

use crate::compress::compress_with_model;
use crate::context::{self, DEFAULT_MAX_CONTEXT_TOKENS};
use crate::events::Chunk;
use crate::prompts::{build_system_prompt, rules_reminder};

/// Upper bound on reason→act cycles within one run.
pub const MAX_STEPS: usize = 25;

/// Base wait before retrying a rate-limited step (plus 0–5 s jitter).
const RATE_LIMIT_BASE_WAIT: Duration = Duration::from_secs(15);

/// The ReAct driver: streams from the model, dispatches tool calls in
/// parallel, reinjects the results, and repeats until the model answers or
/// a safety bound trips.
///
/// All durable state lives behind the injected [`Store`]; the driver only
/// holds the per-turn virtual message list it sends to the adapter.
pub struct Agent {
    store: Arc<dyn Store>,
    /// Explicit provider override (tests, embedders with their own wiring).
    model: Mutex<Option<Arc<dyn ModelProvider>>>,
    /// Config-driven provider construction; `model_id` per run overrides
    /// the model name.
    model_cfg: Mutex<Option<ModelConfig>>,
    config: Mutex<Arc<AgentConfig>>,
    /// Bumped by `set_config` so the MCP fabric reconnects lazily.
    config_generation: AtomicU64,
    mcp: Arc<McpClient>,
    mcp_connected_generation: tokio::sync::Mutex<Option<u64>>,
    skills: Option<Arc<dyn SkillSource>>,
    skills_cache: tokio::sync::Mutex<Option<Vec<SkillEntry>>>,
    search: Option<Arc<dyn SearchProvider>>,
    services: Option<Arc<dyn ServiceManager>>,
    abort: AtomicBool,
    max_steps: usize,
}

impl Agent {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            model: Mutex::new(None),
            model_cfg: Mutex::new(None),
            config: Mutex::new(Arc::new(AgentConfig::default())),
            config_generation: AtomicU64::new(0),
            mcp: Arc::new(McpClient::new()),
            mcp_connected_generation: tokio::sync::Mutex::new(None),
            skills: None,
            skills_cache: tokio::sync::Mutex::new(None),
            search: None,
            services: None,
            abort: AtomicBool::new(false),
            max_steps: MAX_STEPS,
        }
    }

    /// Use an explicit provider instead of config-driven construction.
    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        *self.model.get_mut().unwrap() = Some(provider);
        self
    }

    pub fn with_model_config(mut self, cfg: ModelConfig) -> Self {
        *self.model_cfg.get_mut().unwrap() = Some(cfg);
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        *self.config.get_mut().unwrap() = Arc::new(config);
        self
    }

    pub fn with_skill_source(mut self, skills: Arc<dyn SkillSource>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_search_provider(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_service_manager(mut self, services: Arc<dyn ServiceManager>) -> Self {
        self.services = Some(services);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Replace the agent configuration snapshot.  Takes effect no later
    /// than the next `run`; the MCP fabric reconnects lazily.
    pub fn set_config(&self, config: AgentConfig) {
        *self.config.lock().unwrap() = Arc::new(config);
        self.config_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Request cooperative cancellation of the current run.  Observed at
    /// every adapter-chunk boundary and before each tool dispatch.
    pub fn stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Close the MCP fabric.  Idempotent.
    pub async fn shutdown(&self) {
        self.mcp.shutdown().await;
    }

    pub fn mcp(&self) -> &Arc<McpClient> {
        &self.mcp
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// One user turn: persists the user message, drives the step loop, and
    /// streams [`Chunk`]s through `tx`.  Every run ends with exactly one
    /// `Done`; abnormal termination sends an `Error` chunk first.  No error
    /// escapes this boundary.
    pub async fn run(
        &self,
        session_id: &str,
        user_message: &str,
        project_path: &Path,
        model_id: Option<&str>,
        images: Vec<String>,
        tx: mpsc::Sender<Chunk>,
    ) {
        self.abort.store(false, Ordering::SeqCst);
        let config = self.config.lock().unwrap().clone();

        let provider = match self.provider_for(model_id) {
            Ok(p) => p,
            Err(msg) => return fail(&tx, msg).await,
        };

        // Lazily (re)connect the MCP fabric for the current config.
        // Best-effort: a server that fails to connect is logged and skipped.
        self.ensure_mcp_connected(&config).await;

        let skills = self.skill_catalog(&config).await;

        let workspace = match Workspace::new(project_path) {
            Ok(w) => Arc::new(w),
            Err(e) => return fail(&tx, format!("invalid project path: {e}")).await,
        };
        let registry = builtin_registry(
            workspace,
            self.search.clone(),
            self.skills.clone(),
            self.services.clone(),
        );
        let executor = Arc::new(ToolExecutor::new(registry));
        executor.set_mcp_dispatch(Arc::new(McpRouter { client: Arc::clone(&self.mcp) }));

        if let Err(e) = self
            .store
            .add_message(
                session_id,
                NewMessage {
                    role: "user".into(),
                    content: user_message.into(),
                    images: images.clone(),
                    ..NewMessage::default()
                },
            )
            .await
        {
            return fail(&tx, format!("store error: {e}")).await;
        }

        // Tool list = built-ins ⊕ MCP tools.
        let builtin_schemas = executor.schemas();
        let mut tools: Vec<ToolSchema> = builtin_schemas
            .iter()
            .map(|s| ToolSchema {
                name: s.name.clone(),
                description: s.description.clone(),
                parameters: s.parameters.clone(),
            })
            .collect();
        for def in self.mcp.tool_definitions() {
            tools.push(ToolSchema {
                name: def.name,
                description: def.description,
                parameters: def.input_schema,
            });
        }

        let system_prompt = build_system_prompt(&config.rules, &skills, &builtin_schemas);

        let history = match self.store.get_messages(session_id).await {
            Ok(h) => h,
            Err(e) => return fail(&tx, format!("store error: {e}")).await,
        };
        let mut memory = match self.store.get_session_memory(session_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "session memory unavailable; continuing without it");
                None
            }
        };

        let max_tokens = config.max_context_tokens.unwrap_or(DEFAULT_MAX_CONTEXT_TOKENS);
        let mut messages = vec![Message::system(system_prompt)];
        messages.extend(stored_to_messages(&history));
        repair_unanswered_tool_calls(&mut messages);

        // Synchronous compression when the window is already ≥ 80 % full;
        // the new summary is persisted before the turn continues.
        let threshold = (max_tokens as f32 * context::COMPRESS_THRESHOLD) as usize;
        if context::estimate_tokens(&messages) >= threshold {
            let (summary, kept) =
                compress_with_model(&messages, memory.as_deref(), provider.as_ref(), max_tokens)
                    .await;
            if let Err(e) = self.store.save_session_memory(session_id, &summary).await {
                warn!(error = %e, "failed to persist session memory");
            }
            memory = Some(summary);
            messages = kept;
        }

        let mut working = context::prepare(messages, memory.as_deref(), max_tokens);

        // Defensive: a store/history anomaly can leave nothing but system
        // messages.  The model needs at least the raw user input.
        if !working.iter().any(|m| m.role != Role::System) {
            warn!("no non-system message after window fitting; injecting raw user input");
            working.push(Message::user(user_message));
        }

        let reminder = rules_reminder(&config.rules);
        let mut used_ids: HashSet<String> = HashSet::new();
        let mut batch_signatures: Vec<String> = Vec::new();
        let mut step = 0usize;

        'steps: while step < self.max_steps {
            if self.aborted() {
                break;
            }

            if context::estimate_tokens(&working)
                > (max_tokens as f32 * context::EMERGENCY_THRESHOLD) as usize
            {
                warn!("context above emergency threshold; truncating to recent tail");
                context::emergency_truncate(&mut working);
            }

            let request = CompletionRequest {
                messages: working.clone(),
                tools: tools.clone(),
            };
            let mut stream = match provider.stream(request).await {
                Ok(s) => s,
                Err(e) => return fail(&tx, format!("model request failed: {e}")).await,
            };

            let mut text = String::new();
            let mut raw_calls: Vec<(Option<String>, String, Value)> = Vec::new();
            let mut stream_error: Option<String> = None;

            while let Some(event) = stream.next().await {
                if self.aborted() {
                    break 'steps;
                }
                match event {
                    StreamEvent::Text(delta) => {
                        text.push_str(&delta);
                        let _ = tx.send(Chunk::Text(delta)).await;
                    }
                    StreamEvent::Thinking(delta) => {
                        let _ = tx.send(Chunk::Thinking(delta)).await;
                    }
                    StreamEvent::ToolCall { id, name, arguments } => {
                        raw_calls.push((id, name, arguments));
                    }
                    StreamEvent::Usage { input_tokens, output_tokens } => {
                        debug!(input_tokens, output_tokens, "model usage");
                    }
                    StreamEvent::Done => break,
                    StreamEvent::Error(msg) => {
                        stream_error = Some(msg);
                        break;
                    }
                }
            }

            if let Some(msg) = stream_error {
                if is_rate_limited(&msg) {
                    // Soft retry: same step, counter untouched.  A parseable
                    // retry-after hint in the error wins over the default wait.
                    let delay = rate_limit_delay(&msg);
                    warn!(delay_secs = delay.as_secs(), "rate limited; retrying step");
                    let _ = tx
                        .send(Chunk::Text(format!(
                            "\n[rate limited; retrying in {}s]\n",
                            delay.as_secs()
                        )))
                        .await;
                    tokio::time::sleep(delay).await;
                    continue 'steps;
                }
                let _ = tx.send(Chunk::Error(msg)).await;
                let _ = tx.send(Chunk::Done).await;
                return;
            }

            // Final answer: no tool calls were produced this step.
            if raw_calls.is_empty() {
                if text.is_empty() {
                    warn!("model produced neither text nor tool calls");
                } else if let Err(e) = self
                    .store
                    .add_message(session_id, NewMessage::assistant(&text))
                    .await
                {
                    warn!(error = %e, "failed to persist assistant message");
                }
                break;
            }

            // Assign unique per-turn ids, generating where the adapter
            // omitted one (or repeated one).
            let tool_calls: Vec<ToolCall> = raw_calls
                .into_iter()
                .enumerate()
                .map(|(index, (id, name, args))| {
                    let id = match id {
                        Some(id) if used_ids.insert(id.clone()) => id,
                        _ => {
                            let generated = generate_call_id(step, index);
                            used_ids.insert(generated.clone());
                            generated
                        }
                    };
                    ToolCall { id, name, args }
                })
                .collect();

            // The assistant message with its tool_calls is persisted before
            // any result so the store always sees them in causal order.
            let records: Vec<ToolCallRecord> = tool_calls
                .iter()
                .map(|tc| ToolCallRecord {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.args.to_string(),
                })
                .collect();
            if let Err(e) = self
                .store
                .add_message(session_id, NewMessage::assistant_with_calls(&text, records))
                .await
            {
                warn!(error = %e, "failed to persist assistant tool calls");
            }

            if !text.is_empty() {
                working.push(Message::assistant(&text));
            }
            for tc in &tool_calls {
                working.push(Message::tool_call(&tc.id, &tc.name, tc.args.to_string()));
                let _ = tx
                    .send(Chunk::ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments: tc.args.clone(),
                    })
                    .await;
            }

            if self.aborted() {
                break;
            }

            // All calls of the batch run concurrently; results are collected
            // in input order regardless of completion order.  A panicking
            // task only poisons its own slot.
            let mut tasks = Vec::with_capacity(tool_calls.len());
            for tc in tool_calls.clone() {
                let executor = Arc::clone(&executor);
                tasks.push(tokio::spawn(async move { executor.execute(&tc).await }));
            }
            let mut outputs: Vec<ToolOutput> = Vec::with_capacity(tool_calls.len());
            for (i, task) in tasks.into_iter().enumerate() {
                let output = match task.await {
                    Ok(o) => o,
                    Err(e) => ToolOutput::err(&tool_calls[i].id, format!("tool panicked: {e}")),
                };
                outputs.push(output);
            }

            for (tc, output) in tool_calls.iter().zip(&outputs) {
                if let Err(e) = self
                    .store
                    .add_message(session_id, NewMessage::tool(&tc.id, &output.content))
                    .await
                {
                    warn!(error = %e, "failed to persist tool result");
                }
                if let Err(e) = self
                    .store
                    .add_tool_log(session_id, &tc.name, &tc.args.to_string(), &output.content)
                    .await
                {
                    warn!(error = %e, "failed to write tool log");
                }
                let _ = tx
                    .send(Chunk::ToolResult {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        content: output.content.clone(),
                        is_error: output.is_error,
                    })
                    .await;
                let in_context = if reminder.is_empty() {
                    output.content.clone()
                } else {
                    format!("{}\n\n{}", output.content, reminder)
                };
                working.push(Message::tool_result(&tc.id, in_context));
            }

            // Repetition guard: three identical consecutive batches means
            // the model is looping.  Checked after the results are persisted
            // so every issued call still gets its answer.
            let signature = tool_calls
                .iter()
                .map(|tc| format!("{}:{}", tc.name, tc.args))
                .collect::<Vec<_>>()
                .join("|");
            batch_signatures.push(signature);
            let n = batch_signatures.len();
            if n >= 3
                && batch_signatures[n - 1] == batch_signatures[n - 2]
                && batch_signatures[n - 2] == batch_signatures[n - 3]
            {
                warn!("identical tool batch repeated three times; stopping run");
                let _ = tx
                    .send(Chunk::Text(
                        "\n[stopping: the same tool calls were repeated three times]\n".into(),
                    ))
                    .await;
                break;
            }

            step += 1;
        }

        if step >= self.max_steps {
            warn!(max_steps = self.max_steps, "step budget exhausted");
        }
        let _ = tx.send(Chunk::Done).await;
    }

    /// Resolve the provider for this run.
    fn provider_for(&self, model_id: Option<&str>) -> Result<Arc<dyn ModelProvider>, String> {
        if let Some(id) = model_id {
            if let Some(mut cfg) = self.model_cfg.lock().unwrap().clone() {
                cfg.name = id.to_string();
                return forge_model::from_config(&cfg)
                    .map(Arc::from)
                    .map_err(|e| e.to_string());
            }
        }
        if let Some(p) = self.model.lock().unwrap().clone() {
            return Ok(p);
        }
        if let Some(cfg) = self.model_cfg.lock().unwrap().clone() {
            return forge_model::from_config(&cfg)
                .map(Arc::from)
                .map_err(|e| e.to_string());
        }
        Err("no active model configured".into())
    }

    async fn ensure_mcp_connected(&self, config: &AgentConfig) {
        let generation = self.config_generation.load(Ordering::SeqCst);
        let mut connected = self.mcp_connected_generation.lock().await;
        if *connected == Some(generation) {
            return;
        }
        self.mcp.shutdown().await;
        for server in config.enabled_mcp_servers() {
            match self.mcp.connect(server).await {
                Ok(defs) => {
                    debug!(server = %server.name, tool_count = defs.len(), "MCP server connected");
                }
                Err(e) => {
                    warn!(server = %server.name, error = %e, "MCP connect failed; continuing without it");
                }
            }
        }
        *connected = Some(generation);
    }

    /// The skill catalog for the prompt, filtered by the config's enabled
    /// skills when the config names any.  Cached after the first load.
    async fn skill_catalog(&self, config: &AgentConfig) -> Vec<SkillEntry> {
        let Some(source) = &self.skills else {
            return Vec::new();
        };
        let mut cache = self.skills_cache.lock().await;
        if cache.is_none() {
            *cache = Some(source.load_registry().await);
        }
        let registry = cache.clone().unwrap_or_default();
        if config.skills.is_empty() {
            return registry;
        }
        let enabled: HashSet<&str> = config.enabled_skills().map(|s| s.slug.as_str()).collect();
        registry
            .into_iter()
            .filter(|e| enabled.contains(e.slug.as_str()))
            .collect()
    }
}

/// Routes prefixed MCP tool names through the client fabric.
struct McpRouter {
    client: Arc<McpClient>,
}

#[async_trait]
impl McpDispatch for McpRouter {
    async fn dispatch(&self, prefixed_name: &str, args: Value) -> Result<String, String> {
        self.client
            .call_tool(prefixed_name, args)
            .await
            .map_err(|e| e.to_string())
    }
}

async fn fail(tx: &mpsc::Sender<Chunk>, msg: String) {
    let _ = tx.send(Chunk::Error(msg)).await;
    let _ = tx.send(Chunk::Done).await;
}

fn generate_call_id(step: usize, index: usize) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{step}_{index}_{}", &nonce[..8])
}

/// Convert store records into the adapter message form.  An assistant
/// record fans out into its text message plus one tool-call message per
/// recorded call.
fn stored_to_messages(stored: &[StoredMessage]) -> Vec<Message> {
    let mut out = Vec::new();
    for m in stored {
        match m.role.as_str() {
            "system" => out.push(Message::system(&m.content)),
            "user" => {
                if m.images.is_empty() {
                    out.push(Message::user(&m.content));
                } else {
                    out.push(Message::user_with_images(&m.content, m.images.clone()));
                }
            }
            "assistant" => {
                if !m.content.is_empty() {
                    out.push(Message::assistant(&m.content));
                }
                for tc in &m.tool_calls {
                    out.push(Message::tool_call(&tc.id, &tc.name, &tc.arguments));
                }
            }
            "tool" => {
                let id = m.tool_call_id.clone().unwrap_or_default();
                out.push(Message::tool_result(id, &m.content));
            }
            other => warn!(role = %other, "unknown message role in history; skipping"),
        }
    }
    out
}

/// Defensive repair for histories where an assistant's tool calls were
/// never answered (crash mid-turn, external writer).  Providers reject
/// such histories, so a placeholder result is injected for each orphan.
fn repair_unanswered_tool_calls(messages: &mut Vec<Message>) {
    use forge_model::MessageContent;

    let mut repaired: Vec<Message> = Vec::with_capacity(messages.len());
    let mut open: Vec<String> = Vec::new();

    let flush = |open: &mut Vec<String>, repaired: &mut Vec<Message>| {
        for id in open.drain(..) {
            warn!(tool_call_id = %id, "tool call without result in history; injecting placeholder");
            repaired.push(Message::tool_result(id, "(no result recorded)"));
        }
    };

    for m in messages.drain(..) {
        match &m.content {
            MessageContent::ToolCall { tool_call_id, .. } => {
                open.push(tool_call_id.clone());
                repaired.push(m);
            }
            MessageContent::ToolResult { tool_call_id, .. } => {
                open.retain(|id| id != tool_call_id);
                repaired.push(m);
            }
            _ => {
                flush(&mut open, &mut repaired);
                repaired.push(m);
            }
        }
    }
    flush(&mut open, &mut repaired);

    *messages = repaired;
}

fn is_rate_limited(msg: &str) -> bool {
    let lowered = msg.to_lowercase();
    lowered.contains("429") || lowered.contains("rate_limit") || lowered.contains("rate limit")
}

/// The wait before retrying a rate-limited step.  A `retry-after: N` hint
/// embedded in the error text overrides the default 15 s + jitter.
fn rate_limit_delay(msg: &str) -> Duration {
    if let Some(secs) = parse_retry_after_hint(msg) {
        return Duration::from_secs(secs);
    }
    RATE_LIMIT_BASE_WAIT + Duration::from_millis(rand::thread_rng().gen_range(0..5000))
}

fn parse_retry_after_hint(msg: &str) -> Option<u64> {
    let lowered = msg.to_lowercase();
    let pos = lowered.find("retry-after")?;
    let rest = &lowered[pos + "retry-after".len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_hint_parsed_from_error_text() {
        assert_eq!(parse_retry_after_hint("HTTP 429; retry-after: 2"), Some(2));
        assert_eq!(parse_retry_after_hint("Retry-After 30, slow down"), Some(30));
        assert_eq!(parse_retry_after_hint("HTTP 429 no hint"), None);
    }

    #[test]
    fn rate_limit_detection_matches_spec_markers() {
        assert!(is_rate_limited("HTTP 429 too many requests"));
        assert!(is_rate_limited("provider said rate_limit_exceeded"));
        assert!(is_rate_limited("Rate limit hit"));
        assert!(!is_rate_limited("HTTP 500 internal error"));
    }

    #[test]
    fn rate_limit_delay_honours_hint() {
        assert_eq!(rate_limit_delay("429 retry-after: 3"), Duration::from_secs(3));
        let default = rate_limit_delay("429");
        assert!(default >= Duration::from_secs(15));
        assert!(default <= Duration::from_secs(20));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_call_id(0, 0);
        let b = generate_call_id(0, 0);
        assert_ne!(a, b);
        assert!(a.starts_with("call_0_0_"));
    }

    #[test]
    fn stored_history_fans_out_assistant_tool_calls() {
        use chrono::Utc;
        let stored = vec![StoredMessage {
            id: 1,
            role: "assistant".into(),
            content: "let me check".into(),
            tool_call_id: None,
            tool_calls: vec![
                ToolCallRecord { id: "a".into(), name: "read_file".into(), arguments: "{}".into() },
                ToolCallRecord { id: "b".into(), name: "list_dir".into(), arguments: "{}".into() },
            ],
            images: vec![],
            created_at: Utc::now(),
        }];
        let msgs = stored_to_messages(&stored);
        assert_eq!(msgs.len(), 3, "text + two tool-call messages");
        assert_eq!(msgs[0].as_text(), Some("let me check"));
    }

    #[test]
    fn repair_injects_placeholder_for_orphaned_call() {
        let mut msgs = vec![
            Message::user("go"),
            Message::tool_call("c1", "read_file", "{}"),
            // no result — next user turn follows directly
            Message::user("still there?"),
        ];
        repair_unanswered_tool_calls(&mut msgs);
        assert_eq!(msgs.len(), 4);
        match &msgs[2].content {
            forge_model::MessageContent::ToolResult { tool_call_id, content } => {
                assert_eq!(tool_call_id, "c1");
                assert!(content.contains("no result recorded"));
            }
            other => panic!("expected injected result, got {other:?}"),
        }
    }

    #[test]
    fn repair_leaves_answered_calls_untouched() {
        let mut msgs = vec![
            Message::user("go"),
            Message::tool_call("c1", "read_file", "{}"),
            Message::tool_result("c1", "1 | data"),
            Message::assistant("done"),
        ];
        let before = msgs.len();
        repair_unanswered_tool_calls(&mut msgs);
        assert_eq!(msgs.len(), before);
    }
}
