// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// Used for config fields that should be enabled unless the user explicitly
/// sets them to `false`.  `#[serde(default)]` on a `bool` always falls back
/// to `bool::default()` (i.e. `false`), so a named function is required.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" | "anthropic" | "google" | "openrouter" |
    /// "ollama" | "mock" | any OpenAI-compatible gateway id.
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies or self-hosted servers.
    /// For hosted providers the correct default is auto-selected.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            // api_key_env is intentionally None here.  resolve_api_key() falls
            // through to the per-provider canonical env var (OPENAI_API_KEY,
            // ANTHROPIC_API_KEY, GEMINI_API_KEY) so overriding the provider
            // never sends the wrong credential.
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
        }
    }
}

/// A skill reference as it appears in the agent configuration.
///
/// The slug is the directory name under the skill repository root; the name
/// is the human-readable label shown in the system prompt catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRef {
    pub name: String,
    pub slug: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Launch description for one external MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name — becomes the `mcp_{name}_` prefix of its exposed tools.
    pub name: String,
    /// Executable to spawn.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables merged over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_context_tokens() -> Option<usize> {
    None
}

/// The agent configuration snapshot.
///
/// The driver holds an `Arc<AgentConfig>` per turn; `set_config` swaps the
/// snapshot and the replacement takes effect no later than the next run.
/// Nothing mutates a snapshot in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub skills: Vec<SkillRef>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    /// User-authored rules.  Rendered as a numbered `## Rules` block in the
    /// system prompt and reiterated after every tool result.
    #[serde(default)]
    pub rules: Vec<String>,
    /// Context window budget override.  `None` uses the driver default.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: Option<usize>,
}

impl AgentConfig {
    /// Enabled MCP server configs, in declaration order.
    pub fn enabled_mcp_servers(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.mcp_servers.iter().filter(|s| s.enabled)
    }

    /// Enabled skill references, in declaration order.
    pub fn enabled_skills(&self) -> impl Iterator<Item = &SkillRef> {
        self.skills.iter().filter(|s| s.enabled)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_defaults() {
        let m = ModelConfig::default();
        assert_eq!(m.provider, "openai");
        assert_eq!(m.name, "gpt-4o");
        assert_eq!(m.max_tokens, Some(4096));
        assert!(m.api_key.is_none());
    }

    #[test]
    fn agent_config_defaults_are_empty() {
        let a = AgentConfig::default();
        assert!(a.skills.is_empty());
        assert!(a.mcp_servers.is_empty());
        assert!(a.rules.is_empty());
        assert!(a.max_context_tokens.is_none());
    }

    #[test]
    fn skill_ref_enabled_defaults_to_true() {
        let s: SkillRef =
            serde_yaml::from_str("name: Git Helper\nslug: git-helper").unwrap();
        assert!(s.enabled);
    }

    #[test]
    fn mcp_server_config_minimal_yaml() {
        let s: McpServerConfig =
            serde_yaml::from_str("name: browser\ncommand: npx").unwrap();
        assert_eq!(s.name, "browser");
        assert_eq!(s.command, "npx");
        assert!(s.args.is_empty());
        assert!(s.env.is_empty());
        assert!(s.enabled);
    }

    #[test]
    fn enabled_mcp_servers_filters_disabled() {
        let cfg = AgentConfig {
            mcp_servers: vec![
                McpServerConfig {
                    name: "a".into(),
                    command: "a-bin".into(),
                    args: vec![],
                    env: HashMap::new(),
                    enabled: true,
                },
                McpServerConfig {
                    name: "b".into(),
                    command: "b-bin".into(),
                    args: vec![],
                    env: HashMap::new(),
                    enabled: false,
                },
            ],
            ..AgentConfig::default()
        };
        let names: Vec<_> = cfg.enabled_mcp_servers().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn enabled_skills_filters_disabled() {
        let cfg = AgentConfig {
            skills: vec![
                SkillRef { name: "A".into(), slug: "a".into(), enabled: false },
                SkillRef { name: "B".into(), slug: "b".into(), enabled: true },
            ],
            ..AgentConfig::default()
        };
        let slugs: Vec<_> = cfg.enabled_skills().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b"]);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.provider, cfg.model.provider);
    }
}
