// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod anthropic;
mod google;
mod mock;
pub(crate) mod openai_compat;
mod provider;
pub(crate) mod retry;
pub(crate) mod sse;
mod types;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{EventStream, ModelProvider};
pub use types::*;

use anyhow::bail;
use openai_compat::{AuthStyle, OpenAICompatProvider};
use forge_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// Selects the driver implementation based on `cfg.provider`.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    // key() returns a fresh Option<String> on each call so that each match arm
    // can take ownership without cross-arm borrow issues.
    let key = || resolve_api_key(cfg);

    // Helper that reads `base_url` from config or falls back to a static default.
    let base_url = |default: &str| -> String {
        cfg.base_url.clone().unwrap_or_else(|| default.into())
    };

    match cfg.provider.as_str() {
        // ── Native drivers ────────────────────────────────────────────────────
        "openai" => Ok(Box::new(OpenAICompatProvider::new(
            "openai",
            cfg.name.clone(),
            key(),
            &base_url("https://api.openai.com/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::Bearer,
        ))),
        "anthropic" => Ok(Box::new(AnthropicProvider::new(
            cfg.name.clone(),
            key(),
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),
        "google" => Ok(Box::new(GoogleProvider::new(
            cfg.name.clone(),
            key(),
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),

        // ── OpenAI-compatible gateways ────────────────────────────────────────
        "openrouter" => Ok(Box::new(OpenAICompatProvider::new(
            "openrouter",
            cfg.name.clone(),
            key(),
            &base_url("https://openrouter.ai/api/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![
                ("HTTP-Referer".into(), "https://github.com/forge-agent/forge".into()),
                ("X-Title".into(), "forge".into()),
            ],
            AuthStyle::Bearer,
        ))),
        "groq" => Ok(Box::new(OpenAICompatProvider::new(
            "groq",
            cfg.name.clone(),
            key(),
            &base_url("https://api.groq.com/openai/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::Bearer,
        ))),
        "deepseek" => Ok(Box::new(OpenAICompatProvider::new(
            "deepseek",
            cfg.name.clone(),
            key(),
            &base_url("https://api.deepseek.com/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::Bearer,
        ))),
        "mistral" => Ok(Box::new(OpenAICompatProvider::new(
            "mistral",
            cfg.name.clone(),
            key(),
            &base_url("https://api.mistral.ai/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::Bearer,
        ))),
        "xai" => Ok(Box::new(OpenAICompatProvider::new(
            "xai",
            cfg.name.clone(),
            key(),
            &base_url("https://api.x.ai/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::Bearer,
        ))),
        "together" => Ok(Box::new(OpenAICompatProvider::new(
            "together",
            cfg.name.clone(),
            key(),
            &base_url("https://api.together.xyz/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::Bearer,
        ))),

        // ── Local / OSS ───────────────────────────────────────────────────────
        "ollama" => Ok(Box::new(OpenAICompatProvider::new(
            "ollama",
            cfg.name.clone(),
            None, // no key needed
            &base_url("http://localhost:11434/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::None,
        ))),
        "vllm" => Ok(Box::new(OpenAICompatProvider::new(
            "vllm",
            cfg.name.clone(),
            key(),
            &base_url("http://localhost:8000/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            if key().is_some() { AuthStyle::Bearer } else { AuthStyle::None },
        ))),
        "lmstudio" => Ok(Box::new(OpenAICompatProvider::new(
            "lmstudio",
            cfg.name.clone(),
            None,
            &base_url("http://localhost:1234/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
            AuthStyle::None,
        ))),

        // ── Testing / Mock ────────────────────────────────────────────────────
        "mock" => Ok(Box::new(MockProvider)),

        other => bail!(
            "unknown model provider: {other:?}\n\
             Known providers: openai, anthropic, google, openrouter, groq, \
             deepseek, mistral, xai, together, ollama, vllm, lmstudio, mock"
        ),
    }
}

/// Canonical API-key environment variable for a provider id.
fn default_api_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "google" => Some("GEMINI_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "xai" => Some("XAI_API_KEY"),
        "together" => Some("TOGETHER_API_KEY"),
        "vllm" => Some("VLLM_API_KEY"),
        _ => None,
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    // Auto-resolve from the provider's canonical env var if neither is set.
    default_api_key_env(&cfg.provider).and_then(|var| std::env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_config::ModelConfig;

    fn minimal_config(provider: &str, model: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.into(),
            name: model.into(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn from_config_openai_succeeds() {
        assert!(from_config(&minimal_config("openai", "gpt-4o")).is_ok());
    }

    #[test]
    fn from_config_anthropic_succeeds() {
        assert!(from_config(&minimal_config("anthropic", "claude-sonnet-4-5")).is_ok());
    }

    #[test]
    fn from_config_google_succeeds() {
        assert!(from_config(&minimal_config("google", "gemini-2.0-flash")).is_ok());
    }

    #[test]
    fn from_config_mock_succeeds() {
        assert!(from_config(&minimal_config("mock", "mock-model")).is_ok());
    }

    #[test]
    fn from_config_ollama_requires_no_key() {
        assert!(from_config(&minimal_config("ollama", "llama3.2")).is_ok());
    }

    #[test]
    fn from_config_unknown_provider_returns_error() {
        let result = from_config(&minimal_config("totally_unknown_provider_xyz", "m"));
        assert!(result.is_err());
        let msg = result.err().unwrap().to_string();
        assert!(msg.contains("unknown model provider"));
    }

    #[test]
    fn resolve_api_key_prefers_explicit_key() {
        let cfg = ModelConfig {
            api_key: Some("explicit-key".into()),
            api_key_env: Some("NONEXISTENT_ENV_VAR_XYZ".into()),
            ..ModelConfig::default()
        };
        assert_eq!(resolve_api_key(&cfg).as_deref(), Some("explicit-key"));
    }

    #[test]
    fn canonical_env_vars_cover_hosted_providers() {
        assert_eq!(default_api_key_env("openai"), Some("OPENAI_API_KEY"));
        assert_eq!(default_api_key_env("anthropic"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(default_api_key_env("google"), Some("GEMINI_API_KEY"));
        assert_eq!(default_api_key_env("ollama"), None);
    }
}
