// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Load configuration from an explicit YAML file.
///
/// A missing file is an error; an empty file yields the defaults.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    debug!(path = %path.display(), "loading config");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Parse configuration from a YAML string.  Empty input yields the defaults.
pub fn from_yaml_str(text: &str) -> anyhow::Result<Config> {
    if text.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(text)?;
    Ok(config)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
