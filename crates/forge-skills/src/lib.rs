// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Skill repository access.
//!
//! Skills are markdown documents loaded on demand through the `load_skill`
//! tool rather than preloaded into context.  The repository root carries an
//! `index.json` catalog; each skill lives in its own directory named by its
//! slug.  Content resolution and catalog parsing are both forgiving: a
//! malformed catalog yields an empty list and a missing document yields
//! `None`, never an error.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One catalog entry from `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub summary: String,
}

/// Resolves skill slugs to markdown content and exposes the catalog.
#[async_trait]
pub trait SkillSource: Send + Sync {
    /// The skill catalog.  Parsing failure yields an empty list.
    async fn load_registry(&self) -> Vec<SkillEntry>;

    /// The markdown body for `slug`, or `None` when the skill has no content.
    async fn load_content(&self, slug: &str) -> Option<String>;
}

/// Filesystem-backed [`SkillSource`].
///
/// Layout:
/// ```text
/// <root>/index.json          — catalog: [{"slug","name","summary"}, …]
/// <root>/<slug>/SKILL.md     — preferred content file
/// <root>/<slug>/README.md    — fallback
/// <root>/<slug>/*.md         — last resort: first markdown file, sorted
/// ```
#[derive(Debug, Clone)]
pub struct FsSkillSource {
    root: PathBuf,
}

impl FsSkillSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SkillSource for FsSkillSource {
    async fn load_registry(&self) -> Vec<SkillEntry> {
        let index = self.root.join("index.json");
        let text = match tokio::fs::read_to_string(&index).await {
            Ok(t) => t,
            Err(e) => {
                debug!(path = %index.display(), error = %e, "no skill catalog");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<SkillEntry>>(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %index.display(), error = %e, "skill catalog failed to parse");
                Vec::new()
            }
        }
    }

    async fn load_content(&self, slug: &str) -> Option<String> {
        let dir = self.root.join(slug);
        for candidate in ["SKILL.md", "README.md"] {
            if let Ok(text) = tokio::fs::read_to_string(dir.join(candidate)).await {
                return Some(text);
            }
        }
        // Last resort: the first *.md file in the skill directory, sorted so
        // the result is deterministic across platforms.
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(_) => return None,
        };
        let mut md_files: Vec<PathBuf> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                md_files.push(path);
            }
        }
        md_files.sort();
        let first = md_files.into_iter().next()?;
        tokio::fs::read_to_string(first).await.ok()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn skill_root() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write(dir: &std::path::Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn registry_parses_index_json() {
        let root = skill_root();
        write(
            root.path(),
            "index.json",
            r#"[{"slug":"git","name":"Git","summary":"git workflows"}]"#,
        );
        let src = FsSkillSource::new(root.path());
        let entries = src.load_registry().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "git");
        assert_eq!(entries[0].summary, "git workflows");
    }

    #[tokio::test]
    async fn missing_index_yields_empty_registry() {
        let root = skill_root();
        let src = FsSkillSource::new(root.path());
        assert!(src.load_registry().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_index_yields_empty_registry() {
        let root = skill_root();
        write(root.path(), "index.json", "{ this is not json ]");
        let src = FsSkillSource::new(root.path());
        assert!(src.load_registry().await.is_empty());
    }

    #[tokio::test]
    async fn summary_field_is_optional() {
        let root = skill_root();
        write(root.path(), "index.json", r#"[{"slug":"x","name":"X"}]"#);
        let src = FsSkillSource::new(root.path());
        let entries = src.load_registry().await;
        assert_eq!(entries[0].summary, "");
    }

    #[tokio::test]
    async fn content_prefers_skill_md() {
        let root = skill_root();
        write(root.path(), "git/SKILL.md", "from SKILL.md");
        write(root.path(), "git/README.md", "from README.md");
        let src = FsSkillSource::new(root.path());
        assert_eq!(src.load_content("git").await.as_deref(), Some("from SKILL.md"));
    }

    #[tokio::test]
    async fn content_falls_back_to_readme() {
        let root = skill_root();
        write(root.path(), "git/README.md", "from README.md");
        let src = FsSkillSource::new(root.path());
        assert_eq!(src.load_content("git").await.as_deref(), Some("from README.md"));
    }

    #[tokio::test]
    async fn content_falls_back_to_first_md_sorted() {
        let root = skill_root();
        write(root.path(), "git/zeta.md", "zeta");
        write(root.path(), "git/alpha.md", "alpha");
        write(root.path(), "git/notes.txt", "not markdown");
        let src = FsSkillSource::new(root.path());
        assert_eq!(src.load_content("git").await.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn missing_skill_yields_none() {
        let root = skill_root();
        let src = FsSkillSource::new(root.path());
        assert!(src.load_content("ghost").await.is_none());
    }

    #[tokio::test]
    async fn directory_without_markdown_yields_none() {
        let root = skill_root();
        write(root.path(), "empty/data.json", "{}");
        let src = FsSkillSource::new(root.path());
        assert!(src.load_content("empty").await.is_none());
    }
}
