// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod edit_file;
pub mod list_dir;
pub mod load_skill;
pub mod read_file;
pub mod run_terminal;
pub mod search_files;
pub mod services;
pub mod write_file;

use std::sync::Arc;

use forge_skills::SkillSource;

use crate::registry::ToolRegistry;
use crate::workspace::Workspace;

pub use edit_file::EditFileTool;
pub use list_dir::ListDirTool;
pub use load_skill::LoadSkillTool;
pub use read_file::ReadFileTool;
pub use run_terminal::RunTerminalTool;
pub use search_files::{SearchFilesTool, SearchMatch, SearchOptions, SearchProvider};
pub use services::{CheckServiceTool, ServiceManager, StartServiceTool, StopServiceTool};
pub use write_file::WriteFileTool;

/// Build a registry with every built-in whose dependency is available.
///
/// The filesystem and terminal tools only need the workspace; search,
/// skills, and service tools are registered when their host-injected
/// dependency is present, so the advertised tool list never names a tool
/// that cannot run.
pub fn builtin_registry(
    workspace: Arc<Workspace>,
    search: Option<Arc<dyn SearchProvider>>,
    skills: Option<Arc<dyn SkillSource>>,
    services: Option<Arc<dyn ServiceManager>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool { workspace: Arc::clone(&workspace) });
    registry.register(WriteFileTool { workspace: Arc::clone(&workspace) });
    registry.register(EditFileTool { workspace: Arc::clone(&workspace) });
    registry.register(ListDirTool { workspace: Arc::clone(&workspace) });
    registry.register(RunTerminalTool { workspace: Arc::clone(&workspace) });
    if let Some(provider) = search {
        registry.register(SearchFilesTool { workspace, provider });
    }
    if let Some(skills) = skills {
        registry.register(LoadSkillTool { skills });
    }
    if let Some(manager) = services {
        registry.register(StartServiceTool { manager: Arc::clone(&manager) });
        registry.register(CheckServiceTool { manager: Arc::clone(&manager) });
        registry.register(StopServiceTool { manager });
    }
    registry
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_registry_has_filesystem_and_terminal_tools() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::new(dir.path()).unwrap());
        let reg = builtin_registry(ws, None, None, None);
        assert_eq!(
            reg.names(),
            vec!["edit_file", "list_dir", "read_file", "run_terminal", "write_file"]
        );
    }

    #[test]
    fn service_tools_registered_with_manager() {
        use async_trait::async_trait;

        struct NoopManager;
        #[async_trait]
        impl ServiceManager for NoopManager {
            async fn start_service(&self, _: &str, _: Option<&str>) -> anyhow::Result<String> {
                Ok("ok".into())
            }
            async fn check_service(&self, _: &str) -> anyhow::Result<String> {
                Ok("ok".into())
            }
            async fn stop_service(&self, _: &str) -> anyhow::Result<String> {
                Ok("ok".into())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::new(dir.path()).unwrap());
        let reg = builtin_registry(ws, None, None, Some(Arc::new(NoopManager)));
        let names = reg.names();
        assert!(names.contains(&"start_service".to_string()));
        assert!(names.contains(&"check_service".to_string()));
        assert!(names.contains(&"stop_service".to_string()));
    }
}
