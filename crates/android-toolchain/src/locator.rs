//! Tool Locators
//!
//! Resolves the executable or jar for each tool: the configured path when
//! it exists, otherwise a `PATH` search for tools that are commands.
//! Results are never cached.

use std::path::{Path, PathBuf};

use apkshell_core::config::ToolPaths;
use apkshell_core::Tool;
use tracing::debug;

use crate::runner::{CommandRunner, DEFAULT_TIMEOUT_SECS};

/// Finds tool executables
#[derive(Clone)]
pub struct ToolLocator {
    tools: ToolPaths,
    runner: CommandRunner,
}

impl ToolLocator {
    /// The runner's runtime environment is stripped for `which`/`where`
    pub fn new(tools: ToolPaths, runner: &CommandRunner) -> Self {
        Self {
            tools,
            runner: runner.without_env(),
        }
    }

    /// Configured path of a tool, if set
    pub fn configured(&self, tool: Tool) -> Option<&Path> {
        self.tools.get(tool)
    }

    /// Resolve a tool's executable
    pub async fn locate(&self, tool: Tool) -> Option<PathBuf> {
        if let Some(path) = self.tools.get(tool) {
            if path.exists() {
                return Some(path.to_path_buf());
            }
            debug!("Configured {} path {:?} does not exist", tool, path);
        }

        let name = self.runner.platform().command_file(tool)?;
        self.search_path(&name).await
    }

    /// Ask the platform locator (`which`/`where`) for a command
    pub async fn search_path(&self, name: &str) -> Option<PathBuf> {
        let locator = self.runner.platform().locator_command();
        let result = self.runner.run(locator, [name], DEFAULT_TIMEOUT_SECS).await;
        if !result.success() {
            debug!("{} not found on PATH", name);
            return None;
        }

        result
            .first_line()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
    }

    /// `keytool` next to the resolved java executable
    pub async fn keytool(&self) -> Option<PathBuf> {
        let java = self.locate(Tool::Java).await?;
        let keytool = java.with_file_name(self.runner.platform().exe("keytool"));
        if keytool.exists() {
            Some(keytool)
        } else {
            debug!("keytool not found next to {:?}", java);
            None
        }
    }
}
