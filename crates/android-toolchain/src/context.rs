//! Tool Context
//!
//! Everything a task worker needs to run external tools: a configuration
//! snapshot taken when the worker is built, a runner carrying the Java
//! runtime environment, and a locator.

use std::path::PathBuf;
use std::sync::Arc;

use apkshell_core::{AppConfig, ConfigStore, EventBus, ShellError, Tool};

use crate::locator::ToolLocator;
use crate::runner::CommandRunner;

#[derive(Clone)]
pub struct ToolContext {
    config: AppConfig,
    runner: CommandRunner,
    locator: ToolLocator,
}

impl ToolContext {
    /// Build a context from a configuration snapshot
    pub async fn new(config: AppConfig, event_bus: Option<Arc<EventBus>>) -> Self {
        let mut runner = CommandRunner::new();
        if let Some(bus) = event_bus {
            runner = runner.with_event_bus(bus);
        }

        let locator = ToolLocator::new(config.tools.clone(), &runner);
        if let Some(java) = locator.locate(Tool::Java).await {
            runner = runner.with_java(&java);
        }

        Self {
            config,
            runner,
            locator,
        }
    }

    /// Build a context from the store's current configuration
    pub async fn from_store(store: &ConfigStore, event_bus: Option<Arc<EventBus>>) -> Self {
        Self::new(store.snapshot(), event_bus).await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    /// Resolve a tool or fail with a configuration error naming it
    pub async fn require(&self, tool: Tool) -> Result<PathBuf, ShellError> {
        self.locator
            .locate(tool)
            .await
            .ok_or(ShellError::MissingTool(tool))
    }

    /// `-Xmx<N>m` for jar tools
    pub fn heap_arg(&self) -> String {
        format!("-Xmx{}m", self.config.java_heap_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_require_reports_missing_tool() {
        let mut config = AppConfig::default();
        config.tools.apktool_jar = Some(PathBuf::from("/nowhere/apktool.jar"));
        config.java_heap_mb = 1024;

        let context = ToolContext::new(config, None).await;
        let err = context.require(Tool::Apktool).await.unwrap_err();
        assert!(matches!(err, ShellError::MissingTool(Tool::Apktool)));
        assert_eq!(context.heap_arg(), "-Xmx1024m");
    }

    #[tokio::test]
    async fn test_configured_java_sets_runtime_env() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let java = bin.join("java");
        std::fs::write(&java, b"").unwrap();

        let mut config = AppConfig::default();
        config.tools.java_exe = Some(java);

        let context = ToolContext::new(config, None).await;
        let env = context.runner().env().unwrap();
        assert_eq!(env.java_home.as_deref(), Some(dir.path()));
    }
}
