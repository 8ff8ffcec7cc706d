//! ADB (Android Debug Bridge) Client
//!
//! Communicates with devices through the resolved `adb` executable.

use std::path::{Path, PathBuf};

use apkshell_android_toolchain::{CommandRunner, ToolContext, DEFAULT_TIMEOUT_SECS, PROPERTY_TIMEOUT_SECS};
use apkshell_core::{ErrorCategory, ProcessResult, ShellError, Tool};
use tracing::debug;

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error(transparent)]
    Config(#[from] ShellError),
    #[error("ADB command failed: {0}")]
    CommandFailed(String),
    #[error("ADB timed out: {0}")]
    Timeout(String),
}

impl AdbError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AdbError::Config(e) => e.category(),
            AdbError::CommandFailed(_) | AdbError::Timeout(_) => ErrorCategory::Process,
        }
    }
}

/// ADB Client
#[derive(Clone)]
pub struct AdbClient {
    adb: PathBuf,
    runner: CommandRunner,
}

impl AdbClient {
    pub fn new(adb: PathBuf, runner: CommandRunner) -> Self {
        Self { adb, runner }
    }

    /// Client for the adb the context resolves
    pub async fn from_context(context: &ToolContext) -> Result<Self, AdbError> {
        let adb = context.require(Tool::Adb).await?;
        Ok(Self::new(adb, context.runner().clone()))
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    /// Run an ADB command, returning the raw result
    pub async fn run(&self, args: &[String], timeout_secs: u64) -> ProcessResult {
        debug!("adb {:?}", args);
        self.runner.run(&self.adb, args, timeout_secs).await
    }

    /// Run an ADB command, failing on a non-zero exit
    pub async fn run_checked(&self, args: &[String]) -> Result<ProcessResult, AdbError> {
        let result = self.run(args, DEFAULT_TIMEOUT_SECS).await;
        if result.success() {
            Ok(result)
        } else if result.timed_out() {
            Err(AdbError::Timeout(args.join(" ")))
        } else {
            Err(AdbError::CommandFailed(result.failure_detail()))
        }
    }

    /// Read a system property; `None` when the query fails or prints nothing
    pub async fn get_prop(&self, serial: &str, key: &str) -> Option<String> {
        let args = ["-s", serial, "shell", "getprop", key].map(String::from);
        let result = self.run(&args, PROPERTY_TIMEOUT_SECS).await;
        if !result.success() {
            return None;
        }
        result.first_line().filter(|v| !v.is_empty()).map(String::from)
    }
}
