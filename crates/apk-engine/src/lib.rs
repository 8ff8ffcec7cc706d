//! APK Engine
//!
//! Decompiles and rebuilds APKs with apktool (plus an optional jadx pass),
//! signs them with uber-apk-signer and generates keystores with keytool.

pub mod decompile;
pub mod recompile;
pub mod signing;
mod tool_run;

pub use decompile::{Decompile, DecompileOptions, DecompileOutput};
pub use recompile::{Recompile, RecompileOptions, RecompileOutput};
pub use signing::{GenerateKeystore, KeystoreCredentials, KeystoreRequest, SignApk, SignOptions};

use apkshell_core::{ErrorCategory, ShellError};

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ShellError),
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: &'static str, detail: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Post-condition failed: {0}")]
    PostCondition(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Config(e) => e.category(),
            EngineError::ToolFailed { .. } => ErrorCategory::Process,
            EngineError::Io(_) => ErrorCategory::Filesystem,
            EngineError::PostCondition(_) => ErrorCategory::PostCondition,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    use apkshell_android_toolchain::ToolContext;
    use apkshell_core::AppConfig;

    /// Write an executable shell script named `name` into `dir`
    #[cfg(unix)]
    pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Context whose `java` records its arguments, one per line, in `args.txt`
    #[cfg(unix)]
    pub async fn recording_context(dir: &Path, exit_code: i32) -> ToolContext {
        let java = script(
            dir,
            "java",
            &format!(
                "for a in \"$@\"; do echo \"$a\" >> \"$(dirname \"$0\")/args.txt\"; done\necho \"I: Using Apktool\"\n[ {code} -ne 0 ] && echo \"E: brut.androlib failure\" >&2\nexit {code}",
                code = exit_code
            ),
        );
        let apktool = dir.join("apktool.jar");
        let uas = dir.join("uber-apk-signer.jar");
        std::fs::write(&apktool, b"jar").unwrap();
        std::fs::write(&uas, b"jar").unwrap();

        let mut config = AppConfig::default();
        config.java_heap_mb = 512;
        config.tools.java_exe = Some(java);
        config.tools.apktool_jar = Some(apktool);
        config.tools.uas_jar = Some(uas);
        ToolContext::new(config, None).await
    }

    pub fn recorded_args(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("args.txt"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }
}
