//! APK Decompilation
//!
//! `apktool d` into a folder, optionally followed by a jadx pass writing
//! Java sources into the same folder. jadx often exits non-zero after
//! decompiling most classes, so its exit code only produces a warning.

use std::path::PathBuf;

use apkshell_android_toolchain::{ToolContext, DEFAULT_TIMEOUT_SECS, EXTENDED_TIMEOUT_SECS};
use apkshell_core::{spawn_worker, ProgressSink, Tool, WorkerHandle};
use tracing::{info, warn};

use crate::tool_run::{jar_invocation, run_checked, split_extra_args};
use crate::EngineError;

/// What to decompile and how
#[derive(Debug, Clone)]
pub struct DecompileOptions {
    pub apk: PathBuf,
    /// Output folder
    pub folder: PathBuf,
    /// Disassemble dex to smali (`-s` when off)
    pub smali: bool,
    /// Decode resources (`-r` when off)
    pub resources: bool,
    /// Run jadx afterwards
    pub java: bool,
    pub framework_tag: Option<String>,
    pub extra_args: String,
}

impl DecompileOptions {
    pub fn new(apk: PathBuf, folder: PathBuf) -> Self {
        Self {
            apk,
            folder,
            smali: true,
            resources: true,
            java: false,
            framework_tag: None,
            extra_args: String::new(),
        }
    }

    /// apktool arguments following the jar invocation
    pub fn apktool_args(&self) -> Vec<String> {
        let mut args = vec!["d".to_string()];
        if !self.smali {
            args.push("-s".to_string());
        }
        if !self.resources {
            args.push("-r".to_string());
        }
        if let Some(tag) = self.framework_tag.as_deref().filter(|t| !t.is_empty()) {
            args.push("-t".to_string());
            args.push(tag.to_string());
        }
        args.extend(split_extra_args(&self.extra_args));
        args.push("-o".to_string());
        args.push(self.folder.display().to_string());
        args.push(self.apk.display().to_string());
        args
    }

    pub fn jadx_args(&self) -> Vec<String> {
        vec![
            "-r".to_string(),
            "-d".to_string(),
            self.folder.display().to_string(),
            self.apk.display().to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompileOutput {
    pub apk: PathBuf,
    pub folder: PathBuf,
}

pub struct Decompile {
    context: ToolContext,
    options: DecompileOptions,
}

impl Decompile {
    pub fn new(context: ToolContext, options: DecompileOptions) -> Self {
        Self { context, options }
    }

    async fn run(&self, sink: &ProgressSink<DecompileOutput>) -> Result<DecompileOutput, EngineError> {
        let java = self.context.require(Tool::Java).await?;
        let mut args = jar_invocation(&self.context, Tool::Apktool).await?;
        args.extend(self.options.apktool_args());

        info!("Decompiling {:?} into {:?}", self.options.apk, self.options.folder);
        sink.progress(25, "Running apktool...");
        run_checked(&self.context, "apktool", &java, &args, DEFAULT_TIMEOUT_SECS).await?;

        if self.options.java {
            let jadx = self.context.require(Tool::Jadx).await?;
            sink.progress(75, "Running jadx...");
            let result = self
                .context
                .runner()
                .run(&jadx, self.options.jadx_args(), EXTENDED_TIMEOUT_SECS)
                .await;
            if !result.success() {
                warn!("jadx exited with {}: {}", result.code, result.failure_detail());
            }
        }

        sink.progress(100, "Decompiled");
        Ok(DecompileOutput {
            apk: self.options.apk.clone(),
            folder: self.options.folder.clone(),
        })
    }

    pub fn spawn(self) -> WorkerHandle<DecompileOutput> {
        spawn_worker("decompile", move |sink| async move { self.run(&sink).await })
    }
}
