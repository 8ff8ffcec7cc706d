//! APK Recompilation
//!
//! Rebuilds a decompiled folder with `apktool b`. The built APK lands in the
//! folder's `dist/` directory.

use std::path::{Path, PathBuf};

use apkshell_android_toolchain::{ToolContext, DEFAULT_TIMEOUT_SECS};
use apkshell_core::{spawn_worker, ProgressSink, Tool, WorkerHandle};
use tracing::{info, warn};

use crate::tool_run::{jar_invocation, run_checked, split_extra_args};
use crate::EngineError;

#[derive(Debug, Clone)]
pub struct RecompileOptions {
    /// Decompiled project folder
    pub folder: PathBuf,
    /// Build resources with aapt2 (`--use-aapt1` when off)
    pub aapt2: bool,
    pub extra_args: String,
}

impl RecompileOptions {
    pub fn new(folder: PathBuf, aapt2: bool) -> Self {
        Self {
            folder,
            aapt2,
            extra_args: String::new(),
        }
    }

    pub fn apktool_args(&self) -> Vec<String> {
        let mut args = vec!["b".to_string(), self.folder.display().to_string()];
        if !self.aapt2 {
            args.push("--use-aapt1".to_string());
        }
        args.extend(split_extra_args(&self.extra_args));
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecompileOutput {
    pub folder: PathBuf,
    /// Built APK from `dist/`, when apktool produced one
    pub apk: Option<PathBuf>,
}

/// First `*.apk` in `<folder>/dist`, by name
pub fn built_apk(folder: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(folder.join("dist")).ok()?;
    let mut apks: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("apk"))
                    .unwrap_or(false)
        })
        .collect();
    apks.sort();
    apks.into_iter().next()
}

pub struct Recompile {
    context: ToolContext,
    options: RecompileOptions,
}

impl Recompile {
    pub fn new(context: ToolContext, options: RecompileOptions) -> Self {
        Self { context, options }
    }

    /// Options seeded from the persisted `use_aapt2` setting
    pub fn from_config(context: ToolContext, folder: PathBuf) -> Self {
        let options = RecompileOptions::new(folder, context.config().use_aapt2);
        Self::new(context, options)
    }

    async fn run(&self, sink: &ProgressSink<RecompileOutput>) -> Result<RecompileOutput, EngineError> {
        let java = self.context.require(Tool::Java).await?;
        let mut args = jar_invocation(&self.context, Tool::Apktool).await?;
        args.extend(self.options.apktool_args());

        info!("Recompiling {:?}", self.options.folder);
        sink.progress(25, "Running apktool...");
        run_checked(&self.context, "apktool", &java, &args, DEFAULT_TIMEOUT_SECS).await?;

        let apk = built_apk(&self.options.folder);
        if apk.is_none() {
            warn!("No APK found in {:?}", self.options.folder.join("dist"));
        }
        sink.progress(100, "Recompiled");
        Ok(RecompileOutput {
            folder: self.options.folder.clone(),
            apk,
        })
    }

    pub fn spawn(self) -> WorkerHandle<RecompileOutput> {
        spawn_worker("recompile", move |sink| async move { self.run(&sink).await })
    }
}
