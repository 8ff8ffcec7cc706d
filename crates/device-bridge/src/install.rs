//! APK Installation
//!
//! Installs (or replaces) an APK on a device with `adb install -r`.

use std::path::PathBuf;

use apkshell_android_toolchain::ToolContext;
use apkshell_core::{spawn_worker, WorkerHandle};
use tracing::info;

use crate::adb::{AdbClient, AdbError};

/// Arguments for `adb install`; an empty serial targets the only device
pub fn install_args(apk: &std::path::Path, serial: Option<&str>) -> Vec<String> {
    let mut args = vec!["install".to_string()];
    if let Some(serial) = serial.filter(|s| !s.is_empty()) {
        args.push("-s".to_string());
        args.push(serial.to_string());
    }
    args.push("-r".to_string());
    args.push(apk.display().to_string());
    args
}

/// Installs an APK on a device
pub struct InstallApk {
    context: ToolContext,
    apk: PathBuf,
    serial: Option<String>,
}

impl InstallApk {
    pub fn new(context: ToolContext, apk: PathBuf, serial: Option<String>) -> Self {
        Self { context, apk, serial }
    }

    /// Install and return the APK path
    pub async fn run(&self) -> Result<PathBuf, AdbError> {
        let adb = AdbClient::from_context(&self.context).await?;
        info!("Installing {:?} on {}", self.apk, self.serial.as_deref().unwrap_or("default device"));
        adb.run_checked(&install_args(&self.apk, self.serial.as_deref())).await?;
        Ok(self.apk.clone())
    }

    pub fn spawn(self) -> WorkerHandle<PathBuf> {
        spawn_worker("adb-install", move |sink| async move {
            sink.progress(0, format!("Installing {}...", self.apk.display()));
            let apk = self.run().await?;
            sink.progress(100, "Installed");
            Ok::<_, AdbError>(apk)
        })
    }
}
