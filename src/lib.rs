//! APK Shell - reverse-engineering shell for Android APKs
//!
//! Drives apktool, jadx, adb, keytool and uber-apk-signer, and downloads
//! them when they are missing.
//!
//! ## Architecture
//!
//! APK Shell is organized into specialized crates:
//!
//! - `apkshell-core`: worker executor, configuration and shared types
//! - `apkshell-android-toolchain`: command runner, tool lookup, versions and downloads
//! - `apkshell-device-bridge`: device listing and APK installation via adb
//! - `apkshell-apk-engine`: decompile, recompile, sign and keystore workers

pub mod cli;
pub mod commands;

// Re-export main components for library usage
pub use apkshell_android_toolchain as toolchain;
pub use apkshell_apk_engine as engine;
pub use apkshell_core as core;
pub use apkshell_device_bridge as device;

/// Prelude module for convenient imports
pub mod prelude {
    pub use apkshell_android_toolchain::{AcquisitionQueue, CommandRunner, ResolveVersions, ToolContext};
    pub use apkshell_apk_engine::{Decompile, GenerateKeystore, Recompile, SignApk};
    pub use apkshell_core::{AppConfig, ConfigStore, Tool, WorkerEvent, WorkerHandle};
    pub use apkshell_device_bridge::{InstallApk, ListDevices};
}
