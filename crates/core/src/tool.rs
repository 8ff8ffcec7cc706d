//! Tool Identity
//!
//! The external programs APK Shell drives, with the names each one is
//! known by in configuration, on disk and in version reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An external tool managed by APK Shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Java,
    Apktool,
    Jadx,
    Adb,
    UberApkSigner,
}

impl Tool {
    /// Every tool, in acquisition order
    pub const ALL: [Tool; 5] = [
        Tool::Java,
        Tool::Apktool,
        Tool::Jadx,
        Tool::Adb,
        Tool::UberApkSigner,
    ];

    /// Key of the configured path in the `[tools]` table
    pub fn config_key(&self) -> &'static str {
        match self {
            Tool::Java => "java_exe",
            Tool::Apktool => "apktool_jar",
            Tool::Jadx => "jadx_exe",
            Tool::Adb => "adb_exe",
            Tool::UberApkSigner => "uas_jar",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Tool::Java => "Java",
            Tool::Apktool => "Apktool",
            Tool::Jadx => "JADX",
            Tool::Adb => "ADB",
            Tool::UberApkSigner => "Uber APK Signer",
        }
    }

    /// Directory name under the managed tools directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            Tool::Java => "java",
            Tool::Apktool => "apktool",
            Tool::Jadx => "jadx",
            Tool::Adb => "adb",
            Tool::UberApkSigner => "uber-apk-signer",
        }
    }

    /// Key used in version reports and on the command line
    pub fn probe_key(&self) -> &'static str {
        match self {
            Tool::Java => "java",
            Tool::Apktool => "apktool",
            Tool::Jadx => "jadx",
            Tool::Adb => "adb",
            Tool::UberApkSigner => "uas",
        }
    }

    /// Whether the tool ships as a jar run through `java -jar`
    pub fn is_jar(&self) -> bool {
        matches!(self, Tool::Apktool | Tool::UberApkSigner)
    }

    /// Base command name for tools that may be found on `PATH`
    pub fn command_name(&self) -> Option<&'static str> {
        match self {
            Tool::Java => Some("java"),
            Tool::Jadx => Some("jadx"),
            Tool::Adb => Some("adb"),
            Tool::Apktool | Tool::UberApkSigner => None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "java" | "jdk" => Ok(Tool::Java),
            "apktool" => Ok(Tool::Apktool),
            "jadx" => Ok(Tool::Jadx),
            "adb" => Ok(Tool::Adb),
            "uas" | "uber-apk-signer" | "uber_apk_signer" => Ok(Tool::UberApkSigner),
            other => Err(format!("unknown tool '{}'", other)),
        }
    }
}
