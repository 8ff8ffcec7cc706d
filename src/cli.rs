use std::path::PathBuf;

use apkshell_core::Tool;
use clap::{Parser, Subcommand};

/// APK Shell - decompile, rebuild, sign and install Android APKs
#[derive(Parser, Debug)]
#[command(name = "apkshell")]
#[command(version)]
pub struct Cli {
    /// Configuration file to use instead of the platform default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log external commands and parse details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the version of every external tool
    Versions {
        /// Print the report as JSON keyed by probe key
        #[arg(long)]
        json: bool,
    },
    /// Print where a tool resolves to
    Locate {
        /// java, apktool, jadx, adb or uas
        tool: Tool,
    },
    /// Download and install tools, one after another
    Download {
        tools: Vec<Tool>,
        /// Download every tool whose version cannot be determined
        #[arg(long, conflicts_with = "tools")]
        missing: bool,
    },
    /// List attached devices
    Devices,
    /// Install an APK on a device
    Install {
        apk: PathBuf,
        /// Device serial; the only attached device when omitted
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Decompile an APK with apktool (and optionally jadx)
    Decompile {
        apk: PathBuf,
        /// Output folder, defaults to the APK path without its extension
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep classes.dex instead of disassembling to smali
        #[arg(long)]
        no_smali: bool,
        /// Keep resources.arsc undecoded
        #[arg(long)]
        no_resources: bool,
        /// Also decompile to Java sources with jadx
        #[arg(long)]
        java: bool,
        /// Framework tag passed to apktool
        #[arg(short = 't', long)]
        framework_tag: Option<String>,
        /// Extra apktool arguments, split on whitespace
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        extra: String,
    },
    /// Rebuild a decompiled folder with apktool
    Recompile {
        folder: PathBuf,
        /// Build resources with aapt1
        #[arg(long)]
        aapt1: bool,
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        extra: String,
    },
    /// Sign an APK in place with uber-apk-signer
    Sign {
        apk: PathBuf,
        /// Keystore; the configured signing keystore when omitted
        #[arg(long)]
        keystore: Option<PathBuf>,
        #[arg(long, requires = "keystore")]
        ks_pass: Option<String>,
        #[arg(long, requires = "keystore")]
        alias: Option<String>,
        #[arg(long, requires = "keystore")]
        alias_pass: Option<String>,
        /// Skip zipalign
        #[arg(long)]
        no_zipalign: bool,
    },
    /// Generate a signing keystore with keytool
    Keystore {
        path: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(long)]
        alias: String,
        /// Key password, defaults to the keystore password
        #[arg(long)]
        alias_password: Option<String>,
        #[arg(long, default_value_t = 10000)]
        validity: u32,
        #[arg(long, default_value = "RSA", value_parser = ["RSA", "DSA", "EC"])]
        key_alg: String,
        #[arg(long, default_value_t = 2048)]
        key_size: u32,
        /// Make this keystore the signing default
        #[arg(long)]
        save: bool,
    },
    /// Inspect or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Inspect or change the saved session
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the configuration file
    Show,
    /// Set a tool's executable path, or clear it when no path is given
    SetTool { tool: Tool, path: Option<PathBuf> },
    /// Set the Java heap size in megabytes
    SetHeap { megabytes: u32 },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Print the project, recent projects and open files
    Show,
    /// Add files to the session's open files
    Open { files: Vec<PathBuf> },
    /// Remove files from the session's open files
    Close { files: Vec<PathBuf> },
}
