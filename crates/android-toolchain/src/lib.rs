//! External Tool Management
//!
//! Runs, locates, versions and acquires the external programs APK Shell
//! drives:
//! - Java runtime (and its `keytool`)
//! - Apktool
//! - JADX
//! - ADB (platform-tools)
//! - Uber APK Signer

pub mod context;
pub mod download;
pub mod env;
pub mod extract;
pub mod install;
pub mod locator;
pub mod platform;
pub mod queue;
pub mod release;
pub mod runner;
pub mod search;
pub mod versions;

pub use context::ToolContext;
pub use download::{DownloadError, DownloadSession, DownloadWorker};
pub use env::RuntimeEnv;
pub use extract::{ArchiveKind, Extractor};
pub use install::{find_system_java, Installer};
pub use locator::ToolLocator;
pub use platform::Platform;
pub use queue::{AcquisitionQueue, QueueProgress};
pub use release::{download_source, DownloadSource, Release, ReleaseIndex, ReleaseSource};
pub use runner::{
    CommandRunner, DEFAULT_TIMEOUT_SECS, EXTENDED_TIMEOUT_SECS, KEYTOOL_TIMEOUT_SECS, PROPERTY_TIMEOUT_SECS,
};
pub use search::find_executable;
pub use versions::{DefaultVersionParser, ResolveVersions, VersionParser, VersionReport};

/// Microsoft Build of OpenJDK release downloaded when Java is missing
pub const JDK_VERSION: &str = "11.0.29";
