//! Platform Installers
//!
//! Runs `.pkg` (macOS) and `.msi` (Windows) installers. The Java runtime
//! installs system-wide with elevation. Whatever the installer's exit code,
//! its JVM directories are then polled for a while, since the files may
//! become visible only after the installer has returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use apkshell_core::{ProcessResult, Tool};
use tracing::{debug, info, warn};

use crate::download::DownloadError;
use crate::platform::Platform;
use crate::runner::CommandRunner;

/// Installer timeout for the Java runtime
const JAVA_INSTALL_TIMEOUT_SECS: u64 = 600;

/// Installer timeout for other tools
const INSTALL_TIMEOUT_SECS: u64 = 300;

/// Wait before polling for an installed Java runtime
const POLL_GRACE: Duration = Duration::from_secs(2);

const POLL_ATTEMPTS: usize = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs platform installers
#[derive(Clone)]
pub struct Installer {
    runner: CommandRunner,
    pkg_program: PathBuf,
    msi_program: PathBuf,
    java_roots: Option<Vec<PathBuf>>,
    poll_grace: Duration,
    poll_interval: Duration,
}

impl Installer {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            pkg_program: PathBuf::from("installer"),
            msi_program: PathBuf::from("msiexec"),
            java_roots: None,
            poll_grace: POLL_GRACE,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Programs used for non-elevated package installs
    pub fn with_programs(mut self, pkg: impl Into<PathBuf>, msi: impl Into<PathBuf>) -> Self {
        self.pkg_program = pkg.into();
        self.msi_program = msi.into();
        self
    }

    /// Search these directories for an installed JDK instead of the system ones
    pub fn with_java_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.java_roots = Some(roots);
        self
    }

    pub fn with_poll_timing(mut self, grace: Duration, interval: Duration) -> Self {
        self.poll_grace = grace;
        self.poll_interval = interval;
        self
    }

    fn timeout_for(tool: Tool) -> u64 {
        if tool == Tool::Java {
            JAVA_INSTALL_TIMEOUT_SECS
        } else {
            INSTALL_TIMEOUT_SECS
        }
    }

    /// Install a macOS package; yields the Java executable for `Tool::Java`
    pub async fn install_pkg(&self, tool: Tool, package: &Path) -> Result<Option<PathBuf>, DownloadError> {
        info!("Installing package {:?}", package);
        let result = if tool == Tool::Java {
            let script = format!(
                "do shell script \"installer -pkg \\\"{}\\\" -target / -verboseR\" with administrator privileges",
                package.display()
            );
            self.runner
                .run("osascript", ["-e", script.as_str()], Self::timeout_for(tool))
                .await
        } else {
            let args = [
                "-pkg".to_string(),
                package.display().to_string(),
                "-target".to_string(),
                "/".to_string(),
                "-verboseR".to_string(),
            ];
            self.runner.run(&self.pkg_program, args, Self::timeout_for(tool)).await
        };

        if !result.success() {
            let detail = result.failure_detail().to_lowercase();
            if detail.contains("user canceled") {
                warn!("Installation cancelled at the administrator prompt");
            } else if detail.contains("not authorized") {
                warn!("Installation not authorized");
            }
        }
        self.settle(tool, &result, Platform::MacOs).await
    }

    /// Install a Windows MSI; yields the Java executable for `Tool::Java`
    pub async fn install_msi(&self, tool: Tool, package: &Path) -> Result<Option<PathBuf>, DownloadError> {
        info!("Installing MSI {:?}", package);
        let result = if tool == Tool::Java {
            let command = format!(
                "Start-Process -FilePath 'msiexec.exe' -ArgumentList '/i', '{}', '/qn', '/norestart' -Verb RunAs -Wait -PassThru | ForEach-Object {{ exit $_.ExitCode }}",
                package.display()
            );
            self.runner
                .run("powershell.exe", ["-Command", command.as_str()], Self::timeout_for(tool))
                .await
        } else {
            let args = [
                "/i".to_string(),
                package.display().to_string(),
                "/qn".to_string(),
                "/norestart".to_string(),
            ];
            self.runner.run(&self.msi_program, args, Self::timeout_for(tool)).await
        };
        self.settle(tool, &result, Platform::Windows).await
    }

    /// Decide the outcome of an installer run.
    ///
    /// Java is polled for on success and failure alike; a runtime that shows
    /// up wins over the exit code. Other tools go by the exit code alone.
    pub async fn settle(
        &self,
        tool: Tool,
        result: &ProcessResult,
        platform: Platform,
    ) -> Result<Option<PathBuf>, DownloadError> {
        if tool != Tool::Java {
            return if result.success() {
                Ok(None)
            } else {
                Err(DownloadError::Installer(result.failure_detail()))
            };
        }

        match self.poll_java(platform).await {
            Some(java) => {
                if !result.success() {
                    info!("Java is present despite installer exit code {}", result.code);
                }
                Ok(Some(java))
            }
            None if result.success() => Ok(None),
            None => Err(DownloadError::Installer(result.failure_detail())),
        }
    }

    fn find_java(&self, platform: Platform) -> Option<PathBuf> {
        match &self.java_roots {
            Some(roots) => find_java_under(roots, platform),
            None => find_system_java(platform),
        }
    }

    /// Look once, then after the grace period up to `POLL_ATTEMPTS` times
    async fn poll_java(&self, platform: Platform) -> Option<PathBuf> {
        if let Some(java) = self.find_java(platform) {
            return Some(java);
        }
        tokio::time::sleep(self.poll_grace).await;
        for attempt in 0..POLL_ATTEMPTS {
            if let Some(java) = self.find_java(platform) {
                return Some(java);
            }
            debug!("Java not visible yet (attempt {})", attempt + 1);
            if attempt + 1 < POLL_ATTEMPTS {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        None
    }
}

/// Directories whose `*jdk*`/`*java*` children hold system JDKs
pub fn system_java_roots(platform: Platform) -> Vec<PathBuf> {
    let home = dirs::home_dir();
    match platform {
        Platform::Windows => vec![
            PathBuf::from("C:/Program Files/Microsoft"),
            PathBuf::from("C:/Program Files (x86)/Microsoft"),
            PathBuf::from("C:/Program Files/Java"),
            PathBuf::from("C:/Program Files (x86)/Java"),
        ],
        Platform::MacOs => {
            let mut roots = vec![PathBuf::from("/Library/Java/JavaVirtualMachines")];
            roots.extend(home.map(|h| h.join("Library/Java/JavaVirtualMachines")));
            roots
        }
        Platform::Linux => {
            let mut roots = vec![PathBuf::from("/usr/lib/jvm"), PathBuf::from("/opt/java")];
            roots.extend(home.map(|h| h.join(".local/share/java")));
            roots
        }
    }
}

/// Java executable inside a JDK directory
fn java_in_jdk(jdk: &Path, platform: Platform) -> PathBuf {
    match platform {
        Platform::Windows => jdk.join("bin").join("java.exe"),
        Platform::MacOs => jdk.join("Contents").join("Home").join("bin").join("java"),
        Platform::Linux => jdk.join("bin").join("java"),
    }
}

/// First java executable under the given roots
pub fn find_java_under(roots: &[PathBuf], platform: Platform) -> Option<PathBuf> {
    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        let mut jdks: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                name.contains("jdk") || name.contains("java")
            })
            .map(|entry| entry.path())
            .collect();
        jdks.sort();

        if let Some(java) = jdks
            .iter()
            .map(|jdk| java_in_jdk(jdk, platform))
            .find(|java| java.is_file())
        {
            return Some(java);
        }
    }
    None
}

/// Java installed in the platform's system locations
pub fn find_system_java(platform: Platform) -> Option<PathBuf> {
    find_java_under(&system_java_roots(platform), platform)
}
