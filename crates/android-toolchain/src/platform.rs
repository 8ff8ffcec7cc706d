//! Host Platform
//!
//! Naming conventions that differ between the operating systems the
//! tools are downloaded for.

use apkshell_core::Tool;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Name used in release asset and download file names
    pub fn release_name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "darwin",
            Platform::Linux => "linux",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Program that prints the location of a command on `PATH`
    pub fn locator_command(&self) -> &'static str {
        if self.is_windows() {
            "where"
        } else {
            "which"
        }
    }

    /// Executable file name for a base name
    pub fn exe(&self, base: &str) -> String {
        if self.is_windows() {
            format!("{}.exe", base)
        } else {
            base.to_string()
        }
    }

    /// File name of a tool's launcher on `PATH`, if it has one
    pub fn command_file(&self, tool: Tool) -> Option<String> {
        let base = tool.command_name()?;
        Some(match (self, tool) {
            (Platform::Windows, Tool::Jadx) => format!("{}.bat", base),
            _ => self.exe(base),
        })
    }
}
