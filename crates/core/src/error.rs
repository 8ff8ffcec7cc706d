//! Error types for APK Shell
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::tool::Tool;

/// Broad classification shared by every crate's error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A tool is missing or a setting is invalid
    Configuration,
    /// An external process could not start, timed out or exited non-zero
    Process,
    /// HTTP or release index failure
    Network,
    /// File creation, copy or extraction failure
    Filesystem,
    /// The command succeeded but its expected artifact is absent
    PostCondition,
    /// The operation was aborted by the user
    Cancelled,
}

/// Main error type for APK Shell
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(
        "{} is not configured or could not be found; set its path or run `apkshell download {}`",
        .0.display_name(),
        .0.probe_key()
    )]
    MissingTool(Tool),
}

/// Result type alias for APK Shell operations
pub type Result<T> = std::result::Result<T, ShellError>;

impl ShellError {
    /// Map the error onto the shared taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            ShellError::Config(_)
            | ShellError::TomlParse(_)
            | ShellError::TomlSerialize(_)
            | ShellError::MissingTool(_) => ErrorCategory::Configuration,
            ShellError::Io(_) => ErrorCategory::Filesystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_message() {
        let err = ShellError::MissingTool(Tool::Apktool);
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("Apktool"));
        assert!(err.to_string().contains("apkshell download apktool"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(ShellError::Config("x".into()).category(), ErrorCategory::Configuration);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ShellError::from(io).category(), ErrorCategory::Filesystem);
    }
}
