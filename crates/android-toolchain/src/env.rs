//! Runtime Environment
//!
//! Environment exported to child processes that need a Java runtime.
//! Nothing here touches the environment of the current process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

/// Variables applied to a spawned command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnv {
    /// JAVA_HOME
    pub java_home: Option<PathBuf>,
    /// Directories prepended to PATH
    pub path_additions: Vec<PathBuf>,
}

impl RuntimeEnv {
    /// Environment for a resolved java executable.
    ///
    /// `JAVA_HOME` is the parent of `bin/` when java lives in a `bin`
    /// directory, java's own directory otherwise. That directory is also
    /// prepended to `PATH`.
    pub fn for_java(java: &Path) -> Self {
        let mut env = Self::default();
        let Some(bin_dir) = java.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
            return env;
        };

        env.java_home = if bin_dir.file_name().map_or(false, |name| name == "bin") {
            bin_dir.parent().map(Path::to_path_buf)
        } else {
            Some(bin_dir.to_path_buf())
        };
        env.path_additions.push(bin_dir.to_path_buf());
        env
    }

    pub fn is_empty(&self) -> bool {
        self.java_home.is_none() && self.path_additions.is_empty()
    }

    /// PATH value with the additions prepended, skipping those already present
    pub fn path_value(&self, current: Option<OsString>) -> Option<OsString> {
        let existing: Vec<PathBuf> = current
            .as_ref()
            .map(|value| std::env::split_paths(value).collect())
            .unwrap_or_default();

        let additions: Vec<PathBuf> = self
            .path_additions
            .iter()
            .filter(|dir| !existing.contains(dir))
            .cloned()
            .collect();

        if additions.is_empty() {
            return None;
        }

        std::env::join_paths(additions.into_iter().chain(existing)).ok()
    }

    /// Apply the variables to a command
    pub fn apply(&self, command: &mut Command) {
        if let Some(home) = &self.java_home {
            command.env("JAVA_HOME", home);
        }
        if let Some(path) = self.path_value(std::env::var_os("PATH")) {
            debug!("Child PATH prefixed with {:?}", self.path_additions);
            command.env("PATH", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_in_bin() {
        let env = RuntimeEnv::for_java(Path::new("/opt/jdk-11/bin/java"));
        assert_eq!(env.java_home, Some(PathBuf::from("/opt/jdk-11")));
        assert_eq!(env.path_additions, vec![PathBuf::from("/opt/jdk-11/bin")]);
    }

    #[test]
    fn test_java_outside_bin() {
        let env = RuntimeEnv::for_java(Path::new("/usr/local/java"));
        assert_eq!(env.java_home, Some(PathBuf::from("/usr/local")));
        assert_eq!(env.path_additions, vec![PathBuf::from("/usr/local")]);

        assert!(RuntimeEnv::for_java(Path::new("java")).is_empty());
    }

    #[test]
    fn test_path_not_duplicated() {
        let env = RuntimeEnv::for_java(Path::new("/opt/jdk/bin/java"));

        let current = std::env::join_paths([PathBuf::from("/usr/bin"), PathBuf::from("/opt/jdk/bin")]).unwrap();
        assert_eq!(env.path_value(Some(current)), None);

        let current = std::env::join_paths([PathBuf::from("/usr/bin")]).unwrap();
        let value = env.path_value(Some(current)).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&value).collect();
        assert_eq!(parts, vec![PathBuf::from("/opt/jdk/bin"), PathBuf::from("/usr/bin")]);
    }
}
