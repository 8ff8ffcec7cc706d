//! Executable Search
//!
//! Finds a tool's executable inside an extracted archive. Exact relative
//! candidates are checked against every file of a name-ordered recursive
//! walk; jar tools also accept versioned jar names.

use std::path::{Path, PathBuf};

use apkshell_core::Tool;
use tracing::debug;
use walkdir::WalkDir;

use crate::platform::Platform;

/// Relative paths a tool's executable is expected at under `root`
pub fn candidate_paths(tool: Tool, root: &Path, platform: Platform) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    match tool {
        Tool::Java => {
            names.extend(["bin/java", "bin/java.exe", "java", "java.exe"].map(String::from));
            for entry in child_names(root, true) {
                let lower = entry.to_lowercase();
                if lower.contains("jdk") || lower.contains("java") {
                    names.push(format!("{}/bin/java", entry));
                    names.push(format!("{}/bin/java.exe", entry));
                }
            }
        }
        Tool::Apktool => names.push("apktool.jar".to_string()),
        Tool::Jadx => {
            let launcher = if platform.is_windows() { "jadx.bat" } else { "jadx" };
            names.push(format!("jadx/bin/{}", launcher));
            names.push(format!("bin/{}", launcher));
        }
        Tool::Adb => {
            names.extend(["platform-tools/adb", "adb/adb", "adb"].map(String::from));
            if platform.is_windows() {
                names.extend(["platform-tools/adb.exe", "adb/adb.exe", "adb.exe"].map(String::from));
            }
        }
        Tool::UberApkSigner => names.push("uber-apk-signer.jar".to_string()),
    }
    names
}

/// Locate the executable of `tool` under `root`
pub fn find_executable(tool: Tool, root: &Path, platform: Platform) -> Option<PathBuf> {
    if tool.is_jar() {
        if let Some(jar) = top_level_jar(tool, root) {
            return Some(jar);
        }
    }

    let candidates: Vec<String> = candidate_paths(tool, root, platform)
        .into_iter()
        .map(|c| c.to_lowercase())
        .collect();

    let found = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| matches_candidate(tool, entry.path(), &candidates))
        .map(|entry| entry.into_path());

    debug!("Search for {} under {:?}: {:?}", tool, root, found);
    found
}

fn matches_candidate(tool: Tool, path: &Path, candidates: &[String]) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let full = path.to_string_lossy().replace('\\', "/").to_lowercase();

    let exact = candidates
        .iter()
        .any(|candidate| name == *candidate || full.ends_with(&format!("/{}", candidate)));
    if exact {
        return true;
    }

    tool.is_jar() && name.ends_with(".jar") && name.contains(tool.dir_name())
}

/// A jar directly in `root` whose name mentions the tool
fn top_level_jar(tool: Tool, root: &Path) -> Option<PathBuf> {
    child_names(root, false).into_iter().find_map(|name| {
        let lower = name.to_lowercase();
        (lower.ends_with(".jar") && lower.contains(tool.dir_name())).then(|| root.join(name))
    })
}

/// Sorted names of the files (or directories) directly in `dir`
fn child_names(dir: &Path, dirs: bool) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_dir() == dirs).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Mark a file executable on Unix
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_versioned_jar_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "README.txt");
        let jar = touch(dir.path(), "apktool_2.9.3.jar");

        assert_eq!(find_executable(Tool::Apktool, dir.path(), Platform::Linux), Some(jar));
        assert_eq!(find_executable(Tool::UberApkSigner, dir.path(), Platform::Linux), None);
    }

    #[test]
    fn test_nested_jar_found_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let jar = touch(dir.path(), "release/uber-apk-signer-1.3.0.jar");
        assert_eq!(find_executable(Tool::UberApkSigner, dir.path(), Platform::MacOs), Some(jar));
    }

    #[test]
    fn test_jadx_launcher() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/jadx-1.5.0-all.jar");
        let unix = touch(dir.path(), "bin/jadx");
        let windows = touch(dir.path(), "bin/jadx.bat");

        assert_eq!(find_executable(Tool::Jadx, dir.path(), Platform::Linux), Some(unix));
        assert_eq!(find_executable(Tool::Jadx, dir.path(), Platform::Windows), Some(windows));
    }

    #[test]
    fn test_platform_tools_adb() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "platform-tools/fastboot");
        touch(dir.path(), "platform-tools/adb.sha");
        let adb = touch(dir.path(), "platform-tools/adb");
        assert_eq!(find_executable(Tool::Adb, dir.path(), Platform::Linux), Some(adb));
    }

    #[test]
    fn test_java_in_nested_jdk() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "jdk-11.0.29+7/lib/libjava.so");
        let java = touch(dir.path(), "jdk-11.0.29+7/bin/java");

        let candidates = candidate_paths(Tool::Java, dir.path(), Platform::Linux);
        assert!(candidates.contains(&"jdk-11.0.29+7/bin/java".to_string()));
        assert_eq!(find_executable(Tool::Java, dir.path(), Platform::Linux), Some(java));
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "adb");
        make_executable(&file).unwrap();
        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
