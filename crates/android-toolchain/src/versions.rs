//! Version Probes
//!
//! Runs each tool's version command and scrapes the version string from
//! its output. Scraping lives behind [`VersionParser`] so the patterns can
//! be swapped without touching the probes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use apkshell_core::{spawn_worker, ProcessResult, ProgressSink, ShellError, Tool, WorkerHandle};
use regex::Regex;
use tracing::{debug, info};

use crate::context::ToolContext;
use crate::runner::DEFAULT_TIMEOUT_SECS;

/// Extracts a version string from a probe's output
pub trait VersionParser: Send + Sync {
    fn parse(&self, tool: Tool, result: &ProcessResult) -> Option<String>;
}

/// Patterns matching the stock tool distributions
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultVersionParser;

impl DefaultVersionParser {
    pub const JAVA_PATTERN: &'static str = r#"version "([\d._]+)""#;
    pub const ADB_PATTERN: &'static str = r"version (\d+\.\d+\.\d+)$";
    pub const UAS_PATTERN: &'static str = r"Version: (\d+\.\d+\.\d+)$";
}

impl VersionParser for DefaultVersionParser {
    fn parse(&self, tool: Tool, result: &ProcessResult) -> Option<String> {
        if !result.success() {
            return None;
        }

        match tool {
            Tool::Java => capture_first(Self::JAVA_PATTERN, result),
            Tool::Adb => capture_first(Self::ADB_PATTERN, result),
            Tool::UberApkSigner => capture_first(Self::UAS_PATTERN, result),
            Tool::Apktool | Tool::Jadx => result
                .first_line()
                .filter(|line| !line.is_empty())
                .map(String::from),
        }
    }
}

fn capture_first(pattern: &str, result: &ProcessResult) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    result.lines().find_map(|line| {
        re.captures(line.trim_end())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Version of every tool; `None` when the tool is missing or unrecognised
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionReport {
    versions: BTreeMap<Tool, Option<String>>,
}

impl VersionReport {
    pub fn get(&self, tool: Tool) -> Option<&str> {
        self.versions.get(&tool).and_then(|v| v.as_deref())
    }

    pub fn set(&mut self, tool: Tool, version: Option<String>) {
        self.versions.insert(tool, version);
    }

    /// Tools without a detected version, in acquisition order
    pub fn missing(&self) -> Vec<Tool> {
        Tool::ALL
            .into_iter()
            .filter(|tool| self.get(*tool).is_none())
            .collect()
    }

    /// Versions keyed by probe key (`java`, `apktool`, `jadx`, `adb`, `uas`)
    pub fn by_key(&self) -> BTreeMap<&'static str, Option<String>> {
        Tool::ALL
            .into_iter()
            .map(|tool| (tool.probe_key(), self.get(tool).map(String::from)))
            .collect()
    }
}

impl fmt::Display for VersionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tool in Tool::ALL {
            writeln!(f, "{:<16} {}", tool.display_name(), self.get(tool).unwrap_or("not found"))?;
        }
        Ok(())
    }
}

/// Probes every tool's version
pub struct ResolveVersions {
    context: ToolContext,
    parser: Arc<dyn VersionParser>,
}

impl ResolveVersions {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            parser: Arc::new(DefaultVersionParser),
        }
    }

    /// Use a different output parser
    pub fn with_parser(mut self, parser: Arc<dyn VersionParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Probe a single tool
    pub async fn probe(&self, tool: Tool) -> Option<String> {
        let result = self.run_probe(tool).await?;
        let version = self.parser.parse(tool, &result);
        debug!("{} version: {:?}", tool, version);
        version
    }

    async fn run_probe(&self, tool: Tool) -> Option<ProcessResult> {
        let locator = self.context.locator();
        let runner = self.context.runner();

        let result = match tool {
            Tool::Java => {
                let java = locator.locate(Tool::Java).await?;
                runner.run(&java, ["-version"], DEFAULT_TIMEOUT_SECS).await
            }
            Tool::Apktool | Tool::UberApkSigner => {
                let java = locator.locate(Tool::Java).await?;
                let jar = locator.locate(tool).await?;
                let args = vec!["-jar".to_string(), jar.display().to_string(), "--version".to_string()];
                runner.run(&java, args, DEFAULT_TIMEOUT_SECS).await
            }
            Tool::Jadx | Tool::Adb => {
                let exe = locator.locate(tool).await?;
                runner.run(&exe, ["--version"], DEFAULT_TIMEOUT_SECS).await
            }
        };
        Some(result)
    }

    /// Probe all tools in order
    pub async fn resolve(&self, sink: Option<&ProgressSink<VersionReport>>) -> VersionReport {
        let mut report = VersionReport::default();
        let count = Tool::ALL.len();
        for (index, tool) in Tool::ALL.into_iter().enumerate() {
            if let Some(sink) = sink {
                sink.progress((index * 100 / count) as u8, format!("Checking {}...", tool));
            }
            report.set(tool, self.probe(tool).await);
        }
        info!("Resolved versions, missing: {:?}", report.missing());
        report
    }

    /// Run the probes as a background worker
    pub fn spawn(self) -> WorkerHandle<VersionReport> {
        spawn_worker("resolve-versions", move |sink| async move {
            let report = self.resolve(Some(&sink)).await;
            sink.progress(100, "Done");
            Ok::<_, ShellError>(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: i32, stdout: &str, stderr: &str) -> ProcessResult {
        ProcessResult::from_streams(code, stdout.as_bytes(), stderr.as_bytes())
    }

    #[test]
    fn test_java_version_from_stderr() {
        let out = result(
            0,
            "",
            "openjdk version \"11.0.29\" 2025-10-21 LTS\nOpenJDK Runtime Environment Microsoft-123\n",
        );
        assert_eq!(DefaultVersionParser.parse(Tool::Java, &out).as_deref(), Some("11.0.29"));

        let legacy = result(0, "", "java version \"1.8.0_392\"\n");
        assert_eq!(DefaultVersionParser.parse(Tool::Java, &legacy).as_deref(), Some("1.8.0_392"));
    }

    #[test]
    fn test_adb_and_uas_versions() {
        let adb = result(0, "Android Debug Bridge version 1.0.41\nVersion 35.0.2-12147458\nInstalled as /usr/bin/adb\n", "");
        assert_eq!(DefaultVersionParser.parse(Tool::Adb, &adb).as_deref(), Some("1.0.41"));

        let uas = result(0, "jar: uber-apk-signer.jar\nVersion: 1.3.0\n", "");
        assert_eq!(DefaultVersionParser.parse(Tool::UberApkSigner, &uas).as_deref(), Some("1.3.0"));
    }

    #[test]
    fn test_first_line_tools() {
        let apktool = result(0, "  2.9.3  \nextra\n", "");
        assert_eq!(DefaultVersionParser.parse(Tool::Apktool, &apktool).as_deref(), Some("2.9.3"));

        let jadx = result(0, "1.5.0\n", "");
        assert_eq!(DefaultVersionParser.parse(Tool::Jadx, &jadx).as_deref(), Some("1.5.0"));
    }

    #[test]
    fn test_failed_probe_has_no_version() {
        assert_eq!(DefaultVersionParser.parse(Tool::Jadx, &result(1, "1.5.0\n", "")), None);
        assert_eq!(DefaultVersionParser.parse(Tool::Java, &ProcessResult::failed_to_start()), None);
        assert_eq!(DefaultVersionParser.parse(Tool::Adb, &result(0, "garbage\n", "")), None);
    }

    #[test]
    fn test_report_missing() {
        let mut report = VersionReport::default();
        report.set(Tool::Java, Some("11.0.29".into()));
        report.set(Tool::Adb, None);
        report.set(Tool::Jadx, Some("1.5.0".into()));

        assert_eq!(report.missing(), vec![Tool::Apktool, Tool::Adb, Tool::UberApkSigner]);
        assert_eq!(report.by_key()["java"].as_deref(), Some("11.0.29"));
        assert_eq!(report.by_key()["uas"], None);
    }

    struct FixedParser;

    impl VersionParser for FixedParser {
        fn parse(&self, _tool: Tool, _result: &ProcessResult) -> Option<String> {
            Some("fixed".into())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_uses_parser() {
        let dir = tempfile::tempdir().unwrap();
        let adb = dir.path().join("adb");
        std::fs::write(&adb, "#!/bin/sh\necho \"Android Debug Bridge version 1.0.41\"\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut config = apkshell_core::AppConfig::default();
        config.tools.adb_exe = Some(adb);
        let context = ToolContext::new(config, None).await;

        let probes = ResolveVersions::new(context.clone());
        assert_eq!(probes.probe(Tool::Adb).await.as_deref(), Some("1.0.41"));

        let fixed = ResolveVersions::new(context).with_parser(Arc::new(FixedParser));
        assert_eq!(fixed.probe(Tool::Adb).await.as_deref(), Some("fixed"));
    }
}
