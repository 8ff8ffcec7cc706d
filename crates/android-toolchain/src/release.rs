//! Download Sources
//!
//! Where each tool is fetched from: fixed vendor URLs for the Java
//! runtime and platform-tools, the latest GitHub release for the rest.

use apkshell_core::Tool;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::download::DownloadError;
use crate::platform::Platform;

/// GitHub REST API root
pub const GITHUB_API: &str = "https://api.github.com";

/// A published release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// First asset matching the first pattern that matches anything
    pub fn select_asset(&self, patterns: &[String]) -> Option<&ReleaseAsset> {
        patterns.iter().find_map(|pattern| {
            let re = Regex::new(pattern).ok()?;
            self.assets.iter().find(|asset| re.is_match(&asset.name))
        })
    }
}

/// Repository and asset patterns of a GitHub-hosted tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    pub repo: &'static str,
    /// Tried in order
    pub patterns: Vec<String>,
}

/// Where a tool's archive comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    Direct(String),
    GitHub(ReleaseSource),
}

/// Download source of a tool on a platform
pub fn download_source(tool: Tool, platform: Platform) -> DownloadSource {
    match tool {
        Tool::Java => {
            let suffix = match platform {
                Platform::MacOs => "macos-aarch64.pkg",
                Platform::Linux => "linux-x64.tar.gz",
                Platform::Windows => "windows-x64.msi",
            };
            DownloadSource::Direct(format!(
                "https://aka.ms/download-jdk/microsoft-jdk-{}-{}",
                crate::JDK_VERSION,
                suffix
            ))
        }
        Tool::Adb => DownloadSource::Direct(format!(
            "https://dl.google.com/android/repository/platform-tools-latest-{}.zip",
            platform.release_name()
        )),
        Tool::Apktool => DownloadSource::GitHub(ReleaseSource {
            repo: "iBotPeaches/Apktool",
            patterns: vec![r"apktool.*\.jar$".to_string()],
        }),
        Tool::Jadx => DownloadSource::GitHub(ReleaseSource {
            repo: "skylot/jadx",
            patterns: vec![
                format!(r"jadx-.*-{}\.zip$", platform.release_name()),
                r"jadx-.*\.zip$".to_string(),
            ],
        }),
        Tool::UberApkSigner => DownloadSource::GitHub(ReleaseSource {
            repo: "patrickfav/uber-apk-signer",
            patterns: vec![r"uber-apk-signer.*\.jar$".to_string()],
        }),
    }
}

/// Client for the latest-release endpoint
#[derive(Clone)]
pub struct ReleaseIndex {
    client: Client,
    api_base: String,
}

impl ReleaseIndex {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: GITHUB_API.to_string(),
        }
    }

    /// Point at another API root (mirrors, tests)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch the latest release of `owner/name`
    pub async fn latest(&self, repo: &str) -> Result<Release, DownloadError> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, repo);
        debug!("Fetching release index {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DownloadError::InvalidResponse(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let release: Release = response.json().await?;
        info!("Latest {} release: {} ({} assets)", repo, release.tag_name, release.assets.len());
        Ok(release)
    }

    /// Download URL of the matching asset in the latest release
    pub async fn asset_url(&self, source: &ReleaseSource) -> Result<String, DownloadError> {
        let release = self.latest(source.repo).await?;
        release
            .select_asset(&source.patterns)
            .map(|asset| asset.browser_download_url.clone())
            .ok_or_else(|| {
                DownloadError::UrlUnresolvable(format!(
                    "no asset of {} {} matches {:?}",
                    source.repo, release.tag_name, source.patterns
                ))
            })
    }
}
