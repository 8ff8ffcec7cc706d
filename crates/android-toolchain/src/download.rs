//! Tool Download
//!
//! Downloads a missing tool, unpacks or installs it, locates its
//! executable and records the path in the configuration store.
//!
//! Progress milestones: 0 preparing, 5 to 75 while transferring, 75
//! unpacking, 90 locating, 100 done.
//!
//! Cancelling stops the transfer and deletes the partial file. Once the
//! transfer is complete, unpacking or installing runs in its own task and is
//! not interrupted; the downloaded file is still removed when it ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use apkshell_core::{
    spawn_worker, ConfigStore, ErrorCategory, Event, EventBus, ProgressSink, ShellError, Tool, WorkerHandle,
};
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::extract::{ArchiveKind, Extractor};
use crate::install::Installer;
use crate::platform::Platform;
use crate::release::{download_source, DownloadSource, ReleaseIndex};
use crate::runner::CommandRunner;
use crate::search::{find_executable, make_executable};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("APK Shell/", env!("CARGO_PKG_VERSION"));

/// Download error types
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Could not resolve download URL: {0}")]
    UrlUnresolvable(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Could not create {path:?}: {source}")]
    FileCreate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Installer failed: {0}")]
    Installer(String),
    #[error("Could not find the {0} executable after installation")]
    ExecutableNotFound(Tool),
    #[error(transparent)]
    Config(#[from] ShellError),
    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DownloadError::UrlUnresolvable(_)
            | DownloadError::Network(_)
            | DownloadError::InvalidResponse(_) => ErrorCategory::Network,
            DownloadError::FileCreate { .. } | DownloadError::Io(_) | DownloadError::Extraction(_) => {
                ErrorCategory::Filesystem
            }
            DownloadError::Installer(_) => ErrorCategory::Process,
            DownloadError::ExecutableNotFound(_) => ErrorCategory::PostCondition,
            DownloadError::Config(e) => e.category(),
            DownloadError::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Paths of one download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub url: String,
    /// Where the transfer is written
    pub download_path: PathBuf,
    /// Where the tool is unpacked
    pub extract_path: PathBuf,
}

/// Build a shared HTTP client carrying the user agent
pub fn http_client() -> Result<Client, DownloadError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Last path segment of a URL, without query or fragment
pub fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(String::from))
        })
        .unwrap_or_else(|| "download".to_string())
}

/// Downloads and installs one tool
pub struct DownloadWorker {
    tool: Tool,
    store: ConfigStore,
    client: Client,
    releases: ReleaseIndex,
    runner: CommandRunner,
    installer: Installer,
    platform: Platform,
    download_dir: PathBuf,
    tools_dir: PathBuf,
    url_override: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl DownloadWorker {
    /// Worker installing into the default tools directory
    pub fn new(tool: Tool, store: ConfigStore) -> Result<Self, DownloadError> {
        let client = http_client()?;
        Ok(Self {
            tool,
            store,
            releases: ReleaseIndex::new(client.clone()),
            client,
            runner: CommandRunner::new(),
            installer: Installer::new(CommandRunner::new()),
            platform: Platform::current(),
            download_dir: std::env::temp_dir().join("apkshell_downloads"),
            tools_dir: apkshell_core::AppConfig::tools_dir(),
            url_override: None,
            event_bus: None,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.releases = ReleaseIndex::new(client.clone());
        self.client = client;
        self
    }

    pub fn with_release_index(mut self, releases: ReleaseIndex) -> Self {
        self.releases = releases;
        self
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.platform = runner.platform();
        self.installer = Installer::new(runner.clone());
        self.runner = runner;
        self
    }

    pub fn with_installer(mut self, installer: Installer) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = dir.into();
        self
    }

    /// Download from a fixed URL instead of the tool's source
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url_override = Some(url.into());
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Resolve the archive URL for this platform
    pub async fn resolve_url(&self) -> Result<String, DownloadError> {
        if let Some(url) = &self.url_override {
            return Ok(url.clone());
        }
        match download_source(self.tool, self.platform) {
            DownloadSource::Direct(url) => Ok(url),
            DownloadSource::GitHub(source) => self.releases.asset_url(&source).await,
        }
    }

    /// Paths used for a URL
    pub fn session(&self, url: &str) -> DownloadSession {
        DownloadSession {
            url: url.to_string(),
            download_path: self.download_dir.join(file_name_from_url(url)),
            extract_path: self.tools_dir.join(self.tool.dir_name()),
        }
    }

    /// Run as a background worker yielding the executable path
    pub fn spawn(self) -> WorkerHandle<PathBuf> {
        let name = format!("download-{}", self.tool.probe_key());
        spawn_worker(name, move |sink| self.run(sink))
    }

    async fn run(self, sink: ProgressSink<PathBuf>) -> Result<PathBuf, DownloadError> {
        sink.progress(0, format!("Preparing {} download...", self.tool));
        let url = self.resolve_url().await?;
        let session = self.session(&url);
        info!("Downloading {} from {}", self.tool, url);

        sink.progress(5, format!("Downloading {}...", self.tool));
        self.fetch(&session, &sink).await?;

        // Detached so an aborted worker neither interrupts a running
        // installer nor skips removing the download
        let finishing = tokio::spawn(async move {
            let result = self.finish(&session, &sink).await;
            if let Err(e) = tokio::fs::remove_file(&session.download_path).await {
                debug!("Could not remove {:?}: {}", session.download_path, e);
            }
            result
        });
        finishing
            .await
            .map_err(|e| DownloadError::Extraction(e.to_string()))?
    }

    /// Stream the archive to disk; a cancel deletes the partial file
    async fn fetch(&self, session: &DownloadSession, sink: &ProgressSink<PathBuf>) -> Result<(), DownloadError> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|source| DownloadError::FileCreate {
                path: self.download_dir.clone(),
                source,
            })?;
        let path = &session.download_path;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| DownloadError::FileCreate {
                path: path.clone(),
                source,
            })?;

        let transfer = async {
            let response = self.client.get(&session.url).send().await?;
            if !response.status().is_success() {
                return Err(DownloadError::InvalidResponse(format!("HTTP {}", response.status())));
            }

            let total = response.content_length().unwrap_or(0);
            let mut received: u64 = 0;
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                received += chunk.len() as u64;

                if total > 0 {
                    let percent = 5 + received.min(total) * 70 / total;
                    sink.progress(percent as u8, format!("Downloaded {} of {} bytes", received, total));
                }
            }

            file.flush().await?;
            Ok::<(), DownloadError>(())
        };

        let outcome = tokio::select! {
            outcome = transfer => outcome,
            _ = sink.cancelled() => Err(DownloadError::Cancelled),
        };
        drop(file);

        if outcome.is_err() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Could not remove partial download {:?}: {}", path, e);
            }
        }
        outcome
    }

    async fn finish(&self, session: &DownloadSession, sink: &ProgressSink<PathBuf>) -> Result<PathBuf, DownloadError> {
        let file_name = file_name_from_url(&session.url);
        let kind = ArchiveKind::detect(&file_name);
        tokio::fs::create_dir_all(&session.extract_path)
            .await
            .map_err(|source| DownloadError::FileCreate {
                path: session.extract_path.clone(),
                source,
            })?;

        let step = if kind.is_installer() { "Installing" } else { "Unpacking" };
        sink.progress(75, format!("{} {}...", step, file_name));
        let extractor = Extractor::new(self.runner.clone());
        let installed = match kind {
            ArchiveKind::Zip => {
                extractor.extract_zip(&session.download_path, &session.extract_path).await?;
                None
            }
            ArchiveKind::TarGz => {
                extractor.extract_tar_gz(&session.download_path, &session.extract_path).await?;
                None
            }
            ArchiveKind::Jar | ArchiveKind::Other => {
                extractor.copy_into(&session.download_path, &session.extract_path).await?;
                None
            }
            ArchiveKind::Pkg => self.installer.install_pkg(self.tool, &session.download_path).await?,
            ArchiveKind::Msi => self.installer.install_msi(self.tool, &session.download_path).await?,
        };

        sink.progress(90, "Locating executable...");
        let executable = match installed {
            Some(path) => path,
            None => self.locate(&session.extract_path).await?,
        };
        make_executable(&executable)?;

        if sink.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        self.store.commit_tool_path(self.tool, executable.clone()).await?;
        if let Some(bus) = &self.event_bus {
            bus.emit(Event::ToolInstalled {
                tool: self.tool,
                path: executable.clone(),
            });
        }

        sink.progress(100, format!("{} installed", self.tool));
        info!("{} installed at {:?}", self.tool, executable);
        Ok(executable)
    }

    async fn locate(&self, root: &Path) -> Result<PathBuf, DownloadError> {
        let tool = self.tool;
        let platform = self.platform;
        let root = root.to_path_buf();
        let found = tokio::task::spawn_blocking(move || find_executable(tool, &root, platform))
            .await
            .map_err(|e| DownloadError::Extraction(e.to_string()))?;

        found.ok_or(DownloadError::ExecutableNotFound(tool))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use apkshell_core::{AppConfig, WorkerEvent};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one response; `stall` keeps the connection open after `body`
    async fn serve_once(body: Vec<u8>, content_length: usize, stall: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_length
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.flush().await.unwrap();
            if stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });

        format!("http://{}", addr)
    }

    fn test_client() -> Client {
        Client::builder().no_proxy().user_agent(USER_AGENT).build().unwrap()
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://aka.ms/download-jdk/microsoft-jdk-11.0.29-linux-x64.tar.gz"),
            "microsoft-jdk-11.0.29-linux-x64.tar.gz"
        );
        assert_eq!(file_name_from_url("https://x/y/apktool_2.9.3.jar?raw=1"), "apktool_2.9.3.jar");
        assert_eq!(file_name_from_url("https://example.com/"), "download");
    }

    #[test]
    fn test_session_paths() {
        let store = ConfigStore::in_memory(AppConfig::default());
        let worker = DownloadWorker::new(Tool::UberApkSigner, store)
            .unwrap()
            .with_download_dir("/tmp/dl")
            .with_tools_dir("/data/tools");
        let session = worker.session("https://github.com/a/b/uber-apk-signer-1.3.0.jar");
        assert_eq!(session.download_path, PathBuf::from("/tmp/dl/uber-apk-signer-1.3.0.jar"));
        assert_eq!(session.extract_path, PathBuf::from("/data/tools/uber-apk-signer"));
    }

    #[tokio::test]
    async fn test_jar_download_installs_and_commits() {
        let body = b"PK\x03\x04 fake apktool jar".to_vec();
        let base = serve_once(body.clone(), body.len(), false).await;

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_memory(AppConfig::default());
        let worker = DownloadWorker::new(Tool::Apktool, store.clone())
            .unwrap()
            .with_client(test_client())
            .with_download_dir(dir.path().join("downloads"))
            .with_tools_dir(dir.path().join("tools"))
            .with_url(format!("{}/apktool_2.9.3.jar", base));

        let mut handle = worker.spawn();
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }

        let installed = dir.path().join("tools").join("apktool").join("apktool_2.9.3.jar");
        assert_eq!(events.first(), Some(&WorkerEvent::Started));
        assert_eq!(events.last(), Some(&WorkerEvent::Finished));
        assert!(events.contains(&WorkerEvent::Succeeded(installed.clone())));

        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents.first(), Some(&0));
        assert!(percents.contains(&75));
        assert!(percents.contains(&90));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(std::fs::read(&installed).unwrap(), body);
        assert_eq!(store.tool_path(Tool::Apktool), Some(installed));
        assert!(!dir.path().join("downloads").join("apktool_2.9.3.jar").exists());
    }

    #[tokio::test]
    async fn test_abort_removes_partial_file() {
        let base = serve_once(vec![7u8; 64 * 1024], 1024 * 1024, true).await;

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_memory(AppConfig::default());
        let worker = DownloadWorker::new(Tool::Apktool, store.clone())
            .unwrap()
            .with_client(test_client())
            .with_download_dir(dir.path().join("downloads"))
            .with_tools_dir(dir.path().join("tools"))
            .with_url(format!("{}/apktool_2.9.3.jar", base));

        let mut handle = worker.spawn();
        loop {
            match handle.next_event().await {
                Some(WorkerEvent::Progress { message, .. }) if message.starts_with("Downloaded") => break,
                Some(_) => {}
                None => panic!("worker ended before transferring data"),
            }
        }

        handle.cancel();
        let mut rest = Vec::new();
        while let Some(event) = handle.next_event().await {
            rest.push(event);
        }

        assert_eq!(rest, vec![WorkerEvent::Finished]);
        assert!(!dir.path().join("downloads").join("apktool_2.9.3.jar").exists());
        assert_eq!(store.tool_path(Tool::Apktool), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_does_not_interrupt_installer() {
        use std::os::unix::fs::PermissionsExt;

        let body = b"xar! fake package".to_vec();
        let base = serve_once(body.clone(), body.len(), false).await;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("installer-done");
        let program = dir.path().join("fake-installer");
        std::fs::write(&program, format!("#!/bin/sh\nsleep 3\ntouch '{}'\n", marker.display())).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = ConfigStore::in_memory(AppConfig::default());
        let downloaded = dir.path().join("downloads").join("apktool.pkg");
        let worker = DownloadWorker::new(Tool::Apktool, store.clone())
            .unwrap()
            .with_client(test_client())
            .with_installer(Installer::new(CommandRunner::new()).with_programs(&program, &program))
            .with_download_dir(dir.path().join("downloads"))
            .with_tools_dir(dir.path().join("tools"))
            .with_url(format!("{}/apktool.pkg", base));

        let mut handle = worker.spawn();
        loop {
            match handle.next_event().await {
                Some(WorkerEvent::Progress { percent: 75, .. }) => break,
                Some(_) => {}
                None => panic!("worker ended before installing"),
            }
        }

        handle.cancel();
        let mut rest = Vec::new();
        while let Some(event) = handle.next_event().await {
            rest.push(event);
        }
        assert_eq!(rest, vec![WorkerEvent::Finished]);
        handle.join().await;

        for _ in 0..100 {
            if marker.exists() && !downloaded.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(marker.exists());
        assert!(!downloaded.exists());
        assert_eq!(store.tool_path(Tool::Apktool), None);
    }

    #[tokio::test]
    async fn test_http_error_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        });

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_memory(AppConfig::default());
        let worker = DownloadWorker::new(Tool::UberApkSigner, store)
            .unwrap()
            .with_client(test_client())
            .with_download_dir(dir.path().join("downloads"))
            .with_tools_dir(dir.path().join("tools"))
            .with_url(format!("http://{}/uber-apk-signer-1.3.0.jar", addr));

        match worker.spawn().wait().await {
            apkshell_core::Outcome::Failed(reason) => assert!(reason.contains("404")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!dir.path().join("downloads").join("uber-apk-signer-1.3.0.jar").exists());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(DownloadError::ExecutableNotFound(Tool::Jadx).category(), ErrorCategory::PostCondition);
        assert_eq!(DownloadError::Extraction("x".into()).category(), ErrorCategory::Filesystem);
        assert_eq!(
            DownloadError::Config(ShellError::MissingTool(Tool::Java)).category(),
            ErrorCategory::Configuration
        );
    }
}
