//! Application Configuration
//!
//! Manages all persisted settings including:
//! - Paths of the external tools
//! - Runtime options (java heap, aapt2)
//! - Signing defaults
//! - Appearance and session state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ShellError};
use crate::events::{Event, EventBus};
use crate::tool::Tool;

/// Configured locations of the external tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub java_exe: Option<PathBuf>,
    pub apktool_jar: Option<PathBuf>,
    pub jadx_exe: Option<PathBuf>,
    pub adb_exe: Option<PathBuf>,
    pub uas_jar: Option<PathBuf>,
}

impl ToolPaths {
    /// Configured path for a tool
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Java => self.java_exe.as_deref(),
            Tool::Apktool => self.apktool_jar.as_deref(),
            Tool::Jadx => self.jadx_exe.as_deref(),
            Tool::Adb => self.adb_exe.as_deref(),
            Tool::UberApkSigner => self.uas_jar.as_deref(),
        }
    }

    /// Replace the configured path for a tool
    pub fn set(&mut self, tool: Tool, path: Option<PathBuf>) {
        let slot = match tool {
            Tool::Java => &mut self.java_exe,
            Tool::Apktool => &mut self.apktool_jar,
            Tool::Jadx => &mut self.jadx_exe,
            Tool::Adb => &mut self.adb_exe,
            Tool::UberApkSigner => &mut self.uas_jar,
        };
        *slot = path;
    }
}

/// Signing defaults used by the sign command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Keystore file; debug signing when unset
    pub keystore: Option<PathBuf>,
    pub keystore_password: String,
    pub alias: String,
    pub alias_password: String,
    /// Run zipalign while signing
    pub zipalign: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keystore: None,
            keystore_password: String::new(),
            alias: String::new(),
            alias_password: String::new(),
            zipalign: true,
        }
    }
}

impl SigningConfig {
    /// Whether a complete keystore configuration is present
    pub fn has_keystore(&self) -> bool {
        self.keystore.is_some() && !self.alias.is_empty()
    }
}

/// Appearance preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    pub dark_theme: bool,
    pub editor_font: String,
    pub editor_font_size: u32,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            dark_theme: true,
            editor_font: "Courier New".to_string(),
            editor_font_size: 12,
        }
    }
}

/// State restored on the next start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Last opened project folder
    pub project: Option<PathBuf>,
    /// Documents open when the session ended
    pub open_files: Vec<PathBuf>,
    pub window_geometry: Option<String>,
    pub dock_state: Option<String>,
    /// Recent projects, most recent first
    pub recent_projects: Vec<PathBuf>,
    /// Maximum recent projects to store
    pub max_recent_projects: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project: None,
            open_files: Vec::new(),
            window_geometry: None,
            dock_state: None,
            recent_projects: Vec::new(),
            max_recent_projects: 10,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// Maximum java heap in megabytes for jar tools
    pub java_heap_mb: u32,
    /// Build with aapt2 (otherwise `--use-aapt1`)
    pub use_aapt2: bool,
    /// Tool locations
    pub tools: ToolPaths,
    /// Signing defaults
    pub signing: SigningConfig,
    /// Appearance preferences
    pub appearance: AppearanceConfig,
    /// Session state
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            java_heap_mb: 256,
            use_aapt2: true,
            tools: ToolPaths::default(),
            signing: SigningConfig::default(),
            appearance: AppearanceConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "apkshell", "APK Shell")
    }

    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Directory downloaded tools are installed into
    pub fn tools_dir() -> PathBuf {
        Self::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".apkshell")))
            .unwrap_or_else(std::env::temp_dir)
            .join("tools")
    }

    /// Load configuration from a file, writing defaults when it is missing
    pub async fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {:?}", path);
            let contents = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            info!("Config file not found, using defaults");
            let config = AppConfig::default();
            config.save_to(path).await?;
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Add a recent project
    pub fn add_recent_project(&mut self, path: PathBuf) {
        let session = &mut self.session;
        session.recent_projects.retain(|p| p != &path);
        session.recent_projects.insert(0, path.clone());
        session.recent_projects.truncate(session.max_recent_projects);
        session.project = Some(path);
    }
}

/// Shared, explicitly committed configuration
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<AppConfig>>,
    path: Option<PathBuf>,
    event_bus: Option<Arc<EventBus>>,
}

impl ConfigStore {
    /// Store backed by a file
    pub fn new(config: AppConfig, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(path),
            event_bus: None,
        }
    }

    /// Store that is never written to disk
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
            event_bus: None,
        }
    }

    /// Open the store at `path`, creating it with defaults when missing
    pub async fn open(path: PathBuf) -> Result<Self> {
        let config = AppConfig::load_from(&path).await?;
        Ok(Self::new(config, path))
    }

    /// Open the store at the platform configuration location
    pub async fn open_default() -> Result<Self> {
        let path = AppConfig::config_file()
            .ok_or_else(|| ShellError::Config("Cannot determine config path".into()))?;
        Self::open(path).await
    }

    /// Announce commits on an event bus
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> AppConfig {
        self.inner.read().clone()
    }

    /// Configured path of a tool
    pub fn tool_path(&self, tool: Tool) -> Option<PathBuf> {
        self.inner.read().tools.get(tool).map(Path::to_path_buf)
    }

    /// Apply an update and persist it
    pub async fn commit<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let snapshot = {
            let mut config = self.inner.write();
            update(&mut config);
            config.clone()
        };

        if let Some(path) = &self.path {
            snapshot.save_to(path).await?;
        }
        if let Some(bus) = &self.event_bus {
            bus.emit(Event::ConfigChanged);
        }
        Ok(())
    }

    /// Record the path of a tool
    pub async fn commit_tool_path(&self, tool: Tool, path: PathBuf) -> Result<()> {
        info!("Recording {} at {:?}", tool, path);
        self.commit(|config| config.tools.set(tool, Some(path))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.java_heap_mb, 256);
        assert!(config.use_aapt2);
        assert!(config.signing.zipalign);
        assert!(config.tools.get(Tool::Java).is_none());
    }

    #[test]
    fn test_recent_projects() {
        let mut config = AppConfig::default();
        config.session.max_recent_projects = 3;

        config.add_recent_project(PathBuf::from("/project1"));
        config.add_recent_project(PathBuf::from("/project2"));
        config.add_recent_project(PathBuf::from("/project3"));
        config.add_recent_project(PathBuf::from("/project1"));
        config.add_recent_project(PathBuf::from("/project4"));

        assert_eq!(config.session.recent_projects.len(), 3);
        assert_eq!(config.session.recent_projects[0], PathBuf::from("/project4"));
        assert_eq!(config.session.recent_projects[1], PathBuf::from("/project1"));
        assert_eq!(config.session.project, Some(PathBuf::from("/project4")));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("java_heap_mb = 512\n[tools]\nadb_exe = \"/opt/adb\"\n").unwrap();
        assert_eq!(config.java_heap_mb, 512);
        assert!(config.use_aapt2);
        assert_eq!(config.tools.get(Tool::Adb), Some(Path::new("/opt/adb")));
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        let store = ConfigStore::open(path.clone()).await.unwrap().with_event_bus(Arc::clone(&bus));
        assert!(path.exists());

        store.commit_tool_path(Tool::Apktool, PathBuf::from("/tools/apktool.jar")).await.unwrap();
        assert_eq!(store.tool_path(Tool::Apktool), Some(PathBuf::from("/tools/apktool.jar")));
        assert!(matches!(sub.try_recv(), Ok(Event::ConfigChanged)));

        let reloaded = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(reloaded.tools.apktool_jar, Some(PathBuf::from("/tools/apktool.jar")));
        assert_eq!(reloaded, store.snapshot());
    }
}
