//! CLI commands for APK Shell
//!
//! Each command builds a worker from its arguments, runs it in the
//! background and follows its events with a progress bar. Ctrl-C cancels
//! the running worker. External command lines and their exit codes are
//! logged at debug level (`--verbose`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use apkshell_android_toolchain::{AcquisitionQueue, ResolveVersions, ToolContext};
use apkshell_apk_engine::{
    Decompile, DecompileOptions, GenerateKeystore, KeystoreCredentials, KeystoreRequest, Recompile,
    RecompileOptions, SignApk, SignOptions,
};
use apkshell_core::{
    ConfigStore, Event, EventBus, EventSubscription, OpenDocuments, Tool, WorkerEvent, WorkerHandle,
};
use apkshell_device_bridge::{InstallApk, ListDevices};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::cli::{Cli, Commands, ConfigCommands, SessionCommands};

/// Shared state of one CLI invocation
pub struct App {
    store: ConfigStore,
    bus: Arc<EventBus>,
    commands: EventSubscription,
}

impl App {
    /// Open the configuration at `path`, or the platform default
    pub async fn open(path: Option<PathBuf>) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let commands = bus.subscribe();
        let store = match path {
            Some(path) => ConfigStore::open(path).await,
            None => ConfigStore::open_default().await,
        }
        .context("Failed to load configuration")?
        .with_event_bus(Arc::clone(&bus));
        Ok(Self { store, bus, commands })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    async fn context(&self) -> ToolContext {
        ToolContext::from_store(&self.store, Some(Arc::clone(&self.bus))).await
    }

    async fn follow<T: Send + 'static>(&self, handle: WorkerHandle<T>, label: &str) -> Result<T> {
        drive(handle, label, Some(&self.commands)).await
    }

    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Versions { json } => self.versions(json).await,
            Commands::Locate { tool } => self.locate(tool).await,
            Commands::Download { tools, missing } => self.download(tools, missing).await,
            Commands::Devices => self.devices().await,
            Commands::Install { apk, device } => {
                let apk = self.follow(InstallApk::new(self.context().await, apk, device).spawn(), "Install").await?;
                println!("Installed {}", apk.display());
                Ok(())
            }
            Commands::Decompile {
                apk,
                output,
                no_smali,
                no_resources,
                java,
                framework_tag,
                extra,
            } => {
                let folder = output.unwrap_or_else(|| default_output_folder(&apk));
                let mut options = DecompileOptions::new(apk, folder);
                options.smali = !no_smali;
                options.resources = !no_resources;
                options.java = java;
                options.framework_tag = framework_tag;
                options.extra_args = extra;
                self.decompile(options).await
            }
            Commands::Recompile { folder, aapt1, extra } => {
                let context = self.context().await;
                let mut options = RecompileOptions::new(folder, context.config().use_aapt2 && !aapt1);
                options.extra_args = extra;
                let output = self.follow(Recompile::new(context, options).spawn(), "Recompile").await?;
                match output.apk {
                    Some(apk) => println!("Built {}", apk.display()),
                    None => println!("Rebuilt {} (no APK found in dist/)", output.folder.display()),
                }
                Ok(())
            }
            Commands::Sign {
                apk,
                keystore,
                ks_pass,
                alias,
                alias_pass,
                no_zipalign,
            } => {
                let context = self.context().await;
                let mut options = SignOptions::from_config(apk, &context.config().signing);
                if let Some(path) = keystore {
                    let password = ks_pass.unwrap_or_default();
                    options.keystore = Some(KeystoreCredentials {
                        path,
                        alias_password: alias_pass.unwrap_or_else(|| password.clone()),
                        password,
                        alias: alias.unwrap_or_default(),
                    });
                }
                if no_zipalign {
                    options.zipalign = false;
                }
                let apk = self.follow(SignApk::new(context, options).spawn(), "Sign").await?;
                println!("Signed {}", apk.display());
                Ok(())
            }
            Commands::Keystore {
                path,
                password,
                alias,
                alias_password,
                validity,
                key_alg,
                key_size,
                save,
            } => {
                let credentials = KeystoreCredentials {
                    path,
                    alias_password: alias_password.unwrap_or_else(|| password.clone()),
                    password,
                    alias,
                };
                let mut request = KeystoreRequest::new(credentials);
                request.validity_days = validity;
                request.key_algorithm = key_alg;
                request.key_size = key_size;
                self.keystore(request, save).await
            }
            Commands::Config { action } => self.config(action).await,
            Commands::Session { action } => self.session(action).await,
        }
    }

    async fn versions(&self, json: bool) -> Result<()> {
        let report = self.follow(ResolveVersions::new(self.context().await).spawn(), "Versions").await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report.by_key())?);
        } else {
            print!("{}", report);
            let missing = report.missing();
            if !missing.is_empty() {
                println!("\nRun `apkshell download --missing` to fetch the missing tools.");
            }
        }
        Ok(())
    }

    async fn locate(&self, tool: Tool) -> Result<()> {
        let context = self.context().await;
        let path = context.require(tool).await?;
        println!("{}", path.display());
        if tool == Tool::Java {
            match context.locator().keytool().await {
                Some(keytool) => println!("{}", keytool.display()),
                None => println!("keytool not found next to java"),
            }
        }
        Ok(())
    }

    async fn download(&self, tools: Vec<Tool>, missing: bool) -> Result<()> {
        let queue = if missing {
            let report = self.follow(ResolveVersions::new(self.context().await).spawn(), "Versions").await?;
            AcquisitionQueue::for_missing(self.store.clone(), &report)
        } else if tools.is_empty() {
            bail!("Name the tools to download, or pass --missing");
        } else {
            AcquisitionQueue::new(self.store.clone(), tools)
        };

        if queue.is_empty() {
            println!("All tools are available.");
            return Ok(());
        }

        let events = self.bus.subscribe();
        let cancel = queue.cancel_token();
        let bar = progress_bar("Download");
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let report = queue
            .with_event_bus(Arc::clone(&self.bus))
            .run(|p| {
                log_commands(&self.commands);
                bar.set_position(p.overall_percent as u64);
                bar.set_message(format!("[{}/{}] {}: {}", p.index + 1, p.count, p.tool, p.message));
            })
            .await;
        ctrl_c.abort();
        log_commands(&self.commands);
        bar.finish_and_clear();

        for event in events.drain() {
            if let Event::ToolInstalled { tool, path } = event {
                println!("{} installed at {}", tool, path.display());
            }
        }

        if let Some((_, reason)) = report.failure {
            bail!("Download failed: {}", reason);
        }
        if report.cancelled {
            bail!("Download cancelled");
        }
        Ok(())
    }

    async fn devices(&self) -> Result<()> {
        let devices = self.follow(ListDevices::new(self.context().await).spawn(), "Devices").await?;
        if devices.is_empty() {
            println!("No devices attached.");
        }
        for device in devices {
            println!(
                "{:<24} {:<14} {:<24} Android {} (API {})",
                device.serial,
                device.status,
                device.model.as_deref().unwrap_or("-"),
                device.android_version.as_deref().unwrap_or("?"),
                device.sdk_version.as_deref().unwrap_or("?"),
            );
        }
        Ok(())
    }

    async fn decompile(&self, options: DecompileOptions) -> Result<()> {
        let output = self.follow(Decompile::new(self.context().await, options).spawn(), "Decompile").await?;
        self.store
            .commit(|config| config.add_recent_project(output.folder.clone()))
            .await?;
        println!("Decompiled {} into {}", output.apk.display(), output.folder.display());
        Ok(())
    }

    async fn keystore(&self, request: KeystoreRequest, save: bool) -> Result<()> {
        let credentials = request.credentials.clone();
        let path = self.follow(GenerateKeystore::new(self.context().await, request).spawn(), "Keystore").await?;
        if save {
            self.store
                .commit(|config| {
                    config.signing.keystore = Some(credentials.path);
                    config.signing.keystore_password = credentials.password;
                    config.signing.alias = credentials.alias;
                    config.signing.alias_password = credentials.alias_password;
                })
                .await?;
            info!("Keystore saved as signing default");
        }
        println!("Generated {}", path.display());
        Ok(())
    }

    async fn config(&self, action: ConfigCommands) -> Result<()> {
        match action {
            ConfigCommands::Show => {
                if let Some(path) = self.store.path() {
                    println!("# {}", path.display());
                }
                print!("{}", toml::to_string_pretty(&self.store.snapshot())?);
            }
            ConfigCommands::SetTool { tool, path } => {
                if let Some(path) = &path {
                    if !path.exists() {
                        bail!("{} does not exist", path.display());
                    }
                }
                self.store.commit(|config| config.tools.set(tool, path)).await?;
                println!("{} = {:?}", tool.config_key(), self.store.tool_path(tool));
            }
            ConfigCommands::SetHeap { megabytes } => {
                if megabytes < 64 {
                    bail!("Java heap must be at least 64 MB");
                }
                self.store.commit(|config| config.java_heap_mb = megabytes).await?;
            }
        }
        Ok(())
    }

    async fn session(&self, action: SessionCommands) -> Result<()> {
        let session = self.store.snapshot().session;
        let mut documents = OpenDocuments::restore(&session.open_files).await;
        match action {
            SessionCommands::Show => {
                let project = session.project.as_deref().map(|p| p.display().to_string());
                println!("Project: {}", project.as_deref().unwrap_or("-"));
                for project in &session.recent_projects {
                    println!("  recent: {}", project.display());
                }
                for path in documents.paths() {
                    println!("  open:   {}", path.display());
                }
                return Ok(());
            }
            SessionCommands::Open { files } => {
                for file in files {
                    let file = absolute(&file)?;
                    let document = documents
                        .open(file.clone())
                        .await
                        .with_context(|| format!("Cannot open {}", file.display()))?;
                    debug!("Opened {:?} as {:?}", file, document.kind());
                }
            }
            SessionCommands::Close { files } => {
                for file in files {
                    if documents.close(&absolute(&file)?).is_none() {
                        println!("{} was not open", file.display());
                    }
                }
            }
        }
        let open_files = documents.paths();
        self.store.commit(|config| config.session.open_files = open_files).await?;
        Ok(())
    }
}

/// Parse-free entry point used by `main`
pub async fn run(cli: Cli) -> Result<()> {
    let app = App::open(cli.config).await?;
    app.execute(cli.command).await
}

/// `app.apk` decompiles into `app` next to it
pub fn default_output_folder(apk: &Path) -> PathBuf {
    apk.with_extension("")
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn progress_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{prefix:>10} [{bar:30}] {pos:>3}% {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix(label.to_string());
    bar
}

/// One log line for a command event on the bus
fn describe_command_event(event: &Event) -> Option<String> {
    match event {
        Event::CommandStarting { program, args } if args.is_empty() => Some(format!("$ {}", program)),
        Event::CommandStarting { program, args } => Some(format!("$ {} {}", program, args.join(" "))),
        Event::CommandFinished(result) => Some(format!("exit code {}", result.code)),
        _ => None,
    }
}

fn log_commands(commands: &EventSubscription) {
    for event in commands.drain() {
        if let Some(line) = describe_command_event(&event) {
            debug!("{}", line);
        }
    }
}

enum Step<T> {
    Event(Option<WorkerEvent<T>>),
    Interrupt,
}

/// Follow a worker to its end, cancelling it on Ctrl-C
pub async fn drive<T: Send + 'static>(
    mut handle: WorkerHandle<T>,
    label: &str,
    commands: Option<&EventSubscription>,
) -> Result<T> {
    let bar = progress_bar(label);
    let mut outcome = None;

    loop {
        let watching = !handle.is_cancelled();
        let step = tokio::select! {
            event = handle.next_event() => Step::Event(event),
            _ = tokio::signal::ctrl_c(), if watching => Step::Interrupt,
        };
        if let Some(commands) = commands {
            log_commands(commands);
        }
        match step {
            Step::Interrupt => {
                bar.set_message("Cancelling...");
                handle.cancel();
            }
            Step::Event(Some(WorkerEvent::Progress { percent, message })) => {
                bar.set_position(percent as u64);
                bar.set_message(message);
            }
            Step::Event(Some(WorkerEvent::Succeeded(value))) => outcome = Some(Ok(value)),
            Step::Event(Some(WorkerEvent::Failed(reason))) => outcome = Some(Err(reason)),
            Step::Event(Some(WorkerEvent::Started)) => {}
            Step::Event(Some(WorkerEvent::Finished)) | Step::Event(None) => break,
        }
    }
    handle.join().await;
    if let Some(commands) = commands {
        log_commands(commands);
    }
    bar.finish_and_clear();

    match outcome {
        Some(Ok(value)) => Ok(value),
        Some(Err(reason)) => Err(anyhow!(reason).context(format!("{} failed", label))),
        None => bail!("{} cancelled", label),
    }
}

#[cfg(test)]
mod tests {
    use apkshell_core::spawn_worker;

    use super::*;

    #[test]
    fn test_default_output_folder() {
        assert_eq!(default_output_folder(Path::new("/apks/app.apk")), PathBuf::from("/apks/app"));
        assert_eq!(default_output_folder(Path::new("base")), PathBuf::from("base"));
    }

    #[tokio::test]
    async fn test_drive_returns_payload_and_failure() {
        let value = drive(spawn_worker("ok", |_sink| async { Ok::<_, String>(7) }), "Ok", None)
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = drive(spawn_worker("bad", |_sink| async { Err::<u8, _>("boom".to_string()) }), "Bad", None)
            .await
            .unwrap_err();
        assert_eq!(format!("{:#}", err), "Bad failed: boom");
    }

    #[test]
    fn test_describe_command_event() {
        let starting = Event::CommandStarting {
            program: "/opt/jdk/bin/java".into(),
            args: vec!["-jar".into(), "apktool.jar".into(), "d".into()],
        };
        assert_eq!(
            describe_command_event(&starting).as_deref(),
            Some("$ /opt/jdk/bin/java -jar apktool.jar d")
        );

        let finished = Event::CommandFinished(apkshell_core::ProcessResult::from_streams(3, b"", b"oops"));
        assert_eq!(describe_command_event(&finished).as_deref(), Some("exit code 3"));
        assert_eq!(describe_command_event(&Event::ConfigChanged), None);
    }

    #[tokio::test]
    async fn test_drive_consumes_command_events() {
        let bus = Arc::new(EventBus::new());
        let commands = bus.subscribe();
        let worker_bus = Arc::clone(&bus);

        let handle = spawn_worker("emit", move |_sink| async move {
            worker_bus.emit(Event::CommandStarting { program: "adb".into(), args: vec!["devices".into()] });
            worker_bus.emit(Event::CommandFinished(apkshell_core::ProcessResult::default()));
            Ok::<_, String>(())
        });
        drive(handle, "Emit", Some(&commands)).await.unwrap();
        assert!(commands.drain().is_empty());
    }

    #[tokio::test]
    async fn test_config_and_session_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let app = App::open(Some(config_path.clone())).await.unwrap();
        assert!(config_path.exists());

        let jar = dir.path().join("apktool.jar");
        std::fs::write(&jar, b"jar").unwrap();
        app.execute(Commands::Config {
            action: ConfigCommands::SetTool { tool: Tool::Apktool, path: Some(jar.clone()) },
        })
        .await
        .unwrap();
        app.execute(Commands::Config { action: ConfigCommands::SetHeap { megabytes: 1024 } })
            .await
            .unwrap();
        assert!(app
            .execute(Commands::Config { action: ConfigCommands::SetHeap { megabytes: 8 } })
            .await
            .is_err());

        let smali = dir.path().join("Main.smali");
        std::fs::write(&smali, ".class").unwrap();
        app.execute(Commands::Session { action: SessionCommands::Open { files: vec![smali.clone()] } })
            .await
            .unwrap();

        let reopened = App::open(Some(config_path)).await.unwrap();
        let config = reopened.store().snapshot();
        assert_eq!(config.tools.apktool_jar, Some(jar));
        assert_eq!(config.java_heap_mb, 1024);
        assert_eq!(config.session.open_files, vec![smali]);
    }
}
