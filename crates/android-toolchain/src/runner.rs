//! Command Runner
//!
//! Runs one external program to completion, capturing stdout and stderr
//! separately. Failures never surface as errors: a program that cannot
//! start yields code `-1`, a program that overruns its timeout is killed
//! and yields `-2`.
//!
//! The timeout is the only thing that kills a child. Dropping a pending
//! `run` (for instance when a worker is aborted) leaves the child running
//! to completion.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use apkshell_core::process::{EXIT_FAILED_TO_START, EXIT_SIGNALLED, EXIT_TIMED_OUT};
use apkshell_core::{Event, EventBus, ProcessResult};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::env::RuntimeEnv;
use crate::platform::Platform;

/// Default finish timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Finish timeout for long decompilations (jadx)
pub const EXTENDED_TIMEOUT_SECS: u64 = 1800;

/// Finish timeout for device property queries
pub const PROPERTY_TIMEOUT_SECS: u64 = 5;

/// Finish timeout for keystore generation
pub const KEYTOOL_TIMEOUT_SECS: u64 = 60;

/// How long captured streams may keep draining after a kill
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Spawns external programs
#[derive(Clone)]
pub struct CommandRunner {
    env: Option<RuntimeEnv>,
    event_bus: Option<Arc<EventBus>>,
    platform: Platform,
}

impl CommandRunner {
    /// Runner without a runtime environment
    pub fn new() -> Self {
        Self {
            env: None,
            event_bus: None,
            platform: Platform::current(),
        }
    }

    /// Export the runtime environment derived from a java executable
    pub fn with_java(mut self, java: &Path) -> Self {
        let env = RuntimeEnv::for_java(java);
        self.env = if env.is_empty() { None } else { Some(env) };
        self
    }

    /// Publish command start/finish events on a bus
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Same runner without the runtime environment, for `which`/`where`
    pub fn without_env(&self) -> Self {
        Self {
            env: None,
            ..self.clone()
        }
    }

    pub fn env(&self) -> Option<&RuntimeEnv> {
        self.env.as_ref()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn event_bus(&self) -> Option<&Arc<EventBus>> {
        self.event_bus.as_ref()
    }

    /// Run a program and wait up to `timeout_secs` for it to finish
    pub async fn run<I, S>(&self, program: impl AsRef<Path>, args: I, timeout_secs: u64) -> ProcessResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_in(program, args, timeout_secs, None).await
    }

    /// Run a program with an explicit working directory
    pub async fn run_in<I, S>(
        &self,
        program: impl AsRef<Path>,
        args: I,
        timeout_secs: u64,
        cwd: Option<&Path>,
    ) -> ProcessResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let args: Vec<String> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string_lossy().into_owned())
            .collect();

        if let Some(bus) = &self.event_bus {
            bus.emit(Event::CommandStarting {
                program: program.display().to_string(),
                args: args.clone(),
            });
        }
        debug!("Running {} {}", program.display(), args.join(" "));

        let (exe, argv, workdir) = self.invocation(program, &args, cwd);
        let mut command = Command::new(&exe);
        command
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }
        if let Some(env) = &self.env {
            env.apply(&mut command);
        }

        let result = match command.spawn() {
            Ok(child) => Self::collect(child, Duration::from_secs(timeout_secs)).await,
            Err(e) => {
                warn!("Failed to start {}: {}", program.display(), e);
                ProcessResult::failed_to_start()
            }
        };

        debug!(
            "{} exited with {} ({} stdout / {} stderr lines)",
            program.display(),
            result.code,
            result.output.len(),
            result.error.len()
        );
        if let Some(bus) = &self.event_bus {
            bus.emit(Event::CommandFinished(result.clone()));
        }
        result
    }

    /// Program, arguments and working directory actually spawned.
    /// Batch scripts on Windows go through `cmd.exe /c` from their own directory.
    fn invocation(&self, program: &Path, args: &[String], cwd: Option<&Path>) -> (PathBuf, Vec<String>, Option<PathBuf>) {
        let is_script = program
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("bat") || ext.eq_ignore_ascii_case("cmd"))
            .unwrap_or(false);

        if self.platform.is_windows() && is_script {
            let mut argv = vec!["/c".to_string(), program.display().to_string()];
            argv.extend(args.iter().cloned());
            let dir = cwd
                .map(Path::to_path_buf)
                .or_else(|| program.parent().map(Path::to_path_buf))
                .filter(|dir| !dir.as_os_str().is_empty());
            return (PathBuf::from("cmd.exe"), argv, dir);
        }

        (program.to_path_buf(), args.to_vec(), cwd.map(Path::to_path_buf))
    }

    async fn collect(mut child: Child, timeout: Duration) -> ProcessResult {
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let (code, killed) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code().unwrap_or(EXIT_SIGNALLED), false),
            Ok(Err(e)) => {
                warn!("Failed waiting for child: {}", e);
                (EXIT_FAILED_TO_START, false)
            }
            Err(_) => {
                warn!("Process exceeded {}s, killing it", timeout.as_secs());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill child: {}", e);
                }
                (EXIT_TIMED_OUT, true)
            }
        };

        let stdout = drain(stdout, killed).await;
        let stderr = drain(stderr, killed).await;
        ProcessResult::from_streams(code, &stdout, &stderr)
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reader<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut buf).await {
                debug!("Stream read ended early: {}", e);
            }
        }
        buf
    })
}

/// Collect a reader task; after a kill, grandchildren may hold the pipe open
async fn drain(mut task: JoinHandle<Vec<u8>>, killed: bool) -> Vec<u8> {
    if !killed {
        return task.await.unwrap_or_default();
    }
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            task.abort();
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let runner = CommandRunner::new();
        let result = runner
            .run("/definitely/not/a/real/program", ["--version"], DEFAULT_TIMEOUT_SECS)
            .await;
        assert_eq!(result.code, EXIT_FAILED_TO_START);
        assert!(result.output.is_empty());
        assert!(result.error.is_empty());
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        let runner = CommandRunner::new().with_event_bus(Arc::clone(&bus));

        runner.run("/no/such/tool", ["a", "b"], 5).await;

        let events = sub.drain();
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::CommandStarting { program, args } => {
                assert_eq!(program, "/no/such/tool");
                assert_eq!(args, &vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(&events[1], Event::CommandFinished(r) if r.code == EXIT_FAILED_TO_START));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_streams_separately() {
        let runner = CommandRunner::new();
        let result = runner
            .run("sh", ["-c", "echo out1; echo err1 >&2; echo; echo out2; exit 3"], 10)
            .await;
        assert_eq!(result.code, 3);
        assert_eq!(result.output, vec!["out1", "out2"]);
        assert_eq!(result.error, vec!["err1"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_does_not_block() {
        let runner = CommandRunner::new();
        let result = runner
            .run("sh", ["-c", "i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done"], 60)
            .await;
        assert!(result.success());
        assert_eq!(result.output.len(), 20000);
        assert_eq!(result.error.len(), 20000);
        assert_eq!(result.output.last().map(String::as_str), Some("line-19999"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let script = format!("sleep 3; touch '{}'", marker.display());

        let runner = CommandRunner::new();
        let started = std::time::Instant::now();
        let result = runner.run("sh", ["-c", script.as_str()], 1).await;
        assert_eq!(result.code, EXIT_TIMED_OUT);
        assert!(result.timed_out());
        assert!(started.elapsed() < Duration::from_secs(5));

        // The killed shell never reaches its last command
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aborted_worker_leaves_child_running() {
        use apkshell_core::{spawn_worker, ProgressSink, WorkerEvent};

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("installed");
        let script = format!("sleep 3; touch '{}'", marker.display());

        let mut handle = spawn_worker("installer", move |_sink: ProgressSink<ProcessResult>| async move {
            let result = CommandRunner::new().run("sh", ["-c", script.as_str()], 600).await;
            Ok::<_, String>(result)
        });
        assert_eq!(handle.next_event().await, Some(WorkerEvent::Started));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel();

        let mut rest = Vec::new();
        while let Some(event) = handle.next_event().await {
            rest.push(event);
        }
        assert_eq!(rest, vec![WorkerEvent::Finished]);
        handle.join().await;

        for _ in 0..60 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_java_env_exported() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("jdk").join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let runner = CommandRunner::new().with_java(&bin.join("java"));
        let result = runner.run("sh", ["-c", "echo $JAVA_HOME; echo $PATH"], 10).await;

        assert_eq!(result.output[0], dir.path().join("jdk").display().to_string());
        assert!(result.output[1].starts_with(&bin.display().to_string()));

        let plain = runner.without_env().run("sh", ["-c", "echo \"[$JAVA_HOME]\""], 10).await;
        assert_ne!(plain.output[0], format!("[{}]", dir.path().join("jdk").display()));
    }

    #[test]
    fn test_windows_script_invocation() {
        let runner = CommandRunner::new().with_platform(Platform::Windows);
        let (exe, argv, cwd) = runner.invocation(
            Path::new("C:/tools/jadx/bin/jadx.bat"),
            &["--version".to_string()],
            None,
        );
        assert_eq!(exe, PathBuf::from("cmd.exe"));
        assert_eq!(argv, vec!["/c", "C:/tools/jadx/bin/jadx.bat", "--version"]);
        assert_eq!(cwd, Some(PathBuf::from("C:/tools/jadx/bin")));

        let (exe, argv, cwd) = CommandRunner::new()
            .with_platform(Platform::Linux)
            .invocation(Path::new("/opt/jadx/bin/jadx"), &["-r".to_string()], None);
        assert_eq!(exe, PathBuf::from("/opt/jadx/bin/jadx"));
        assert_eq!(argv, vec!["-r"]);
        assert!(cwd.is_none());
    }
}
