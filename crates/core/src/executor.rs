//! Worker Executor
//!
//! Runs background workers as tokio tasks and delivers their
//! [`WorkerEvent`]s over a dedicated unbounded channel. Each worker is
//! identified by a uuid and carries its own cancellation token.
//!
//! The executor guarantees the event order of every worker: `Started`
//! first, then progress, then one terminal signal, then `Finished`
//! exactly once. After [`WorkerHandle::cancel`] nothing but `Finished`
//! reaches the consumer.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::WorkerEvent;

/// Time a cancelled worker gets to clean up before its task is aborted
pub const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Handed to the worker body for reporting progress and observing cancellation
pub struct ProgressSink<T> {
    tx: mpsc::UnboundedSender<WorkerEvent<T>>,
    token: CancellationToken,
}

impl<T> Clone for ProgressSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> ProgressSink<T> {
    /// Report progress in percent; silent once cancelled
    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        if self.token.is_cancelled() {
            return;
        }
        let _ = self.tx.send(WorkerEvent::Progress {
            percent: percent.min(100),
            message: message.into(),
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the worker is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// The worker's cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// How a worker ended, as seen by its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(String),
    Cancelled,
}

impl<T> Outcome<T> {
    /// Convert into a `Result`, describing cancellation as an error message
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Failed(reason) => Err(reason),
            Outcome::Cancelled => Err("cancelled".to_string()),
        }
    }
}

/// Consumer side of a running worker
pub struct WorkerHandle<T> {
    id: Uuid,
    name: String,
    events: mpsc::UnboundedReceiver<WorkerEvent<T>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl<T> WorkerHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Abort the worker. Only `Finished` is delivered from now on.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            info!("Cancelling worker {} ({})", self.name, self.id);
        }
        self.cancelled = true;
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Next event, or `None` once the worker's channel is closed
    pub async fn next_event(&mut self) -> Option<WorkerEvent<T>> {
        loop {
            let event = self.events.recv().await?;
            if self.cancelled && !matches!(event, WorkerEvent::Finished) {
                continue;
            }
            return Some(event);
        }
    }

    /// Wait for the worker's task to exit
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Worker {} task ended abnormally: {}", self.name, e);
            }
        }
    }

    /// Consume all events, reporting progress, and return the outcome
    pub async fn wait_with<F>(mut self, mut on_progress: F) -> Outcome<T>
    where
        F: FnMut(u8, &str),
    {
        let mut outcome = None;
        while let Some(event) = self.next_event().await {
            match event {
                WorkerEvent::Started => {}
                WorkerEvent::Progress { percent, message } => on_progress(percent, &message),
                WorkerEvent::Succeeded(value) => outcome = Some(Outcome::Succeeded(value)),
                WorkerEvent::Failed(reason) => outcome = Some(Outcome::Failed(reason)),
                WorkerEvent::Finished => break,
            }
        }
        self.join().await;

        match outcome {
            Some(outcome) if !self.cancelled => outcome,
            _ if self.cancelled => Outcome::Cancelled,
            _ => Outcome::Failed(format!("worker {} ended without a result", self.name)),
        }
    }

    /// Consume all events and return the outcome
    pub async fn wait(self) -> Outcome<T> {
        self.wait_with(|_, _| {}).await
    }
}

/// Spawn a worker body on the tokio runtime.
///
/// The body receives a [`ProgressSink`]; its `Ok` value becomes
/// `Succeeded`, its `Err` becomes `Failed` with the error's display text.
/// A panicking body is reported as `Failed("worker panicked")`.
pub fn spawn_worker<T, E, F, Fut>(name: impl Into<String>, work: F) -> WorkerHandle<T>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: FnOnce(ProgressSink<T>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let (tx, events) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let id = Uuid::new_v4();
    let name = name.into();

    let sink = ProgressSink {
        tx: tx.clone(),
        token: token.clone(),
    };
    let task_token = token.clone();
    let task_name = name.clone();

    let task = tokio::spawn(async move {
        debug!("Worker {} ({}) started", task_name, id);
        let _ = tx.send(WorkerEvent::Started);

        let mut body = tokio::spawn(work(sink));
        let joined = tokio::select! {
            joined = &mut body => Some(joined),
            _ = task_token.cancelled() => None,
        };

        let joined = match joined {
            Some(joined) => Some(joined),
            None => match tokio::time::timeout(CANCEL_GRACE, &mut body).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    body.abort();
                    None
                }
            },
        };

        if !task_token.is_cancelled() {
            let terminal = match joined {
                Some(Ok(Ok(value))) => WorkerEvent::Succeeded(value),
                Some(Ok(Err(e))) => WorkerEvent::Failed(e.to_string()),
                Some(Err(e)) if e.is_panic() => WorkerEvent::Failed("worker panicked".to_string()),
                Some(Err(e)) => WorkerEvent::Failed(e.to_string()),
                None => WorkerEvent::Failed("worker did not finish".to_string()),
            };
            let _ = tx.send(terminal);
        }

        debug!("Worker {} ({}) finished", task_name, id);
        let _ = tx.send(WorkerEvent::Finished);
    });

    WorkerHandle {
        id,
        name,
        events,
        token,
        task: Some(task),
        cancelled: false,
    }
}

/// Result of running workers one after another
#[derive(Debug)]
pub struct SequenceReport<T> {
    /// Payloads of the workers that succeeded, in order
    pub completed: Vec<T>,
    /// Index and reason of the worker that failed, if any
    pub failure: Option<(usize, String)>,
    /// Whether the run was aborted
    pub cancelled: bool,
}

impl<T> SequenceReport<T> {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

enum Step<T> {
    Event(Option<WorkerEvent<T>>),
    Cancel,
}

/// Run one worker per item, strictly in sequence.
///
/// The worker for item N+1 is only created after item N's terminal event
/// has been observed and its task joined. The first failure stops the run.
/// Cancelling `cancel` aborts the current worker and skips the rest.
pub async fn run_sequentially<I, T, S, O>(
    items: &[I],
    cancel: &CancellationToken,
    mut spawn: S,
    mut observe: O,
) -> SequenceReport<T>
where
    S: FnMut(usize, &I) -> WorkerHandle<T>,
    O: FnMut(usize, &WorkerEvent<T>),
{
    let mut report = SequenceReport {
        completed: Vec::new(),
        failure: None,
        cancelled: false,
    };

    for (index, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let mut handle = spawn(index, item);
        let mut terminal = None;

        loop {
            let watching = !handle.is_cancelled();
            let step = tokio::select! {
                event = handle.next_event() => Step::Event(event),
                _ = cancel.cancelled(), if watching => Step::Cancel,
            };

            match step {
                Step::Cancel => handle.cancel(),
                Step::Event(None) => break,
                Step::Event(Some(event)) => {
                    observe(index, &event);
                    match event {
                        WorkerEvent::Succeeded(value) => terminal = Some(Ok(value)),
                        WorkerEvent::Failed(reason) => terminal = Some(Err(reason)),
                        WorkerEvent::Finished => break,
                        _ => {}
                    }
                }
            }
        }
        handle.join().await;

        if handle.is_cancelled() {
            report.cancelled = true;
            break;
        }
        match terminal {
            Some(Ok(value)) => report.completed.push(value),
            Some(Err(reason)) => {
                report.failure = Some((index, reason));
                break;
            }
            None => {
                report.failure = Some((index, format!("worker {} ended without a result", handle.name())));
                break;
            }
        }
    }

    report
}
