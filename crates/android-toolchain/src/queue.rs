//! Acquisition Queue
//!
//! Downloads several tools strictly one after another and folds their
//! progress into a single overall percentage.

use std::path::PathBuf;
use std::sync::Arc;

use apkshell_core::{
    run_sequentially, spawn_worker, ConfigStore, EventBus, ProgressSink, SequenceReport, Tool, WorkerEvent,
    WorkerHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::download::{DownloadError, DownloadWorker};
use crate::versions::VersionReport;

/// Overall progress across `count` sequential jobs
pub fn overall_percent(index: usize, count: usize, percent: u8) -> u8 {
    if count == 0 {
        return 100;
    }
    ((index * 100 + percent.min(100) as usize) / count) as u8
}

/// One progress update of the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProgress {
    pub tool: Tool,
    /// Position of the tool in the queue
    pub index: usize,
    pub count: usize,
    /// Progress of the current tool
    pub tool_percent: u8,
    /// Progress across the whole queue
    pub overall_percent: u8,
    pub message: String,
}

/// Sequential download of missing tools
pub struct AcquisitionQueue {
    store: ConfigStore,
    tools: Vec<Tool>,
    cancel: CancellationToken,
    event_bus: Option<Arc<EventBus>>,
}

impl AcquisitionQueue {
    pub fn new(store: ConfigStore, tools: Vec<Tool>) -> Self {
        Self {
            store,
            tools,
            cancel: CancellationToken::new(),
            event_bus: None,
        }
    }

    /// Queue every tool the report has no version for
    pub fn for_missing(store: ConfigStore, report: &VersionReport) -> Self {
        Self::new(store, report.missing())
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Token that aborts the current download and skips the rest
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download the queued tools with default workers
    pub async fn run<P>(self, on_progress: P) -> SequenceReport<PathBuf>
    where
        P: FnMut(QueueProgress),
    {
        let store = self.store.clone();
        let bus = self.event_bus.clone();
        self.run_with(
            move |tool| {
                let worker = DownloadWorker::new(tool, store.clone()).map(|worker| match &bus {
                    Some(bus) => worker.with_event_bus(Arc::clone(bus)),
                    None => worker,
                });
                match worker {
                    Ok(worker) => worker.spawn(),
                    Err(e) => failed_worker(tool, e),
                }
            },
            on_progress,
        )
        .await
    }

    /// Run the queue with a custom worker factory
    pub async fn run_with<S, P>(self, mut spawn: S, mut on_progress: P) -> SequenceReport<PathBuf>
    where
        S: FnMut(Tool) -> WorkerHandle<PathBuf>,
        P: FnMut(QueueProgress),
    {
        let count = self.tools.len();
        info!("Acquiring {} tool(s): {:?}", count, self.tools);

        let tools = self.tools.clone();
        let report = run_sequentially(
            &tools,
            &self.cancel,
            |_, tool| spawn(*tool),
            |index, event| {
                if let WorkerEvent::Progress { percent, message } = event {
                    on_progress(QueueProgress {
                        tool: tools[index],
                        index,
                        count,
                        tool_percent: *percent,
                        overall_percent: overall_percent(index, count, *percent),
                        message: message.clone(),
                    });
                }
            },
        )
        .await;

        if let Some((index, reason)) = &report.failure {
            warn!("Acquisition stopped at {}: {}", tools[*index], reason);
        } else if report.cancelled {
            info!("Acquisition cancelled");
        }
        report
    }
}

fn failed_worker(tool: Tool, error: DownloadError) -> WorkerHandle<PathBuf> {
    spawn_worker(format!("download-{}", tool.probe_key()), move |_sink: ProgressSink<PathBuf>| async move {
        Err::<PathBuf, _>(error)
    })
}
