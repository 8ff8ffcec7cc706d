//! APK Shell Core - Worker executor and shared types
//!
//! This crate provides the shared foundation of APK Shell: the worker
//! event protocol and executor, the configuration store, tool identity,
//! process results and the broadcast event bus.

pub mod config;
pub mod documents;
pub mod error;
pub mod events;
pub mod executor;
pub mod process;
pub mod tool;

pub use config::{AppConfig, ConfigStore, SigningConfig, ToolPaths};
pub use documents::{Document, DocumentKind, OpenDocuments};
pub use error::{ErrorCategory, Result, ShellError};
pub use events::{Event, EventBus, EventSubscription, WorkerEvent};
pub use executor::{run_sequentially, spawn_worker, Outcome, ProgressSink, SequenceReport, WorkerHandle};
pub use process::ProcessResult;
pub use tool::Tool;

/// APK Shell version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "APK Shell";
