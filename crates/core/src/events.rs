//! Event System
//!
//! Two kinds of events live here: the broadcast [`Event`] bus used for
//! command tracing and configuration changes, and the per-worker
//! [`WorkerEvent`] protocol delivered over a worker's own channel.

use std::path::PathBuf;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::debug;

use crate::process::ProcessResult;
use crate::tool::Tool;

/// Events broadcast to every subscriber of the bus
#[derive(Debug, Clone)]
pub enum Event {
    /// An external command is about to be spawned
    CommandStarting { program: String, args: Vec<String> },
    /// An external command completed (or failed to start)
    CommandFinished(ProcessResult),
    /// Configuration was committed
    ConfigChanged,
    /// A downloaded tool was installed and recorded
    ToolInstalled { tool: Tool, path: PathBuf },
}

/// Signals emitted by a background worker, in order:
/// `Started`, any number of `Progress`, exactly one of `Succeeded` or
/// `Failed`, then `Finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent<T> {
    Started,
    Progress { percent: u8, message: String },
    Succeeded(T),
    Failed(String),
    Finished,
}

impl<T> WorkerEvent<T> {
    /// Whether this is the success or failure signal
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Succeeded(_) | WorkerEvent::Failed(_))
    }
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event currently queued
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<Event>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers, dropping those that went away
    pub fn emit(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();

        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.emit(Event::ConfigChanged);
        assert_eq!(delivered, 2);

        assert!(sub1.try_recv().is_ok());
        assert!(sub2.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.emit(Event::ConfigChanged), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.drain().len(), 1);
    }

    #[test]
    fn test_terminal_events() {
        assert!(WorkerEvent::Succeeded(()).is_terminal());
        assert!(WorkerEvent::<()>::Failed("x".into()).is_terminal());
        assert!(!WorkerEvent::<()>::Finished.is_terminal());
    }
}
