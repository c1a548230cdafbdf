//! Update notifications: broadcast events and the host listener

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

use crate::engine::UpdateSummary;
use crate::errors::RunnerError;

/// Something that happened to a runner's engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    UpdateCompleted { ticket: u64, summary: UpdateSummary },
    UpdateFailed { ticket: u64, error: RunnerError },
    LibrariesImported { names: Vec<String> },
    Reinitialized,
    /// The host switched the runner to another of its graphs.
    GraphActivated { graph_id: u32 },
}

/// Host sink for update outcomes.
///
/// The runner only holds a weak reference; dropping the listener is
/// enough to stop notifications.
pub trait UpdateListener: Send + Sync {
    fn post_graph_update(&self, summary: &UpdateSummary);

    fn update_failed(&self, _error: &RunnerError) {}

    /// The host activated the graph (document) `graph_id`.
    fn graph_activated(&self, _graph_id: u32) {}
}

#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<flume::Sender<RunnerEvent>>>,
    listener: RwLock<Option<Weak<dyn UpdateListener>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> flume::Receiver<RunnerEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn set_listener(&self, listener: &Arc<dyn UpdateListener>) {
        self.set_weak_listener(Arc::downgrade(listener));
    }

    pub fn set_weak_listener(&self, listener: Weak<dyn UpdateListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    /// Deliver to every live subscriber, forgetting the ones that hung up.
    pub fn publish(&self, event: RunnerEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn update_completed(&self, ticket: u64, summary: &UpdateSummary) {
        if let Some(listener) = self.listener() {
            listener.post_graph_update(summary);
        }
        self.publish(RunnerEvent::UpdateCompleted {
            ticket,
            summary: summary.clone(),
        });
    }

    pub fn update_failed(&self, ticket: u64, error: &RunnerError) {
        if let Some(listener) = self.listener() {
            listener.update_failed(error);
        }
        self.publish(RunnerEvent::UpdateFailed {
            ticket,
            error: error.clone(),
        });
    }

    pub fn graph_activated(&self, graph_id: u32) {
        if let Some(listener) = self.listener() {
            listener.graph_activated(graph_id);
        }
        self.publish(RunnerEvent::GraphActivated { graph_id });
    }

    fn listener(&self) -> Option<Arc<dyn UpdateListener>> {
        self.listener.read().as_ref().and_then(Weak::upgrade)
    }
}
