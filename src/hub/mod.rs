//! Push notification hub
//!
//! Keeps the set of live push subscribers and fans every [`HubEvent`] out to
//! all of them. Registration happens on the async request side while workers
//! broadcast from their own OS threads, so every method is synchronous and
//! never blocks on a subscriber.

mod events;

pub use events::{HubEvent, ProgressUpdate};

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::observability::Metrics;

pub type SubscriberId = Uuid;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("subscriber connection closed")]
    Closed,

    #[error("subscriber write failed: {0}")]
    WriteFailed(String),
}

/// One push connection.
pub trait Subscriber: Send + Sync {
    /// Hand a serialized event to the connection without blocking.
    fn deliver(&self, payload: &str) -> Result<(), HubError>;
}

/// WebSocket connections are fed through an unbounded channel drained by a
/// per-connection writer task.
impl Subscriber for mpsc::UnboundedSender<String> {
    fn deliver(&self, payload: &str) -> Result<(), HubError> {
        self.send(payload.to_owned()).map_err(|_| HubError::Closed)
    }
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct NotificationHub {
    subscribers: DashMap<SubscriberId, Arc<dyn Subscriber>>,
    metrics: Arc<Metrics>,
}

impl NotificationHub {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: DashMap::new(),
            metrics,
        }
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.insert(id, subscriber);
        debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber registered");
        id
    }

    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber unregistered");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every registered subscriber.
    ///
    /// A subscriber whose write fails is unregistered; the others still
    /// receive the event. Never fails.
    pub fn broadcast(&self, event: impl Into<HubEvent>) -> BroadcastReport {
        let event = event.into();
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize hub event");
                return BroadcastReport::default();
            }
        };

        // Deliver from a snapshot so no shard lock is held across writes
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, subscriber) in targets {
            match subscriber.deliver(&payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(subscriber = %id, error = %e, "Dropping subscriber after failed write");
                    if self.subscribers.remove(&id).is_some() {
                        self.metrics.subscriber_dropped();
                    }
                    report.dropped += 1;
                }
            }
        }

        self.metrics.broadcast_delivered(report.delivered);
        report
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(Arc::new(Metrics::new()))
    }
}
