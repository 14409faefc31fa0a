//! Per-batch fan-out of progress messages.
//!
//! Subscribers register a [`ProgressSink`] for one batch. Broadcasts reach
//! every sink registered at that moment; nothing is queued for sinks that
//! subscribe later.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{ProgressEvent, ProgressMessage};

/// Errors returned by a sink when a message cannot be delivered.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The receiving side is gone; the sink will be pruned.
    #[error("Sink closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// A transport that progress messages can be pushed into.
///
/// Implementations must not block; a WebSocket or SSE bridge would forward
/// into its own write queue.
pub trait ProgressSink: Send + Sync {
    fn send(&self, message: &ProgressMessage) -> Result<(), SinkError>;
}

/// Sink backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressMessage>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn send(&self, message: &ProgressMessage) -> Result<(), SinkError> {
        self.tx.send(message.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Subscribers = HashMap<Uuid, Vec<(SubscriptionId, Arc<dyn ProgressSink>)>>;

/// Registry of progress subscribers keyed by batch id.
#[derive(Default)]
pub struct ProgressBroadcaster {
    subscribers: RwLock<Subscribers>,
}

impl fmt::Debug for ProgressBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressBroadcaster")
            .field("batches", &self.batch_count())
            .finish()
    }
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` for `batch_id` and sends it a `connected`
    /// acknowledgement. No earlier events are replayed.
    pub fn subscribe(&self, batch_id: Uuid, sink: Arc<dyn ProgressSink>) -> SubscriptionId {
        let id = SubscriptionId::new();

        if let Err(e) = sink.send(&ProgressMessage::connected(batch_id)) {
            warn!(batch_id = %batch_id, subscription = %id, error = %e, "Failed to acknowledge subscriber");
        }

        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.entry(batch_id).or_default().push((id, sink));
        debug!(batch_id = %batch_id, subscription = %id, "Progress subscriber added");
        id
    }

    /// Subscribes a fresh channel sink and returns its receiver.
    pub fn subscribe_channel(
        &self,
        batch_id: Uuid,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ProgressMessage>) {
        let (sink, rx) = ChannelSink::new();
        let id = self.subscribe(batch_id, Arc::new(sink));
        (id, rx)
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, batch_id: Uuid, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let Some(sinks) = subscribers.get_mut(&batch_id) else {
            return false;
        };

        let before = sinks.len();
        sinks.retain(|(sid, _)| *sid != id);
        let removed = sinks.len() != before;
        if sinks.is_empty() {
            subscribers.remove(&batch_id);
        }
        removed
    }

    /// Delivers `event` to every sink registered for its batch.
    ///
    /// Failures are logged and swallowed. Closed sinks are pruned.
    pub fn broadcast(&self, event: &ProgressEvent) {
        let batch_id = event.batch_id;
        let sinks: Vec<(SubscriptionId, Arc<dyn ProgressSink>)> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subscribers.get(&batch_id) {
                Some(sinks) => sinks.clone(),
                None => return,
            }
        };

        let message = ProgressMessage::Progress(event.clone());
        let mut closed = Vec::new();
        for (id, sink) in &sinks {
            match sink.send(&message) {
                Ok(()) => {}
                Err(SinkError::Closed) => closed.push(*id),
                Err(e) => {
                    warn!(batch_id = %batch_id, subscription = %id, error = %e, "Progress delivery failed")
                }
            }
        }

        for id in closed {
            debug!(batch_id = %batch_id, subscription = %id, "Pruning closed progress subscriber");
            self.unsubscribe(batch_id, id);
        }
    }

    pub fn subscriber_count(&self, batch_id: Uuid) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.get(&batch_id).map_or(0, Vec::len)
    }

    /// Number of batches with at least one subscriber.
    pub fn batch_count(&self) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.len()
    }

    /// Drops every sink registered for `batch_id`.
    pub fn close_batch(&self, batch_id: Uuid) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(sinks) = subscribers.remove(&batch_id) {
            debug!(batch_id = %batch_id, count = sinks.len(), "Closed progress subscribers");
        }
    }

    /// Drops every sink of every batch.
    pub fn shutdown(&self) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let count: usize = subscribers.values().map(Vec::len).sum();
        subscribers.clear();
        debug!(count, "Progress broadcaster shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressCounts, ProgressEventType};
    use std::sync::Mutex;

    fn event(batch_id: Uuid, percentage: u8) -> ProgressEvent {
        ProgressEvent::new(
            batch_id,
            ProgressEventType::AnalysisStarted,
            ProgressCounts {
                completed: 0,
                total: 1,
                percentage,
            },
        )
    }

    struct FailingSink {
        attempts: Mutex<usize>,
    }

    impl ProgressSink for FailingSink {
        fn send(&self, _message: &ProgressMessage) -> Result<(), SinkError> {
            *self.attempts.lock().unwrap() += 1;
            Err(SinkError::Failed("socket write error".to_string()))
        }
    }

    #[test]
    fn test_subscribe_sends_ack_only_to_new_sink() {
        let broadcaster = ProgressBroadcaster::new();
        let batch_id = Uuid::new_v4();

        let (_first, mut rx1) = broadcaster.subscribe_channel(batch_id);
        assert!(matches!(rx1.try_recv().unwrap(), ProgressMessage::Connected { .. }));

        let (_second, mut rx2) = broadcaster.subscribe_channel(batch_id);
        assert!(matches!(rx2.try_recv().unwrap(), ProgressMessage::Connected { .. }));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber_of_batch() {
        let broadcaster = ProgressBroadcaster::new();
        let batch_id = Uuid::new_v4();
        let other_batch = Uuid::new_v4();

        let (_a, mut rx_a) = broadcaster.subscribe_channel(batch_id);
        let (_b, mut rx_b) = broadcaster.subscribe_channel(batch_id);
        let (_c, mut rx_other) = broadcaster.subscribe_channel(other_batch);
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();
        rx_other.try_recv().unwrap();

        broadcaster.broadcast(&event(batch_id, 10));
        broadcaster.broadcast(&event(batch_id, 40));

        for rx in [&mut rx_a, &mut rx_b] {
            let first = rx.try_recv().unwrap();
            let second = rx.try_recv().unwrap();
            assert_eq!(first.as_event().unwrap().progress.percentage, 10);
            assert_eq!(second.as_event().unwrap().progress.percentage, 40);
        }
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_without_subscribers_is_noop() {
        let broadcaster = ProgressBroadcaster::new();
        broadcaster.broadcast(&event(Uuid::new_v4(), 0));
        assert_eq!(broadcaster.batch_count(), 0);
    }

    #[test]
    fn test_late_subscriber_gets_no_replay() {
        let broadcaster = ProgressBroadcaster::new();
        let batch_id = Uuid::new_v4();
        broadcaster.broadcast(&event(batch_id, 10));

        let (_id, mut rx) = broadcaster.subscribe_channel(batch_id);
        assert!(matches!(rx.try_recv().unwrap(), ProgressMessage::Connected { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_removes_empty_batch() {
        let broadcaster = ProgressBroadcaster::new();
        let batch_id = Uuid::new_v4();
        let (id, _rx) = broadcaster.subscribe_channel(batch_id);

        assert_eq!(broadcaster.subscriber_count(batch_id), 1);
        assert!(broadcaster.unsubscribe(batch_id, id));
        assert!(!broadcaster.unsubscribe(batch_id, id));
        assert_eq!(broadcaster.subscriber_count(batch_id), 0);
        assert_eq!(broadcaster.batch_count(), 0);
    }

    #[test]
    fn test_closed_sink_is_pruned() {
        let broadcaster = ProgressBroadcaster::new();
        let batch_id = Uuid::new_v4();
        let (_kept, mut kept_rx) = broadcaster.subscribe_channel(batch_id);
        let (_dropped, dropped_rx) = broadcaster.subscribe_channel(batch_id);
        drop(dropped_rx);

        broadcaster.broadcast(&event(batch_id, 10));

        assert_eq!(broadcaster.subscriber_count(batch_id), 1);
        kept_rx.try_recv().unwrap();
        assert!(kept_rx.try_recv().unwrap().as_event().is_some());
    }

    #[test]
    fn test_failing_sink_is_kept_and_others_still_delivered() {
        let broadcaster = ProgressBroadcaster::new();
        let batch_id = Uuid::new_v4();
        let failing = Arc::new(FailingSink {
            attempts: Mutex::new(0),
        });
        broadcaster.subscribe(batch_id, failing.clone());
        let (_ok, mut rx) = broadcaster.subscribe_channel(batch_id);
        rx.try_recv().unwrap();

        broadcaster.broadcast(&event(batch_id, 65));

        assert_eq!(*failing.attempts.lock().unwrap(), 2);
        assert_eq!(broadcaster.subscriber_count(batch_id), 2);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_close_batch_and_shutdown() {
        let broadcaster = ProgressBroadcaster::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let (_a, _rx_a) = broadcaster.subscribe_channel(first);
        let (_b, _rx_b) = broadcaster.subscribe_channel(second);

        broadcaster.close_batch(first);
        assert_eq!(broadcaster.subscriber_count(first), 0);
        assert_eq!(broadcaster.subscriber_count(second), 1);

        broadcaster.shutdown();
        assert_eq!(broadcaster.batch_count(), 0);
    }
}
