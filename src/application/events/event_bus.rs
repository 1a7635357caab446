//! Server-push stream of audit records.
//!
//! Uses a tokio broadcast channel: publishing never waits, and a subscriber
//! that falls behind loses the oldest records (reported as lag) instead of
//! slowing down the calls that produce them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::record::AuditRecord;

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus for audit records
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<AuditRecord>>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a record; returns how many subscribers will see it.
    pub fn publish(&self, record: AuditRecord) -> usize {
        let call_id = record.call_id;
        let direction = record.direction;

        match self.sender.send(Arc::new(record)) {
            Ok(count) => {
                debug!(%call_id, %direction, subscribers = count, "Audit record pushed");
                count
            }
            Err(_) => {
                debug!(%call_id, %direction, "Audit record pushed (no subscribers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        let count = self.subscriber_count.load(Ordering::SeqCst);
        info!(total = count, "New audit stream subscriber");

        EventSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of the push stream
pub struct EventSubscriber {
    receiver: broadcast::Receiver<Arc<AuditRecord>>,
    subscriber_count: Arc<AtomicUsize>,
    missed: u64,
}

impl EventSubscriber {
    /// Next record, skipping over anything lost to lag. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<AuditRecord>> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.missed += count;
                    warn!(missed = count, "Audit stream subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    /// Records dropped for this subscriber because it fell behind.
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        info!(remaining = prev.saturating_sub(1), "Audit stream subscriber disconnected");
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

/// Create a shared event bus
pub fn create_event_bus(capacity: usize) -> SharedEventBus {
    Arc::new(EventBus::with_capacity(capacity))
}
