//! Network audit sink.
//!
//! `record` only enqueues (`try_send`) onto a bounded channel; a background
//! worker drains it and hands each record to an [`AuditTransport`] with
//! exponential backoff. A full queue drops the record and counts it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::events::{AuditEvent, AuditRecord};
use crate::application::ports::{AuditSink, AuditTransport};
use crate::config::NetworkConfig;
use crate::domain::SinkError;
use crate::shared::{retry_with_backoff, RetryConfig};

/// Counters shared between the sink and its worker.
#[derive(Debug, Default)]
pub struct NetworkSinkStats {
    delivered: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_delivery: AtomicU64,
}

impl NetworkSinkStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Records rejected because the queue was full.
    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow.load(Ordering::Relaxed)
    }

    /// Records given up on after retries.
    pub fn dropped_delivery(&self) -> u64 {
        self.dropped_delivery.load(Ordering::Relaxed)
    }
}

pub struct NetworkSink {
    name: String,
    queue: mpsc::Sender<AuditRecord>,
    stats: Arc<NetworkSinkStats>,
}

impl NetworkSink {
    /// Start the delivery worker. Must be called inside a tokio runtime.
    ///
    /// The worker exits once the sink (and thus the queue sender) is dropped
    /// and the remaining records have been attempted.
    pub fn spawn(transport: Arc<dyn AuditTransport>, config: &NetworkConfig) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(NetworkSinkStats::default());
        let name = transport.name().to_string();

        let worker = tokio::spawn(run_worker(transport, rx, config.retry(), stats.clone()));
        info!(
            sink = %name,
            queue_capacity = config.queue_capacity,
            max_attempts = config.max_attempts,
            "Network audit sink started"
        );

        (Self { name, queue, stats }, worker)
    }

    pub fn stats(&self) -> Arc<NetworkSinkStats> {
        self.stats.clone()
    }
}

impl AuditSink for NetworkSink {
    fn record(&self, event: &AuditEvent<'_>) -> Result<(), SinkError> {
        match self.queue.try_send(AuditRecord::from_event(event)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.stats.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    "audit_records_dropped_total",
                    "sink" => self.name.clone(),
                    "reason" => "overflow"
                )
                .increment(1);
                Err(SinkError::Overflow(format!(
                    "{} queue full, call {} dropped",
                    self.name, record.call_id
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SinkError::Closed(format!("{} worker stopped", self.name)))
            }
        }
    }
}

async fn run_worker(
    transport: Arc<dyn AuditTransport>,
    mut rx: mpsc::Receiver<AuditRecord>,
    retry: RetryConfig,
    stats: Arc<NetworkSinkStats>,
) {
    let name = transport.name().to_string();

    while let Some(record) = rx.recv().await {
        let sent = retry_with_backoff(
            &retry,
            || transport.send(&record),
            SinkError::is_transient,
            &name,
        )
        .await;

        match sent {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(sink = %name, call_id = %record.call_id, "Audit record delivered");
            }
            Err(e) => {
                stats.dropped_delivery.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    "audit_records_dropped_total",
                    "sink" => name.clone(),
                    "reason" => "delivery"
                )
                .increment(1);
                warn!(
                    target: "cpo::audit::fallback",
                    sink = %name,
                    call_id = %record.call_id,
                    operation = %record.operation,
                    direction = %record.direction,
                    error = %e,
                    "Audit record dropped after retries"
                );
            }
        }
    }

    info!(sink = %name, "Network audit sink stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::events::{OperationInfo, TagSet};
    use crate::domain::RequestContext;

    /// Fails the first `failures` sends with a transient error.
    #[derive(Default)]
    struct FlakyTransport {
        failures: AtomicU64,
        received: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditTransport for FlakyTransport {
        async fn send(&self, record: &AuditRecord) -> Result<(), SinkError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(SinkError::Transport("503 from collector".into()));
            }
            self.received.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "collector"
        }
    }

    /// Never completes a send.
    struct StuckTransport;

    #[async_trait]
    impl AuditTransport for StuckTransport {
        async fn send(&self, _record: &AuditRecord) -> Result<(), SinkError> {
            std::future::pending().await
        }
    }

    fn config(queue_capacity: usize) -> NetworkConfig {
        NetworkConfig {
            queue_capacity,
            max_attempts: 3,
            initial_delay_ms: 10,
            backoff_multiplier: 2.0,
            max_delay_ms: 50,
        }
    }

    fn operation() -> OperationInfo {
        OperationInfo {
            name: "AuthorizeRemoteStart".into(),
            tags: TagSet::from_iter(["remote-start"]),
        }
    }

    fn push(sink: &NetworkSink, info: &OperationInfo) -> Result<(), SinkError> {
        let context = RequestContext::new("DE*GDF".into(), json!({"EVSEID": "DE*GEF*E1*1"}));
        sink.record(&AuditEvent::Request {
            operation: info,
            context: &context,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let transport = Arc::new(FlakyTransport {
            failures: AtomicU64::new(2),
            ..Default::default()
        });
        let (sink, worker) = NetworkSink::spawn(transport.clone(), &config(8));
        let stats = sink.stats();
        let info = operation();

        push(&sink, &info).unwrap();
        drop(sink);
        worker.await.unwrap();

        assert_eq!(stats.delivered(), 1);
        assert_eq!(stats.dropped_delivery(), 0);
        let received = transport.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].operation, "AuthorizeRemoteStart");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let transport = Arc::new(FlakyTransport {
            failures: AtomicU64::new(10),
            ..Default::default()
        });
        let (sink, worker) = NetworkSink::spawn(transport.clone(), &config(8));
        let stats = sink.stats();
        let info = operation();

        push(&sink, &info).unwrap();
        drop(sink);
        worker.await.unwrap();

        assert_eq!(stats.delivered(), 0);
        assert_eq!(stats.dropped_delivery(), 1);
        assert_eq!(transport.failures.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (sink, worker) = NetworkSink::spawn(Arc::new(StuckTransport), &config(2));
        let info = operation();

        // The worker holds one record in flight once it gets scheduled, so
        // at most capacity + 1 records are accepted.
        let mut rejected = 0;
        for _ in 0..10 {
            if let Err(e) = push(&sink, &info) {
                assert!(matches!(e, SinkError::Overflow(_)));
                rejected += 1;
            }
        }
        assert!(rejected >= 7);
        assert_eq!(sink.stats().dropped_overflow(), rejected);

        worker.abort();
        let _ = tokio::time::timeout(Duration::from_secs(1), worker).await;
    }

    #[tokio::test]
    async fn stopped_worker_reports_closed() {
        let (sink, worker) = NetworkSink::spawn(Arc::new(StuckTransport), &config(2));
        worker.abort();
        let _ = worker.await;

        let err = push(&sink, &operation()).unwrap_err();
        assert!(matches!(err, SinkError::Closed(_)));
    }
}
