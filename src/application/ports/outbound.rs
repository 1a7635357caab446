//! Outbound ports: where audit events leave the core.
//!
//! [`AuditSink`] is the synchronous contract every registered sink fulfils.
//! It is called inline by the dispatcher, so implementations must not block
//! beyond a bounded local write; anything slower (network, streaming) hands
//! the record to its own queue.
//!
//! [`AuditTransport`] is the async contract behind the network sink's worker.

use async_trait::async_trait;

use crate::application::events::record::AuditRecord;
use crate::application::events::types::AuditEvent;
use crate::domain::SinkError;

/// A best-effort, side-effecting consumer of audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent<'_>) -> Result<(), SinkError>;
}

impl<F> AuditSink for F
where
    F: Fn(&AuditEvent<'_>) -> Result<(), SinkError> + Send + Sync,
{
    fn record(&self, event: &AuditEvent<'_>) -> Result<(), SinkError> {
        self(event)
    }
}

/// Pins a closure's signature so it can be registered as a sink without
/// annotating the argument type.
pub fn sink_fn<F>(f: F) -> F
where
    F: Fn(&AuditEvent<'_>) -> Result<(), SinkError> + Send + Sync,
{
    f
}

/// Remote delivery of one audit record (log collector, SIEM, webhook).
#[async_trait]
pub trait AuditTransport: Send + Sync {
    async fn send(&self, record: &AuditRecord) -> Result<(), SinkError>;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "network"
    }
}
