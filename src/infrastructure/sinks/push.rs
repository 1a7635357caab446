//! Server-push sink: publishes every event on the audit [`EventBus`].

use crate::application::events::{AuditEvent, AuditRecord, SharedEventBus};
use crate::application::ports::AuditSink;
use crate::domain::SinkError;

pub struct ServerPushSink {
    bus: SharedEventBus,
}

impl ServerPushSink {
    pub fn new(bus: SharedEventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }
}

impl AuditSink for ServerPushSink {
    fn record(&self, event: &AuditEvent<'_>) -> Result<(), SinkError> {
        // No subscribers is not a failure.
        self.bus.publish(AuditRecord::from_event(event));
        Ok(())
    }
}
