//! Event dispatcher: operation registry and filtered fan-out to sinks.
//!
//! ## Lifecycle
//!
//! ```text
//! EventDispatcherBuilder ──register_operation / add_sink──► build()
//!                                                             │
//!                                   Arc<EventDispatcher> ◄────┘
//!                                   notify_request / notify_response only
//! ```
//!
//! Registration and notification live on different types, so sinks can
//! never be attached while calls are being served.
//!
//! ## Fan-out rules
//! - Sinks run inline, in registration order.
//! - A sink fires when its tag set matches the operation's tags.
//! - Every sink call is isolated: an `Err` or a panic is reported on the
//!   fallback channel (`cpo::audit::fallback`) and the next sink still runs.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::registry::{SinkEntry, SinkRegistry};
use super::types::{AuditEvent, Direction, OperationInfo, TagSet};
use crate::application::ports::AuditSink;
use crate::domain::{ConfigurationError, RequestContext, ResponseContext};
use crate::shared::panic::panic_message;

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Typed reference to a declared operation.
///
/// Only valid for the dispatcher whose builder issued it.
pub struct OperationHandle<Req, Res> {
    dispatcher_id: u64,
    index: usize,
    name: Arc<str>,
    _payload: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res> OperationHandle<Req, Res> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<Req, Res> Clone for OperationHandle<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            dispatcher_id: self.dispatcher_id,
            index: self.index,
            name: self.name.clone(),
            _payload: PhantomData,
        }
    }
}

impl<Req, Res> std::fmt::Debug for OperationHandle<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish()
    }
}

struct OperationSlot {
    info: OperationInfo,
    sinks: SinkRegistry,
}

/// Registration phase.
pub struct EventDispatcherBuilder {
    id: u64,
    operations: Vec<OperationSlot>,
    names: HashSet<String>,
}

impl EventDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
            operations: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Declare an operation. Each name may be declared once.
    pub fn register_operation<Req, Res, I, S>(
        &mut self,
        name: impl Into<String>,
        tags: I,
    ) -> Result<OperationHandle<Req, Res>, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(ConfigurationError::DuplicateOperation(name));
        }

        let info = OperationInfo {
            name: name.clone(),
            tags: TagSet::from_iter(tags),
        };
        debug!(operation = %info.name, tags = %info.tags, "Operation registered");

        self.operations.push(OperationSlot {
            info,
            sinks: SinkRegistry::new(),
        });

        Ok(OperationHandle {
            dispatcher_id: self.id,
            index: self.operations.len() - 1,
            name: Arc::from(name),
            _payload: PhantomData,
        })
    }

    /// Append a sink to an operation's request or response list.
    pub fn add_sink<Req, Res, I, S>(
        &mut self,
        handle: &OperationHandle<Req, Res>,
        direction: Direction,
        label: impl Into<String>,
        tags: I,
        sink: impl AuditSink + 'static,
    ) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_shared_sink(handle, direction, label, tags, Arc::new(sink))
    }

    /// Like [`add_sink`](Self::add_sink) for a sink shared between several
    /// registrations (e.g. one disk sink for request and response).
    pub fn add_shared_sink<Req, Res, I, S>(
        &mut self,
        handle: &OperationHandle<Req, Res>,
        direction: Direction,
        label: impl Into<String>,
        tags: I,
        sink: Arc<dyn AuditSink>,
    ) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.slot_mut(handle)?;
        let entry = SinkEntry {
            label: label.into(),
            tags: TagSet::from_iter(tags),
            sink,
        };
        debug!(
            operation = %slot.info.name,
            %direction,
            sink = %entry.label,
            tags = %entry.tags,
            "Sink attached"
        );
        slot.sinks.push(direction, entry);
        Ok(())
    }

    /// Metadata of a declared operation, for config-driven wiring.
    pub fn operation_info<Req, Res>(
        &self,
        handle: &OperationHandle<Req, Res>,
    ) -> Option<&OperationInfo> {
        if handle.dispatcher_id != self.id {
            return None;
        }
        self.operations.get(handle.index).map(|slot| &slot.info)
    }

    fn slot_mut<Req, Res>(
        &mut self,
        handle: &OperationHandle<Req, Res>,
    ) -> Result<&mut OperationSlot, ConfigurationError> {
        if handle.dispatcher_id != self.id {
            return Err(ConfigurationError::UnknownOperation(handle.name().to_string()));
        }
        self.operations
            .get_mut(handle.index)
            .ok_or_else(|| ConfigurationError::UnknownOperation(handle.name().to_string()))
    }

    /// Finish registration and enter the serving phase.
    pub fn build(self) -> EventDispatcher {
        EventDispatcher {
            id: self.id,
            operations: self.operations,
            sink_failures: AtomicU64::new(0),
        }
    }
}

impl Default for EventDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Serving phase: immutable registrations, concurrent notifications.
pub struct EventDispatcher {
    id: u64,
    operations: Vec<OperationSlot>,
    sink_failures: AtomicU64,
}

impl EventDispatcher {
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::new()
    }

    pub fn operation<Req, Res>(&self, handle: &OperationHandle<Req, Res>) -> Option<&OperationInfo> {
        self.slot(handle).map(|slot| &slot.info)
    }

    /// Total sink failures reported on the fallback channel so far.
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    pub fn notify_request<Req, Res>(
        &self,
        handle: &OperationHandle<Req, Res>,
        context: &RequestContext<Req>,
    ) -> DispatchReport
    where
        Req: Serialize,
    {
        let Some(slot) = self.slot(handle) else {
            return DispatchReport::default();
        };
        if slot.sinks.len(Direction::Request) == 0 {
            return DispatchReport::default();
        }

        let untyped = context.to_untyped();
        let event = AuditEvent::Request {
            operation: &slot.info,
            context: &untyped,
        };
        self.fan_out(slot, &event)
    }

    pub fn notify_response<Req, Res>(
        &self,
        handle: &OperationHandle<Req, Res>,
        context: &ResponseContext<Req, Res>,
    ) -> DispatchReport
    where
        Req: Serialize,
        Res: Serialize,
    {
        let Some(slot) = self.slot(handle) else {
            return DispatchReport::default();
        };
        if slot.sinks.len(Direction::Response) == 0 {
            return DispatchReport::default();
        }

        let untyped = context.to_untyped();
        let event = AuditEvent::Response {
            operation: &slot.info,
            context: &untyped,
        };
        self.fan_out(slot, &event)
    }

    fn slot<Req, Res>(&self, handle: &OperationHandle<Req, Res>) -> Option<&OperationSlot> {
        if handle.dispatcher_id != self.id {
            warn!(
                target: "cpo::audit::fallback",
                operation = handle.name(),
                "Handle belongs to another dispatcher, event not dispatched"
            );
            return None;
        }
        self.operations.get(handle.index)
    }

    fn fan_out(&self, slot: &OperationSlot, event: &AuditEvent<'_>) -> DispatchReport {
        let direction = event.direction();
        let mut report = DispatchReport::default();

        for entry in slot.sinks.matching(direction, &slot.info.tags) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.sink.record(event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic_err) => Some(format!("sink panicked: {}", panic_message(panic_err.as_ref()))),
            };

            match failure {
                None => report.delivered += 1,
                Some(error) => {
                    report.failed += 1;
                    self.report_sink_failure(&slot.info, direction, entry, event, &error);
                }
            }
        }

        report
    }

    fn report_sink_failure(
        &self,
        operation: &OperationInfo,
        direction: Direction,
        entry: &SinkEntry,
        event: &AuditEvent<'_>,
        error: &str,
    ) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "audit_sink_failures_total",
            "operation" => operation.name.clone(),
            "sink" => entry.label.clone()
        )
        .increment(1);
        warn!(
            target: "cpo::audit::fallback",
            operation = %operation.name,
            %direction,
            sink = %entry.label,
            call_id = %event.call_id(),
            error,
            "Audit sink failed"
        );
    }
}
