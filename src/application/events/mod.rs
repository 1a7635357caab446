//! Audit events: types, per-operation sink registries, the dispatcher and
//! the server-push bus.

pub mod dispatcher;
pub mod event_bus;
pub mod record;
pub mod registry;
pub mod types;

pub use dispatcher::{DispatchReport, EventDispatcher, EventDispatcherBuilder, OperationHandle};
pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use record::AuditRecord;
pub use registry::{SinkEntry, SinkRegistry};
pub use types::{AuditEvent, Direction, OperationInfo, TagSet, ALL_TAG};
