pub mod api;
pub mod events;
pub mod pipeline;
pub mod ports;

// Re-export key types for convenience
pub use api::{
    CpoClientApi, CpoOperations, AUTHORIZE_REMOTE_RESERVATION_START, AUTHORIZE_REMOTE_RESERVATION_STOP,
    AUTHORIZE_REMOTE_START, AUTHORIZE_REMOTE_STOP,
};
pub use events::{
    create_event_bus, AuditEvent, AuditRecord, Direction, DispatchReport, EventBus, EventDispatcher,
    EventDispatcherBuilder, EventSubscriber, OperationHandle, OperationInfo, SharedEventBus, TagSet,
};
pub use pipeline::{CallState, OperationPipeline, DEFAULT_HANDLER_TIMEOUT};
pub use ports::{sink_fn, AuditSink, AuditTransport, HandlerResult, RemoteAuthorizationHandler};
