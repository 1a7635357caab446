//! # Texnouz CPO Client API
//!
//! Request/response event dispatch and multi-sink audit logging for the
//! remote authorization operations of an e-mobility CPO Client API:
//! AuthorizeRemoteStart, AuthorizeRemoteStop, AuthorizeRemoteReservationStart
//! and AuthorizeRemoteReservationStop.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Payloads, contexts, result envelope and error types
//! - **application**: Event dispatcher, operation pipeline, API facade and ports
//! - **infrastructure**: Audit sinks (console, disk, network, server-push)
//! - **shared**: Retry and panic helpers
//! - **server**: Runtime wiring from [`AppConfig`] and tracing setup

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use application::{
    create_event_bus, AuditEvent, AuditRecord, AuditSink, AuditTransport, CpoClientApi, CpoOperations, Direction,
    EventBus, EventDispatcher, EventDispatcherBuilder, OperationHandle, OperationPipeline,
    RemoteAuthorizationHandler, SharedEventBus,
};
pub use domain::{Fault, FaultCode, HandlerError, ResultEnvelope, SenderIdentity, SinkError};
pub use server::{init_tracing, CpoClientRuntime, ExtraSink, RuntimeOptions};
