pub mod inbound;
pub mod outbound;

pub use inbound::{HandlerResult, RemoteAuthorizationHandler};
pub use outbound::{sink_fn, AuditSink, AuditTransport};
