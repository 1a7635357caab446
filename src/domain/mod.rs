pub mod context;
pub mod envelope;
pub mod error;
pub mod messages;

// Re-export commonly used types
pub use context::{RequestContext, ResponseContext, SenderIdentity};
pub use envelope::{Fault, FaultCode, FieldError, Outcome, ResultEnvelope};
pub use error::{ConfigError, ConfigurationError, HandlerError, SinkError};
pub use messages::{
    Acknowledgement, AuthorizeRemoteReservationStartRequest, AuthorizeRemoteReservationStopRequest,
    AuthorizeRemoteStartRequest, AuthorizeRemoteStopRequest, Identification, StatusCode,
};
