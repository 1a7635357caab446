//! Inbound ports: the business side of the CPO Client API.
//!
//! One [`RemoteAuthorizationHandler`] serves every call concurrently. The
//! pipeline owns the call context; the handler receives its own copies of the
//! timestamp, sender and request and must not hold on to them afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Acknowledgement, AuthorizeRemoteReservationStartRequest, AuthorizeRemoteReservationStopRequest,
    AuthorizeRemoteStartRequest, AuthorizeRemoteStopRequest, HandlerError, ResultEnvelope,
    SenderIdentity,
};

/// Result every handler method returns.
///
/// `Ok(envelope)` is passed through unchanged, `Err` is converted to a fault
/// envelope by the pipeline.
pub type HandlerResult<T> = Result<ResultEnvelope<T>, HandlerError>;

/// Business logic behind the four remote authorization operations.
#[async_trait]
pub trait RemoteAuthorizationHandler: Send + Sync {
    async fn authorize_remote_start(
        &self,
        timestamp: DateTime<Utc>,
        sender: SenderIdentity,
        request: AuthorizeRemoteStartRequest,
    ) -> HandlerResult<Acknowledgement>;

    async fn authorize_remote_stop(
        &self,
        timestamp: DateTime<Utc>,
        sender: SenderIdentity,
        request: AuthorizeRemoteStopRequest,
    ) -> HandlerResult<Acknowledgement>;

    async fn authorize_remote_reservation_start(
        &self,
        timestamp: DateTime<Utc>,
        sender: SenderIdentity,
        request: AuthorizeRemoteReservationStartRequest,
    ) -> HandlerResult<Acknowledgement>;

    async fn authorize_remote_reservation_stop(
        &self,
        timestamp: DateTime<Utc>,
        sender: SenderIdentity,
        request: AuthorizeRemoteReservationStopRequest,
    ) -> HandlerResult<Acknowledgement>;
}
