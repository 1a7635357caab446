//! CPO Client API facade.
//!
//! Declares the four remote authorization operations on a dispatcher
//! builder and routes inbound calls for them through the
//! [`OperationPipeline`] to a single [`RemoteAuthorizationHandler`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::events::{EventDispatcherBuilder, OperationHandle};
use super::pipeline::OperationPipeline;
use super::ports::RemoteAuthorizationHandler;
use crate::domain::{
    Acknowledgement, AuthorizeRemoteReservationStartRequest, AuthorizeRemoteReservationStopRequest,
    AuthorizeRemoteStartRequest, AuthorizeRemoteStopRequest, ConfigurationError, ResultEnvelope,
    SenderIdentity,
};

pub const AUTHORIZE_REMOTE_START: &str = "AuthorizeRemoteStart";
pub const AUTHORIZE_REMOTE_STOP: &str = "AuthorizeRemoteStop";
pub const AUTHORIZE_REMOTE_RESERVATION_START: &str = "AuthorizeRemoteReservationStart";
pub const AUTHORIZE_REMOTE_RESERVATION_STOP: &str = "AuthorizeRemoteReservationStop";

/// Handles of the declared CPO Client API operations.
#[derive(Debug, Clone)]
pub struct CpoOperations {
    pub remote_start: OperationHandle<AuthorizeRemoteStartRequest, Acknowledgement>,
    pub remote_stop: OperationHandle<AuthorizeRemoteStopRequest, Acknowledgement>,
    pub reservation_start: OperationHandle<AuthorizeRemoteReservationStartRequest, Acknowledgement>,
    pub reservation_stop: OperationHandle<AuthorizeRemoteReservationStopRequest, Acknowledgement>,
}

impl CpoOperations {
    /// Declare all four operations with their tag sets.
    pub fn register(builder: &mut EventDispatcherBuilder) -> Result<Self, ConfigurationError> {
        Ok(Self {
            remote_start: builder.register_operation(
                AUTHORIZE_REMOTE_START,
                ["authorize", "remote", "remote-start", "all"],
            )?,
            remote_stop: builder.register_operation(
                AUTHORIZE_REMOTE_STOP,
                ["authorize", "remote", "remote-stop", "all"],
            )?,
            reservation_start: builder.register_operation(
                AUTHORIZE_REMOTE_RESERVATION_START,
                ["authorize", "reservation", "remote-reservation-start", "all"],
            )?,
            reservation_stop: builder.register_operation(
                AUTHORIZE_REMOTE_RESERVATION_STOP,
                ["authorize", "reservation", "remote-reservation-stop", "all"],
            )?,
        })
    }
}

/// Entry point the transport calls into. Cheap to clone.
#[derive(Clone)]
pub struct CpoClientApi {
    pipeline: Arc<OperationPipeline>,
    handler: Arc<dyn RemoteAuthorizationHandler>,
    operations: CpoOperations,
}

impl CpoClientApi {
    pub fn new(
        pipeline: Arc<OperationPipeline>,
        handler: Arc<dyn RemoteAuthorizationHandler>,
        operations: CpoOperations,
    ) -> Self {
        Self {
            pipeline,
            handler,
            operations,
        }
    }

    pub fn operations(&self) -> &CpoOperations {
        &self.operations
    }

    pub fn pipeline(&self) -> &Arc<OperationPipeline> {
        &self.pipeline
    }

    pub async fn remote_start(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteStartRequest,
    ) -> ResultEnvelope<Acknowledgement> {
        self.remote_start_cancellable(sender, request, &CancellationToken::new())
            .await
    }

    pub async fn remote_start_cancellable(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteStartRequest,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<Acknowledgement> {
        let handler = &self.handler;
        self.pipeline
            .execute_cancellable(
                &self.operations.remote_start,
                sender,
                request,
                |ts, sender, request| handler.authorize_remote_start(ts, sender, request),
                cancel,
            )
            .await
    }

    pub async fn remote_stop(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteStopRequest,
    ) -> ResultEnvelope<Acknowledgement> {
        self.remote_stop_cancellable(sender, request, &CancellationToken::new())
            .await
    }

    pub async fn remote_stop_cancellable(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteStopRequest,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<Acknowledgement> {
        let handler = &self.handler;
        self.pipeline
            .execute_cancellable(
                &self.operations.remote_stop,
                sender,
                request,
                |ts, sender, request| handler.authorize_remote_stop(ts, sender, request),
                cancel,
            )
            .await
    }

    pub async fn remote_reservation_start(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteReservationStartRequest,
    ) -> ResultEnvelope<Acknowledgement> {
        self.remote_reservation_start_cancellable(sender, request, &CancellationToken::new())
            .await
    }

    pub async fn remote_reservation_start_cancellable(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteReservationStartRequest,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<Acknowledgement> {
        let handler = &self.handler;
        self.pipeline
            .execute_cancellable(
                &self.operations.reservation_start,
                sender,
                request,
                |ts, sender, request| handler.authorize_remote_reservation_start(ts, sender, request),
                cancel,
            )
            .await
    }

    pub async fn remote_reservation_stop(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteReservationStopRequest,
    ) -> ResultEnvelope<Acknowledgement> {
        self.remote_reservation_stop_cancellable(sender, request, &CancellationToken::new())
            .await
    }

    pub async fn remote_reservation_stop_cancellable(
        &self,
        sender: SenderIdentity,
        request: AuthorizeRemoteReservationStopRequest,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<Acknowledgement> {
        let handler = &self.handler;
        self.pipeline
            .execute_cancellable(
                &self.operations.reservation_stop,
                sender,
                request,
                |ts, sender, request| handler.authorize_remote_reservation_stop(ts, sender, request),
                cancel,
            )
            .await
    }
}
