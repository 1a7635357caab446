//! Operation pipeline: drives one inbound call end-to-end.
//!
//! ```text
//! Received ─► DispatchingRequest ─► Handling ─┬──────────────┬─► DispatchingResponse ─► Completed
//!                                             └─► Faulted ───┘
//! ```
//!
//! Every call that reached `DispatchingRequest` gets exactly one response
//! notification: handler errors, panics, timeouts and cancellations are
//! turned into fault envelopes, and an [`InFlightCall`] dropped mid-flight
//! (the transport dropped the future) dispatches a `CancelledFault` itself.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use validator::Validate;

use super::events::{EventDispatcher, OperationHandle};
use super::ports::HandlerResult;
use crate::domain::{Fault, RequestContext, ResponseContext, ResultEnvelope, SenderIdentity};
use crate::shared::panic::panic_message;

/// Default bound on a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    DispatchingRequest,
    Handling,
    Faulted,
    DispatchingResponse,
    Completed,
}

pub struct OperationPipeline {
    dispatcher: Arc<EventDispatcher>,
    handler_timeout: Duration,
}

impl OperationPipeline {
    pub fn new(dispatcher: Arc<EventDispatcher>, handler_timeout: Duration) -> Self {
        Self {
            dispatcher,
            handler_timeout,
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }

    /// Run one call. Always returns an envelope.
    pub async fn execute<Req, Res, F, Fut>(
        &self,
        handle: &OperationHandle<Req, Res>,
        sender: SenderIdentity,
        request: Req,
        handler: F,
    ) -> ResultEnvelope<Res>
    where
        Req: Serialize + Validate + Clone,
        Res: Serialize,
        F: FnOnce(DateTime<Utc>, SenderIdentity, Req) -> Fut,
        Fut: Future<Output = HandlerResult<Res>>,
    {
        self.execute_cancellable(handle, sender, request, handler, &CancellationToken::new())
            .await
    }

    /// Run one call that the transport may cancel through `cancel`.
    pub async fn execute_cancellable<Req, Res, F, Fut>(
        &self,
        handle: &OperationHandle<Req, Res>,
        sender: SenderIdentity,
        request: Req,
        handler: F,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<Res>
    where
        Req: Serialize + Validate + Clone,
        Res: Serialize,
        F: FnOnce(DateTime<Utc>, SenderIdentity, Req) -> Fut,
        Fut: Future<Output = HandlerResult<Res>>,
    {
        let started = Instant::now();
        let context = RequestContext::new(sender, request);
        let (timestamp, sender, request) = (
            context.timestamp,
            context.sender.clone(),
            context.request.clone(),
        );
        let mut call = InFlightCall::new(&self.dispatcher, handle, context, started);
        call.dispatch_request();

        let envelope = match request.validate() {
            Err(errors) => Fault::from_validation(&errors).into(),
            // The handler is invoked inside the guarded future so a panic
            // before its first poll is caught too.
            Ok(()) => {
                self.run_handler(async move { handler(timestamp, sender, request).await }, cancel)
                    .await
            }
        };

        call.complete(envelope)
    }

    async fn run_handler<Res, Fut>(&self, fut: Fut, cancel: &CancellationToken) -> ResultEnvelope<Res>
    where
        Fut: Future<Output = HandlerResult<Res>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Fault::cancelled("Call cancelled by transport").into(),
            outcome = tokio::time::timeout(self.handler_timeout, guarded) => match outcome {
                Err(_elapsed) => Fault::timeout(self.handler_timeout).into(),
                Ok(Err(panic_err)) => Fault::internal(format!(
                    "Handler panicked: {}",
                    panic_message(panic_err.as_ref())
                ))
                .into(),
                Ok(Ok(Err(handler_err))) => Fault::from(handler_err).into(),
                Ok(Ok(Ok(envelope))) => envelope,
            },
        }
    }
}

/// One call in progress. Owns the request context until the response has
/// been dispatched.
struct InFlightCall<'a, Req, Res>
where
    Req: Serialize,
    Res: Serialize,
{
    dispatcher: &'a EventDispatcher,
    handle: &'a OperationHandle<Req, Res>,
    context: Option<RequestContext<Req>>,
    started: Instant,
    state: CallState,
}

impl<'a, Req, Res> InFlightCall<'a, Req, Res>
where
    Req: Serialize,
    Res: Serialize,
{
    fn new(
        dispatcher: &'a EventDispatcher,
        handle: &'a OperationHandle<Req, Res>,
        context: RequestContext<Req>,
        started: Instant,
    ) -> Self {
        debug!(
            operation = handle.name(),
            call_id = %context.call_id,
            sender = %context.sender,
            "Call received"
        );
        Self {
            dispatcher,
            handle,
            context: Some(context),
            started,
            state: CallState::Received,
        }
    }

    fn transition(&mut self, next: CallState) {
        trace!(operation = self.handle.name(), from = ?self.state, to = ?next, "Call state");
        self.state = next;
    }

    fn dispatch_request(&mut self) {
        self.transition(CallState::DispatchingRequest);
        if let Some(context) = &self.context {
            self.dispatcher.notify_request(self.handle, context);
        }
        self.transition(CallState::Handling);
    }

    fn complete(mut self, envelope: ResultEnvelope<Res>) -> ResultEnvelope<Res> {
        match self.context.take() {
            Some(context) => self.finish(context, envelope),
            None => envelope,
        }
    }

    fn finish(&mut self, context: RequestContext<Req>, envelope: ResultEnvelope<Res>) -> ResultEnvelope<Res> {
        let runtime = self.started.elapsed();
        if !envelope.is_success() {
            self.transition(CallState::Faulted);
        }
        self.transition(CallState::DispatchingResponse);

        let operation = self.handle.name().to_string();
        let call_id = context.call_id;
        let outcome = envelope.outcome();
        let runtime_ms = u64::try_from(runtime.as_millis()).unwrap_or(u64::MAX);

        match envelope.as_fault() {
            None => info!(%operation, %call_id, runtime_ms, "Call completed"),
            Some(fault) => warn!(
                %operation,
                %call_id,
                runtime_ms,
                code = %fault.code,
                description = %fault.description,
                "Call completed with fault"
            ),
        }
        metrics::histogram!("cpo_operation_latency_seconds", "operation" => operation.clone())
            .record(runtime.as_secs_f64());
        metrics::counter!(
            "cpo_operations_total",
            "operation" => operation,
            "outcome" => outcome.as_str()
        )
        .increment(1);

        let response = ResponseContext {
            request: context,
            envelope,
            runtime,
        };
        self.dispatcher.notify_response(self.handle, &response);
        self.transition(CallState::Completed);

        response.into_envelope()
    }
}

impl<Req, Res> Drop for InFlightCall<'_, Req, Res>
where
    Req: Serialize,
    Res: Serialize,
{
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let fault = if std::thread::panicking() {
            Fault::internal("Pipeline aborted while handling the call")
        } else {
            Fault::cancelled("Call dropped before completion")
        };
        self.finish(context, fault.into());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde::Deserialize;
    use serde_json::Value;

    use super::*;
    use crate::application::events::{AuditEvent, Direction};
    use crate::application::ports::sink_fn;
    use crate::domain::{FaultCode, HandlerError, Outcome};

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    struct StartCommand {
        #[validate(length(min = 1, message = "evse_id is required"))]
        evse_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ack {
        accepted: bool,
    }

    #[derive(Debug, Clone)]
    struct Seen {
        direction: Direction,
        call_id: uuid::Uuid,
        outcome: Option<Outcome>,
        fault: Option<FaultCode>,
        runtime: Option<Duration>,
    }

    struct Harness {
        pipeline: OperationPipeline,
        handle: OperationHandle<StartCommand, Ack>,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    fn harness(timeout: Duration) -> Harness {
        let seen: Arc<Mutex<Vec<Seen>>> = Arc::default();
        let mut builder = EventDispatcher::builder();
        let handle = builder
            .register_operation::<StartCommand, Ack, _, _>("AuthorizeRemoteStart", ["remote-start", "all"])
            .unwrap();

        for direction in [Direction::Request, Direction::Response] {
            let seen = seen.clone();
            builder
                .add_sink(&handle, direction, "recorder", ["all"], sink_fn(move |event| {
                    let entry = match event {
                        AuditEvent::Request { context, .. } => Seen {
                            direction: Direction::Request,
                            call_id: context.call_id,
                            outcome: None,
                            fault: None,
                            runtime: None,
                        },
                        AuditEvent::Response { context, .. } => Seen {
                            direction: Direction::Response,
                            call_id: context.call_id(),
                            outcome: Some(context.envelope.outcome()),
                            fault: context.envelope.fault_code(),
                            runtime: Some(context.runtime),
                        },
                    };
                    seen.lock().unwrap().push(entry);
                    Ok(())
                }))
                .unwrap();
        }

        Harness {
            pipeline: OperationPipeline::new(Arc::new(builder.build()), timeout),
            handle,
            seen,
        }
    }

    fn command() -> StartCommand {
        StartCommand {
            evse_id: "DE*GEF*E1*1".into(),
        }
    }

    fn assert_one_pair(seen: &[Seen]) -> &Seen {
        assert_eq!(seen.len(), 2, "expected one request and one response: {:?}", seen);
        assert_eq!(seen[0].direction, Direction::Request);
        assert_eq!(seen[1].direction, Direction::Response);
        assert_eq!(seen[0].call_id, seen[1].call_id);
        &seen[1]
    }

    #[tokio::test(start_paused = true)]
    async fn success_reports_handler_runtime() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);

        let envelope = h
            .pipeline
            .execute(&h.handle, "DE*EMP".into(), command(), |_, _, _| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(ResultEnvelope::success(Ack { accepted: true }))
            })
            .await;

        assert_eq!(envelope, ResultEnvelope::Success(Ack { accepted: true }));
        let seen = h.seen.lock().unwrap();
        let response = assert_one_pair(&seen);
        assert_eq!(response.outcome, Some(Outcome::Success));
        let runtime = response.runtime.unwrap();
        assert!(runtime >= Duration::from_millis(50));
        assert!(runtime < Duration::from_millis(60));
    }

    #[tokio::test]
    async fn handler_receives_request_fields() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);

        let envelope = h
            .pipeline
            .execute(&h.handle, "DE*EMP".into(), command(), |ts, sender, req| async move {
                assert!(ts <= Utc::now());
                assert_eq!(sender.as_str(), "DE*EMP");
                assert_eq!(req.evse_id, "DE*GEF*E1*1");
                Ok(ResultEnvelope::success(Ack { accepted: false }))
            })
            .await;

        assert!(envelope.is_success());
    }

    #[tokio::test]
    async fn handler_error_becomes_fault() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);

        let envelope = h
            .pipeline
            .execute(&h.handle, "DE*EMP".into(), command(), |_, _, _| async {
                Err::<ResultEnvelope<Ack>, _>(HandlerError::Upstream("charge point offline".into()))
            })
            .await;

        assert_eq!(envelope.fault_code(), Some(FaultCode::UpstreamFault));
        let seen = h.seen.lock().unwrap();
        assert_eq!(assert_one_pair(&seen).fault, Some(FaultCode::UpstreamFault));
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_fault() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);

        let envelope = h
            .pipeline
            .execute(&h.handle, "DE*EMP".into(), command(), |_, _, _| async {
                if true {
                    panic!("unexpected state");
                }
                Ok(ResultEnvelope::success(Ack { accepted: true }))
            })
            .await;

        let fault = envelope.as_fault().expect("fault");
        assert_eq!(fault.code, FaultCode::InternalFault);
        assert!(fault.description.contains("unexpected state"));
        let seen = h.seen.lock().unwrap();
        assert_eq!(assert_one_pair(&seen).fault, Some(FaultCode::InternalFault));
    }

    #[tokio::test]
    async fn sync_panicking_handler_becomes_internal_fault() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);

        let call = h.pipeline.execute(
            &h.handle,
            "DE*EMP".into(),
            command(),
            |_, _, _| -> std::future::Ready<HandlerResult<Ack>> { panic!("rejected before polling") },
        );
        let outcome = AssertUnwindSafe(call).catch_unwind().await;

        let envelope = outcome.expect("panic must not reach the caller");
        let fault = envelope.as_fault().expect("fault");
        assert_eq!(fault.code, FaultCode::InternalFault);
        assert!(fault.description.contains("rejected before polling"));
        let seen = h.seen.lock().unwrap();
        assert_eq!(assert_one_pair(&seen).fault, Some(FaultCode::InternalFault));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let h = harness(Duration::from_millis(100));

        let envelope = h
            .pipeline
            .execute(&h.handle, "DE*EMP".into(), command(), |_, _, _| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ResultEnvelope::success(Ack { accepted: true }))
            })
            .await;

        assert_eq!(envelope.fault_code(), Some(FaultCode::TimeoutFault));
        let seen = h.seen.lock().unwrap();
        let response = assert_one_pair(&seen);
        assert_eq!(response.fault, Some(FaultCode::TimeoutFault));
        assert!(response.runtime.unwrap() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn invalid_request_skips_handler() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();

        let envelope = h
            .pipeline
            .execute(
                &h.handle,
                "DE*EMP".into(),
                StartCommand { evse_id: String::new() },
                move |_, _, _| async move {
                    *flag.lock().unwrap() = true;
                    Ok(ResultEnvelope::success(Ack { accepted: true }))
                },
            )
            .await;

        assert!(!*called.lock().unwrap());
        let fault = envelope.as_fault().expect("fault");
        assert_eq!(fault.code, FaultCode::ValidationFault);
        assert_eq!(fault.details.as_ref().map(Vec::len), Some(1));
        let seen = h.seen.lock().unwrap();
        assert_eq!(assert_one_pair(&seen).fault, Some(FaultCode::ValidationFault));
    }

    #[tokio::test]
    async fn token_cancellation_dispatches_cancelled_fault() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let envelope = h
            .pipeline
            .execute_cancellable(
                &h.handle,
                "DE*EMP".into(),
                command(),
                move |_, _, _| async move {
                    trigger.cancel();
                    std::future::pending::<HandlerResult<Ack>>().await
                },
                &cancel,
            )
            .await;

        assert_eq!(envelope.fault_code(), Some(FaultCode::CancelledFault));
        let seen = h.seen.lock().unwrap();
        assert_eq!(assert_one_pair(&seen).fault, Some(FaultCode::CancelledFault));
    }

    #[tokio::test]
    async fn dropped_call_still_dispatches_response() {
        let h = harness(DEFAULT_HANDLER_TIMEOUT);

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            h.pipeline.execute(&h.handle, "DE*EMP".into(), command(), |_, _, _| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(ResultEnvelope::success(Ack { accepted: true }))
            }),
        )
        .await;

        assert!(outcome.is_err(), "call should have been dropped");
        let seen = h.seen.lock().unwrap();
        let response = assert_one_pair(&seen);
        assert_eq!(response.fault, Some(FaultCode::CancelledFault));
    }

    #[tokio::test]
    async fn every_outcome_yields_exactly_one_response() {
        let h = harness(Duration::from_millis(30));

        let _ = h
            .pipeline
            .execute(&h.handle, "a".into(), command(), |_, _, _| async {
                Ok(ResultEnvelope::success(Ack { accepted: true }))
            })
            .await;
        let _ = h
            .pipeline
            .execute(&h.handle, "b".into(), command(), |_, _, _| async {
                Err::<ResultEnvelope<Ack>, _>(HandlerError::Internal("db".into()))
            })
            .await;
        let _ = h
            .pipeline
            .execute(&h.handle, "c".into(), command(), |_, _, _| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(ResultEnvelope::success(Ack { accepted: true }))
            })
            .await;

        let seen = h.seen.lock().unwrap();
        let requests = seen.iter().filter(|s| s.direction == Direction::Request).count();
        let responses = seen.iter().filter(|s| s.direction == Direction::Response).count();
        assert_eq!(requests, 3);
        assert_eq!(responses, 3);
        for pair in seen.chunks(2) {
            assert_eq!(pair[0].call_id, pair[1].call_id);
        }
    }

    #[test]
    fn untyped_payload_reaches_sinks() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let mut builder = EventDispatcher::builder();
        let handle = builder
            .register_operation::<StartCommand, Ack, _, _>("AuthorizeRemoteStart", ["all"])
            .unwrap();
        let sink_seen = seen.clone();
        builder
            .add_sink(&handle, Direction::Request, "payload", ["all"], sink_fn(move |event| {
                sink_seen.lock().unwrap().push(event.request().request.clone());
                Ok(())
            }))
            .unwrap();
        let dispatcher = builder.build();

        dispatcher.notify_request(&handle, &RequestContext::new("hub".into(), command()));
        assert_eq!(seen.lock().unwrap()[0]["evse_id"], "DE*GEF*E1*1");
    }
}
