//! Per-call request and response contexts.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::envelope::ResultEnvelope;

/// Identity of the party that sent a call (EMP operator, roaming hub, peer address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderIdentity(String);

impl SenderIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Everything known about a call when it arrives. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext<Req = Value> {
    pub call_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender: SenderIdentity,
    pub request: Req,
}

impl<Req> RequestContext<Req> {
    pub fn new(sender: SenderIdentity, request: Req) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender,
            request,
        }
    }
}

impl<Req: Serialize> RequestContext<Req> {
    /// Untyped copy handed to sinks.
    pub fn to_untyped(&self) -> RequestContext<Value> {
        RequestContext {
            call_id: self.call_id,
            timestamp: self.timestamp,
            sender: self.sender.clone(),
            request: to_value_lossy(&self.request),
        }
    }
}

/// Request context plus the produced envelope and the elapsed processing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseContext<Req = Value, Res = Value> {
    pub request: RequestContext<Req>,
    pub envelope: ResultEnvelope<Res>,
    pub runtime: Duration,
}

impl<Req, Res> ResponseContext<Req, Res> {
    pub fn call_id(&self) -> Uuid {
        self.request.call_id
    }

    /// Wall-clock time at which the response was produced.
    pub fn completed_at(&self) -> DateTime<Utc> {
        let runtime = chrono::Duration::from_std(self.runtime).unwrap_or(chrono::Duration::zero());
        self.request.timestamp + runtime
    }

    /// Hand the envelope back to the transport.
    pub fn into_envelope(self) -> ResultEnvelope<Res> {
        self.envelope
    }
}

impl<Req: Serialize, Res: Serialize> ResponseContext<Req, Res> {
    pub fn to_untyped(&self) -> ResponseContext<Value, Value> {
        let envelope = match &self.envelope {
            ResultEnvelope::Success(value) => ResultEnvelope::Success(to_value_lossy(value)),
            ResultEnvelope::Fault(fault) => ResultEnvelope::Fault(fault.clone()),
        };
        ResponseContext {
            request: self.request.to_untyped(),
            envelope,
            runtime: self.runtime,
        }
    }
}

fn to_value_lossy<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Payload could not be summarised for audit");
        Value::Null
    })
}
