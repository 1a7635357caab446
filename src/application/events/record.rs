//! Flat, serialisable audit record, one per event.
//!
//! This is the line written by the disk sink, the message published on the
//! push stream and the payload handed to network transports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::types::{AuditEvent, Direction};
use crate::domain::{Outcome, ResultEnvelope};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub call_id: Uuid,
    pub operation: String,
    pub direction: Direction,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Request payload for request events, envelope for response events.
    pub payload_summary: Value,
}

impl AuditRecord {
    pub fn from_event(event: &AuditEvent<'_>) -> Self {
        let request = event.request();
        let mut record = Self {
            timestamp: event.timestamp(),
            call_id: request.call_id,
            operation: event.operation().name.clone(),
            direction: event.direction(),
            sender: request.sender.to_string(),
            runtime_ms: None,
            outcome: None,
            payload_summary: Value::Null,
        };

        match event {
            AuditEvent::Request { context, .. } => {
                record.payload_summary = context.request.clone();
            }
            AuditEvent::Response { context, .. } => {
                record.runtime_ms = Some(u64::try_from(context.runtime.as_millis()).unwrap_or(u64::MAX));
                record.outcome = Some(context.envelope.outcome());
                record.payload_summary = match &context.envelope {
                    ResultEnvelope::Success(value) => value.clone(),
                    ResultEnvelope::Fault(fault) => {
                        serde_json::to_value(fault).unwrap_or(Value::Null)
                    }
                };
            }
        }

        record
    }

    /// Single-line JSON with trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::events::types::{OperationInfo, TagSet};
    use crate::domain::{Fault, FaultCode, RequestContext, ResponseContext, SenderIdentity};

    fn operation() -> OperationInfo {
        OperationInfo {
            name: "AuthorizeRemoteStop".into(),
            tags: TagSet::from_iter(["remote-stop"]),
        }
    }

    #[test]
    fn request_record_has_no_outcome() {
        let op = operation();
        let ctx = RequestContext::new(SenderIdentity::new("hub"), serde_json::json!({"SessionID": "s-1"}));
        let record = AuditRecord::from_event(&AuditEvent::Request {
            operation: &op,
            context: &ctx,
        });

        assert_eq!(record.direction, Direction::Request);
        assert_eq!(record.outcome, None);
        assert_eq!(record.runtime_ms, None);
        assert_eq!(record.payload_summary["SessionID"], "s-1");

        let line = record.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(!line.contains("runtime_ms"));
    }

    #[test]
    fn response_record_carries_runtime_and_outcome() {
        let op = operation();
        let ctx = ResponseContext {
            request: RequestContext::new(SenderIdentity::new("hub"), Value::Null),
            envelope: Fault::new(FaultCode::InternalFault, "boom").into(),
            runtime: Duration::from_millis(42),
        };
        let record = AuditRecord::from_event(&AuditEvent::Response {
            operation: &op,
            context: &ctx,
        });

        assert_eq!(record.direction, Direction::Response);
        assert_eq!(record.runtime_ms, Some(42));
        assert_eq!(record.outcome, Some(Outcome::Fault));
        assert_eq!(record.payload_summary["code"], "InternalFault");

        let parsed: AuditRecord = serde_json::from_str(record.to_line().unwrap().trim_end()).unwrap();
        assert_eq!(parsed, record);
    }
}
