//! Success/fault outcome container produced once per call.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use super::error::HandlerError;

/// Classification of a fault returned to the transport.
///
/// Sink failures have no code here: they are reported through
/// [`SinkError`](super::error::SinkError) and never reach an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultCode {
    /// Malformed or missing mandatory request fields.
    ValidationFault,
    /// The business handler reported a downstream dependency failure.
    UpstreamFault,
    /// The handler exceeded its time bound.
    TimeoutFault,
    /// The transport cancelled the call.
    CancelledFault,
    /// Unexpected failure inside the handler or the pipeline.
    InternalFault,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFault => "ValidationFault",
            Self::UpstreamFault => "UpstreamFault",
            Self::TimeoutFault => "TimeoutFault",
            Self::CancelledFault => "CancelledFault",
            Self::InternalFault => "InternalFault",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Structured fault: code, human readable description, optional field errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub code: FaultCode,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl Fault {
    pub fn new(code: FaultCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn timeout(bound: std::time::Duration) -> Self {
        Self::new(
            FaultCode::TimeoutFault,
            format!("Handler did not complete within {} ms", bound.as_millis()),
        )
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(FaultCode::CancelledFault, reason)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultCode::InternalFault, message)
    }

    /// Build a `ValidationFault` listing every failing field.
    pub fn from_validation(errors: &ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| FieldError {
                    field: field.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        // HashMap iteration order is unstable
        details.sort_by(|a, b| a.field.cmp(&b.field));

        let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();
        let description = if fields.is_empty() {
            "Request validation failed".to_string()
        } else {
            format!("Request validation failed: {}", fields.join(", "))
        };

        Self::new(FaultCode::ValidationFault, description).with_details(details)
    }
}

impl From<HandlerError> for Fault {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Validation(msg) => Fault::new(FaultCode::ValidationFault, msg),
            HandlerError::Upstream(msg) => Fault::new(FaultCode::UpstreamFault, msg),
            HandlerError::Internal(msg) => Fault::new(FaultCode::InternalFault, msg),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Coarse outcome used in audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Fault,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fault => "fault",
        }
    }
}

/// Result of one call: exactly one of success payload or fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultEnvelope<T> {
    Success(T),
    Fault(Fault),
}

impl<T> ResultEnvelope<T> {
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    pub fn fault(code: FaultCode, description: impl Into<String>) -> Self {
        Self::Fault(Fault::new(code, description))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Success(_) => Outcome::Success,
            Self::Fault(_) => Outcome::Fault,
        }
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Success(_) => None,
            Self::Fault(fault) => Some(fault),
        }
    }

    pub fn fault_code(&self) -> Option<FaultCode> {
        self.as_fault().map(|f| f.code)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultEnvelope<U> {
        match self {
            Self::Success(value) => ResultEnvelope::Success(f(value)),
            Self::Fault(fault) => ResultEnvelope::Fault(fault),
        }
    }

    pub fn into_result(self) -> Result<T, Fault> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Fault(fault) => Err(fault),
        }
    }
}

impl<T> From<Fault> for ResultEnvelope<T> {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}
