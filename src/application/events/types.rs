//! Audit event types: directions, tag sets and the event view sinks receive.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{RequestContext, ResponseContext};

/// Tag that matches every event of an operation+direction.
pub const ALL_TAG: &str = "all";

/// Which phase of a call an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of classification tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set containing only [`ALL_TAG`].
    pub fn all() -> Self {
        Self::from_iter([ALL_TAG])
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Sink-side filter: fires when this set holds [`ALL_TAG`] or shares at
    /// least one tag with the event.
    pub fn matches(&self, event_tags: &TagSet) -> bool {
        self.contains(ALL_TAG) || self.0.iter().any(|tag| event_tags.0.contains(tag))
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|t| Into::<String>::into(t).trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", tags.join(", "))
    }
}

/// Declared operation: name plus the tags every one of its events carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub name: String,
    pub tags: TagSet,
}

impl OperationInfo {
    /// Most specific tag, used to name log files: the longest tag other than
    /// `all`, falling back to the operation name.
    pub fn primary_tag(&self) -> &str {
        self.tags
            .iter()
            .filter(|t| *t != ALL_TAG)
            .max_by_key(|t| t.len())
            .unwrap_or(self.name.as_str())
    }
}

/// What a sink sees: the operation plus the full, untyped call context.
#[derive(Debug, Clone, Copy)]
pub enum AuditEvent<'a> {
    Request {
        operation: &'a OperationInfo,
        context: &'a RequestContext<Value>,
    },
    Response {
        operation: &'a OperationInfo,
        context: &'a ResponseContext<Value, Value>,
    },
}

impl<'a> AuditEvent<'a> {
    pub fn operation(&self) -> &'a OperationInfo {
        match self {
            Self::Request { operation, .. } | Self::Response { operation, .. } => operation,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Request { .. } => Direction::Request,
            Self::Response { .. } => Direction::Response,
        }
    }

    pub fn request(&self) -> &'a RequestContext<Value> {
        match self {
            Self::Request { context, .. } => context,
            Self::Response { context, .. } => &context.request,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.request().call_id
    }

    /// Request arrival time for request events, completion time for responses.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Request { context, .. } => context.timestamp,
            Self::Response { context, .. } => context.completed_at(),
        }
    }
}
