use thiserror::Error;

/// Errors raised while declaring operations and attaching sinks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Operation already registered: {0}")]
    DuplicateOperation(String),

    #[error("Operation not registered with this dispatcher: {0}")]
    UnknownOperation(String),

    #[error("Invalid log file template: {0}")]
    InvalidTemplate(String),
}

/// Failure of a single sink invocation.
///
/// Never surfaced to the business caller; the dispatcher reports it on the
/// fallback diagnostic channel.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink queue full, record dropped: {0}")]
    Overflow(String),

    #[error("Sink closed: {0}")]
    Closed(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl SinkError {
    /// Whether a retry of the same write may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
            ),
            SinkError::Transport(_) => true,
            SinkError::Serialization(_) | SinkError::Overflow(_) | SinkError::Closed(_) => false,
        }
    }
}

/// Failure reported by a business handler instead of an envelope.
#[derive(Debug, Error, Clone)]
pub enum HandlerError {
    #[error("Validation: {0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(SinkError::Transport("connection reset".into()).is_transient());
        assert!(!SinkError::Overflow("network".into()).is_transient());
        assert!(!SinkError::Closed("network".into()).is_transient());
    }

    #[test]
    fn io_error_kind_decides_transience() {
        let timed_out = SinkError::from(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(timed_out.is_transient());

        let denied = SinkError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!denied.is_transient());
    }
}
