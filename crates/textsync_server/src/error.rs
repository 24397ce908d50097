//! Error types for the authority.

use textsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the authority.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A push was computed against a version other than the current one.
    #[error("stale version: expected {expected}, got {actual}")]
    StaleVersion {
        /// Current version of the log.
        expected: u64,
        /// Version the client sent.
        actual: u64,
    },

    /// A pull asked for a version the log has not reached.
    #[error("version {requested} is ahead of the log (at {current})")]
    VersionAhead {
        /// Requested version.
        requested: u64,
        /// Current version of the log.
        current: u64,
    },

    /// An update could not be decoded or applied.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_convert() {
        let err = ServerError::from(ProtocolError::malformed("x"));
        assert!(matches!(err, ServerError::Protocol(_)));
        assert!(err.to_string().starts_with("protocol error:"));
    }

    #[test]
    fn error_display() {
        let err = ServerError::StaleVersion {
            expected: 6,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("6"));
        assert!(msg.contains("5"));

        let err = ServerError::VersionAhead {
            requested: 9,
            current: 4,
        };
        assert_eq!(err.to_string(), "version 9 is ahead of the log (at 4)");
    }
}
