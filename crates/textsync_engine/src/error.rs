//! Error types for the sync engine.

use std::time::Duration;

use textsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A change set failed to decode or addresses positions outside the document.
    #[error("malformed change set: {0}")]
    MalformedChangeSet(String),

    /// The authority rejected a push computed against an outdated version.
    #[error("push against version {version} was rejected as stale")]
    StaleBaseVersion {
        /// Base version the batch was computed against.
        version: u64,
    },

    /// The channel dropped or a request did not resolve.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The initial document fetch did not complete in time.
    #[error("document fetch did not complete within {0:?}")]
    AttachTimeout(Duration),

    /// No document baseline is known yet.
    #[error("session is not ready")]
    NotReady,

    /// The session was detached.
    #[error("session detached")]
    Detached,

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The authority answered with an error.
    #[error("server error: {0}")]
    Server(String),
}

impl SyncError {
    /// Returns true if this error can be retried.
    ///
    /// The pull and push loops stop on the first fault that is not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::MalformedChangeSet(_) => true,
            SyncError::StaleBaseVersion { .. } => true,
            SyncError::TransportUnavailable(_) => true,
            SyncError::Server(_) => true,
            SyncError::Protocol(_) => true,
            SyncError::AttachTimeout(_) | SyncError::NotReady | SyncError::Detached => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        if err.is_malformed() {
            SyncError::MalformedChangeSet(err.to_string())
        } else {
            SyncError::Protocol(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::TransportUnavailable("connection lost".into()).is_retryable());
        assert!(SyncError::StaleBaseVersion { version: 5 }.is_retryable());
        assert!(SyncError::MalformedChangeSet("bad".into()).is_retryable());
        assert!(SyncError::Protocol("unexpected reply".into()).is_retryable());
        assert!(!SyncError::NotReady.is_retryable());
        assert!(!SyncError::Detached.is_retryable());
        assert!(!SyncError::AttachTimeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SyncError = ProtocolError::LengthMismatch {
            expected: 3,
            actual: 9,
        }
        .into();
        assert!(matches!(err, SyncError::MalformedChangeSet(_)));

        let err: SyncError = ProtocolError::Codec("eof".into()).into();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn error_display() {
        let err = SyncError::StaleBaseVersion { version: 5 };
        assert_eq!(err.to_string(), "push against version 5 was rejected as stale");
    }
}
