//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding or applying change sets and messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A change set failed to decode or targets positions outside the document.
    #[error("malformed change set: {reason}")]
    MalformedChangeSet {
        /// Description of what was wrong.
        reason: String,
    },

    /// Two change sets (or a change set and a document) disagree on length.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Length the operation required.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// Message framing could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ProtocolError {
    /// Creates a malformed change set error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedChangeSet {
            reason: reason.into(),
        }
    }

    /// Returns true if the error means a change set cannot be applied as given.
    ///
    /// Length mismatches are reported as malformed change sets by the sync layer:
    /// a remote change set whose spans do not cover the local base document
    /// addresses out-of-range positions.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedChangeSet { .. } | ProtocolError::LengthMismatch { .. }
        )
    }
}
