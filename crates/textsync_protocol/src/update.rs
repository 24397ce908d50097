//! Updates and client identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::ChangeSet;

/// Opaque identifier of an editing client.
///
/// The reconciler compares it against the origin of remote updates to
/// recognise a client's own, now confirmed, changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One editing transaction together with the client it originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Originating client.
    pub client_id: ClientId,
    /// The transaction's changes.
    pub changes: ChangeSet,
}

impl Update {
    /// Creates a new update.
    pub fn new(client_id: ClientId, changes: ChangeSet) -> Self {
        Self { client_id, changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn client_id_display() {
        let id = ClientId::from("editor-1");
        assert_eq!(id.to_string(), "editor-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"editor-1\"");
    }
}
