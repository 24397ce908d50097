//! Canonical document and its update log.

use crate::error::{ServerError, ServerResult};
use textsync_protocol::wire::{self, WireUpdate};

/// The authority's copy of the document.
///
/// The log maintains:
/// - Every accepted update in acceptance order
/// - The document text with all of them applied
///
/// The version is the number of accepted updates.
#[derive(Debug, Clone)]
pub struct DocumentLog {
    doc: String,
    updates: Vec<WireUpdate>,
}

impl DocumentLog {
    /// Creates a log at version 0.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            doc: initial.into(),
            updates: Vec::new(),
        }
    }

    /// Returns the current version.
    pub fn version(&self) -> u64 {
        self.updates.len() as u64
    }

    /// Returns the current document text.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Returns the updates accepted at or after `version`.
    pub fn updates_since(&self, version: u64) -> ServerResult<Vec<WireUpdate>> {
        let current = self.version();
        if version > current {
            return Err(ServerError::VersionAhead {
                requested: version,
                current,
            });
        }
        Ok(self.updates[version as usize..].to_vec())
    }

    /// Appends a batch computed against `version`.
    ///
    /// The batch is applied to a copy of the document first; a malformed
    /// update leaves the log untouched. Returns the new version.
    pub fn append(&mut self, version: u64, updates: Vec<WireUpdate>) -> ServerResult<u64> {
        let current = self.version();
        if version != current {
            return Err(ServerError::StaleVersion {
                expected: current,
                actual: version,
            });
        }

        let mut doc = self.doc.clone();
        for update in &updates {
            let update = wire::deserialize(update)?;
            doc = update.changes.apply(&doc)?;
        }

        self.doc = doc;
        self.updates.extend(updates);
        Ok(self.version())
    }

    /// Returns the number of accepted updates.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Returns true if no update has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textsync_protocol::{ChangeSet, Update, WireChangeSet};

    fn insert(doc_len: usize, at: usize, text: &str) -> WireUpdate {
        wire::serialize(&Update::new(
            "c".into(),
            ChangeSet::insert(doc_len, at, text).unwrap(),
        ))
    }

    #[test]
    fn empty_log() {
        let log = DocumentLog::new("abc");
        assert_eq!(log.version(), 0);
        assert_eq!(log.doc(), "abc");
        assert!(log.is_empty());
        assert!(log.updates_since(0).unwrap().is_empty());
    }

    #[test]
    fn append_updates() {
        let mut log = DocumentLog::new("abc");
        let version = log
            .append(0, vec![insert(3, 0, "X"), insert(4, 4, "Y")])
            .unwrap();

        assert_eq!(version, 2);
        assert_eq!(log.doc(), "XabcY");
        assert_eq!(log.updates_since(1).unwrap().len(), 1);
    }

    #[test]
    fn stale_version() {
        let mut log = DocumentLog::new("abc");
        log.append(0, vec![insert(3, 0, "X")]).unwrap();

        let err = log.append(0, vec![insert(3, 3, "Y")]).unwrap_err();
        assert_eq!(
            err,
            ServerError::StaleVersion {
                expected: 1,
                actual: 0
            }
        );
        assert_eq!(log.doc(), "Xabc");
    }

    #[test]
    fn malformed_batch_is_not_partially_applied() {
        let mut log = DocumentLog::new("abc");
        let out_of_range = WireUpdate {
            client_id: "c".into(),
            changes: serde_json::from_str::<WireChangeSet>("[10, [0, \"z\"]]").unwrap(),
        };

        let err = log.append(0, vec![insert(3, 0, "X"), out_of_range]);
        assert!(matches!(err, Err(ServerError::Protocol(_))));
        assert_eq!(log.version(), 0);
        assert_eq!(log.doc(), "abc");
    }

    #[test]
    fn version_ahead() {
        let log = DocumentLog::new("");
        assert!(matches!(
            log.updates_since(3),
            Err(ServerError::VersionAhead {
                requested: 3,
                current: 0
            })
        ));
    }
}
