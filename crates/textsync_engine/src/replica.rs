//! Local replica of the shared document.

use crate::cursor::VersionCursor;
use crate::error::SyncResult;
use crate::reconcile::Reconciler;
use textsync_protocol::{ChangeSet, ClientId, Update};

/// Result of folding a batch of remote updates into the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Changes applied to the local text, if any.
    pub applied: Option<ChangeSet>,
    /// Number of pending updates confirmed by the batch.
    pub confirmed: usize,
    /// Version after the batch.
    pub version: u64,
}

/// A client's copy of the document.
///
/// Owns the text, the [`VersionCursor`] and the pending (unconfirmed) local
/// updates. The text always equals the document at the cursor's version with
/// every pending update applied.
#[derive(Debug, Clone)]
pub struct Replica {
    client_id: ClientId,
    text: String,
    cursor: VersionCursor,
    pending: Vec<Update>,
}

impl Replica {
    /// Creates a replica from an authority snapshot.
    pub fn new(client_id: ClientId, doc: impl Into<String>, version: u64) -> Self {
        Self {
            client_id,
            text: doc.into(),
            cursor: VersionCursor::new(version),
            pending: Vec::new(),
        }
    }

    /// Returns the client id stamped on local updates.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Returns the current text, pending edits included.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the last version fully incorporated.
    pub fn version(&self) -> u64 {
        self.cursor.current()
    }

    /// Returns the unconfirmed local updates.
    pub fn pending(&self) -> &[Update] {
        &self.pending
    }

    /// Returns a snapshot of every pending update, oldest first.
    pub fn sendable(&self) -> Vec<Update> {
        self.pending.clone()
    }

    /// Applies a local transaction.
    ///
    /// Transactions that do not change the content are not queued.
    pub fn apply_local(&mut self, changes: ChangeSet) -> SyncResult<()> {
        self.text = changes.apply(&self.text)?;
        if !changes.is_empty() {
            self.pending
                .push(Update::new(self.client_id.clone(), changes));
        }
        Ok(())
    }

    /// Folds remote updates accepted at and after the current version.
    ///
    /// All or nothing: on error the text, the pending updates and the cursor
    /// are left untouched.
    pub fn receive(
        &mut self,
        updates: &[Update],
        reconciler: &dyn Reconciler,
    ) -> SyncResult<Received> {
        if updates.is_empty() {
            return Ok(Received {
                applied: None,
                confirmed: 0,
                version: self.version(),
            });
        }

        let reconciled = reconciler.reconcile(&self.client_id, &self.pending, updates)?;
        let text = match &reconciled.changes {
            Some(changes) => Some(changes.apply(&self.text)?),
            None => None,
        };

        if let Some(text) = text {
            self.text = text;
        }
        self.pending = reconciled.pending;
        self.cursor.advance_by(updates.len() as u64);

        Ok(Received {
            applied: reconciled.changes,
            confirmed: reconciled.confirmed,
            version: self.version(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::reconcile::Rebase;

    #[test]
    fn local_edits_queue_updates() {
        let mut replica = Replica::new("me".into(), "int main(){}", 3);
        replica
            .apply_local(ChangeSet::insert(12, 8, " ").unwrap())
            .unwrap();

        assert_eq!(replica.text(), "int main() {}");
        assert_eq!(replica.version(), 3);
        assert_eq!(replica.sendable().len(), 1);
    }

    #[test]
    fn identity_edits_are_not_queued() {
        let mut replica = Replica::new("me".into(), "abc", 0);
        replica.apply_local(ChangeSet::identity(3)).unwrap();
        assert!(replica.pending().is_empty());
    }

    #[test]
    fn local_edit_must_fit() {
        let mut replica = Replica::new("me".into(), "abc", 0);
        let err = replica
            .apply_local(ChangeSet::insert(5, 0, "x").unwrap())
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedChangeSet(_)));
        assert_eq!(replica.text(), "abc");
    }

    #[test]
    fn receiving_own_update_confirms_it() {
        let mut replica = Replica::new("me".into(), "int main(){}", 3);
        replica
            .apply_local(ChangeSet::insert(12, 8, " ").unwrap())
            .unwrap();
        let sent = replica.sendable();

        let received = replica.receive(&sent, &Rebase).unwrap();

        assert_eq!(received.confirmed, 1);
        assert_eq!(received.applied, None);
        assert_eq!(replica.version(), 4);
        assert_eq!(replica.text(), "int main() {}");
        assert!(replica.pending().is_empty());
    }

    #[test]
    fn malformed_batch_changes_nothing() {
        let mut replica = Replica::new("me".into(), "abc", 5);
        replica
            .apply_local(ChangeSet::insert(3, 3, "Y").unwrap())
            .unwrap();

        let bad = vec![
            Update::new("a".into(), ChangeSet::insert(3, 0, "X").unwrap()),
            Update::new("a".into(), ChangeSet::delete(40, 0, 2).unwrap()),
        ];
        let err = replica.receive(&bad, &Rebase).unwrap_err();

        assert!(matches!(err, SyncError::MalformedChangeSet(_)));
        assert_eq!(replica.version(), 5);
        assert_eq!(replica.text(), "abcY");
        assert_eq!(replica.pending().len(), 1);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut replica = Replica::new("me".into(), "abc", 2);
        let received = replica.receive(&[], &Rebase).unwrap();
        assert_eq!(received.version, 2);
        assert_eq!(replica.version(), 2);
    }
}
