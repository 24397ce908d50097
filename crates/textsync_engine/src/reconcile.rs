//! Reconciliation of remote updates with unconfirmed local ones.

use textsync_protocol::{ChangeSet, ClientId, ProtocolResult, Update};

/// Outcome of reconciling one batch of remote updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Changes to apply to the local document, if its content changes.
    pub changes: Option<ChangeSet>,
    /// Pending local updates, rebased onto the new version.
    pub pending: Vec<Update>,
    /// How many pending updates the batch confirmed.
    pub confirmed: usize,
}

/// Merges remote updates into a replica that has unconfirmed local edits.
///
/// `pending` is based on the client's current version and `remote` holds the
/// updates accepted from that version on, in order. Implementations must not
/// lose or duplicate any inserted character.
pub trait Reconciler: Send + Sync {
    /// Reconciles `remote` with `pending`.
    fn reconcile(
        &self,
        client_id: &ClientId,
        pending: &[Update],
        remote: &[Update],
    ) -> ProtocolResult<Reconciled>;
}

/// Rebase-based reconciler.
///
/// Remote updates from this client that line up with the head of the pending
/// queue are confirmations and drop out of it. Foreign updates are composed
/// and the remaining pending updates are rebased over them, with the remote
/// side winning ties at equal positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rebase;

impl Reconciler for Rebase {
    fn reconcile(
        &self,
        client_id: &ClientId,
        pending: &[Update],
        remote: &[Update],
    ) -> ProtocolResult<Reconciled> {
        let mut own = 0;
        let mut changes: Option<ChangeSet> = None;

        for update in remote {
            let confirms = own < pending.len() && update.client_id == *client_id;
            if confirms {
                if let Some(foreign) = changes {
                    changes = Some(foreign.map(&pending[own].changes, true)?);
                }
                own += 1;
            } else {
                changes = Some(match changes {
                    Some(foreign) => foreign.compose(&update.changes)?,
                    None => update.changes.clone(),
                });
            }
        }

        let mut rest = pending[own..].to_vec();
        if let Some(mut foreign) = changes.take() {
            for update in &mut rest {
                let rebased = update.changes.map(&foreign, false)?;
                foreign = foreign.map(&update.changes, true)?;
                update.changes = rebased;
            }
            changes = Some(foreign);
        }

        Ok(Reconciled {
            changes,
            pending: rest,
            confirmed: own,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(client: &str, changes: ChangeSet) -> Update {
        Update::new(client.into(), changes)
    }

    #[test]
    fn confirmations_drop_out() {
        let me = ClientId::new("me");
        let mine = update("me", ChangeSet::insert(12, 8, " ").unwrap());

        let result = Rebase
            .reconcile(&me, std::slice::from_ref(&mine), std::slice::from_ref(&mine))
            .unwrap();

        assert_eq!(result.changes, None);
        assert!(result.pending.is_empty());
        assert_eq!(result.confirmed, 1);
    }

    #[test]
    fn foreign_updates_rebase_pending() {
        let me = ClientId::new("b");
        let local = "abcY";
        let pending = vec![update("b", ChangeSet::insert(3, 3, "Y").unwrap())];
        let remote = vec![update("a", ChangeSet::insert(3, 0, "X").unwrap())];

        let result = Rebase.reconcile(&me, &pending, &remote).unwrap();

        let changes = result.changes.unwrap();
        assert_eq!(changes.apply(local).unwrap(), "XabcY");
        assert_eq!(result.pending.len(), 1);
        assert_eq!(result.pending[0].changes.apply("Xabc").unwrap(), "XabcY");
        assert_eq!(result.confirmed, 0);
    }

    #[test]
    fn remote_wins_ties() {
        let me = ClientId::new("b");
        let pending = vec![update("b", ChangeSet::insert(3, 0, "Y").unwrap())];
        let remote = vec![update("a", ChangeSet::insert(3, 0, "X").unwrap())];

        let result = Rebase.reconcile(&me, &pending, &remote).unwrap();

        assert_eq!(result.changes.unwrap().apply("Yabc").unwrap(), "XYabc");
        assert_eq!(result.pending[0].changes.apply("Xabc").unwrap(), "XYabc");
    }

    #[test]
    fn confirmation_after_foreign_update() {
        let me = ClientId::new("b");
        let pending = vec![
            update("b", ChangeSet::insert(3, 3, "Y").unwrap()),
            update("b", ChangeSet::insert(4, 0, "Z").unwrap()),
        ];
        let remote = vec![
            update("a", ChangeSet::insert(3, 0, "X").unwrap()),
            update("b", ChangeSet::insert(4, 4, "Y").unwrap()),
        ];

        let result = Rebase.reconcile(&me, &pending, &remote).unwrap();

        assert_eq!(result.confirmed, 1);
        assert_eq!(result.pending.len(), 1);
        // Local "ZabcY"; the authority is at "XabcY".
        assert_eq!(result.changes.unwrap().apply("ZabcY").unwrap(), "XZabcY");
        assert_eq!(result.pending[0].changes.apply("XabcY").unwrap(), "XZabcY");
    }

    #[test]
    fn misaligned_remote_is_malformed() {
        let me = ClientId::new("b");
        let pending = vec![update("b", ChangeSet::insert(3, 0, "Y").unwrap())];
        let remote = vec![update("a", ChangeSet::insert(10, 0, "X").unwrap())];

        let err = Rebase.reconcile(&me, &pending, &remote).unwrap_err();
        assert!(err.is_malformed());
    }
}
