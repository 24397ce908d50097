//! The editing surface as seen by a sync session.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use textsync_protocol::{ChangeSet, Update};
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::session::SessionShared;
use crate::transport::ConnectionState;

/// Capability a sync session needs from the editor presenting the document.
///
/// All calls are made from the session's tasks; `apply_remote_change_set` is
/// called while the session's replica is locked, so implementations must not
/// call back into the registered [`LocalChangeSink`] from it.
pub trait EditorSurface: Send + Sync {
    /// Switches the "read-only until ready" mode.
    fn set_read_only(&self, read_only: bool);

    /// Replaces the whole content with the authority's snapshot.
    fn load_document(&self, doc: &str, version: u64);

    /// Applies reconciled remote changes to the presented content.
    fn apply_remote_change_set(&self, changes: &ChangeSet);

    /// Registers the callback local edits are reported to.
    fn on_local_change(&self, sink: LocalChangeSink);

    /// Drops the registered callback.
    fn clear_local_change(&self);

    /// Connectivity signal for display purposes.
    fn connection_changed(&self, _state: ConnectionState) {}

    /// A recoverable sync fault occurred.
    fn sync_fault(&self, _error: &SyncError) {}
}

/// Callback handed to the surface on attach.
///
/// Local edits must be reported synchronously, before the surface shows them.
/// Once the session is detached every call fails with [`SyncError::Detached`].
#[derive(Clone)]
pub struct LocalChangeSink {
    session: Weak<SessionShared>,
}

impl LocalChangeSink {
    pub(crate) fn new(session: Weak<SessionShared>) -> Self {
        Self { session }
    }

    fn session(&self) -> SyncResult<Arc<SessionShared>> {
        self.session
            .upgrade()
            .filter(|session| !session.is_stopped())
            .ok_or(SyncError::Detached)
    }

    /// Reports a content-changing transaction and triggers a push attempt.
    pub fn apply_local(&self, changes: ChangeSet) -> SyncResult<()> {
        self.session()?.apply_local(changes)
    }

    /// Reports a transaction that did not change the content.
    pub fn notify_transaction(&self) {
        if let Ok(session) = self.session() {
            session.request_push();
        }
    }

    /// Local updates the authority has not confirmed yet.
    pub fn pending(&self) -> Vec<Update> {
        self.session()
            .map(|session| session.pending())
            .unwrap_or_default()
    }

    /// Returns true while the session accepts edits.
    pub fn is_attached(&self) -> bool {
        self.session().is_ok()
    }
}

impl fmt::Debug for LocalChangeSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChangeSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    text: String,
    version: Option<u64>,
    read_only: bool,
    detached: bool,
    connection: Option<ConnectionState>,
    remote_changes: usize,
    faults: Vec<String>,
}

/// Headless in-memory editor.
///
/// Keeps its own copy of the text, fed only through the [`EditorSurface`]
/// calls and its editing methods, so tests can check it against the replica.
#[derive(Debug, Default)]
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
    sink: Mutex<Option<LocalChangeSink>>,
}

impl MemorySurface {
    /// Creates an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the presented text.
    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    /// Returns the presented text length in characters.
    pub fn len(&self) -> usize {
        self.state.lock().text.chars().count()
    }

    /// Returns true if the presented text is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().text.is_empty()
    }

    /// Returns the version of the loaded snapshot.
    pub fn loaded_version(&self) -> Option<u64> {
        self.state.lock().version
    }

    /// Returns true while edits are refused.
    pub fn is_read_only(&self) -> bool {
        self.state.lock().read_only
    }

    /// Returns the last connectivity signal.
    pub fn connection(&self) -> Option<ConnectionState> {
        self.state.lock().connection
    }

    /// Returns how many remote change sets were applied.
    pub fn remote_changes(&self) -> usize {
        self.state.lock().remote_changes
    }

    /// Returns the messages of every reported sync fault.
    pub fn faults(&self) -> Vec<String> {
        self.state.lock().faults.clone()
    }

    /// Unconfirmed local updates, as reported by the session.
    pub fn pending_local_change_sets(&self) -> Vec<Update> {
        self.sink
            .lock()
            .as_ref()
            .map(LocalChangeSink::pending)
            .unwrap_or_default()
    }

    /// Applies a local edit.
    pub fn edit(&self, changes: ChangeSet) -> SyncResult<()> {
        let sink = self.sink_for_edit()?;
        sink.apply_local(changes.clone())?;

        let mut state = self.state.lock();
        state.text = changes.apply(&state.text)?;
        Ok(())
    }

    /// Inserts `text` at `at`.
    pub fn insert(&self, at: usize, text: &str) -> SyncResult<()> {
        let changes = ChangeSet::insert(self.len(), at, text)?;
        self.edit(changes)
    }

    /// Deletes `count` characters at `at`.
    pub fn delete(&self, at: usize, count: usize) -> SyncResult<()> {
        let changes = ChangeSet::delete(self.len(), at, count)?;
        self.edit(changes)
    }

    /// A transaction without content changes, such as a selection move.
    pub fn touch(&self) -> SyncResult<()> {
        self.sink_for_edit()?.notify_transaction();
        Ok(())
    }

    fn sink_for_edit(&self) -> SyncResult<LocalChangeSink> {
        {
            let state = self.state.lock();
            if state.detached {
                return Err(SyncError::Detached);
            }
            if state.read_only {
                return Err(SyncError::NotReady);
            }
        }
        self.sink.lock().clone().ok_or(SyncError::NotReady)
    }
}

impl EditorSurface for MemorySurface {
    fn set_read_only(&self, read_only: bool) {
        self.state.lock().read_only = read_only;
    }

    fn load_document(&self, doc: &str, version: u64) {
        let mut state = self.state.lock();
        state.text = doc.to_owned();
        state.version = Some(version);
        state.detached = false;
    }

    fn apply_remote_change_set(&self, changes: &ChangeSet) {
        let mut state = self.state.lock();
        match changes.apply(&state.text) {
            Ok(text) => {
                state.text = text;
                state.remote_changes += 1;
            }
            Err(err) => {
                warn!(error = %err, "surface out of step with replica");
                state.faults.push(err.to_string());
            }
        }
    }

    fn on_local_change(&self, sink: LocalChangeSink) {
        *self.sink.lock() = Some(sink);
    }

    fn clear_local_change(&self) {
        self.sink.lock().take();
        let mut state = self.state.lock();
        state.detached = true;
        state.read_only = true;
    }

    fn connection_changed(&self, state: ConnectionState) {
        self.state.lock().connection = Some(state);
    }

    fn sync_fault(&self, error: &SyncError) {
        self.state.lock().faults.push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_need_a_session() {
        let surface = MemorySurface::new();
        surface.load_document("abc", 0);
        assert!(matches!(surface.insert(0, "x"), Err(SyncError::NotReady)));
        assert_eq!(surface.text(), "abc");
    }

    #[test]
    fn read_only_refuses_edits() {
        let surface = MemorySurface::new();
        surface.set_read_only(true);
        assert!(matches!(surface.touch(), Err(SyncError::NotReady)));
    }

    #[test]
    fn dangling_sink_is_detached() {
        let sink = LocalChangeSink::new(Weak::new());
        assert!(!sink.is_attached());
        assert!(sink.pending().is_empty());
        assert!(matches!(
            sink.apply_local(ChangeSet::identity(0)),
            Err(SyncError::Detached)
        ));
    }

    #[test]
    fn remote_changes_apply() {
        let surface = MemorySurface::new();
        surface.load_document("abc", 5);
        surface.apply_remote_change_set(&ChangeSet::insert(3, 0, "X").unwrap());

        assert_eq!(surface.text(), "Xabc");
        assert_eq!(surface.remote_changes(), 1);
        assert_eq!(surface.loaded_version(), Some(5));
    }

    #[test]
    fn mismatched_remote_changes_are_reported() {
        let surface = MemorySurface::new();
        surface.load_document("abc", 0);
        surface.apply_remote_change_set(&ChangeSet::insert(8, 0, "X").unwrap());

        assert_eq!(surface.text(), "abc");
        assert_eq!(surface.faults().len(), 1);
    }
}
