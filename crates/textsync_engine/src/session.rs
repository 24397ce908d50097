//! Sync Session: one document, one replica, one Pull Loop and one Push Loop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use textsync_protocol::{wire, ChangeSet, ClientId, DocumentSnapshot, PullResponse, Update};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SyncError, SyncResult};
use crate::pull::{self, PullState};
use crate::push;
use crate::reconcile::{Rebase, Reconciler};
use crate::replica::{Received, Replica};
use crate::surface::{EditorSurface, LocalChangeSink};
use crate::transport::{ConnectionState, SyncTransport};

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Last connectivity signal from the transport.
    pub connection: ConnectionState,
    /// Version Cursor value.
    pub version: u64,
    /// Number of unconfirmed local updates.
    pub pending: usize,
    /// Current Pull Loop state.
    pub pull_state: PullState,
    /// Whether a push is outstanding.
    pub push_in_flight: bool,
    /// Number of recoverable faults so far.
    pub faults: u64,
}

/// State shared by the session handle, its tasks and the surface's sink.
pub(crate) struct SessionShared {
    pub(crate) config: SessionConfig,
    pub(crate) transport: Arc<dyn SyncTransport>,
    surface: Arc<dyn EditorSurface>,
    reconciler: Arc<dyn Reconciler>,
    replica: Mutex<Replica>,
    stopped: AtomicBool,
    shutdown: watch::Sender<bool>,
    push_trigger: Notify,
    push_in_flight: AtomicBool,
    pull_state: RwLock<PullState>,
    connection: RwLock<ConnectionState>,
    faults: AtomicU64,
}

impl SessionShared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn client_id(&self) -> &ClientId {
        &self.config.client_id
    }

    pub(crate) fn version(&self) -> u64 {
        self.replica.lock().version()
    }

    pub(crate) fn pending(&self) -> Vec<Update> {
        self.replica.lock().sendable()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.replica.lock().pending().is_empty()
    }

    /// Version and pending updates, read together.
    pub(crate) fn sendable(&self) -> (u64, Vec<Update>) {
        let replica = self.replica.lock();
        (replica.version(), replica.sendable())
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Direct local-edit path. Never suspends.
    pub(crate) fn apply_local(&self, changes: ChangeSet) -> SyncResult<()> {
        self.replica.lock().apply_local(changes)?;
        self.request_push();
        Ok(())
    }

    pub(crate) fn request_push(&self) {
        self.push_trigger.notify_one();
    }

    pub(crate) async fn push_requested(&self) {
        self.push_trigger.notified().await;
    }

    pub(crate) fn begin_push(&self) -> bool {
        !self.push_in_flight.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn end_push(&self) {
        self.push_in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn set_pull_state(&self, state: PullState) {
        let mut current = self.pull_state.write();
        if *current != PullState::Stopped {
            *current = state;
        }
    }

    pub(crate) fn stop_pull(&self) {
        *self.pull_state.write() = PullState::Stopped;
    }

    /// Folds one pull response into the replica and shows the result.
    ///
    /// Nothing changes when any update in the batch is malformed.
    pub(crate) fn apply_remote(&self, response: &PullResponse) -> SyncResult<Received> {
        let updates = wire::deserialize_all(&response.updates)?;

        let received = {
            let mut replica = self.replica.lock();
            let received = replica.receive(&updates, self.reconciler.as_ref())?;
            if let Some(changes) = &received.applied {
                if !self.is_stopped() {
                    self.surface.apply_remote_change_set(changes);
                }
            }
            received
        };

        debug!(
            client_id = %self.client_id(),
            version = received.version,
            updates = updates.len(),
            confirmed = received.confirmed,
            "applied remote updates"
        );

        if !updates.is_empty() && self.has_pending() {
            self.request_push();
        }
        Ok(received)
    }

    /// Counts and reports a fault. Returns whether the loop should retry.
    pub(crate) fn record_fault(&self, error: &SyncError) -> bool {
        self.faults.fetch_add(1, Ordering::Relaxed);
        warn!(client_id = %self.client_id(), error = %error, "sync fault");
        self.surface.sync_fault(error);
        error.is_retryable()
    }

    fn set_connection(&self, state: ConnectionState) {
        let changed = {
            let mut current = self.connection.write();
            let changed = *current != state;
            *current = state;
            changed
        };
        if changed {
            info!(client_id = %self.client_id(), connection = %state, "connection changed");
        }
        self.surface.connection_changed(state);
    }

    /// Runs a pull or push request under the configured request timeout.
    pub(crate) async fn request<T>(
        &self,
        request: impl Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.map_err(|_| {
                SyncError::TransportUnavailable(format!("request timed out after {limit:?}"))
            })?,
            None => request.await,
        }
    }

    /// Sleeps for `delay`, returning early on detach.
    pub(crate) async fn pause(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// Binds one document replica to a transport and an editing surface.
///
/// Created by [`SyncSession::attach`]; detached explicitly or when dropped.
/// The session's tasks are spawned on the current Tokio runtime and expect
/// a current-thread runtime, on which local edits and remote applications
/// never interleave.
pub struct SyncSession {
    shared: Arc<SessionShared>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncSession {
    /// Attaches to the authority's document using the [`Rebase`] reconciler.
    pub async fn attach<T, S>(
        config: SessionConfig,
        transport: Arc<T>,
        surface: Arc<S>,
    ) -> SyncResult<Self>
    where
        T: SyncTransport + 'static,
        S: EditorSurface + 'static,
    {
        Self::attach_with_reconciler(config, transport, surface, Arc::new(Rebase)).await
    }

    /// Attaches with a custom reconciler.
    ///
    /// The surface is read-only until the snapshot is loaded. If the fetch
    /// fails or times out the surface stays read-only and the error is
    /// returned.
    pub async fn attach_with_reconciler<T, S, R>(
        config: SessionConfig,
        transport: Arc<T>,
        surface: Arc<S>,
        reconciler: Arc<R>,
    ) -> SyncResult<Self>
    where
        T: SyncTransport + 'static,
        S: EditorSurface + 'static,
        R: Reconciler + 'static,
    {
        let transport: Arc<dyn SyncTransport> = transport;
        let surface: Arc<dyn EditorSurface> = surface;
        let reconciler: Arc<dyn Reconciler> = reconciler;

        surface.set_read_only(true);
        info!(client_id = %config.client_id, "attaching");

        let snapshot = match fetch_document(&config, transport.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(client_id = %config.client_id, error = %err, "document fetch failed");
                return Err(err);
            }
        };

        let replica = Replica::new(
            config.client_id.clone(),
            snapshot.doc.as_str(),
            snapshot.version,
        );
        surface.load_document(&snapshot.doc, snapshot.version);

        let connection_rx = transport.connection_state();
        let connection = *connection_rx.borrow();
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(SessionShared {
            config,
            transport,
            surface,
            reconciler,
            replica: Mutex::new(replica),
            stopped: AtomicBool::new(false),
            shutdown,
            push_trigger: Notify::new(),
            push_in_flight: AtomicBool::new(false),
            pull_state: RwLock::new(PullState::Idle),
            connection: RwLock::new(connection),
            faults: AtomicU64::new(0),
        });

        shared
            .surface
            .on_local_change(LocalChangeSink::new(Arc::downgrade(&shared)));
        shared.surface.set_read_only(false);

        let tasks = vec![
            tokio::spawn(pull::run(Arc::clone(&shared), shared.subscribe_shutdown())),
            tokio::spawn(push::run(Arc::clone(&shared), shared.subscribe_shutdown())),
            tokio::spawn(watch_connection(
                Arc::clone(&shared),
                connection_rx,
                shared.subscribe_shutdown(),
            )),
        ];

        info!(
            client_id = %shared.client_id(),
            version = snapshot.version,
            "attached"
        );
        Ok(Self { shared, tasks })
    }

    /// Returns the client id.
    pub fn client_id(&self) -> &ClientId {
        self.shared.client_id()
    }

    /// Returns the Version Cursor value.
    pub fn version(&self) -> u64 {
        self.shared.version()
    }

    /// Returns the replica's text.
    pub fn content(&self) -> String {
        self.shared.replica.lock().text().to_owned()
    }

    /// Returns the unconfirmed local updates.
    pub fn pending(&self) -> Vec<Update> {
        self.shared.pending()
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> SessionStatus {
        let (version, pending) = {
            let replica = self.shared.replica.lock();
            (replica.version(), replica.pending().len())
        };
        SessionStatus {
            connection: *self.shared.connection.read(),
            version,
            pending,
            pull_state: *self.shared.pull_state.read(),
            push_in_flight: self.shared.push_in_flight.load(Ordering::Acquire),
            faults: self.shared.faults.load(Ordering::Relaxed),
        }
    }

    /// Returns true once the session was detached.
    pub fn is_detached(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Detaches from the surface and stops both loops.
    ///
    /// Requests already outstanding are not aborted: a late pull response
    /// still lands in the replica, but no new request is issued and the
    /// surface is no longer touched.
    pub fn detach(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.surface.clear_local_change();
        self.shared.stop_pull();
        self.shared.shutdown.send_replace(true);
        info!(client_id = %self.shared.client_id(), "detached");
    }

    /// Returns true once every session task has exited.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn fetch_document(
    config: &SessionConfig,
    transport: &dyn SyncTransport,
) -> SyncResult<DocumentSnapshot> {
    let fetch = transport.get_document();
    match config.attach_timeout {
        Some(limit) => tokio::time::timeout(limit, fetch)
            .await
            .map_err(|_| SyncError::AttachTimeout(limit))?,
        None => fetch.await,
    }
}

async fn watch_connection(
    shared: Arc<SessionShared>,
    mut state_rx: watch::Receiver<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let state = *state_rx.borrow_and_update();
        shared.set_connection(state);

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!(client_id = %shared.client_id(), "connection watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use crate::transport::MockTransport;

    #[tokio::test]
    async fn attach_loads_snapshot() {
        let transport = Arc::new(MockTransport::with_document(3, "int main(){}"));
        let surface = Arc::new(MemorySurface::new());

        let session = SyncSession::attach(SessionConfig::new(), transport, Arc::clone(&surface))
            .await
            .unwrap();

        assert_eq!(session.version(), 3);
        assert_eq!(session.content(), "int main(){}");
        assert_eq!(surface.text(), "int main(){}");
        assert!(!surface.is_read_only());
        assert_eq!(session.status().pending, 0);
        assert_eq!(session.status().connection, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_timeout_keeps_surface_read_only() {
        let transport = Arc::new(MockTransport::new());
        let surface = Arc::new(MemorySurface::new());
        let config = SessionConfig::new().with_attach_timeout(Duration::from_secs(5));

        let result = SyncSession::attach(config, transport, Arc::clone(&surface)).await;

        assert!(matches!(result, Err(SyncError::AttachTimeout(_))));
        assert!(surface.is_read_only());
        assert!(matches!(surface.insert(0, "x"), Err(SyncError::NotReady)));
    }

    #[tokio::test]
    async fn detach_rejects_edits() {
        let transport = Arc::new(MockTransport::with_document(0, "abc"));
        let surface = Arc::new(MemorySurface::new());
        let session = SyncSession::attach(SessionConfig::new(), transport, Arc::clone(&surface))
            .await
            .unwrap();

        session.detach();
        session.detach();

        assert!(session.is_detached());
        assert_eq!(session.status().pull_state, PullState::Stopped);
        assert!(matches!(surface.insert(0, "x"), Err(SyncError::Detached)));
        assert_eq!(session.content(), "abc");
    }
}
