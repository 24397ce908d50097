//! Transport layer abstraction for sync operations.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use textsync_protocol::{
    DocumentSnapshot, PullRequest, PullResponse, PushRequest, PushResponse,
};
use tokio::sync::{watch, Notify};

use crate::error::SyncResult;

/// Connectivity of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Requests can complete.
    Connected,
    /// The channel is down; requests stay suspended or fail.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A sync transport carries requests to the authority.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (framed byte channels, mock for testing, etc.). Requests
/// may suspend for as long as the authority takes; pulls are long-polls.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetches the current document and its version.
    async fn get_document(&self) -> SyncResult<DocumentSnapshot>;

    /// Asks for every update accepted at or after `request.version`.
    async fn pull(&self, request: PullRequest) -> SyncResult<PullResponse>;

    /// Submits pending updates computed against `request.version`.
    async fn push(&self, request: PushRequest) -> SyncResult<PushResponse>;

    /// Observable connectivity.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

/// A scripted transport for testing.
///
/// Responses are queued by the test. A request with nothing queued suspends
/// until a response is queued, like a long-poll that has no data yet.
pub struct MockTransport {
    snapshot: Mutex<Option<DocumentSnapshot>>,
    snapshot_ready: Notify,
    pulls: Mutex<VecDeque<SyncResult<PullResponse>>>,
    pull_ready: Notify,
    pushes: Mutex<VecDeque<SyncResult<PushResponse>>>,
    push_ready: Notify,
    pull_requests: Mutex<Vec<PullRequest>>,
    push_requests: Mutex<Vec<PushRequest>>,
    state: watch::Sender<ConnectionState>,
}

impl MockTransport {
    /// Creates a new mock transport with no snapshot set.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            snapshot: Mutex::new(None),
            snapshot_ready: Notify::new(),
            pulls: Mutex::new(VecDeque::new()),
            pull_ready: Notify::new(),
            pushes: Mutex::new(VecDeque::new()),
            push_ready: Notify::new(),
            pull_requests: Mutex::new(Vec::new()),
            push_requests: Mutex::new(Vec::new()),
            state,
        }
    }

    /// Creates a mock transport serving the given snapshot.
    pub fn with_document(version: u64, doc: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.set_document(version, doc);
        transport
    }

    /// Sets the snapshot answered to `get_document`.
    pub fn set_document(&self, version: u64, doc: impl Into<String>) {
        *self.snapshot.lock() = Some(DocumentSnapshot {
            version,
            doc: doc.into(),
        });
        self.snapshot_ready.notify_waiters();
    }

    /// Queues a pull response.
    pub fn queue_pull(&self, response: SyncResult<PullResponse>) {
        self.pulls.lock().push_back(response);
        self.pull_ready.notify_one();
    }

    /// Queues a push response.
    pub fn queue_push(&self, response: SyncResult<PushResponse>) {
        self.pushes.lock().push_back(response);
        self.push_ready.notify_one();
    }

    /// Every pull request received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Every push request received so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connection(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn get_document(&self) -> SyncResult<DocumentSnapshot> {
        loop {
            let notified = self.snapshot_ready.notified();
            let snapshot = self.snapshot.lock().clone();
            if let Some(snapshot) = snapshot {
                return Ok(snapshot);
            }
            notified.await;
        }
    }

    async fn pull(&self, request: PullRequest) -> SyncResult<PullResponse> {
        self.pull_requests.lock().push(request);
        loop {
            let next = self.pulls.lock().pop_front();
            if let Some(response) = next {
                return response;
            }
            self.pull_ready.notified().await;
        }
    }

    async fn push(&self, request: PushRequest) -> SyncResult<PushResponse> {
        self.push_requests.lock().push(request);
        loop {
            let next = self.pushes.lock().pop_front();
            if let Some(response) = next {
                return response;
            }
            self.push_ready.notified().await;
        }
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
