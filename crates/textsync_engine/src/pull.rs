//! Pull Loop.

use std::fmt;
use std::sync::Arc;

use textsync_protocol::PullRequest;
use tokio::sync::watch;
use tracing::debug;

use crate::session::SessionShared;

/// State of a session's Pull Loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    /// Between requests.
    Idle,
    /// A pull is outstanding.
    Requesting,
    /// A response is being folded into the replica.
    Applying,
    /// The session was detached or a fault was not retryable. Terminal.
    Stopped,
}

impl PullState {
    /// Returns true while the loop may still issue requests.
    pub fn is_running(&self) -> bool {
        !matches!(self, PullState::Stopped)
    }
}

impl fmt::Display for PullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullState::Idle => write!(f, "idle"),
            PullState::Requesting => write!(f, "requesting"),
            PullState::Applying => write!(f, "applying"),
            PullState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Requests updates after the Version Cursor until the session stops.
///
/// A failed request or a malformed batch leaves the cursor where it was;
/// the same range is requested again after `fault_retry_delay`. The loop
/// yields to the runtime after every applied response.
pub(crate) async fn run(shared: Arc<SessionShared>, mut shutdown: watch::Receiver<bool>) {
    debug!(client_id = %shared.client_id(), "pull loop started");

    while !shared.is_stopped() {
        let version = shared.version();
        shared.set_pull_state(PullState::Requesting);
        debug!(client_id = %shared.client_id(), version, "pulling");

        let result = shared
            .request(shared.transport.pull(PullRequest::new(version)))
            .await;

        let fault = match result {
            Ok(response) => {
                shared.set_pull_state(PullState::Applying);
                shared.apply_remote(&response).err()
            }
            Err(err) => Some(err),
        };
        shared.set_pull_state(PullState::Idle);

        match fault {
            Some(err) => {
                if !shared.record_fault(&err) {
                    debug!(
                        client_id = %shared.client_id(),
                        error = %err,
                        "pull fault not retryable"
                    );
                    shared.stop_pull();
                    break;
                }
                shared
                    .pause(shared.config.fault_retry_delay, &mut shutdown)
                    .await;
            }
            None => tokio::task::yield_now().await,
        }
    }

    debug!(client_id = %shared.client_id(), "pull loop stopped");
}
