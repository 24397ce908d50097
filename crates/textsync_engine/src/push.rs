//! Push Loop.

use std::sync::Arc;

use textsync_protocol::{wire, PushRequest};
use tokio::sync::watch;
use tracing::debug;

use crate::error::SyncError;
use crate::session::SessionShared;

/// Delivers pending local updates whenever a push is requested.
///
/// While pending updates remain after an attempt, another one follows
/// after `push_retry_delay`. A fault that is not retryable ends the loop.
pub(crate) async fn run(shared: Arc<SessionShared>, mut shutdown: watch::Receiver<bool>) {
    debug!(client_id = %shared.client_id(), "push loop started");

    loop {
        tokio::select! {
            _ = shared.push_requested() => {}
            _ = shutdown.changed() => {}
        }
        if shared.is_stopped() {
            break;
        }

        if !attempt(&shared).await {
            debug!(client_id = %shared.client_id(), "push fault not retryable");
            break;
        }

        if shared.has_pending() && !shared.is_stopped() {
            shared
                .pause(shared.config.push_retry_delay, &mut shutdown)
                .await;
            shared.request_push();
        }
    }

    debug!(client_id = %shared.client_id(), "push loop stopped");
}

/// One push attempt. A no-op while another push is in flight or nothing is pending.
///
/// Returns false after a fault the loop should not retry.
async fn attempt(shared: &SessionShared) -> bool {
    if !shared.begin_push() {
        return true;
    }

    let (version, batch) = shared.sendable();
    if batch.is_empty() {
        shared.end_push();
        return true;
    }

    debug!(
        client_id = %shared.client_id(),
        version,
        updates = batch.len(),
        "pushing"
    );
    let request = PushRequest::new(version, wire::serialize_all(&batch));
    let result = shared.request(shared.transport.push(request)).await;
    shared.end_push();

    match result {
        Ok(response) if response.ok => {
            debug!(client_id = %shared.client_id(), version, "push accepted");
            true
        }
        Ok(_) => {
            let err = SyncError::StaleBaseVersion { version };
            debug!(client_id = %shared.client_id(), error = %err, "push rejected");
            true
        }
        Err(err) => shared.record_fault(&err),
    }
}
