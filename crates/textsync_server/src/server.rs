//! The authority.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::oplog::DocumentLog;
use parking_lot::RwLock;
use textsync_protocol::{DocumentSnapshot, PullRequest, PullResponse, PushRequest, PushResponse};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// In-memory authority serializing all edits to one document.
///
/// Pulls are long-polls: a pull at the current version suspends until
/// another client's push lands.
///
/// # Example
///
/// ```
/// use textsync_server::{Authority, ServerConfig};
///
/// let authority = Authority::new(ServerConfig::default());
/// let snapshot = authority.get_document();
///
/// assert_eq!(snapshot.version, 0);
/// assert_eq!(snapshot.doc, "Start document");
/// ```
pub struct Authority {
    config: ServerConfig,
    log: RwLock<DocumentLog>,
    version_tx: watch::Sender<u64>,
}

impl Authority {
    /// Creates an authority holding `config.initial_document` at version 0.
    pub fn new(config: ServerConfig) -> Self {
        let log = DocumentLog::new(config.initial_document.clone());
        Self::with_log(config, log)
    }

    /// Creates an authority from an existing log.
    pub fn with_log(config: ServerConfig, log: DocumentLog) -> Self {
        let (version_tx, _) = watch::channel(log.version());
        Self {
            config,
            log: RwLock::new(log),
            version_tx,
        }
    }

    /// Returns the current version.
    pub fn version(&self) -> u64 {
        self.log.read().version()
    }

    /// Returns the current document text.
    pub fn document(&self) -> String {
        self.log.read().doc().to_owned()
    }

    /// Handles a get document request.
    pub fn get_document(&self) -> DocumentSnapshot {
        let log = self.log.read();
        DocumentSnapshot {
            version: log.version(),
            doc: log.doc().to_owned(),
        }
    }

    /// Handles a pull request.
    ///
    /// Returns every update accepted at or after `request.version`, waiting
    /// for the next accepted push when there is none yet.
    pub async fn pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let mut version_rx = self.version_tx.subscribe();
        loop {
            {
                let log = self.log.read();
                let updates = log.updates_since(request.version)?;
                if !updates.is_empty() {
                    debug!(
                        version = request.version,
                        updates = updates.len(),
                        "answering pull"
                    );
                    return Ok(PullResponse::new(updates));
                }
            }

            if version_rx.changed().await.is_err() {
                return Ok(PullResponse::default());
            }
        }
    }

    /// Handles a push request.
    ///
    /// Stale or malformed batches are rejected as a whole with `ok = false`.
    pub fn push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        if request.updates.len() > self.config.max_push_batch {
            return Err(ServerError::InvalidRequest(format!(
                "too many updates: {} > {}",
                request.updates.len(),
                self.config.max_push_batch
            )));
        }

        let count = request.updates.len();
        let result = self.log.write().append(request.version, request.updates);
        match result {
            Ok(version) => {
                self.version_tx.send_replace(version);
                info!(version, updates = count, "accepted push");
                Ok(PushResponse::accepted())
            }
            Err(ServerError::StaleVersion { expected, actual }) => {
                debug!(expected, actual, "rejected stale push");
                Ok(PushResponse::rejected())
            }
            Err(ServerError::Protocol(err)) => {
                warn!(error = %err, "rejected malformed push");
                Ok(PushResponse::rejected())
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
