//! Message and frame dispatch.

use crate::error::{ServerError, ServerResult};
use crate::server::Authority;
use textsync_protocol::{ErrorResponse, SyncMessage};
use tracing::{debug, error, warn};

impl Authority {
    /// Handles a sync message (dispatches to the matching request handler).
    pub async fn handle_message(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::GetDocument => Ok(SyncMessage::DocumentSnapshot(self.get_document())),
            SyncMessage::PullRequest(request) => {
                self.pull(request).await.map(SyncMessage::PullResponse)
            }
            SyncMessage::PushRequest(request) => self.push(request).map(SyncMessage::PushResponse),
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected message type: {}",
                other.name()
            ))),
        }
    }

    /// Handles an encoded frame and returns the encoded reply.
    ///
    /// Every failure is answered with an [`ErrorResponse`] frame.
    pub async fn handle_frame(&self, frame: &[u8]) -> Vec<u8> {
        let reply = match SyncMessage::decode(frame) {
            Ok(message) => {
                debug!(message = message.name(), "handling frame");
                match self.handle_message(message).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        warn!(error = %err, "request failed");
                        SyncMessage::Error(ErrorResponse::new(err.to_string()))
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "undecodable frame");
                SyncMessage::Error(ErrorResponse::new(err.to_string()))
            }
        };

        reply.encode().unwrap_or_else(|err| {
            error!(error = %err, "failed to encode reply");
            Vec::new()
        })
    }
}
