//! Framed transport implementation.
//!
//! This module provides a transport that exchanges encoded [`SyncMessage`]
//! frames with the authority. The byte channel itself is abstracted via a
//! trait to allow different implementations (sockets, websockets, or an
//! in-process loopback).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use textsync_protocol::{
    DocumentSnapshot, PullRequest, PullResponse, PushRequest, PushResponse, SyncMessage,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::transport::{ConnectionState, SyncTransport};

/// Byte-level request/response channel.
#[async_trait]
pub trait FrameClient: Send + Sync {
    /// Sends one frame and returns the reply frame.
    async fn send(&self, frame: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Servers that can answer frames in-process.
#[async_trait]
pub trait FrameServer: Send + Sync {
    /// Handles one frame and returns the reply frame.
    async fn handle_frame(&self, frame: Vec<u8>) -> Vec<u8>;
}

/// Transport speaking CBOR frames over a [`FrameClient`].
///
/// A failed send flips the connection state to disconnected; the next
/// successful one flips it back.
pub struct FramedTransport<C: FrameClient> {
    client: C,
    state: watch::Sender<ConnectionState>,
    last_error: RwLock<Option<String>>,
}

impl<C: FrameClient> FramedTransport<C> {
    /// Creates a new framed transport.
    pub fn new(client: C) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            client,
            state,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn mark(&self, connection: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == connection {
                return false;
            }
            debug!(%connection, "transport state changed");
            *current = connection;
            true
        });
    }

    async fn roundtrip(&self, message: SyncMessage) -> SyncResult<SyncMessage> {
        let frame = message.encode()?;

        let reply = match self.client.send(frame).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, request = message.name(), "frame send failed");
                *self.last_error.write() = Some(err.clone());
                self.mark(ConnectionState::Disconnected);
                return Err(SyncError::TransportUnavailable(err));
            }
        };

        *self.last_error.write() = None;
        self.mark(ConnectionState::Connected);

        match SyncMessage::decode(&reply)? {
            SyncMessage::Error(err) => Err(SyncError::Server(err.message)),
            reply => Ok(reply),
        }
    }
}

fn unexpected(expected: &str, reply: &SyncMessage) -> SyncError {
    SyncError::Protocol(format!(
        "expected {expected}, got {}",
        reply.name()
    ))
}

#[async_trait]
impl<C: FrameClient> SyncTransport for FramedTransport<C> {
    async fn get_document(&self) -> SyncResult<DocumentSnapshot> {
        match self.roundtrip(SyncMessage::GetDocument).await? {
            SyncMessage::DocumentSnapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected("document_snapshot", &other)),
        }
    }

    async fn pull(&self, request: PullRequest) -> SyncResult<PullResponse> {
        match self.roundtrip(SyncMessage::PullRequest(request)).await? {
            SyncMessage::PullResponse(response) => Ok(response),
            other => Err(unexpected("pull_response", &other)),
        }
    }

    async fn push(&self, request: PushRequest) -> SyncResult<PushResponse> {
        match self.roundtrip(SyncMessage::PushRequest(request)).await? {
            SyncMessage::PushResponse(response) => Ok(response),
            other => Err(unexpected("push_response", &other)),
        }
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

/// A frame client that routes frames directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: FrameServer> {
    server: Arc<S>,
}

impl<S: FrameServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: Arc<S>) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }
}

#[async_trait]
impl<S: FrameServer> FrameClient for LoopbackClient<S> {
    async fn send(&self, frame: Vec<u8>) -> Result<Vec<u8>, String> {
        Ok(self.server.handle_frame(frame).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use textsync_protocol::ErrorResponse;

    /// Answers every request with a fixed message, or fails while `down`.
    struct Scripted {
        reply: SyncMessage,
        down: AtomicBool,
    }

    #[async_trait]
    impl FrameServer for Scripted {
        async fn handle_frame(&self, _frame: Vec<u8>) -> Vec<u8> {
            self.reply.encode().unwrap()
        }
    }

    #[async_trait]
    impl FrameClient for Scripted {
        async fn send(&self, frame: Vec<u8>) -> Result<Vec<u8>, String> {
            if self.down.load(Ordering::SeqCst) {
                return Err("connection refused".into());
            }
            Ok(self.handle_frame(frame).await)
        }
    }

    fn scripted(reply: SyncMessage) -> Scripted {
        Scripted {
            reply,
            down: AtomicBool::new(false),
        }
    }

    #[tokio::test]
    async fn loopback_snapshot() {
        let server = Arc::new(scripted(SyncMessage::DocumentSnapshot(DocumentSnapshot {
            version: 3,
            doc: "int main(){}".into(),
        })));
        let transport = FramedTransport::new(LoopbackClient::new(server));

        let snapshot = transport.get_document().await.unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.doc, "int main(){}");
    }

    #[tokio::test]
    async fn unexpected_reply_is_protocol_error() {
        let transport = FramedTransport::new(scripted(SyncMessage::PushResponse(
            PushResponse::accepted(),
        )));
        let err = transport.pull(PullRequest::new(0)).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn error_reply_is_server_error() {
        let transport = FramedTransport::new(scripted(SyncMessage::Error(ErrorResponse::new(
            "version 9 is ahead of the log",
        ))));
        let err = transport.pull(PullRequest::new(9)).await.unwrap_err();
        assert_eq!(err, SyncError::Server("version 9 is ahead of the log".into()));
    }

    #[tokio::test]
    async fn send_failure_flips_connection_state() {
        let transport = FramedTransport::new(scripted(SyncMessage::PushResponse(
            PushResponse::accepted(),
        )));
        let state = transport.connection_state();

        transport.client().down.store(true, Ordering::SeqCst);
        let err = transport
            .push(PushRequest::new(0, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TransportUnavailable(_)));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
        assert_eq!(transport.last_error().as_deref(), Some("connection refused"));

        transport.client().down.store(false, Ordering::SeqCst);
        assert!(transport.push(PushRequest::new(0, vec![])).await.unwrap().ok);
        assert_eq!(*state.borrow(), ConnectionState::Connected);
        assert!(transport.last_error().is_none());
    }
}
