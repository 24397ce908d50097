//! Protocol messages for sync.
//!
//! Every message body is CBOR. A [`SyncMessage`] frame is the one-byte type
//! code followed by the body, so a transport can carry frames as opaque bytes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::WireUpdate;

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Snapshot request sent once on attach.
    GetDocument,
    /// Snapshot response.
    DocumentSnapshot(DocumentSnapshot),
    /// Pull request.
    PullRequest(PullRequest),
    /// Pull response.
    PullResponse(PullResponse),
    /// Push request.
    PushRequest(PushRequest),
    /// Push response.
    PushResponse(PushResponse),
    /// The authority could not handle a request.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::GetDocument => 1,
            SyncMessage::DocumentSnapshot(_) => 2,
            SyncMessage::PullRequest(_) => 3,
            SyncMessage::PullResponse(_) => 4,
            SyncMessage::PushRequest(_) => 5,
            SyncMessage::PushResponse(_) => 6,
            SyncMessage::Error(_) => 7,
        }
    }

    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SyncMessage::GetDocument => "get_document",
            SyncMessage::DocumentSnapshot(_) => "document_snapshot",
            SyncMessage::PullRequest(_) => "pull_request",
            SyncMessage::PullResponse(_) => "pull_response",
            SyncMessage::PushRequest(_) => "push_request",
            SyncMessage::PushResponse(_) => "push_response",
            SyncMessage::Error(_) => "error",
        }
    }

    /// Encodes the message as a frame.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let body = match self {
            SyncMessage::GetDocument => Vec::new(),
            SyncMessage::DocumentSnapshot(m) => m.encode()?,
            SyncMessage::PullRequest(m) => m.encode()?,
            SyncMessage::PullResponse(m) => m.encode()?,
            SyncMessage::PushRequest(m) => m.encode()?,
            SyncMessage::PushResponse(m) => m.encode()?,
            SyncMessage::Error(m) => m.encode()?,
        };

        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(self.type_code());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decodes a frame.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let (code, body) = frame
            .split_first()
            .ok_or_else(|| ProtocolError::Codec("empty frame".into()))?;

        Ok(match *code {
            1 => SyncMessage::GetDocument,
            2 => SyncMessage::DocumentSnapshot(DocumentSnapshot::decode(body)?),
            3 => SyncMessage::PullRequest(PullRequest::decode(body)?),
            4 => SyncMessage::PullResponse(PullResponse::decode(body)?),
            5 => SyncMessage::PushRequest(PushRequest::decode(body)?),
            6 => SyncMessage::PushResponse(PushResponse::decode(body)?),
            7 => SyncMessage::Error(ErrorResponse::decode(body)?),
            other => {
                return Err(ProtocolError::Codec(format!(
                    "unknown message type {other}"
                )))
            }
        })
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| ProtocolError::Codec(e.to_string()))?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Codec(e.to_string()))
}

macro_rules! cbor_body {
    ($($ty:ty),* $(,)?) => {$(
        impl $ty {
            /// Encodes to CBOR.
            pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
                to_cbor(self)
            }

            /// Decodes from CBOR.
            pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
                from_cbor(bytes)
            }
        }
    )*};
}

cbor_body!(
    DocumentSnapshot,
    PullRequest,
    PullResponse,
    PushRequest,
    PushResponse,
    ErrorResponse,
);

/// The authority's current document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Number of updates folded into `doc`.
    pub version: u64,
    /// Full document text.
    pub doc: String,
}

/// Asks for every update accepted at or after `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// The client's Version Cursor.
    pub version: u64,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(version: u64) -> Self {
        Self { version }
    }
}

/// Updates accepted since the requested version, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PullResponse {
    /// Accepted updates.
    pub updates: Vec<WireUpdate>,
}

impl PullResponse {
    /// Creates a new pull response.
    pub fn new(updates: Vec<WireUpdate>) -> Self {
        Self { updates }
    }
}

/// Pending updates computed against `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Base version of every update in the batch.
    pub version: u64,
    /// The batch, oldest first.
    pub updates: Vec<WireUpdate>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(version: u64, updates: Vec<WireUpdate>) -> Self {
        Self { version, updates }
    }
}

/// Whether a push batch was accepted as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// `false` when the batch was rejected, typically for a stale base version.
    pub ok: bool,
}

impl PushResponse {
    /// An accepting response.
    pub fn accepted() -> Self {
        Self { ok: true }
    }

    /// A rejecting response.
    pub fn rejected() -> Self {
        Self { ok: false }
    }
}

/// Failure reply for requests the authority could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable reason.
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeSet;
    use crate::update::Update;
    use crate::wire::serialize;

    fn update(text: &str) -> WireUpdate {
        serialize(&Update::new(
            "client-a".into(),
            ChangeSet::insert(3, 1, text).unwrap(),
        ))
    }

    #[test]
    fn snapshot_roundtrip() {
        let msg = SyncMessage::DocumentSnapshot(DocumentSnapshot {
            version: 3,
            doc: "int main(){}".into(),
        });
        let frame = msg.encode().unwrap();
        assert_eq!(frame[0], 2);
        assert_eq!(SyncMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn get_document_is_a_bare_type_code() {
        assert_eq!(SyncMessage::GetDocument.encode().unwrap(), vec![1]);
        assert_eq!(
            SyncMessage::decode(&[1]).unwrap(),
            SyncMessage::GetDocument
        );
    }

    #[test]
    fn push_request_carries_updates() {
        let req = PushRequest::new(5, vec![update("X"), update("é\nz")]);
        let decoded = PushRequest::decode(&req.encode().unwrap()).unwrap();

        assert_eq!(decoded.version, 5);
        assert_eq!(decoded.updates, req.updates);
    }

    #[test]
    fn pull_response_roundtrip() {
        let msg = SyncMessage::PullResponse(PullResponse::new(vec![update("Y")]));
        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn bad_frames() {
        assert!(matches!(
            SyncMessage::decode(&[]),
            Err(ProtocolError::Codec(_))
        ));
        assert!(matches!(
            SyncMessage::decode(&[42]),
            Err(ProtocolError::Codec(_))
        ));
        assert!(matches!(
            SyncMessage::decode(&[3, 0xff, 0x00]),
            Err(ProtocolError::Codec(_))
        ));
    }

    #[test]
    fn sync_message_type_codes() {
        assert_eq!(SyncMessage::GetDocument.type_code(), 1);
        assert_eq!(
            SyncMessage::PullRequest(PullRequest::new(0)).type_code(),
            3
        );
        assert_eq!(
            SyncMessage::PushResponse(PushResponse::accepted()).type_code(),
            6
        );
        assert_eq!(
            SyncMessage::Error(ErrorResponse::new("nope")).type_code(),
            7
        );
    }
}
