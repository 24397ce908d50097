//! # Textsync Engine
//!
//! Client side of textsync: keeps an editor's copy of a shared document in
//! step with a single serializing authority.
//!
//! This crate provides:
//! - Version Cursor and the local replica with its pending updates
//! - Reconciliation of remote updates with unconfirmed local ones
//! - Pull Loop (perpetual long-poll) and Push Loop (edge-triggered, self-batching)
//! - Sync Session lifecycle (attach, detach, status)
//! - Transport abstraction with framed and mock implementations
//!
//! ## Architecture
//!
//! ```text
//!  surface ──edit──▶ LocalChangeSink ──▶ Replica ──notify──▶ Push Loop ──▶ authority
//!     ▲                                    ▲                                  │
//!     └──────── apply_remote_change_set ───┴──────── Pull Loop ◀──────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! - Local edits are applied to the replica synchronously
//! - The Version Cursor never decreases
//! - A failed or malformed pull leaves replica and cursor untouched
//! - At most one pull and one push are outstanding per session
//! - No request is issued after detach

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod error;
mod framed;
mod pull;
mod push;
mod reconcile;
mod replica;
mod session;
mod surface;
mod transport;

pub use config::SessionConfig;
pub use cursor::VersionCursor;
pub use error::{SyncError, SyncResult};
pub use framed::{FrameClient, FrameServer, FramedTransport, LoopbackClient};
pub use pull::PullState;
pub use reconcile::{Rebase, Reconciled, Reconciler};
pub use replica::{Received, Replica};
pub use session::{SessionStatus, SyncSession};
pub use surface::{EditorSurface, LocalChangeSink, MemorySurface};
pub use transport::{ConnectionState, MockTransport, SyncTransport};
