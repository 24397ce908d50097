//! # Textsync Protocol
//!
//! Data types and codecs shared by textsync clients and authorities.
//!
//! This crate provides:
//! - `ChangeSet` with apply, compose and map (rebase) over plain text
//! - `Update` and `ClientId`
//! - The wire form of updates (`WireUpdate`) and its serialize/deserialize bridge
//! - Protocol messages (GetDocument, Pull, Push) with CBOR framing
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod messages;
mod update;
pub mod wire;

pub use change::{ChangeSet, ChangeSetBuilder, Span};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    DocumentSnapshot, ErrorResponse, PullRequest, PullResponse, PushRequest, PushResponse,
    SyncMessage,
};
pub use update::{ClientId, Update};
pub use wire::{WireChangeSet, WireItem, WireSection, WireUpdate};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
