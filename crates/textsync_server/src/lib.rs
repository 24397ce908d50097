//! # Textsync Server
//!
//! Reference authority for textsync.
//!
//! This crate provides:
//! - The canonical document and its log of accepted updates
//! - Snapshot, pull (long-poll) and push handlers
//! - CBOR frame dispatch for byte-level transports
//!
//! # Protocol
//!
//! The authority serializes every edit:
//! 1. A client fetches the document and its version once
//! 2. Pulls return every update accepted at or after the client's version,
//!    suspending until one exists
//! 3. Pushes are accepted only against the current version; anything else
//!    is answered with `ok = false`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod oplog;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use oplog::DocumentLog;
pub use server::Authority;
