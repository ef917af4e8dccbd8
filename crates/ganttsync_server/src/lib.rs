//! # Gantt-Sync Relay Server
//!
//! Reference WebSocket relay for the Gantt-Sync protocol.
//!
//! This crate provides:
//! - A hub that owns the live-connection registry and fans messages out
//! - Per-connection sessions that validate causal timestamps before relaying
//! - HTTP endpoints for login and single-operation validation
//!
//! # Architecture
//!
//! The relay stores nothing. Each connection runs a session loop that
//! decodes every inbound envelope, answers control requests directly, and
//! hands the raw bytes of valid operations to the hub. The hub's single
//! coordinator task delivers them, unmodified and in submission order, to
//! every registered connection.
//!
//! ```text
//! client -> Session (decode, check HLC) -> Hub (single coordinator) -> peers
//! ```
//!
//! Whether a sender receives its own broadcast is controlled by
//! [`ServerConfig::echo_to_sender`] (on by default).

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod http;
mod hub;
mod server;
mod session;

pub use config::{HubConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use http::{router, AppState, LoginResponse};
pub use hub::{ConnectionHandle, ConnectionId, Eviction, Hub};
pub use server::RelayServer;
pub use session::{Disposition, MessageSource, Session, SessionContext};
