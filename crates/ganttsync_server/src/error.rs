//! Error types for the relay server.

use ganttsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the relay server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A message failed protocol decoding or validation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection-level failure; ends that connection only.
    #[error("transport error: {0}")]
    Transport(String),

    /// The hub coordinator has stopped.
    #[error("hub is closed")]
    HubClosed,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::Protocol(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::HubClosed | ServerError::Io(_))
    }
}
