//! Error types for the protocol crate.

use std::fmt;
use thiserror::Error;

/// Result type for clock operations.
pub type HlcResult<T> = Result<T, HlcError>;

/// Result type for envelope and validation operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while parsing or constructing an HLC timestamp.
///
/// Each variant names the component that was malformed so callers can log
/// precisely what went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HlcError {
    /// The text does not match `<time>-<CCCC>-<node>`.
    #[error("invalid HLC format: {text}")]
    InvalidFormat {
        /// The rejected text.
        text: String,
    },

    /// The time component is not RFC 3339 or is out of range.
    #[error("invalid time component: {message}")]
    InvalidTime {
        /// Description of the time error.
        message: String,
    },

    /// The counter component is not a 16-bit hexadecimal number.
    #[error("invalid counter component: {message}")]
    InvalidCounter {
        /// Description of the counter error.
        message: String,
    },
}

impl HlcError {
    /// Create an invalid format error.
    pub fn invalid_format(text: impl Into<String>) -> Self {
        Self::InvalidFormat { text: text.into() }
    }

    /// Create an invalid time error.
    pub fn invalid_time(message: impl Into<String>) -> Self {
        Self::InvalidTime {
            message: message.into(),
        }
    }

    /// Create an invalid counter error.
    pub fn invalid_counter(message: impl Into<String>) -> Self {
        Self::InvalidCounter {
            message: message.into(),
        }
    }

    /// Short name of the error kind, suitable for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HlcError::InvalidFormat { .. } => "invalid_format",
            HlcError::InvalidTime { .. } => "invalid_time",
            HlcError::InvalidCounter { .. } => "invalid_counter",
        }
    }
}

/// The typed payload shapes that `data` can be projected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A task on the timeline.
    Task,
    /// An immutable snapshot tag.
    Tag,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Task => f.write_str("Task"),
            PayloadKind::Tag => f.write_str("Tag"),
        }
    }
}

/// Errors that can occur while decoding, encoding or validating envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message is not a well-formed JSON object.
    #[error("JSON Decode Error: {message}")]
    Decode {
        /// Description of the decoding error.
        message: String,
    },

    /// The envelope timestamp failed to parse.
    #[error("Invalid HLC Timestamp: {raw} ({source})")]
    InvalidTimestamp {
        /// The offending timestamp text, verbatim.
        raw: String,
        /// Which clock component was malformed.
        #[source]
        source: HlcError,
    },

    /// `data` could not be projected into the payload shape its type demands.
    #[error("Invalid {payload} Data structure: {message}")]
    InvalidPayload {
        /// The payload shape that was expected.
        payload: PayloadKind,
        /// Description of the projection error.
        message: String,
    },

    /// A required payload field is absent or empty.
    #[error("{payload} {field} is required")]
    MissingField {
        /// The payload that was checked.
        payload: PayloadKind,
        /// Wire name of the missing field.
        field: &'static str,
    },

    /// Failed to encode a response.
    #[error("encoding failed: {message}")]
    Encode {
        /// Description of the encoding error.
        message: String,
    },
}

impl ProtocolError {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(payload: PayloadKind, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            payload,
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(payload: PayloadKind, field: &'static str) -> Self {
        Self::MissingField { payload, field }
    }
}
