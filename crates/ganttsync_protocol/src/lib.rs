//! # Gantt-Sync Protocol
//!
//! Wire types for the Gantt-Sync collaborative editing protocol.
//!
//! This crate provides:
//! - `Hlc` hybrid logical clock timestamps (parse, format, total order)
//! - `Envelope` decoding with lazy payload projection
//! - `Response` encoding for control replies
//! - Standalone single-operation validation
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use ganttsync_protocol::{validate_bytes, Hlc};
//!
//! let ts = Hlc::parse("2023-10-27T10:00:00.123Z-0000-deviceA").unwrap();
//! assert_eq!(ts.to_string(), "2023-10-27T10:00:00.123Z-0000-deviceA");
//!
//! let raw = br#"{"type":"INSERT_TASK","timestamp":"2023-10-27T10:00:00.000Z-0000-deviceA","data":{"id":"t1"}}"#;
//! assert!(validate_bytes(raw).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod hlc;
mod payload;
mod response;
mod validator;

pub use envelope::{Envelope, Header, OperationCategory, OperationType};
pub use error::{HlcError, HlcResult, PayloadKind, ProtocolError, ProtocolResult};
pub use hlc::Hlc;
pub use payload::{TagPayload, TaskPayload};
pub use response::{MerkleRootData, Response};
pub use validator::{validate_bytes, validate_operation, ValidatedOperation};
