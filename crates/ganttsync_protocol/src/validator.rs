//! Standalone single-operation validation.
//!
//! Runs the same structural and timestamp checks as the live relay, but
//! returns a verdict instead of broadcasting. Checks run in order and the
//! first failure short-circuits:
//!
//! 1. normalize `schemaVersion`
//! 2. parse `timestamp` (required here, unlike on the broadcast path)
//! 3. project and check the payload for task inserts/updates and tag creation

use crate::envelope::{Envelope, OperationType};
use crate::error::{PayloadKind, ProtocolError, ProtocolResult};
use crate::hlc::Hlc;

/// An operation that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOperation {
    /// Operation type.
    pub op_type: OperationType,
    /// Effective schema version (always >= 1).
    pub schema_version: u64,
    /// Parsed timestamp.
    pub timestamp: Hlc,
    /// Task id or tag root that the payload check looked at, if any.
    pub subject: Option<String>,
}

/// Validates one decoded envelope.
pub fn validate_operation(envelope: &Envelope) -> ProtocolResult<ValidatedOperation> {
    let schema_version = envelope.schema_version();

    // An absent timestamp is checked as the empty string, which never parses.
    let raw = envelope.timestamp.as_deref().unwrap_or_default();
    let timestamp = Hlc::parse(raw).map_err(|source| ProtocolError::InvalidTimestamp {
        raw: raw.to_string(),
        source,
    })?;

    let subject = match envelope.op_type.payload_kind() {
        Some(PayloadKind::Task) => {
            let task = envelope.task_payload()?;
            if task.id.is_empty() {
                return Err(ProtocolError::missing_field(PayloadKind::Task, "id"));
            }
            Some(task.id)
        }
        Some(PayloadKind::Tag) => {
            let tag = envelope.tag_payload()?;
            if tag.merkle_root.is_empty() {
                return Err(ProtocolError::missing_field(PayloadKind::Tag, "merkleRoot"));
            }
            Some(tag.merkle_root)
        }
        None => None,
    };

    Ok(ValidatedOperation {
        op_type: envelope.op_type.clone(),
        schema_version,
        timestamp,
        subject,
    })
}

/// Decodes and validates one raw message.
pub fn validate_bytes(bytes: &[u8]) -> ProtocolResult<ValidatedOperation> {
    let envelope = Envelope::decode(bytes)?;
    validate_operation(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HlcError;
    use serde_json::json;

    const TS: &str = "2023-10-27T10:00:00.000Z-0000-deviceA";

    fn insert(timestamp: &str, data: serde_json::Value) -> Envelope {
        Envelope::new(OperationType::InsertTask)
            .with_timestamp(timestamp)
            .with_data(data)
    }

    #[test]
    fn valid_insert() {
        let verdict = validate_operation(&insert(TS, json!({"id": "t1"}))).unwrap();
        assert_eq!(verdict.op_type, OperationType::InsertTask);
        assert_eq!(verdict.schema_version, 1);
        assert_eq!(verdict.timestamp.node_id(), "deviceA");
        assert_eq!(verdict.subject.as_deref(), Some("t1"));
    }

    #[test]
    fn insert_without_id_is_rejected() {
        let err = validate_operation(&insert(TS, json!({}))).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::missing_field(PayloadKind::Task, "id")
        );
    }

    #[test]
    fn three_digit_counter_is_rejected() {
        let raw = "2023-10-27T10:00:00.000Z-000-deviceA";
        let err = validate_operation(&insert(raw, json!({"id": "t1"}))).unwrap_err();
        match err {
            ProtocolError::InvalidTimestamp { raw: got, source } => {
                assert_eq!(got, raw);
                assert!(matches!(source, HlcError::InvalidFormat { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn timestamp_checked_before_payload() {
        // Both the timestamp and the payload are bad; only the first failure
        // is reported.
        let err = validate_operation(&insert("garbage", json!({}))).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTimestamp { .. }));
    }

    #[test]
    fn missing_timestamp_is_rejected() {
        let envelope = Envelope::new(OperationType::DeleteTask);
        let err = validate_operation(&envelope).unwrap_err();
        match err {
            ProtocolError::InvalidTimestamp { raw, source } => {
                assert!(raw.is_empty());
                assert!(matches!(source, HlcError::InvalidFormat { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn update_with_malformed_data_is_rejected() {
        let envelope = Envelope::new(OperationType::UpdateTask)
            .with_timestamp(TS)
            .with_data(json!("not an object"));
        let err = validate_operation(&envelope).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                payload: PayloadKind::Task,
                ..
            }
        ));
    }

    #[test]
    fn create_tag_requires_merkle_root() {
        let envelope = Envelope::new(OperationType::CreateTag)
            .with_timestamp(TS)
            .with_data(json!({"name": "v1"}));
        let err = validate_operation(&envelope).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::missing_field(PayloadKind::Tag, "merkleRoot")
        );

        let envelope = envelope.with_data(json!({"name": "v1", "merkleRoot": "abc"}));
        let verdict = validate_operation(&envelope).unwrap();
        assert_eq!(verdict.subject.as_deref(), Some("abc"));
    }

    #[test]
    fn other_types_skip_payload_check() {
        for op_type in [
            OperationType::DeleteTask,
            OperationType::BatchUpdate,
            OperationType::DeleteTag,
            OperationType::CursorMove,
        ] {
            let envelope = Envelope::new(op_type)
                .with_timestamp(TS)
                .with_data(json!(42));
            let verdict = validate_operation(&envelope).unwrap();
            assert!(verdict.subject.is_none());
        }
    }

    #[test]
    fn schema_version_is_normalized() {
        let envelope = insert(TS, json!({"id": "t1"})).with_schema_version(0);
        assert_eq!(validate_operation(&envelope).unwrap().schema_version, 1);

        let envelope = insert(TS, json!({"id": "t1"})).with_schema_version(3);
        assert_eq!(validate_operation(&envelope).unwrap().schema_version, 3);
    }

    #[test]
    fn validate_raw_bytes() {
        let raw = format!(r#"{{"type":"INSERT_TASK","timestamp":"{TS}","data":{{"id":"t1"}}}}"#);
        assert!(validate_bytes(raw.as_bytes()).is_ok());

        let err = validate_bytes(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode { .. }));
    }
}
