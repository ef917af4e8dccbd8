//! Structural projections of envelope payloads.
//!
//! These only model what validation needs. Every field is optional on the
//! wire; wrongly typed fields fail the projection.

use serde::{Deserialize, Serialize};

/// A task on the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPayload {
    /// Task id. Must be non-empty for inserts and updates.
    pub id: String,
    /// Row the task is drawn in.
    pub row_id: String,
    /// ISO-8601 start.
    pub start: String,
    /// ISO-8601 end.
    pub end: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

/// An immutable snapshot tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagPayload {
    /// Tag id.
    pub id: String,
    /// Tag name.
    pub name: String,
    /// Root hash of the tagged snapshot. Must be non-empty.
    pub merkle_root: String,
    /// HLC text of the snapshot.
    pub timestamp: String,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_fields_are_optional() {
        let task: TaskPayload = serde_json::from_value(json!({"id": "t1"})).unwrap();
        assert_eq!(task.id, "t1");
        assert!(task.row_id.is_empty());
        assert!(!task.is_deleted);

        let task: TaskPayload = serde_json::from_value(json!({})).unwrap();
        assert!(task.id.is_empty());
    }

    #[test]
    fn task_uses_camel_case() {
        let task: TaskPayload = serde_json::from_value(json!({
            "id": "t1",
            "rowId": "r1",
            "start": "2023-10-27",
            "end": "2023-10-30",
            "isDeleted": true
        }))
        .unwrap();
        assert_eq!(task.row_id, "r1");
        assert!(task.is_deleted);
    }

    #[test]
    fn wrongly_typed_field_fails() {
        assert!(serde_json::from_value::<TaskPayload>(json!({"id": 7})).is_err());
        assert!(serde_json::from_value::<TagPayload>(json!("root")).is_err());
    }

    #[test]
    fn tag_merkle_root() {
        let tag: TagPayload =
            serde_json::from_value(json!({"name": "v1", "merkleRoot": "abc123"})).unwrap();
        assert_eq!(tag.merkle_root, "abc123");
        assert_eq!(tag.name, "v1");
    }
}
