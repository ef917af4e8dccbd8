//! Operation envelopes.
//!
//! Every wire message is a JSON object with a `type` discriminant, optional
//! causal metadata and an opaque `data` payload. Decoding goes through a
//! generic JSON tree first; `data` is only projected into a typed payload
//! when the operation type demands it.

use crate::error::{PayloadKind, ProtocolError, ProtocolResult};
use crate::payload::{TagPayload, TaskPayload};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How the relay treats an operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    /// Request answered directly to the sender; never broadcast.
    Control,
    /// Data mutation carrying a causal timestamp.
    Causal,
    /// Loss-tolerant presence signal, broadcast without checks.
    Ephemeral,
    /// Anything the relay does not understand.
    Unrecognized,
}

/// The `type` discriminant of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationType {
    /// `subscribe`
    Subscribe,
    /// `GET_MERKLE_ROOT`
    GetMerkleRoot,
    /// `INSERT_TASK`
    InsertTask,
    /// `UPDATE_TASK`
    UpdateTask,
    /// `DELETE_TASK`
    DeleteTask,
    /// `BATCH_UPDATE`
    BatchUpdate,
    /// `CREATE_TAG`
    CreateTag,
    /// `DELETE_TAG`
    DeleteTag,
    /// `PRESENCE_UPDATE`
    PresenceUpdate,
    /// `CURSOR_MOVE`
    CursorMove,
    /// `GHOST_UPDATE`
    GhostUpdate,
    /// Any other value, kept verbatim for logging.
    Unknown(String),
}

impl OperationType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Subscribe => "subscribe",
            OperationType::GetMerkleRoot => "GET_MERKLE_ROOT",
            OperationType::InsertTask => "INSERT_TASK",
            OperationType::UpdateTask => "UPDATE_TASK",
            OperationType::DeleteTask => "DELETE_TASK",
            OperationType::BatchUpdate => "BATCH_UPDATE",
            OperationType::CreateTag => "CREATE_TAG",
            OperationType::DeleteTag => "DELETE_TAG",
            OperationType::PresenceUpdate => "PRESENCE_UPDATE",
            OperationType::CursorMove => "CURSOR_MOVE",
            OperationType::GhostUpdate => "GHOST_UPDATE",
            OperationType::Unknown(name) => name,
        }
    }

    /// Classifies the type for dispatch.
    pub fn category(&self) -> OperationCategory {
        match self {
            OperationType::Subscribe | OperationType::GetMerkleRoot => OperationCategory::Control,
            OperationType::InsertTask
            | OperationType::UpdateTask
            | OperationType::DeleteTask
            | OperationType::BatchUpdate
            | OperationType::CreateTag
            | OperationType::DeleteTag => OperationCategory::Causal,
            OperationType::PresenceUpdate
            | OperationType::CursorMove
            | OperationType::GhostUpdate => OperationCategory::Ephemeral,
            OperationType::Unknown(_) => OperationCategory::Unrecognized,
        }
    }

    /// The payload shape this type must carry, if any.
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        match self {
            OperationType::InsertTask | OperationType::UpdateTask => Some(PayloadKind::Task),
            OperationType::CreateTag => Some(PayloadKind::Tag),
            _ => None,
        }
    }
}

impl Default for OperationType {
    fn default() -> Self {
        OperationType::Unknown(String::new())
    }
}

impl From<&str> for OperationType {
    fn from(name: &str) -> Self {
        match name {
            "subscribe" => OperationType::Subscribe,
            "GET_MERKLE_ROOT" => OperationType::GetMerkleRoot,
            "INSERT_TASK" => OperationType::InsertTask,
            "UPDATE_TASK" => OperationType::UpdateTask,
            "DELETE_TASK" => OperationType::DeleteTask,
            "BATCH_UPDATE" => OperationType::BatchUpdate,
            "CREATE_TAG" => OperationType::CreateTag,
            "DELETE_TAG" => OperationType::DeleteTag,
            "PRESENCE_UPDATE" => OperationType::PresenceUpdate,
            "CURSOR_MOVE" => OperationType::CursorMove,
            "GHOST_UPDATE" => OperationType::GhostUpdate,
            other => OperationType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for OperationType {
    fn from(name: String) -> Self {
        OperationType::from(name.as_str())
    }
}

impl From<OperationType> for String {
    fn from(op_type: OperationType) -> Self {
        op_type.as_str().to_string()
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields a relay routes on, read without type checks.
///
/// A routing field holding the wrong JSON type counts as absent, so a
/// relay can forward any well-formed object it does not need to inspect.
/// Use [`Envelope::decode`] where every field must be well typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Operation type; `Unknown("")` when missing or not a string.
    pub op_type: OperationType,
    /// HLC timestamp text, when present as a string.
    pub timestamp: Option<String>,
    /// Channel name, when present as a string.
    pub channel: Option<String>,
}

impl Header {
    /// Reads the routing fields of one message.
    ///
    /// Fails only for malformed JSON or a non-object top level.
    pub fn read(bytes: &[u8]) -> ProtocolResult<Self> {
        let tree: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::decode(e.to_string()))?;
        let Value::Object(fields) = tree else {
            return Err(ProtocolError::decode("expected a JSON object"));
        };

        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_owned);
        Ok(Self {
            op_type: text("type").map(OperationType::from).unwrap_or_default(),
            timestamp: text("timestamp"),
            channel: text("channel"),
        })
    }
}

/// One protocol message.
///
/// Unknown top-level fields are ignored on decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Operation type.
    #[serde(rename = "type", default)]
    pub op_type: OperationType,
    /// Declared schema version; see [`Envelope::schema_version`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
    /// HLC timestamp text, for causal operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Sending client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Channel name, for `subscribe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Creates an envelope with only a type.
    pub fn new(op_type: OperationType) -> Self {
        Self {
            op_type,
            ..Self::default()
        }
    }

    /// Sets the timestamp text.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Sets the actor id.
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Sets the channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets the payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the declared schema version.
    pub fn with_schema_version(mut self, version: i64) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Decodes one message.
    ///
    /// Fails only for malformed JSON, a non-object top level, or a known
    /// field carrying the wrong JSON type.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let tree: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::decode(e.to_string()))?;
        if !tree.is_object() {
            return Err(ProtocolError::decode("expected a JSON object"));
        }
        serde_json::from_value(tree).map_err(|e| ProtocolError::decode(e.to_string()))
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::encode(e.to_string()))
    }

    /// Effective schema version: the declared one, or 1 when absent or < 1.
    pub fn schema_version(&self) -> u64 {
        self.schema_version
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v >= 1)
            .unwrap_or(1)
    }

    /// Projects `data` into a task payload.
    pub fn task_payload(&self) -> ProtocolResult<TaskPayload> {
        let data = self.payload_value(PayloadKind::Task)?;
        TaskPayload::deserialize(data)
            .map_err(|e| ProtocolError::invalid_payload(PayloadKind::Task, e.to_string()))
    }

    /// Projects `data` into a tag payload.
    pub fn tag_payload(&self) -> ProtocolResult<TagPayload> {
        let data = self.payload_value(PayloadKind::Tag)?;
        TagPayload::deserialize(data)
            .map_err(|e| ProtocolError::invalid_payload(PayloadKind::Tag, e.to_string()))
    }

    fn payload_value(&self, kind: PayloadKind) -> ProtocolResult<&Value> {
        self.data
            .as_ref()
            .ok_or_else(|| ProtocolError::invalid_payload(kind, "missing data"))
    }
}
