//! Control responses sent directly to a single client.

use crate::error::{ProtocolError, ProtocolResult};
use crate::hlc::Hlc;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Body of a `MERKLE_ROOT` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleRootData {
    /// Root hash of the server's snapshot.
    pub root: String,
}

/// A server-originated control response.
///
/// `SUBSCRIBE_SUCCESS` carries no timestamp or actor, which marks it as a
/// control message rather than a data operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Acknowledges a `subscribe` request.
    #[serde(rename = "SUBSCRIBE_SUCCESS")]
    SubscribeSuccess {
        /// The channel that was requested.
        channel: String,
    },

    /// Answers `GET_MERKLE_ROOT`.
    #[serde(rename = "MERKLE_ROOT", rename_all = "camelCase")]
    MerkleRoot {
        /// The root.
        data: MerkleRootData,
        /// Always [`Hlc::zero`]; the reply is not a causal event.
        timestamp: Hlc,
        /// Server identity.
        actor_id: String,
    },
}

impl Response {
    /// Creates a subscribe acknowledgment.
    pub fn subscribe_success(channel: impl Into<String>) -> Self {
        Response::SubscribeSuccess {
            channel: channel.into(),
        }
    }

    /// Creates a root response stamped with the zero timestamp.
    pub fn merkle_root(root: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Response::MerkleRoot {
            data: MerkleRootData { root: root.into() },
            timestamp: Hlc::zero(),
            actor_id: actor_id.into(),
        }
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::encode(e.to_string()))
    }

    /// Decodes a response, as a client would.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::decode(e.to_string()))
    }
}
