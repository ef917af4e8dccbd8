//! Per-connection session loop.
//!
//! A session reads one message at a time, classifies it by `type` and either
//! replies directly, hands the raw bytes to the hub, or drops it. Only the
//! routing header is read; other fields are never type checked. Per-message
//! problems are logged and never end the session. A read failure, end of
//! stream, or eviction by the hub does.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::hub::{ConnectionHandle, ConnectionId, Hub};
use bytes::Bytes;
use ganttsync_protocol::{Header, Hlc, OperationCategory, OperationType, Response};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Inbound side of a connection.
pub trait MessageSource: Send {
    /// Waits for the next message. `None` means the peer closed cleanly.
    fn next_message(&mut self) -> impl Future<Output = Option<ServerResult<Bytes>>> + Send;
}

impl MessageSource for mpsc::Receiver<ServerResult<Bytes>> {
    fn next_message(&mut self) -> impl Future<Output = Option<ServerResult<Bytes>>> + Send {
        self.recv()
    }
}

/// Server identity used in control replies.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Actor id stamped on server responses.
    pub server_actor_id: String,
    /// Root reported for `GET_MERKLE_ROOT`.
    pub placeholder_root: String,
}

impl From<&ServerConfig> for SessionContext {
    fn from(config: &ServerConfig) -> Self {
        Self {
            server_actor_id: config.server_actor_id.clone(),
            placeholder_root: config.placeholder_root.clone(),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handed to the hub for fan-out.
    Broadcast,
    /// Answered directly to the sender.
    Replied,
    /// Rejected (undecodable, bad timestamp, or undeliverable).
    Dropped,
    /// Not understood; nothing was sent.
    Ignored,
}

/// Unregisters the connection when dropped, whichever way the session ends.
struct Registration {
    hub: Hub,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.hub.unregister(self.id).is_err() {
            debug!(connection = %self.id, "hub already closed at unregister");
        }
    }
}

/// One client connection.
pub struct Session {
    handle: ConnectionHandle,
    hub: Hub,
    context: Arc<SessionContext>,
    _registration: Registration,
}

impl Session {
    /// Registers the connection with the hub.
    pub async fn start(
        hub: Hub,
        handle: ConnectionHandle,
        context: Arc<SessionContext>,
    ) -> ServerResult<Self> {
        hub.register(handle.clone()).await?;
        info!(connection = %handle.id(), "session started");

        let registration = Registration {
            hub: hub.clone(),
            id: handle.id(),
        };
        Ok(Self {
            handle,
            hub,
            context,
            _registration: registration,
        })
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Runs until the source fails or closes, or the hub evicts the
    /// connection, then unregisters.
    pub async fn run<S: MessageSource>(self, mut source: S) {
        let evicted = self.handle.eviction().wait();
        tokio::pin!(evicted);

        loop {
            let message = tokio::select! {
                biased;
                () = &mut evicted => {
                    warn!(connection = %self.id(), "evicted by hub, closing session");
                    break;
                }
                message = source.next_message() => message,
            };
            match message {
                Some(Ok(raw)) => {
                    self.handle_message(raw).await;
                }
                Some(Err(err)) => {
                    warn!(connection = %self.id(), error = %err, "read failed, closing session");
                    break;
                }
                None => {
                    debug!(connection = %self.id(), "peer closed connection");
                    break;
                }
            }
        }
        info!(connection = %self.id(), "session ended");
    }

    /// Processes one raw message.
    pub async fn handle_message(&self, raw: Bytes) -> Disposition {
        let header = match Header::read(&raw) {
            Ok(header) => header,
            Err(err) => {
                warn!(connection = %self.id(), error = %err, "dropping undecodable message");
                return Disposition::Dropped;
            }
        };
        debug!(connection = %self.id(), op_type = %header.op_type, "message received");

        match header.op_type.category() {
            OperationCategory::Control => self.reply(&header).await,
            OperationCategory::Causal => {
                // Presence of a timestamp is optional here; validity is not.
                // A non-string timestamp counts as absent.
                if let Some(timestamp) = header.timestamp.as_deref() {
                    if let Err(err) = Hlc::parse(timestamp) {
                        warn!(
                            connection = %self.id(),
                            op_type = %header.op_type,
                            timestamp,
                            kind = err.kind(),
                            error = %err,
                            "dropping operation with invalid HLC"
                        );
                        return Disposition::Dropped;
                    }
                }
                self.broadcast(raw).await
            }
            OperationCategory::Ephemeral => self.broadcast(raw).await,
            OperationCategory::Unrecognized => {
                warn!(connection = %self.id(), op_type = %header.op_type, "unknown message type");
                Disposition::Ignored
            }
        }
    }

    async fn reply(&self, header: &Header) -> Disposition {
        let response = match &header.op_type {
            OperationType::Subscribe => match header.channel.as_deref() {
                Some(channel) => Response::subscribe_success(channel),
                None => {
                    warn!(connection = %self.id(), "subscribe without channel");
                    return Disposition::Ignored;
                }
            },
            OperationType::GetMerkleRoot => Response::merkle_root(
                &self.context.placeholder_root,
                &self.context.server_actor_id,
            ),
            other => {
                debug!(connection = %self.id(), op_type = %other, "no control reply defined");
                return Disposition::Ignored;
            }
        };

        let payload = match response.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(connection = %self.id(), error = %err, "failed to encode reply");
                return Disposition::Dropped;
            }
        };

        match self.handle.send(payload).await {
            Ok(()) => Disposition::Replied,
            Err(err) => {
                debug!(connection = %self.id(), error = %err, "reply not delivered");
                Disposition::Dropped
            }
        }
    }

    async fn broadcast(&self, raw: Bytes) -> Disposition {
        match self.hub.broadcast(Some(self.id()), raw).await {
            Ok(()) => Disposition::Broadcast,
            Err(err) => {
                warn!(connection = %self.id(), error = %err, "broadcast failed");
                Disposition::Dropped
            }
        }
    }
}
