//! Connection hub.
//!
//! The hub owns the registry of live connections. All registry access goes
//! through one coordinator task that drains three queues (register,
//! unregister, broadcast), so a broadcast never observes a registry that is
//! halfway through a register or unregister. The registry itself is a plain
//! `HashMap` owned by that task.
//!
//! Each connection is represented by a [`ConnectionHandle`]: the sending half
//! of a bounded queue drained by the connection's writer task. Dropping the
//! last handle ends the writer, which closes the socket. When the hub drops a
//! connection it cannot deliver to, it also fires the handle's [`Eviction`]
//! so the session and writer holding other clones shut down too.

use crate::config::HubConfig;
use crate::error::{ServerError, ServerResult};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound side of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Bytes>,
    evicted: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Wraps an existing outbound queue.
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Bytes>) -> Self {
        let (evicted, _) = watch::channel(false);
        Self {
            id,
            outbound,
            evicted: Arc::new(evicted),
        }
    }

    /// Creates a handle with a fresh id and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::next(), tx), rx)
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns true once the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Returns a signal that fires once the hub evicts this connection.
    pub fn eviction(&self) -> Eviction {
        Eviction(self.evicted.subscribe())
    }

    /// Sends a direct reply to this connection, waiting for queue space.
    ///
    /// Gives up if the connection is evicted while waiting.
    pub async fn send(&self, payload: Bytes) -> ServerResult<()> {
        tokio::select! {
            sent = self.outbound.send(payload) => {
                sent.map_err(|_| ServerError::Transport(format!("{} is closed", self.id)))
            }
            () = self.eviction().wait() => {
                Err(ServerError::Transport(format!("{} was evicted", self.id)))
            }
        }
    }

    fn try_deliver(&self, payload: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.outbound.try_send(payload)
    }

    fn evict(&self) {
        self.evicted.send_replace(true);
    }
}

/// Fires when the hub drops a connection it could not deliver to.
#[derive(Debug, Clone)]
pub struct Eviction(watch::Receiver<bool>);

impl Eviction {
    /// Resolves once the connection is evicted.
    ///
    /// Never resolves for a connection that is released any other way.
    pub async fn wait(mut self) {
        loop {
            let evicted = *self.0.borrow_and_update();
            if evicted {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Returns true if the connection has already been evicted.
    pub fn is_evicted(&self) -> bool {
        *self.0.borrow()
    }
}

#[derive(Debug)]
struct BroadcastRequest {
    origin: Option<ConnectionId>,
    payload: Bytes,
}

/// Cloneable front end to the hub coordinator.
///
/// The coordinator task stops once every `Hub` clone has been dropped.
#[derive(Debug, Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<ConnectionHandle>,
    unregister_tx: mpsc::UnboundedSender<ConnectionId>,
    broadcast_tx: mpsc::Sender<BroadcastRequest>,
    query_tx: mpsc::Sender<oneshot::Sender<usize>>,
}

impl Hub {
    /// Spawns the coordinator on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> (Self, JoinHandle<()>) {
        let queue = config.command_queue.max(1);
        let (register_tx, register_rx) = mpsc::channel(queue);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(queue);
        let (query_tx, query_rx) = mpsc::channel(16);

        let coordinator = Coordinator::new(config.echo_to_sender);
        let inbox = Inbox {
            register: register_rx,
            unregister: unregister_rx,
            broadcast: broadcast_rx,
            queries: query_rx,
        };
        let task = tokio::spawn(coordinator.run(inbox));

        let hub = Self {
            register_tx,
            unregister_tx,
            broadcast_tx,
            query_tx,
        };
        (hub, task)
    }

    /// Adds a connection. Registering the same id twice is a no-op.
    pub async fn register(&self, handle: ConnectionHandle) -> ServerResult<()> {
        self.register_tx
            .send(handle)
            .await
            .map_err(|_| ServerError::HubClosed)
    }

    /// Removes a connection and releases its outbound queue.
    ///
    /// Never blocks, so it can be called from `Drop`. Unknown ids are ignored.
    pub fn unregister(&self, id: ConnectionId) -> ServerResult<()> {
        self.unregister_tx
            .send(id)
            .map_err(|_| ServerError::HubClosed)
    }

    /// Queues `payload` for delivery to every registered connection.
    ///
    /// `origin` is skipped when echo is disabled.
    pub async fn broadcast(&self, origin: Option<ConnectionId>, payload: Bytes) -> ServerResult<()> {
        self.broadcast_tx
            .send(BroadcastRequest { origin, payload })
            .await
            .map_err(|_| ServerError::HubClosed)
    }

    /// Number of registered connections, after every earlier request from
    /// this caller has been applied.
    pub async fn connection_count(&self) -> ServerResult<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.query_tx
            .send(reply_tx)
            .await
            .map_err(|_| ServerError::HubClosed)?;
        reply_rx.await.map_err(|_| ServerError::HubClosed)
    }
}

struct Inbox {
    register: mpsc::Receiver<ConnectionHandle>,
    unregister: mpsc::UnboundedReceiver<ConnectionId>,
    broadcast: mpsc::Receiver<BroadcastRequest>,
    queries: mpsc::Receiver<oneshot::Sender<usize>>,
}

/// Sole owner of the registry.
struct Coordinator {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    echo_to_sender: bool,
}

impl Coordinator {
    fn new(echo_to_sender: bool) -> Self {
        Self {
            connections: HashMap::new(),
            echo_to_sender,
        }
    }

    async fn run(mut self, inbox: Inbox) {
        let Inbox {
            mut register,
            mut unregister,
            mut broadcast,
            mut queries,
        } = inbox;

        loop {
            // Registry changes win over queued broadcasts. Each one is a
            // single map operation and arrives at most once per connection,
            // so broadcasts only ever wait behind connection churn.
            tokio::select! {
                biased;
                Some(handle) = register.recv() => self.register(handle),
                Some(id) = unregister.recv() => self.unregister(id),
                Some(request) = broadcast.recv() => {
                    self.broadcast(request.origin, &request.payload);
                }
                Some(reply) = queries.recv() => {
                    let _ = reply.send(self.connections.len());
                }
                else => break,
            }
        }

        debug!(remaining = self.connections.len(), "hub coordinator stopped");
    }

    fn register(&mut self, handle: ConnectionHandle) {
        let id = handle.id();
        if self.connections.insert(id, handle).is_none() {
            debug!(connection = %id, total = self.connections.len(), "connection registered");
        }
    }

    fn unregister(&mut self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            debug!(connection = %id, total = self.connections.len(), "connection unregistered");
        }
    }

    /// Delivers to every connection; failed ones are dropped in the same pass.
    fn broadcast(&mut self, origin: Option<ConnectionId>, payload: &Bytes) -> usize {
        let echo_to_sender = self.echo_to_sender;
        let mut delivered = 0;

        self.connections.retain(|id, handle| {
            if !echo_to_sender && origin == Some(*id) {
                return true;
            }
            match handle.try_deliver(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(connection = %id, "outbound queue full, dropping connection");
                    handle.evict();
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = %id, "connection closed during broadcast");
                    handle.evict();
                    false
                }
            }
        });

        debug!(delivered, bytes = payload.len(), "broadcast complete");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hub(echo_to_sender: bool) -> Hub {
        let config = HubConfig {
            command_queue: 64,
            echo_to_sender,
        };
        Hub::spawn(config).0
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn-"));
    }

    #[test]
    fn coordinator_drops_closed_connections() {
        let mut coordinator = Coordinator::new(true);
        let (alive, mut alive_rx) = ConnectionHandle::channel(4);
        let (dead, dead_rx) = ConnectionHandle::channel(4);
        drop(dead_rx);

        coordinator.register(alive);
        coordinator.register(dead);

        let delivered = coordinator.broadcast(None, &Bytes::from_static(b"m"));
        assert_eq!(delivered, 1);
        assert_eq!(coordinator.connections.len(), 1);
        assert_eq!(alive_rx.try_recv().unwrap(), Bytes::from_static(b"m"));
    }

    #[test]
    fn coordinator_drops_lagging_connections() {
        let mut coordinator = Coordinator::new(true);
        let (slow, _slow_rx) = ConnectionHandle::channel(1);
        let slow_id = slow.id();
        let eviction = slow.eviction();
        coordinator.register(slow);

        assert_eq!(coordinator.broadcast(None, &Bytes::from_static(b"1")), 1);
        assert!(!eviction.is_evicted());
        assert_eq!(coordinator.broadcast(None, &Bytes::from_static(b"2")), 0);
        assert!(!coordinator.connections.contains_key(&slow_id));
        assert!(eviction.is_evicted());
    }

    #[test]
    fn coordinator_register_is_idempotent() {
        let mut coordinator = Coordinator::new(true);
        let (handle, _rx) = ConnectionHandle::channel(4);
        coordinator.register(handle.clone());
        coordinator.register(handle.clone());
        assert_eq!(coordinator.connections.len(), 1);

        coordinator.unregister(handle.id());
        coordinator.unregister(handle.id());
        assert!(coordinator.connections.is_empty());
        // Leaving is not an eviction.
        assert!(!handle.eviction().is_evicted());
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_including_origin() {
        let hub = hub(true);
        let (a, mut a_rx) = ConnectionHandle::channel(8);
        let (b, mut b_rx) = ConnectionHandle::channel(8);
        let (c, mut c_rx) = ConnectionHandle::channel(8);
        let origin = a.id();

        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();
        hub.register(c).await.unwrap();
        hub.broadcast(Some(origin), Bytes::from_static(b"M"))
            .await
            .unwrap();

        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"M"));
        }
    }

    #[tokio::test]
    async fn broadcast_skips_origin_without_echo() {
        let hub = hub(false);
        let (a, mut a_rx) = ConnectionHandle::channel(8);
        let (b, mut b_rx) = ConnectionHandle::channel(8);
        let origin = a.id();

        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();
        hub.broadcast(Some(origin), Bytes::from_static(b"M"))
            .await
            .unwrap();
        hub.connection_count().await.unwrap();

        assert_eq!(b_rx.recv().await.unwrap(), Bytes::from_static(b"M"));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcasts_arrive_in_submission_order() {
        let hub = hub(true);
        let (a, mut a_rx) = ConnectionHandle::channel(64);
        hub.register(a).await.unwrap();

        for i in 0..32u8 {
            hub.broadcast(None, Bytes::from(vec![i])).await.unwrap();
        }
        for i in 0..32u8 {
            assert_eq!(a_rx.recv().await.unwrap(), Bytes::from(vec![i]));
        }
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_fan_out() {
        let hub = hub(true);
        let (a, a_rx) = ConnectionHandle::channel(8);
        let (b, mut b_rx) = ConnectionHandle::channel(8);
        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();
        drop(a_rx);

        hub.broadcast(None, Bytes::from_static(b"M")).await.unwrap();
        assert_eq!(b_rx.recv().await.unwrap(), Bytes::from_static(b"M"));
        assert_eq!(hub.connection_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unregister_releases_connection() {
        let hub = hub(true);
        let (a, mut a_rx) = ConnectionHandle::channel(8);
        let id = a.id();
        hub.register(a).await.unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        hub.unregister(id).unwrap();
        hub.unregister(id).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 0);

        // The hub held the only sender, so the queue is now closed.
        assert!(a_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_race() {
        let hub = hub(true);
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, mut rx) = ConnectionHandle::channel(256);
                let id = handle.id();
                hub.register(handle).await.unwrap();
                hub.broadcast(Some(id), Bytes::from_static(b"x"))
                    .await
                    .unwrap();
                // Anything arriving here proves the registration landed.
                assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"x"));
                hub.unregister(id).unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(hub.connection_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn eviction_releases_every_clone() {
        let hub = hub(true);
        let (slow, mut slow_rx) = ConnectionHandle::channel(1);
        let kept = slow.clone();
        hub.register(slow).await.unwrap();

        hub.broadcast(None, Bytes::from_static(b"1")).await.unwrap();
        hub.broadcast(None, Bytes::from_static(b"2")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), kept.eviction().wait())
            .await
            .unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 0);

        // A pending reply gives up instead of waiting on the full queue.
        assert!(kept.send(Bytes::from_static(b"r")).await.is_err());

        drop(kept);
        assert_eq!(slow_rx.recv().await.unwrap(), Bytes::from_static(b"1"));
        assert!(slow_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn queued_registrations_precede_broadcast() {
        let hub = hub(true);
        let mut receivers = Vec::new();
        for _ in 0..32 {
            let (handle, rx) = ConnectionHandle::channel(4);
            hub.register(handle).await.unwrap();
            receivers.push(rx);
        }
        hub.broadcast(None, Bytes::from_static(b"M")).await.unwrap();

        for rx in &mut receivers {
            assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"M"));
        }
    }

    #[tokio::test]
    async fn coordinator_stops_when_hub_dropped() {
        let (hub, task) = Hub::spawn(HubConfig::default());
        drop(hub);
        task.await.unwrap();
    }
}
