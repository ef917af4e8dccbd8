//! Server configuration.

use std::net::SocketAddr;

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Per-connection outbound queue length. A connection whose queue is
    /// full when a broadcast arrives is treated as failed and dropped.
    pub outbound_buffer: usize,
    /// Length of the hub's register and broadcast queues.
    pub command_queue: usize,
    /// Whether a broadcast is echoed back to the connection that sent it.
    pub echo_to_sender: bool,
    /// Actor id stamped on server-originated responses.
    pub server_actor_id: String,
    /// Root reported for `GET_MERKLE_ROOT`.
    pub placeholder_root: String,
    /// Token handed out by the login endpoint.
    pub login_token: String,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            outbound_buffer: 256,
            command_queue: 1024,
            echo_to_sender: true,
            server_actor_id: "server".to_string(),
            placeholder_root: "hash-empty-tree".to_string(),
            login_token: "mock-jwt-token-12345".to_string(),
        }
    }

    /// Sets the per-connection outbound queue length.
    pub fn with_outbound_buffer(mut self, size: usize) -> Self {
        self.outbound_buffer = size.max(1);
        self
    }

    /// Sets the hub queue length.
    pub fn with_command_queue(mut self, size: usize) -> Self {
        self.command_queue = size.max(1);
        self
    }

    /// Enables or disables echoing broadcasts to their sender.
    pub fn with_echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    /// Sets the server actor id.
    pub fn with_server_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.server_actor_id = actor_id.into();
        self
    }

    /// Sets the placeholder Merkle root.
    pub fn with_placeholder_root(mut self, root: impl Into<String>) -> Self {
        self.placeholder_root = root.into();
        self
    }

    /// Returns the hub settings.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            command_queue: self.command_queue,
            echo_to_sender: self.echo_to_sender,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

/// Settings for the hub coordinator.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Length of the register and broadcast queues.
    pub command_queue: usize,
    /// Whether a broadcast is echoed back to its origin.
    pub echo_to_sender: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        ServerConfig::default().hub_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.echo_to_sender);
        assert_eq!(config.server_actor_id, "server");
        assert_eq!(config.placeholder_root, "hash-empty-tree");
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_outbound_buffer(16)
            .with_command_queue(0)
            .with_echo_to_sender(false)
            .with_server_actor_id("relay-1");

        assert_eq!(config.outbound_buffer, 16);
        assert_eq!(config.command_queue, 1);
        assert_eq!(config.server_actor_id, "relay-1");

        let hub = config.hub_config();
        assert_eq!(hub.command_queue, 1);
        assert!(!hub.echo_to_sender);
    }
}
