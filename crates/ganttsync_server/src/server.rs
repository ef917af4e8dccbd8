//! Main relay server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::http::{router, AppState};
use crate::hub::Hub;
use axum::Router;
use ganttsync_protocol::{validate_bytes, ValidatedOperation};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The relay server.
///
/// Owns the hub and exposes the HTTP/WebSocket surface.
///
/// # Example
///
/// ```no_run
/// use ganttsync_server::{RelayServer, ServerConfig};
///
/// # async fn run() -> Result<(), ganttsync_server::ServerError> {
/// let server = RelayServer::new(ServerConfig::default());
/// server.serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayServer {
    config: Arc<ServerConfig>,
    hub: Hub,
}

impl RelayServer {
    /// Creates a server and spawns its hub.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let (hub, _coordinator) = Hub::spawn(config.hub_config());
        Self {
            config: Arc::new(config),
            hub,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the hub.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Builds the axum router for this server.
    pub fn router(&self) -> Router {
        router(AppState::new(self.hub.clone(), Arc::clone(&self.config)))
    }

    /// Validates one raw operation without broadcasting it.
    pub fn validate(&self, bytes: &[u8]) -> ServerResult<ValidatedOperation> {
        Ok(validate_bytes(bytes)?)
    }

    /// Binds the configured address and serves until the process exits.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "relay listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("relay stopped");
        Ok(())
    }
}
