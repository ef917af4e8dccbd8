//! Serve command implementation.

use ganttsync_server::{RelayServer, ServerConfig};
use tracing::{info, warn};

/// Runs the relay until Ctrl-C.
pub fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        bind = %config.bind_addr,
        echo_to_sender = config.echo_to_sender,
        "starting Gantt-Sync relay"
    );
    println!("Gantt-Sync relay listening on {}", config.bind_addr);
    println!(" - POST /auth/login (returns mock token)");
    println!(" - WS   / (sync functionality)");
    println!(" - POST /validate-op (validation only)");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let server = RelayServer::new(config);
        server.serve_with_shutdown(shutdown_signal()).await
    })?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "cannot listen for Ctrl-C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
