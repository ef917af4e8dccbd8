//! HTTP endpoints and the WebSocket transport.
//!
//! - `GET /` upgrades to the sync WebSocket, or returns a banner
//! - `POST /auth/login` hands out a fixed token without looking at the body
//! - `POST /validate-op` runs the standalone validator on one operation

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::hub::{ConnectionHandle, Eviction, Hub};
use crate::session::{MessageSource, Session, SessionContext};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ganttsync_protocol::validate_bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BANNER: &str = "Gantt-Sync Relay\n\nEndpoints:\n - POST /auth/login\n - WS   /\n - POST /validate-op\n";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    hub: Hub,
    config: Arc<ServerConfig>,
    context: Arc<SessionContext>,
}

impl AppState {
    /// Creates handler state around a running hub.
    pub fn new(hub: Hub, config: Arc<ServerConfig>) -> Self {
        let context = Arc::new(SessionContext::from(config.as_ref()));
        Self {
            hub,
            config,
            context,
        }
    }
}

/// Body of a login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Opaque bearer token.
    pub access_token: String,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/auth/login", post(login))
        .route("/validate-op", post(validate_op))
        .with_state(state)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

async fn root(State(state): State<AppState>, upgrade: Option<WebSocketUpgrade>) -> Response {
    match upgrade {
        Some(upgrade) => upgrade.on_upgrade(move |socket| serve_socket(socket, state)),
        None => BANNER.into_response(),
    }
}

async fn login(State(state): State<AppState>) -> Json<LoginResponse> {
    Json(LoginResponse {
        access_token: state.config.login_token.clone(),
    })
}

async fn validate_op(body: Bytes) -> Response {
    match validate_bytes(&body) {
        Ok(operation) => {
            info!(
                op_type = %operation.op_type,
                schema_version = operation.schema_version,
                timestamp = %operation.timestamp,
                "operation valid"
            );
            (StatusCode::OK, "Operation Valid").into_response()
        }
        Err(err) => {
            info!(error = %err, "operation rejected");
            ServerError::from(err).into_response()
        }
    }
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let (handle, outbound) = ConnectionHandle::channel(state.config.outbound_buffer);
    let id = handle.id();
    tokio::spawn(write_loop(sink, outbound, handle.eviction()));

    match Session::start(state.hub.clone(), handle, Arc::clone(&state.context)).await {
        Ok(session) => session.run(WsSource { stream }).await,
        Err(err) => warn!(connection = %id, error = %err, "could not register connection"),
    }
}

/// Drains a connection's outbound queue into its socket until the queue
/// closes or the hub evicts the connection.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Bytes>,
    eviction: Eviction,
) {
    let pump = async {
        while let Some(payload) = outbound.recv().await {
            let message = match String::from_utf8(payload.to_vec()) {
                Ok(text) => Message::Text(text),
                Err(err) => Message::Binary(err.into_bytes()),
            };
            if let Err(err) = sink.send(message).await {
                debug!(error = %err, "websocket write failed");
                break;
            }
        }
    };

    tokio::select! {
        () = eviction.wait() => debug!("connection evicted, closing socket"),
        () = pump => {}
    }
    let _ = sink.close().await;
}

struct WsSource {
    stream: SplitStream<WebSocket>,
}

impl MessageSource for WsSource {
    fn next_message(&mut self) -> impl Future<Output = Option<ServerResult<Bytes>>> + Send {
        async move {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text))),
                    Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                    Ok(Message::Close(_)) => return None,
                    Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                    Err(err) => return Some(Err(ServerError::Transport(err.to_string()))),
                }
            }
        }
    }
}
