//! WebSocket upgrade handler.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::ws::auth::Authenticator;
use crate::ws::broadcaster::Broadcaster;
use crate::ws::connection::Connection;

/// Shared state handed to every upgraded connection.
#[derive(Clone)]
pub struct WsState {
    /// Hand-off to the connection hub.
    pub broadcaster: Broadcaster,
    /// Handshake validator.
    pub authenticator: Arc<dyn Authenticator>,
    /// Keep-alive ping period.
    pub ping_interval: Duration,
}

/// Handles WebSocket upgrade requests.
///
/// The connection joins the broadcast set before the client's handshake
/// arrives, so it receives broadcasts from the moment it is accepted.
pub async fn handle_ws_upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| async move {
        let receiver = match state.broadcaster.subscribe() {
            Ok(receiver) => receiver,
            Err(e) => {
                warn!(error = %e, "Rejecting connection, server is stopping");
                return;
            }
        };
        let connection = Connection::new(
            socket,
            receiver,
            Arc::clone(&state.authenticator),
            state.ping_interval,
        );
        let client_id = connection.client_id();

        if let Err(e) = connection.run().await {
            error!(client_id = %client_id, error = %e, "WebSocket connection error");
        }
    })
}

/// Creates a router that upgrades WebSocket requests on `/` and `/ws`.
pub fn ws_router(state: WsState) -> Router {
    Router::new()
        .route("/", get(handle_ws_upgrade))
        .route("/ws", get(handle_ws_upgrade))
        .with_state(state)
}
