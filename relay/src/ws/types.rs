//! Domain types for WebSocket broadcasting.

use axum::extract::ws::Utf8Bytes;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identity of one accepted connection, used for set membership and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message queued in a connection's outbox.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// A serialized event envelope, shared across all recipients.
    Event(Utf8Bytes),
    /// The server is stopping; close the connection.
    Shutdown,
}

/// Errors raised by the broadcast server and the wire protocol.
#[derive(Debug, Error)]
pub enum WsError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A WebSocket transport error.
    #[error("WebSocket connection error: {0}")]
    AxumWs(#[from] axum::Error),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The connection hub is no longer running.
    #[error("Broadcast channel closed")]
    ChannelClosed,

    /// The background server thread could not be started or died during startup.
    #[error("server thread failed: {0}")]
    ServerThread(String),
}
