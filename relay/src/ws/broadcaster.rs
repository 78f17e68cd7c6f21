//! Broadcaster handle for event distribution.

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::protocol::EventEnvelope;
use crate::ws::hub::{ConnectionHub, HubCommand};
use crate::ws::types::{BroadcastMessage, ClientId, WsError};

/// Default per-connection outbox capacity.
pub const OUTBOX_CAPACITY: usize = 256;

/// Thread-safe handle for broadcasting to all connected WebSocket clients.
///
/// Cloning is cheap. Every method only enqueues a command for the
/// [`ConnectionHub`], so it may be called from any thread, inside or outside
/// a tokio runtime, without touching a socket.
#[derive(Clone)]
pub struct Broadcaster {
    commands: mpsc::UnboundedSender<HubCommand>,
    client_count: Arc<AtomicUsize>,
    outbox_capacity: usize,
}

impl Broadcaster {
    /// Creates a broadcaster and the hub task that must be spawned to serve it.
    #[must_use]
    pub fn new(outbox_capacity: usize) -> (Self, ConnectionHub) {
        let (commands, rx) = mpsc::unbounded_channel();
        let client_count = Arc::new(AtomicUsize::new(0));
        let hub = ConnectionHub::new(rx, Arc::clone(&client_count));
        let broadcaster = Self {
            commands,
            client_count,
            outbox_capacity: outbox_capacity.max(1),
        };
        (broadcaster, hub)
    }

    /// Subscribes a new client to receive broadcast messages.
    ///
    /// # Errors
    ///
    /// Returns `WsError::ChannelClosed` if the hub has stopped.
    pub fn subscribe(&self) -> Result<BroadcastReceiver, WsError> {
        let client_id = ClientId::generate();
        let (outbox, inner) = mpsc::channel(self.outbox_capacity);
        self.commands
            .send(HubCommand::Register { client_id, outbox })
            .map_err(|_| WsError::ChannelClosed)?;
        debug!(client_id = %client_id, "Client subscribed");
        Ok(BroadcastReceiver {
            client_id,
            inner,
            commands: self.commands.clone(),
        })
    }

    /// Broadcasts `{"event": event, "data": data}` to every connected client.
    ///
    /// Delivery failures to individual clients never surface here; the hub
    /// drops those clients and carries on.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized or the hub has stopped.
    pub fn broadcast<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> Result<(), WsError> {
        let data = serde_json::to_value(data).map_err(WsError::Serialization)?;
        self.broadcast_envelope(&EventEnvelope::new(event, data))
    }

    /// Broadcasts a prepared envelope to every connected client.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be serialized or the hub has stopped.
    pub fn broadcast_envelope(&self, envelope: &EventEnvelope) -> Result<(), WsError> {
        let frame = Utf8Bytes::from(envelope.to_frame()?);
        debug!(event = %envelope.event, "Broadcasting event");
        self.commands
            .send(HubCommand::Broadcast { frame })
            .map_err(|_| {
                warn!(event = %envelope.event, "Broadcast dropped, hub is stopped");
                WsError::ChannelClosed
            })
    }

    /// Returns the number of connected clients as last published by the hub.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Returns the connection set size once every previously queued command
    /// has been applied.
    ///
    /// # Errors
    ///
    /// Returns `WsError::ChannelClosed` if the hub has stopped.
    pub async fn settled_count(&self) -> Result<usize, WsError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Count { reply })
            .map_err(|_| WsError::ChannelClosed)?;
        rx.await.map_err(|_| WsError::ChannelClosed)
    }

    /// Returns `true` once the hub has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Asks the hub to close every connection and stop.
    pub fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown);
    }
}

/// Receiver for broadcast messages addressed to one connection.
///
/// Dropping it removes the connection from the hub's set.
pub struct BroadcastReceiver {
    client_id: ClientId,
    inner: mpsc::Receiver<BroadcastMessage>,
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl BroadcastReceiver {
    /// Returns the identity this receiver was registered under.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Receive a broadcast message.
    ///
    /// # Errors
    /// Returns `WsError::ChannelClosed` once the hub has dropped this client,
    /// either because it lagged or because the server is stopping.
    pub async fn recv(&mut self) -> Result<BroadcastMessage, WsError> {
        self.inner.recv().await.ok_or(WsError::ChannelClosed)
    }
}

impl Drop for BroadcastReceiver {
    fn drop(&mut self) {
        let _ = self.commands.send(HubCommand::Unregister {
            client_id: self.client_id,
        });
        debug!(client_id = %self.client_id, "Client unsubscribed");
    }
}
