//! Single owner of the live connection set.
//!
//! Every mutation and iteration of the set happens inside [`ConnectionHub::run`].
//! Other threads and tasks talk to it only through [`HubCommand`]s.

use axum::extract::ws::Utf8Bytes;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::ws::types::{BroadcastMessage, ClientId};

/// Commands accepted by the hub.
pub(crate) enum HubCommand {
    Register {
        client_id: ClientId,
        outbox: mpsc::Sender<BroadcastMessage>,
    },
    Unregister {
        client_id: ClientId,
    },
    Broadcast {
        frame: Utf8Bytes,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Task that owns the connection set and fans out broadcasts.
pub struct ConnectionHub {
    commands: mpsc::UnboundedReceiver<HubCommand>,
    connections: HashMap<ClientId, mpsc::Sender<BroadcastMessage>>,
    client_count: Arc<AtomicUsize>,
}

impl ConnectionHub {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<HubCommand>,
        client_count: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            commands,
            connections: HashMap::new(),
            client_count,
        }
    }

    /// Processes commands until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register { client_id, outbox } => {
                    self.connections.insert(client_id, outbox);
                    counter!("relay_connections_total").increment(1);
                    debug!(client_id = %client_id, "Connection registered");
                    self.publish_count();
                }
                HubCommand::Unregister { client_id } => {
                    if self.connections.remove(&client_id).is_some() {
                        debug!(client_id = %client_id, "Connection unregistered");
                        self.publish_count();
                    }
                }
                HubCommand::Broadcast { frame } => self.fan_out(&frame),
                HubCommand::Count { reply } => {
                    let _ = reply.send(self.connections.len());
                }
                HubCommand::Shutdown => {
                    self.close_all();
                    break;
                }
            }
        }
        debug!("Connection hub stopped");
    }

    fn fan_out(&mut self, frame: &Utf8Bytes) {
        counter!("relay_broadcasts_total").increment(1);

        let mut evicted = Vec::new();
        let mut delivered = 0usize;
        for (client_id, outbox) in &self.connections {
            match outbox.try_send(BroadcastMessage::Event(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %client_id, "Client lagging, disconnecting");
                    counter!("relay_frames_dropped_total").increment(1);
                    evicted.push(*client_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %client_id, "Dropping stale connection");
                    evicted.push(*client_id);
                }
            }
        }

        for client_id in &evicted {
            self.connections.remove(client_id);
        }
        if !evicted.is_empty() {
            self.publish_count();
        }
        debug!(delivered, evicted = evicted.len(), "Broadcast fanned out");
    }

    fn close_all(&mut self) {
        info!(clients = self.connections.len(), "Closing all connections");
        for (_, outbox) in self.connections.drain() {
            let _ = outbox.try_send(BroadcastMessage::Shutdown);
        }
        self.publish_count();
    }

    fn publish_count(&self) {
        let count = self.connections.len();
        self.client_count.store(count, Ordering::SeqCst);
        #[allow(clippy::cast_precision_loss)]
        gauge!("relay_connections_active").set(count as f64);
    }
}
