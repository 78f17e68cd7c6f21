//! WebSocket connection lifecycle management.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::StreamExt;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::protocol::Handshake;
use crate::ws::auth::{AuthDecision, Authenticator};
use crate::ws::broadcaster::BroadcastReceiver;
use crate::ws::types::{BroadcastMessage, ClientId, WsError};

/// What the connection loop should do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The peer is gone; nothing more to send.
    PeerClosed,
    /// The server ends the connection with a close frame.
    Close,
}

/// One accepted WebSocket connection.
///
/// Owns the socket, so every read and write to it happens on this task.
/// The connection leaves the hub's set when `receiver` is dropped, which
/// happens however [`Connection::run`] returns.
pub struct Connection {
    client_id: ClientId,
    stream: WebSocket,
    receiver: BroadcastReceiver,
    authenticator: Arc<dyn Authenticator>,
    ping_interval: Duration,
    authenticated: bool,
}

impl Connection {
    /// Creates a new WebSocket connection.
    ///
    /// # Arguments
    ///
    /// * `stream` - The WebSocket stream.
    /// * `receiver` - The broadcast receiver registered for this connection.
    /// * `authenticator` - Validates the client's handshake token.
    /// * `ping_interval` - Keep-alive ping period.
    pub fn new(
        stream: WebSocket,
        receiver: BroadcastReceiver,
        authenticator: Arc<dyn Authenticator>,
        ping_interval: Duration,
    ) -> Self {
        let client_id = receiver.client_id();
        info!(client_id = %client_id, "New client connected");
        log_audit(&AuditEvent::ClientConnected {
            client_id: client_id.to_string(),
        });
        Self {
            client_id,
            stream,
            receiver,
            authenticator,
            ping_interval,
            authenticated: false,
        }
    }

    /// Returns the client ID for this connection.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Runs the connection loop until the client leaves or a send fails.
    ///
    /// # Errors
    ///
    /// Returns an error if WebSocket communication fails.
    pub async fn run(mut self) -> Result<(), WsError> {
        let mut ping_interval = interval(self.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping_interval.tick().await;

        let result = self.serve(&mut ping_interval).await;

        log_audit(&AuditEvent::ClientDisconnected {
            client_id: self.client_id.to_string(),
        });
        match result? {
            Flow::Close => self.graceful_close().await,
            Flow::PeerClosed | Flow::Continue => {
                info!(client_id = %self.client_id, "Client disconnected");
                Ok(())
            }
        }
    }

    async fn serve(&mut self, ping_interval: &mut tokio::time::Interval) -> Result<Flow, WsError> {
        loop {
            tokio::select! {
                incoming = self.stream.next() => {
                    match incoming {
                        Some(Ok(msg)) => {
                            let flow = self.handle_incoming_message(msg).await?;
                            if flow != Flow::Continue {
                                return Ok(flow);
                            }
                        }
                        Some(Err(e)) => {
                            warn!(client_id = %self.client_id, error = %e, "WebSocket read error");
                            return Err(WsError::AxumWs(e));
                        }
                        None => {
                            debug!(client_id = %self.client_id, "Stream ended");
                            return Ok(Flow::PeerClosed);
                        }
                    }
                }

                broadcast_result = self.receiver.recv() => {
                    match broadcast_result {
                        Ok(BroadcastMessage::Event(frame)) => {
                            self.stream
                                .send(Message::Text(frame))
                                .await
                                .map_err(WsError::AxumWs)?;
                        }
                        Ok(BroadcastMessage::Shutdown) => {
                            info!(client_id = %self.client_id, "Shutdown broadcast received");
                            return Ok(Flow::Close);
                        }
                        Err(_) => {
                            info!(client_id = %self.client_id, "Dropped by broadcaster");
                            return Ok(Flow::Close);
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    self.send_ping().await?;
                }
            }
        }
    }

    async fn handle_incoming_message(&mut self, message: Message) -> Result<Flow, WsError> {
        match message {
            Message::Text(text) => {
                if self.authenticated {
                    debug!(client_id = %self.client_id, len = text.len(), "Received message from client");
                    return Ok(Flow::Continue);
                }
                match serde_json::from_str::<Handshake>(text.as_str()) {
                    Ok(handshake) => Ok(self.authenticate(&handshake)),
                    Err(e) => {
                        warn!(client_id = %self.client_id, error = %e, "Unparseable handshake");
                        Ok(Flow::Continue)
                    }
                }
            }
            Message::Binary(data) => {
                debug!(client_id = %self.client_id, len = data.len(), "Ignoring binary frame");
                Ok(Flow::Continue)
            }
            Message::Ping(data) => {
                debug!(client_id = %self.client_id, "Ping received");
                self.stream
                    .send(Message::Pong(data))
                    .await
                    .map_err(WsError::AxumWs)?;
                Ok(Flow::Continue)
            }
            Message::Pong(_) => {
                debug!(client_id = %self.client_id, "Pong received");
                Ok(Flow::Continue)
            }
            Message::Close(_) => {
                info!(client_id = %self.client_id, "Client initiated close");
                Ok(Flow::PeerClosed)
            }
        }
    }

    fn authenticate(&mut self, handshake: &Handshake) -> Flow {
        match self.authenticator.validate(&handshake.token) {
            AuthDecision::Accepted => {
                debug!(client_id = %self.client_id, "Handshake accepted");
                self.authenticated = true;
                Flow::Continue
            }
            AuthDecision::Rejected => {
                warn!(client_id = %self.client_id, "Handshake rejected");
                counter!("relay_handshakes_rejected_total").increment(1);
                log_audit(&AuditEvent::HandshakeRejected {
                    client_id: self.client_id.to_string(),
                });
                Flow::Close
            }
        }
    }

    async fn send_ping(&mut self) -> Result<(), WsError> {
        debug!(client_id = %self.client_id, "Sending ping");
        self.stream
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(WsError::AxumWs)
    }

    async fn graceful_close(mut self) -> Result<(), WsError> {
        debug!(client_id = %self.client_id, "Closing gracefully");
        if let Err(e) = self.stream.send(Message::Close(None)).await {
            error!(client_id = %self.client_id, error = %e, "Close frame not delivered");
        }
        info!(client_id = %self.client_id, "Connection closed");
        Ok(())
    }
}
