//! Connect, handshake and listen sequence for one client.

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::hooks::HookRegistry;
use super::{ClientError, ClientState};
use crate::protocol::{EventEnvelope, Handshake};

pub(super) struct Listener {
    pub(super) uri: String,
    pub(super) token: SecretString,
    pub(super) hooks: HookRegistry,
    pub(super) state: Arc<watch::Sender<ClientState>>,
    pub(super) shutdown: Arc<Notify>,
}

/// Publishes `Closed` when dropped, including while a hook panic unwinds.
struct ClosedOnDrop(Arc<watch::Sender<ClientState>>);

impl Drop for ClosedOnDrop {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Broadcast client stopped by a panicking hook");
        }
        self.0.send_replace(ClientState::Closed);
        info!("Broadcast client closed");
    }
}

impl Listener {
    /// Runs until the connection ends, then publishes `Closed`.
    pub(super) async fn run(self) {
        let _closed = ClosedOnDrop(Arc::clone(&self.state));
        if let Err(e) = self.listen().await {
            error!(error = %e, "NetworkClient error");
        }
    }

    async fn listen(&self) -> Result<(), ClientError> {
        self.state.send_replace(ClientState::Connecting);
        let url = Url::parse(&self.uri)?;
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        self.state.send_replace(ClientState::Handshaking);
        let handshake = Handshake::new(self.token.expose_secret()).to_frame()?;
        write.send(Message::Text(handshake.into())).await?;

        self.state.send_replace(ClientState::Listening);
        info!(uri = %self.uri, "Connected to DM server");

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            return Ok(());
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!(len = data.len(), "Ignoring binary frame");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                () = self.shutdown.notified() => {
                    debug!("Client close requested");
                    write.send(Message::Close(None)).await?;
                    return Ok(());
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let envelope = match EventEnvelope::from_frame(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
                return;
            }
        };

        debug!(event = %envelope.event, payload = %envelope.data, "Received event");
        if !self.hooks.dispatch(&envelope.event, envelope.data) {
            warn!(event = %envelope.event, "No hook registered for event");
        }
    }
}
