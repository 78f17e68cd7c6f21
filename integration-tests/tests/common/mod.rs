//! Shared helpers for broadcast integration tests.
//!
//! Every test runs a real server on an ephemeral loopback port and talks to
//! it with real clients.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use codex_relay::infrastructure::config::{ClientSettings, ServerSettings};
use codex_relay::{BroadcastClient, BroadcastServer, ClientState, ServerBuilder};
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Upper bound for anything that should happen "promptly".
pub const WAIT: Duration = Duration::from_secs(5);

/// How long to watch for a frame that must never arrive.
pub const QUIET: Duration = Duration::from_millis(200);

/// A raw WebSocket peer, used where the library client is too well-behaved.
pub type RawPeer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running server plus helpers to attach clients to it.
pub struct Harness {
    /// The server under test.
    pub server: BroadcastServer,
}

impl Harness {
    /// Starts a server with default settings on an ephemeral port.
    pub async fn start() -> Result<Self> {
        Self::from_builder(BroadcastServer::builder(loopback())).await
    }

    /// Starts a server from a customised builder.
    pub async fn from_builder(builder: ServerBuilder) -> Result<Self> {
        let server = builder.spawn().await?;
        Ok(Self { server })
    }

    /// Client settings pointing at this server.
    pub fn client_settings(&self, token: &str) -> ClientSettings {
        ClientSettings::new(self.server.url(), token)
    }

    /// Connects a library client whose `event` hook forwards payloads to the
    /// returned receiver, and waits until its handshake is sent (or the
    /// connection already ended).
    pub async fn recorder(
        &self,
        event: &str,
        token: &str,
    ) -> Result<(BroadcastClient, mpsc::UnboundedReceiver<Value>)> {
        let client = BroadcastClient::new(self.client_settings(token));
        let (tx, rx) = mpsc::unbounded_channel();
        client.register_hook(event, move |payload| {
            let _ = tx.send(payload);
        });
        let mut state = client.subscribe_state();
        client.spawn()?;
        timeout(
            WAIT,
            state.wait_for(|s| matches!(s, ClientState::Listening | ClientState::Closed)),
        )
        .await
        .map_err(|_| anyhow!("client never finished its handshake"))??;
        drop(state);
        Ok((client, rx))
    }

    /// Opens a raw connection and sends the handshake frame.
    pub async fn raw_peer(&self, token: &str) -> Result<RawPeer> {
        let (mut peer, _) = connect_async(self.server.url()).await?;
        let handshake = serde_json::json!({ "token": token }).to_string();
        futures_util::SinkExt::send(&mut peer, Message::text(handshake)).await?;
        Ok(peer)
    }

    /// Waits until the server's connection set has exactly `expected` members.
    pub async fn wait_for_clients(&self, expected: usize) -> Result<()> {
        timeout(WAIT, poll_clients(self.server.clone(), expected))
            .await
        .map_err(|_| {
            anyhow!(
                "expected {expected} clients, server has {}",
                self.server.client_count()
            )
        })?
    }
}

async fn poll_clients(server: BroadcastServer, expected: usize) -> Result<()> {
    while server.broadcaster().settled_count().await? != expected {
        sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Server settings for an ephemeral loopback port.
pub fn loopback() -> ServerSettings {
    ServerSettings::new("127.0.0.1", 0)
}

/// Waits until `client` reaches `target`.
pub async fn wait_for_state(client: &BroadcastClient, target: ClientState) -> Result<()> {
    let mut state = client.subscribe_state();
    let reached = timeout(WAIT, state.wait_for(|s| *s == target))
        .await
        .map_err(|_| anyhow!("client stuck in {:?}, wanted {target:?}", client.state()))?;
    reached.map(|_| ()).map_err(|e| anyhow!("state channel closed: {e}"))
}

/// Receives the next payload recorded by a hook.
pub async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Value>) -> Result<Value> {
    match timeout(WAIT, rx.recv()).await {
        Ok(Some(payload)) => Ok(payload),
        Ok(None) => bail!("recorder dropped"),
        Err(_) => bail!("no payload within {WAIT:?}"),
    }
}

/// Asserts that no further payload arrives for a short while.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Value>) -> Result<()> {
    match timeout(QUIET, rx.recv()).await {
        Ok(Some(payload)) => bail!("unexpected payload {payload}"),
        Ok(None) | Err(_) => Ok(()),
    }
}

/// Reads frames from a raw peer until a text frame arrives.
pub async fn next_text(peer: &mut RawPeer) -> Result<String> {
    timeout(WAIT, read_text(peer))
        .await
        .map_err(|_| anyhow!("no text frame within {WAIT:?}"))?
}

async fn read_text(peer: &mut RawPeer) -> Result<String> {
    while let Some(frame) = peer.next().await {
        match frame? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Close(_) => bail!("peer closed"),
            _ => {}
        }
    }
    bail!("stream ended")
}
