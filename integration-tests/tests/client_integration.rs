//! End-to-end tests for the client's handshake and listen loop, driven by a
//! scripted server.

#![allow(missing_docs)]

use anyhow::{bail, Result};
use codex_relay::infrastructure::config::ClientSettings;
use codex_relay::{BroadcastClient, ClientState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

mod common;

use common::{assert_quiet, next_payload, wait_for_state, WAIT};

type ServerSide = WebSocketStream<TcpStream>;

/// A one-connection server whose frames the test writes by hand.
struct ScriptedServer {
    listener: TcpListener,
}

impl ScriptedServer {
    async fn bind() -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0").await?,
        })
    }

    fn settings(&self, token: &str) -> Result<ClientSettings> {
        Ok(ClientSettings::new(
            format!("ws://{}", self.listener.local_addr()?),
            token,
        ))
    }

    /// Accepts the client and returns its handshake token.
    async fn accept(&self) -> Result<(ServerSide, String)> {
        let (stream, _) = timeout(WAIT, self.listener.accept()).await??;
        let mut ws = accept_async(stream).await?;
        let first = match timeout(WAIT, ws.next()).await? {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            other => bail!("expected handshake, got {other:?}"),
        };
        let handshake: Value = serde_json::from_str(&first)?;
        let Some(token) = handshake.get("token").and_then(Value::as_str) else {
            bail!("handshake without token: {first}");
        };
        Ok((ws, token.to_owned()))
    }
}

async fn send(ws: &mut ServerSide, frame: &str) -> Result<()> {
    ws.send(Message::text(frame.to_string())).await?;
    Ok(())
}

fn recorder(client: &BroadcastClient, event: &str) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.register_hook(event, move |payload| {
        let _ = tx.send(payload);
    });
    rx
}

#[tokio::test]
async fn handshake_is_the_first_frame() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("default_token")?);
    client.spawn()?;

    let (_ws, token) = server.accept().await?;
    assert_eq!(token, "default_token");
    wait_for_state(&client, ClientState::Listening).await?;
    Ok(())
}

#[tokio::test]
async fn malformed_frame_is_skipped() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    let mut rx = recorder(&client, "gandor_chat");
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;

    send(&mut ws, "{not json").await?;
    send(&mut ws, r#"{"data":{"text":"no event name"}}"#).await?;
    send(&mut ws, r#"{"event":"gandor_chat","data":{"text":"still here"}}"#).await?;

    assert_eq!(next_payload(&mut rx).await?, json!({"text": "still here"}));
    assert_eq!(client.state(), ClientState::Listening);
    Ok(())
}

#[tokio::test]
async fn unknown_event_does_not_stop_listening() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    let mut rx = recorder(&client, "known");
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;

    send(&mut ws, r#"{"event":"nobody_listens","data":{}}"#).await?;
    send(&mut ws, r#"{"event":"known","data":{"n":1}}"#).await?;

    assert_eq!(next_payload(&mut rx).await?, json!({"n": 1}));
    assert_quiet(&mut rx).await?;
    Ok(())
}

#[tokio::test]
async fn reregistered_hook_replaces_previous_one() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    let mut first = recorder(&client, "x");
    let mut second = recorder(&client, "x");
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;

    send(&mut ws, r#"{"event":"x","data":{"v":1}}"#).await?;
    send(&mut ws, r#"{"event":"x","data":{"v":2}}"#).await?;

    assert_eq!(next_payload(&mut second).await?, json!({"v": 1}));
    assert_eq!(next_payload(&mut second).await?, json!({"v": 2}));
    assert_quiet(&mut first).await?;
    Ok(())
}

#[tokio::test]
async fn hook_registered_after_start_is_honored() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;
    wait_for_state(&client, ClientState::Listening).await?;

    let mut rx = recorder(&client, "late");
    send(&mut ws, r#"{"event":"late","data":{"ok":true}}"#).await?;
    assert_eq!(next_payload(&mut rx).await?, json!({"ok": true}));
    Ok(())
}

#[tokio::test]
async fn missing_data_and_payload_alias_are_tolerated() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    let mut rx = recorder(&client, "x");
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;

    send(&mut ws, r#"{"event":"x"}"#).await?;
    send(&mut ws, r#"{"event":"x","payload":{"legacy":true}}"#).await?;

    assert_eq!(next_payload(&mut rx).await?, json!({}));
    assert_eq!(next_payload(&mut rx).await?, json!({"legacy": true}));
    Ok(())
}

#[tokio::test]
async fn server_close_ends_client_without_reconnect() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;
    wait_for_state(&client, ClientState::Listening).await?;

    ws.close(None).await?;
    wait_for_state(&client, ClientState::Closed).await?;

    let reconnect = timeout(common::QUIET, server.listener.accept()).await;
    assert!(reconnect.is_err(), "client must not reconnect");
    Ok(())
}

#[tokio::test]
async fn close_sends_close_frame() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;
    wait_for_state(&client, ClientState::Listening).await?;

    client.close();

    let frame = timeout(WAIT, ws.next()).await?;
    assert!(matches!(frame, Some(Ok(Message::Close(_)))));
    wait_for_state(&client, ClientState::Closed).await?;
    Ok(())
}

#[tokio::test]
async fn panicking_hook_closes_client() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    client.register_hook("boom", |_| panic!("hook failed"));
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;
    wait_for_state(&client, ClientState::Listening).await?;

    send(&mut ws, r#"{"event":"boom","data":{}}"#).await?;

    wait_for_state(&client, ClientState::Closed).await?;
    Ok(())
}

#[tokio::test]
async fn close_before_start_is_ignored() -> Result<()> {
    let server = ScriptedServer::bind().await?;
    let client = BroadcastClient::new(server.settings("t")?);
    let mut rx = recorder(&client, "x");
    client.close();
    client.spawn()?;
    let (mut ws, _) = server.accept().await?;
    wait_for_state(&client, ClientState::Listening).await?;

    send(&mut ws, r#"{"event":"x","data":{"still":"listening"}}"#).await?;
    assert_eq!(next_payload(&mut rx).await?, json!({"still": "listening"}));
    assert_eq!(client.state(), ClientState::Listening);
    Ok(())
}
