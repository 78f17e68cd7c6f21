//! Headless Dungeon Master host.
//!
//! Starts the broadcast server and relays stdin to every connected Player:
//! a plain line is sent as a `gandor_chat` message, and
//! `/event <name> <json>` sends an arbitrary event.

use codex_relay::infrastructure::{config::Settings, telemetry::TelemetryBuilder};
use codex_relay::BroadcastServer;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};

const CHAT_HOOK: &str = "gandor_chat";

/// A parsed stdin line.
#[derive(Debug, PartialEq)]
enum Command {
    Hook { name: String, payload: Value },
    Empty,
    Invalid(String),
}

fn parse_line(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix("/event ") else {
        return Command::Hook {
            name: CHAT_HOOK.to_string(),
            payload: json!({ "text": line }),
        };
    };
    let (name, raw) = rest.trim().split_once(' ').unwrap_or((rest.trim(), "{}"));
    match serde_json::from_str(raw) {
        Ok(payload) => Command::Hook {
            name: name.to_string(),
            payload,
        },
        Err(e) => Command::Invalid(format!("payload for '{name}' is not JSON: {e}")),
    }
}

/// Routes a named hook to the network, mirroring the DM app's hook manager.
fn trigger_hook(server: &BroadcastServer, name: &str, payload: &Value) {
    if name.is_empty() {
        warn!("Ignoring hook without a name");
        return;
    }
    if name != CHAT_HOOK {
        debug!(hook = name, "Forwarding custom hook");
    }
    if let Err(e) = server.broadcast(name, payload) {
        warn!(error = %e, hook = name, "Broadcast failed");
    }
}

async fn relay_stdin(server: BroadcastServer) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Command::Hook { name, payload } => {
                trigger_hook(&server, &name, &payload);
                info!(hook = %name, clients = server.client_count(), "Sent");
            }
            Command::Empty => {}
            Command::Invalid(reason) => warn!(%reason, "Ignoring input"),
        }
    }
    info!("stdin closed");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new()?;

    let telemetry = TelemetryBuilder::from_settings(&config.telemetry, env!("CARGO_PKG_VERSION"))
        .with_metrics()
        .init()?;

    info!("DM host starting...");

    let mut builder = BroadcastServer::builder(config.server.clone());
    if let Some(handle) = telemetry.metrics {
        builder = builder.metrics(handle);
    }
    let server = builder.spawn().await?;

    tokio::select! {
        result = relay_stdin(server.clone()) => result?,
        () = shutdown_signal() => info!("Shutdown signal received, cleaning up..."),
    }

    server.shutdown();
    info!("DM host shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
