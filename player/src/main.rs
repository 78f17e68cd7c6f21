//! Player app: follows the DM's broadcasts and prints the Gandor chat feed.

mod app;

use app::{gandor_chat_hook, App};
use codex_relay::infrastructure::config::{ClientSettings, Settings};
use codex_relay::infrastructure::telemetry::TelemetryBuilder;
use codex_relay::{BroadcastClient, ClientError, ClientState};
use parking_lot::Mutex;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new()?;
    let mut telemetry = config.telemetry.clone();
    telemetry.service_name = "codex-player".into();
    TelemetryBuilder::from_settings(&telemetry, env!("CARGO_PKG_VERSION")).init()?;

    let app = Arc::new(Mutex::new(App::default()));
    let client = player_client(config.client.clone(), &app, std::io::stdout());
    info!(uri = %config.client.uri, "Player app connecting");

    run(&client, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    info!(messages = app.lock().session_log.len(), "Player app exiting");
    Ok(())
}

/// Builds a client whose `gandor_chat` hook feeds `app` and echoes to `out`.
fn player_client<W: Write + Send + 'static>(
    settings: ClientSettings,
    app: &Arc<Mutex<App>>,
    out: W,
) -> BroadcastClient {
    let client = BroadcastClient::new(settings);
    client.register_hook(
        "gandor_chat",
        gandor_chat_hook(Arc::clone(app), Arc::new(Mutex::new(out))),
    );
    client
}

/// Runs `client` until the server goes away or `shutdown` resolves.
async fn run(
    client: &BroadcastClient,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ClientError> {
    let mut state = client.subscribe_state();
    client.spawn()?;

    let server_closed = tokio::select! {
        _ = state.wait_for(|s| *s == ClientState::Closed) => true,
        () = shutdown => false,
    };

    if server_closed {
        info!("Disconnected from DM server");
    } else {
        info!("Shutdown requested, closing connection");
        client.close();
        let _ = state.wait_for(|s| *s == ClientState::Closed).await;
    }
    Ok(())
}
