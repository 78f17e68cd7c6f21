//! Hosting for the broadcast server.
//!
//! The server runs its accept loop, its connection hub and every connection
//! on one tokio runtime. [`ServerBuilder::start`] gives that runtime its own
//! OS thread, so a GUI or other blocking host keeps its main thread.
//! [`ServerBuilder::spawn`] reuses the caller's runtime instead.

use axum::{routing::get, Router};
use futures_util::future::{BoxFuture, FutureExt};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::infrastructure::config::ServerSettings;
use crate::ws::{
    ws_router, AcceptAll, Authenticator, Broadcaster, StaticToken, WsError, WsState,
};

async fn health_check() -> &'static str {
    "OK"
}

fn control_plane(metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new().route("/health/live", get(health_check));
    match metrics {
        Some(handle) => router.route("/metrics", get(move || std::future::ready(handle.render()))),
        None => router,
    }
}

/// Configures and launches a [`BroadcastServer`].
pub struct ServerBuilder {
    settings: ServerSettings,
    authenticator: Option<Arc<dyn Authenticator>>,
    metrics: Option<PrometheusHandle>,
}

impl ServerBuilder {
    /// Replaces the handshake validator.
    ///
    /// Without one, [`StaticToken`] is used when `expected_token` is configured
    /// and [`AcceptAll`] otherwise.
    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Serves Prometheus metrics at `/metrics`.
    #[must_use]
    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Binds and runs the server on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Bind` if the listener cannot be bound.
    pub async fn spawn(self) -> Result<BroadcastServer, WsError> {
        let (server, serve) = self.bind().await?;
        tokio::spawn(serve);
        Ok(server)
    }

    /// Binds and runs the server on a dedicated background thread.
    ///
    /// Blocks only until the listener is armed. Call it from outside any
    /// async context.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Bind` if the listener cannot be bound, or
    /// `WsError::ServerThread` if the thread or its runtime cannot start.
    pub fn start(self) -> Result<BroadcastServer, WsError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        std::thread::Builder::new()
            .name("codex-relay-server".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(WsError::ServerThread(e.to_string())));
                        return;
                    }
                };
                runtime.block_on(async move {
                    match self.bind().await {
                        Ok((server, serve)) => {
                            let _ = ready_tx.send(Ok(server));
                            serve.await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
            })
            .map_err(|e| WsError::ServerThread(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| WsError::ServerThread("server thread exited during startup".into()))?
    }

    async fn bind(self) -> Result<(BroadcastServer, BoxFuture<'static, ()>), WsError> {
        let addr = self.settings.bind_address();
        let listener = TcpListener::bind((self.settings.host.as_str(), self.settings.port))
            .await
            .map_err(|source| WsError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| WsError::Bind { addr, source })?;

        let authenticator: Arc<dyn Authenticator> =
            match (self.authenticator, &self.settings.expected_token) {
                (Some(authenticator), _) => authenticator,
                (None, Some(token)) => Arc::new(StaticToken::new(token.clone())),
                (None, None) => Arc::new(AcceptAll),
            };

        let (broadcaster, hub) = Broadcaster::new(self.settings.outbox_capacity);
        let state = WsState {
            broadcaster: broadcaster.clone(),
            authenticator,
            ping_interval: self.settings.ping_interval(),
        };
        let app = control_plane(self.metrics).merge(ws_router(state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let serve = async move {
            let shutdown_signal = async move {
                if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let accept_loop = async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_signal)
                    .await
            };
            let ((), result) = tokio::join!(hub.run(), accept_loop);
            if let Err(e) = result {
                error!(error = %e, "Accept loop failed");
            }
            info!(%local_addr, "Broadcast server stopped");
            log_audit(&AuditEvent::ServerStopped {
                reason: "shutdown requested".into(),
            });
        }
        .boxed();

        info!(%local_addr, port = local_addr.port(), "Broadcast server listening");
        log_audit(&AuditEvent::ServerStarted {
            addr: local_addr.to_string(),
        });

        let server = BroadcastServer {
            broadcaster,
            local_addr,
            shutdown: Arc::new(shutdown_tx),
        };
        Ok((server, serve))
    }
}

/// Handle to a running broadcast server.
///
/// Cloneable and usable from any thread. The server keeps running until
/// [`shutdown`](Self::shutdown) is called, even if every handle is dropped.
#[derive(Clone)]
pub struct BroadcastServer {
    broadcaster: Broadcaster,
    local_addr: SocketAddr,
    shutdown: Arc<watch::Sender<bool>>,
}

impl BroadcastServer {
    /// Starts configuring a server bound to `settings.host:settings.port`.
    #[must_use]
    pub fn builder(settings: ServerSettings) -> ServerBuilder {
        ServerBuilder {
            settings,
            authenticator: None,
            metrics: None,
        }
    }

    /// Broadcasts `{"event": event, "data": data}` to every connected client.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized or the server has stopped.
    /// Failures reaching individual clients are never reported here.
    pub fn broadcast<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> Result<(), WsError> {
        self.broadcaster.broadcast(event, data)
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.broadcaster.client_count()
    }

    /// Returns the address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a `ws://` URL clients can connect to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the broadcaster handle backing this server.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Closes every connection and stops accepting new ones.
    pub fn shutdown(&self) {
        self.broadcaster.shutdown();
        self.shutdown.send_replace(true);
    }
}
