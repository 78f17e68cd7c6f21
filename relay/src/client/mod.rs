//! Broadcast client for the Player side.
//!
//! A [`BroadcastClient`] connects to the DM server, sends its token once,
//! and then dispatches each received event to the hook registered for its
//! name. It does not reconnect: once the connection ends the client stays
//! [`ClientState::Closed`].

mod hooks;
mod listener;

pub use hooks::{Hook, HookRegistry};

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tracing::{debug, error};

use crate::infrastructure::config::ClientSettings;
use crate::ws::WsError;
use listener::Listener;

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started yet.
    Idle,
    /// Opening the connection.
    Connecting,
    /// Sending the token frame.
    Handshaking,
    /// Receiving and dispatching events.
    Listening,
    /// Finished; there is no way back.
    Closed,
}

/// Errors raised by the broadcast client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `start` or `spawn` was called more than once.
    #[error("client already started")]
    AlreadyStarted,

    /// The configured URI is not a valid URL.
    #[error("invalid server URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    /// Connecting, sending or receiving failed.
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// An outgoing frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] WsError),

    /// The background thread could not be started.
    #[error("failed to start client thread: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Connects to a broadcast server and dispatches events to hooks.
pub struct BroadcastClient {
    settings: ClientSettings,
    hooks: HookRegistry,
    state: Arc<watch::Sender<ClientState>>,
    started: AtomicBool,
    shutdown: Arc<Notify>,
}

impl BroadcastClient {
    /// Creates an idle client for `settings`.
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        Self {
            settings,
            hooks: HookRegistry::new(),
            state: Arc::new(state),
            started: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Registers `callback` for `event`, replacing any previous hook.
    pub fn register_hook<F>(&self, event: impl Into<String>, callback: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.hooks.register(event, callback);
    }

    /// Returns the client's hook registry.
    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Connects and listens on a dedicated background thread.
    ///
    /// Hooks run on that thread.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AlreadyStarted` on a second call, or
    /// `ClientError::Runtime` if the thread cannot be spawned.
    pub fn start(&self) -> Result<(), ClientError> {
        let listener = self.claim()?;
        std::thread::Builder::new()
            .name("codex-relay-client".into())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(listener.run()),
                    Err(e) => {
                        error!(error = %e, "Failed to build client runtime");
                        listener.state.send_replace(ClientState::Closed);
                    }
                }
            })
            .map_err(|e| {
                self.state.send_replace(ClientState::Closed);
                ClientError::Runtime(e)
            })?;
        Ok(())
    }

    /// Connects and listens as a task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AlreadyStarted` on a second call.
    pub fn spawn(&self) -> Result<tokio::task::JoinHandle<()>, ClientError> {
        let listener = self.claim()?;
        Ok(tokio::spawn(listener.run()))
    }

    /// Sends a close frame and stops listening.
    ///
    /// Does nothing on an `Idle` or `Closed` client. A close requested while
    /// connecting takes effect as soon as the handshake has been sent.
    pub fn close(&self) {
        match self.state() {
            ClientState::Idle | ClientState::Closed => {
                debug!(state = ?self.state(), "Ignoring close on inactive client");
            }
            ClientState::Connecting | ClientState::Handshaking | ClientState::Listening => {
                self.shutdown.notify_one();
            }
        }
    }

    fn claim(&self) -> Result<Listener, ClientError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyStarted);
        }
        self.state.send_replace(ClientState::Connecting);
        Ok(Listener {
            uri: self.settings.uri.clone(),
            token: self.settings.token.clone(),
            hooks: self.hooks.clone(),
            state: Arc::clone(&self.state),
            shutdown: Arc::clone(&self.shutdown),
        })
    }
}

impl Default for BroadcastClient {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}
