//! Codex Relay - real-time event broadcast between the DM and Player apps.
//!
//! The DM side hosts a [`BroadcastServer`] and pushes named events to every
//! connected Player. Each Player runs a [`BroadcastClient`] that performs a
//! one-shot token handshake and dispatches incoming events to registered hooks.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Broadcast client with hook dispatch.
pub mod client;
/// Infrastructure components (config, server, telemetry, audit).
pub mod infrastructure;
/// Wire envelopes exchanged between server and clients.
pub mod protocol;
/// WebSocket connection set and fan-out.
pub mod ws;

pub use client::{BroadcastClient, ClientError, ClientState, HookRegistry};
pub use infrastructure::server::{BroadcastServer, ServerBuilder};
pub use protocol::{EventEnvelope, Handshake};
pub use ws::{AcceptAll, AuthDecision, Authenticator, Broadcaster, StaticToken, WsError};
