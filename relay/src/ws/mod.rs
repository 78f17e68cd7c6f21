//! WebSocket module for event broadcasting.

pub mod auth;
pub mod broadcaster;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod types;

pub use auth::{AcceptAll, AuthDecision, Authenticator, StaticToken};
pub use broadcaster::{BroadcastReceiver, Broadcaster, OUTBOX_CAPACITY};
pub use handler::{ws_router, WsState};
pub use hub::ConnectionHub;
pub use types::{BroadcastMessage, ClientId, WsError};
