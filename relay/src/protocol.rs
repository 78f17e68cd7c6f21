//! Wire envelopes for the broadcast protocol.
//!
//! One JSON object per text frame:
//! - client to server, once after connecting: `{"token": "..."}`
//! - server to client, per broadcast: `{"event": "...", "data": ...}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ws::WsError;

/// A named event plus its structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event name used for hook lookup.
    pub event: String,
    /// Arbitrary structured payload.
    ///
    /// Decoding also accepts the key `payload`. A frame carrying both `data`
    /// and `payload` is rejected as a duplicate field.
    #[serde(default = "empty_payload", alias = "payload")]
    pub data: Value,
}

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

impl EventEnvelope {
    /// Creates an envelope for `event` carrying `data`.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serializes the envelope to a text frame payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be serialized to JSON.
    pub fn to_frame(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::Serialization)
    }

    /// Parses an envelope from a received text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with an `event` field.
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// The credential frame a client sends immediately after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Opaque client token.
    pub token: String,
}

impl Handshake {
    /// Creates a handshake carrying `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Serializes the handshake to a text frame payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake cannot be serialized to JSON.
    pub fn to_frame(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::Serialization)
    }
}
