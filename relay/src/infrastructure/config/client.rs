//! Client configuration for the broadcast layer.

use secrecy::SecretString;
use serde::Deserialize;

pub(super) const DEFAULT_URI: &str = "ws://localhost:8765";
pub(super) const DEFAULT_TOKEN: &str = "default_token";

/// Target server and credential for a broadcast client.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    /// WebSocket URI of the DM server.
    pub uri: String,
    /// Token sent in the handshake frame.
    pub token: SecretString,
}

impl ClientSettings {
    /// Settings for `uri` using `token`.
    #[must_use]
    pub fn new(uri: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            token: SecretString::new(token.into().into()),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::new(DEFAULT_URI, DEFAULT_TOKEN)
    }
}
