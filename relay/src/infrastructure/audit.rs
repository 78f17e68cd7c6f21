use serde::Serialize;
use tracing::{info, info_span};

/// Domain event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The broadcast server bound its listener.
    ServerStarted {
        /// Bound address.
        addr: String,
    },
    /// The broadcast server stopped accepting connections.
    ServerStopped {
        /// Why it stopped.
        reason: String,
    },
    /// A client connection was accepted.
    ClientConnected {
        /// Connection identity.
        client_id: String,
    },
    /// A client connection ended.
    ClientDisconnected {
        /// Connection identity.
        client_id: String,
    },
    /// A client's handshake token was rejected.
    HandshakeRejected {
        /// Connection identity.
        client_id: String,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// The `audit` target can be filtered by the subscriber to redirect to a separate sink.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Audit event");
}
