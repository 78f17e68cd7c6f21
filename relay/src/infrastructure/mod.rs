/// Audit logging for connection and security events.
pub mod audit;
/// Configuration management.
pub mod config;
/// Broadcast server hosting and HTTP surface.
pub mod server;
/// Telemetry setup for logging and metrics.
pub mod telemetry;
