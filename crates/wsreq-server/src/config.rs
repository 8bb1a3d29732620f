//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for an [`EventServer`](crate::server::EventServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Path of the WebSocket endpoint (default `"/"`).
    pub path: String,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub send_queue: usize,
    /// Server-initiated ping interval in seconds.
    pub ping_interval_secs: u64,
    /// How long `close` waits for the serve task before giving up.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            path: "/".into(),
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue: 1024,
            ping_interval_secs: 30,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Default config with the WebSocket endpoint mounted at `path`.
    pub fn with_path(path: impl AsRef<str>) -> Self {
        Self {
            path: wsreq_core::url::normalize_path(path.as_ref()),
            ..Self::default()
        }
    }
}
