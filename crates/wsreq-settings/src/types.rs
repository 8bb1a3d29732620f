//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every section is `#[serde(default)]`,
//! so a partial file only overrides the keys it names.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsreqSettings {
    /// Connection factory defaults.
    pub client: ClientSettings,
    /// Demonstration server bind settings.
    pub server: ServerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl WsreqSettings {
    /// Reject values that would make the CLI misbehave rather than clamp.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "logging.level must be one of {LOG_LEVELS:?}: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Defaults applied by the connection factory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Event-channel path.
    pub path: String,
    /// Wait timeout in milliseconds. Values under 3000 are raised to 3000 by the factory.
    pub timeout_ms: u64,
    /// Number of connections to open.
    pub clients: usize,
    /// Port used when booting a local server.
    pub port: u16,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            timeout_ms: 3000,
            clients: 1,
            port: 45000,
        }
    }
}

/// Bind settings for `wsreq serve`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 45000,
            ws_path: "/api/ws".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
