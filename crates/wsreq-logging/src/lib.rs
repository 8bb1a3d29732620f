//! # wsreq-logging
//!
//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global subscriber (human or JSON output on stderr)
//! - [`test_utils::capture_logs`] captures events in memory for assertions

#![deny(unsafe_code)]

pub mod test_utils;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Subscriber configuration.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Default level. `RUST_LOG` wins when set.
    pub level: String,
    /// Per-module level overrides, e.g. `("wsreq_client", "debug")`.
    pub module_levels: Vec<(String, String)>,
    /// Emit JSON lines instead of compact human output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Config with only a default level.
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Filter directive built from the level and module overrides.
    pub fn directive(&self) -> String {
        let mut filter = self.level.to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{module}={}", level.to_lowercase()));
        }
        filter
    }
}

/// Why the subscriber could not be installed.
#[derive(Debug, Error)]
pub enum LogError {
    /// The level or a module override is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),
    /// A global subscriber is already set.
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber.
///
/// Output goes to stderr so stdout stays free for command results.
pub fn init_subscriber(config: &LogConfig) -> Result<(), LogError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directive())?,
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_includes_module_overrides() {
        let config = LogConfig {
            level: "INFO".into(),
            module_levels: vec![("wsreq_client".into(), "Debug".into())],
            json: false,
        };
        assert_eq!(config.directive(), "info,wsreq_client=debug");
    }

    #[test]
    fn default_is_info_text() {
        let config = LogConfig::default();
        assert_eq!(config.directive(), "info");
        assert!(!config.json);
    }

    #[test]
    fn second_init_reports_error() {
        let config = LogConfig::with_level("warn");
        let _ = init_subscriber(&config);
        let second = init_subscriber(&config);
        assert!(matches!(second, Err(LogError::AlreadyInitialized(_))));
    }
}
