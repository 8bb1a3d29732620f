//! Error taxonomy for the connection bridge.
//!
//! Every failure in the bridge is a per-operation rejection: nothing here is
//! fatal to the process, and no error closes a bridge on its own.

use std::error::Error as StdError;

use serde_json::Value;
use thiserror::Error;

/// Message for a failed event-channel connection attempt.
pub const INVALID_CONNECTION: &str = "Invalid WS connection.";
/// Message for an awaited event that never arrived.
pub const INVALID_EVENT: &str = "Invalid WS event.";
/// Message for a `send` that never got a reply.
pub const REQUEST_TIMEOUT: &str = "Request timeout.";

/// Boxed transport error kept as the source of a normalized connection error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by bridges and the connection factory.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Event-channel connect failure or awaited-event timeout.
    ///
    /// The message is normalized; the underlying transport error (if any)
    /// stays reachable through [`std::error::Error::source`].
    #[error("{message}")]
    Connection {
        /// Normalized message ([`INVALID_CONNECTION`] or [`INVALID_EVENT`]).
        message: String,
        /// Original error that triggered the failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Reply-channel timeout, distinct from an event-wait timeout.
    #[error("{message}")]
    Timeout {
        /// Always [`REQUEST_TIMEOUT`] for bridge-originated timeouts.
        message: String,
    },

    /// HTTP transport or status failure.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The awaited payload arrived but could not be decoded into the requested type.
    #[error("invalid payload for event '{event}': {source}")]
    Payload {
        /// Event whose payload failed to decode.
        event: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The local server could not bind.
    #[error("failed to listen: {0}")]
    Listen(#[source] std::io::Error),
}

impl BridgeError {
    /// Connection error carrying the transport failure that caused it.
    pub fn invalid_connection(source: impl Into<BoxError>) -> Self {
        Self::Connection {
            message: INVALID_CONNECTION.into(),
            source: Some(source.into()),
        }
    }

    /// Awaited event did not arrive within the bridge timeout.
    pub fn invalid_event() -> Self {
        Self::Connection {
            message: INVALID_EVENT.into(),
            source: None,
        }
    }

    /// `send` got no reply within the bridge timeout.
    pub fn request_timeout() -> Self {
        Self::Timeout {
            message: REQUEST_TIMEOUT.into(),
        }
    }

    /// Error name in the `"<Kind> Error."` style callers match on.
    pub fn name(&self) -> &str {
        match self {
            Self::Connection { .. } => "Connection Error.",
            Self::Timeout { .. } => "Timeout Error.",
            Self::Http(e) => e.name(),
            Self::Payload { .. } => "Payload Error.",
            Self::Listen(_) => "Listen Error.",
        }
    }

    /// Whether this is the awaited-event timeout.
    pub fn is_invalid_event(&self) -> bool {
        matches!(self, Self::Connection { message, .. } if message == INVALID_EVENT)
    }
}

/// Classification of an HTTP failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// Server answered with a non-2xx status.
    Status,
    /// The per-call timeout elapsed.
    Timeout,
    /// Connection refused, reset, DNS failure, and similar.
    Network,
    /// The request body exceeded `max_body_length`.
    BodyTooLarge,
    /// The request could not be built (bad URL, bad header, bad proxy).
    InvalidRequest,
    /// The response body could not be decoded into the requested type.
    Decode,
}

impl HttpErrorKind {
    /// Stable name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Status => "StatusError",
            Self::Timeout => "TimeoutError",
            Self::Network => "NetworkError",
            Self::BodyTooLarge => "BodyTooLargeError",
            Self::InvalidRequest => "InvalidRequestError",
            Self::Decode => "DecodeError",
        }
    }
}

/// An HTTP failure from the request client, surfaced unmodified.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    /// Failure classification.
    pub kind: HttpErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Response status, for [`HttpErrorKind::Status`].
    pub status: Option<u16>,
    /// Response body, for [`HttpErrorKind::Status`] when one was returned.
    pub body: Option<Value>,
}

impl HttpError {
    /// Build an error with only a kind and a message.
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Non-2xx response.
    pub fn status(status: u16, body: Option<Value>) -> Self {
        Self {
            kind: HttpErrorKind::Status,
            message: format!("Request failed with status code {status}"),
            status: Some(status),
            body,
        }
    }

    /// Per-call timeout elapsed.
    pub fn timeout(timeout_ms: u128) -> Self {
        Self::new(
            HttpErrorKind::Timeout,
            format!("timeout of {timeout_ms}ms exceeded"),
        )
    }

    /// Request body larger than the configured limit.
    pub fn body_too_large(limit: usize) -> Self {
        Self::new(
            HttpErrorKind::BodyTooLarge,
            format!("Request body larger than maxBodyLength limit ({limit} bytes)"),
        )
    }

    /// Name derived from the kind.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Copy of this error keeping only its name and message.
    pub fn detached(&self) -> Self {
        Self::new(self.kind, self.message.clone())
    }
}

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn invalid_event_display_and_name() {
        let err = BridgeError::invalid_event();
        assert_eq!(err.to_string(), "Invalid WS event.");
        assert_eq!(err.name(), "Connection Error.");
        assert!(err.is_invalid_event());
    }

    #[test]
    fn invalid_connection_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = BridgeError::invalid_connection(io);
        assert_eq!(err.to_string(), "Invalid WS connection.");
        assert!(!err.is_invalid_event());
        let source = err.source().expect("source kept");
        assert!(source.to_string().contains("refused"));
    }

    #[test]
    fn request_timeout_is_timeout_variant() {
        let err = BridgeError::request_timeout();
        assert_matches!(&err, BridgeError::Timeout { message } if message == "Request timeout.");
        assert_eq!(err.name(), "Timeout Error.");
    }

    #[test]
    fn status_error_message_matches_transport_wording() {
        let err = HttpError::status(404, None);
        assert_eq!(err.to_string(), "Request failed with status code 404");
        assert_eq!(err.status, Some(404));
        assert_eq!(err.name(), "StatusError");
    }

    #[test]
    fn detached_copies_only_name_and_message() {
        let err = HttpError::status(500, Some(serde_json::json!({"error": "boom"})));
        let copy = err.detached();
        assert_eq!(copy.message, err.message);
        assert_eq!(copy.name(), err.name());
        assert!(copy.status.is_none());
        assert!(copy.body.is_none());
    }

    #[test]
    fn http_error_converts_into_bridge_error() {
        let err: BridgeError = HttpError::timeout(1500).into();
        assert_matches!(&err, BridgeError::Http(e) if e.kind == HttpErrorKind::Timeout);
        assert_eq!(err.to_string(), "timeout of 1500ms exceeded");
        assert_eq!(err.name(), "TimeoutError");
    }

    #[test]
    fn body_too_large_mentions_limit() {
        let err = HttpError::body_too_large(16);
        assert!(err.to_string().contains("16 bytes"));
        assert_eq!(err.kind, HttpErrorKind::BodyTooLarge);
    }
}
