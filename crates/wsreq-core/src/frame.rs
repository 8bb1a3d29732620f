//! Wire frame for the event channel.
//!
//! Every WebSocket text frame carries one JSON object
//! `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ConnectionId;

/// Reserved event used by `send` and its reply.
pub const MESSAGE_EVENT: &str = "message";

/// First frame a server sends on every accepted connection.
pub const ESTABLISHED_EVENT: &str = "connection.established";

/// A named event with a JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name. Never empty on a well-formed frame.
    pub event: String,
    /// Payload; `null` when the sender attached nothing.
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    /// Build a frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The handshake frame announcing a connection id.
    pub fn established(id: &ConnectionId) -> Self {
        Self::new(ESTABLISHED_EVENT, serde_json::json!({ "id": id }))
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a text frame. Frames with an empty event name are rejected.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let frame: Self = serde_json::from_str(text)?;
        if frame.event.is_empty() {
            return Err(FrameError::EmptyEvent);
        }
        Ok(frame)
    }

    /// Connection id carried by an established frame.
    pub fn established_id(&self) -> Option<ConnectionId> {
        if self.event != ESTABLISHED_EVENT {
            return None;
        }
        self.data
            .get("id")
            .and_then(Value::as_str)
            .map(ConnectionId::from_raw)
    }
}

/// Why a text frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not valid JSON or not a frame object.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The event name was empty.
    #[error("frame has an empty event name")]
    EmptyEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_with_payload() {
        let frame = EventFrame::decode(r#"{"event":"pong","data":{"msg":"test"}}"#).unwrap();
        assert_eq!(frame.event, "pong");
        assert_eq!(frame.data, json!({"msg": "test"}));
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let frame = EventFrame::decode(r#"{"event":"ping"}"#).unwrap();
        assert!(frame.data.is_null());
    }

    #[test]
    fn empty_event_rejected() {
        let err = EventFrame::decode(r#"{"event":"","data":1}"#).unwrap_err();
        assert!(matches!(err, FrameError::EmptyEvent));
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            EventFrame::decode("[1,2,3]"),
            Err(FrameError::Json(_))
        ));
        assert!(EventFrame::decode("not json").is_err());
    }

    #[test]
    fn established_frame_carries_id() {
        let id = ConnectionId::from_raw("conn_42");
        let frame = EventFrame::established(&id);
        let text = frame.encode().unwrap();
        let back = EventFrame::decode(&text).unwrap();
        assert_eq!(back.established_id(), Some(id));
    }

    #[test]
    fn established_id_ignores_other_events() {
        let frame = EventFrame::new("pong", json!({"id": "conn_1"}));
        assert!(frame.established_id().is_none());
    }
}
