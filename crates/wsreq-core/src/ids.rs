//! Branded identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an identifier received from elsewhere without validation.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identifier the server assigns to an accepted event-channel connection.
    ConnectionId,
    "conn"
);
branded_id!(
    /// Identifier of a single pending one-shot listener.
    ListenerId,
    "lsn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn listener_id_has_prefix() {
        let id = ListenerId::new();
        assert!(id.as_str().starts_with("lsn_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = ConnectionId::from_raw("remote-assigned-7");
        assert_eq!(id.as_str(), "remote-assigned-7");
        assert_eq!(id.to_string(), "remote-assigned-7");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ConnectionId::from_raw("conn_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_abc\"");
    }
}
