//! Declarative event registry.
//!
//! An [`EventRegistry`] is an ordered list of `(event, handler)` pairs that the
//! server attaches to every accepted connection. Handlers receive an explicit
//! [`HandlerContext`] scoped to the connection the event arrived on.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use wsreq_core::ConnectionId;

use crate::connection::{Connection, ConnectionMap};
use crate::errors::{RegistryError, ServerError};

/// Per-event context handed to every handler invocation.
#[derive(Clone)]
pub struct HandlerContext {
    connection: Arc<Connection>,
    connections: Arc<ConnectionMap>,
}

impl HandlerContext {
    /// Context for `connection`, with access to every live connection.
    pub fn new(connection: Arc<Connection>, connections: Arc<ConnectionMap>) -> Self {
        Self {
            connection,
            connections,
        }
    }

    /// Id of the connection the event arrived on.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection.id
    }

    /// Emit back on the same connection.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.connection.emit(event, data)
    }

    /// Every live connection, for handlers that fan out.
    pub fn connections(&self) -> &Arc<ConnectionMap> {
        &self.connections
    }
}

/// A handler attached to one event name.
pub trait EventHandler: Send + Sync {
    /// React to one event. `data` is `null` when the sender attached nothing.
    fn handle(&self, ctx: &HandlerContext, data: Value);
}

impl<F> EventHandler for F
where
    F: Fn(&HandlerContext, Value) + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext, data: Value) {
        self(ctx, data);
    }
}

/// Ordered, append-only list of event handlers.
#[derive(Clone, Default)]
pub struct EventRegistry {
    entries: Vec<(String, Arc<dyn EventHandler>)>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event`.
    pub fn push(
        &mut self,
        event: impl Into<String>,
        handler: impl EventHandler + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let event = event.into();
        if event.is_empty() {
            return Err(RegistryError::EmptyEventName);
        }
        self.entries.push((event, Arc::new(handler)));
        Ok(self)
    }

    /// Registered event names, in registration order.
    pub fn events(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail if the registry holds no handlers.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.entries.is_empty() {
            return Err(ServerError::EmptyRegistry);
        }
        Ok(())
    }

    /// Run every handler registered for `event`, in order.
    ///
    /// Returns how many handlers ran.
    pub fn dispatch(&self, ctx: &HandlerContext, event: &str, data: &Value) -> usize {
        let mut ran = 0;
        for (name, handler) in &self.entries {
            if name == event {
                handler.handle(ctx, data.clone());
                ran += 1;
            }
        }
        if ran == 0 {
            debug!(conn_id = %ctx.connection_id(), event, "no handler for event");
        }
        ran
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.events())
            .finish()
    }
}
