//! Accepted connections and the id → connection map.
//!
//! HTTP handlers address connections through [`ConnectionMap`] by id; there
//! is no process-wide "current connection".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use wsreq_core::{ConnectionId, EventFrame};

/// One accepted event-channel connection.
pub struct Connection {
    /// Server-assigned id, announced in the established frame.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was accepted.
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Wrap the outbound half of a session.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue an encoded frame.
    ///
    /// Returns `false` if the channel is full or closed.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Emit `event` with `data` on this connection.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        match EventFrame::new(event, data).encode() {
            Ok(text) => self.send(Arc::new(text)),
            Err(e) => {
                warn!(conn_id = %self.id, event, error = %e, "failed to encode frame");
                false
            }
        }
    }

    /// Frames dropped because the outbound queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Live connections indexed by id.
#[derive(Default)]
pub struct ConnectionMap {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection.
    pub async fn add(&self, connection: Arc<Connection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Forget a connection.
    pub async fn remove(&self, id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(id);
    }

    /// Look up a connection.
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Emit to one connection. Returns `false` if it is unknown or its queue rejected the frame.
    pub async fn emit_to(&self, id: &ConnectionId, event: &str, data: Value) -> bool {
        let Some(conn) = self.get(id).await else {
            debug!(conn_id = %id, event, "emit to unknown connection");
            return false;
        };
        conn.emit(event, data)
    }

    /// Emit to every live connection. Returns the number of connections that accepted the frame.
    pub async fn emit_all(&self, event: &str, data: Value) -> usize {
        let text = match EventFrame::new(event, data).encode() {
            Ok(t) => Arc::new(t),
            Err(e) => {
                warn!(event, error = %e, "failed to encode frame");
                return 0;
            }
        };
        let conns = self.connections.read().await;
        debug!(event, recipients = conns.len(), "emit to all");
        let mut delivered = 0;
        for conn in conns.values() {
            if conn.send(text.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = %conn.id, event, "failed to send event to client");
            }
        }
        delivered
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Ids of all live connections.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().cloned().collect()
    }
}
