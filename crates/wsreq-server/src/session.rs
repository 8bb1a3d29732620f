//! WebSocket session lifecycle: one accepted client from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wsreq_core::{ConnectionId, EventFrame};

use crate::connection::{Connection, ConnectionMap};
use crate::registry::{EventRegistry, HandlerContext};

/// How long a finished session waits for its outbound task to flush.
const OUTBOUND_DRAIN: Duration = Duration::from_secs(1);

/// Everything a session shares with the server that accepted it.
#[derive(Clone)]
pub struct SessionShared {
    /// Handlers attached to every connection.
    pub registry: Arc<EventRegistry>,
    /// Live connections.
    pub connections: Arc<ConnectionMap>,
    /// Cancelled when the server closes.
    pub token: CancellationToken,
    /// Outbound queue capacity.
    pub send_queue: usize,
    /// Interval between server-initiated pings.
    pub ping_interval: Duration,
}

/// Run a session for an upgraded socket.
///
/// 1. Registers the connection and sends the established frame
/// 2. Dispatches incoming frames to the registry
/// 3. Forwards queued outbound frames and periodic pings
/// 4. Sends a close frame and stops when the server shuts down
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_session(ws: WebSocket, id: ConnectionId, shared: SessionShared) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(shared.send_queue.max(1));
    let connection = Arc::new(Connection::new(id.clone(), send_tx));

    let started = Instant::now();
    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    shared.connections.add(connection.clone()).await;

    match EventFrame::established(&id).encode() {
        Ok(text) => {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                warn!("failed to send established frame");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode established frame"),
    }

    let outbound_token = shared.token.clone();
    let ping_every = shared.ping_interval;
    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                () = outbound_token.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text((*text).clone().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let ctx = HandlerContext::new(connection.clone(), shared.connections.clone());
    loop {
        let next = tokio::select! {
            () = shared.token.cancelled() => {
                debug!("server closing, ending session");
                break;
            }
            next = ws_rx.next() => next,
        };
        let Some(Ok(msg)) = next else { break };

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "dropping non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match EventFrame::decode(&text) {
            Ok(frame) => {
                let _ = shared.registry.dispatch(&ctx, &frame.event, &frame.data);
            }
            Err(e) => debug!(error = %e, "dropping malformed frame"),
        }
    }

    shared.connections.remove(&id).await;
    drop(ctx);
    drop(connection);

    let abort = outbound.abort_handle();
    if tokio::time::timeout(OUTBOUND_DRAIN, outbound).await.is_err() {
        abort.abort();
    }

    info!("client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(started.elapsed().as_secs_f64());
}
