//! Event-channel client over `tokio-tungstenite`.
//!
//! A single background task owns the socket: it forwards queued outbound
//! frames and routes inbound frames to the one-shot [`ListenerSet`].

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, info, instrument, warn};
use wsreq_core::errors::BoxError;
use wsreq_core::{BridgeError, ConnectionId, EventFrame, Result};

use crate::listeners::{ListenerGuard, ListenerSet};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound queue capacity per socket.
const SEND_QUEUE: usize = 256;

/// How long `close` waits for the socket task to flush the close frame.
const CLOSE_DRAIN: Duration = Duration::from_secs(1);

/// Live view of a connection: its id and whether it is still open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Id the server assigned in its established frame.
    pub id: ConnectionId,
    /// `false` once either side closed the socket.
    pub connected: bool,
}

/// Options passed through to the WebSocket client.
#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    /// Extra headers sent with the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Largest accepted message, in bytes.
    pub max_message_size: Option<usize>,
    /// Largest accepted frame, in bytes.
    pub max_frame_size: Option<usize>,
    /// Set `TCP_NODELAY` on the socket.
    pub disable_nagle: bool,
}

impl TransportOptions {
    /// Add an upgrade request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn ws_config(&self) -> Option<WebSocketConfig> {
        if self.max_message_size.is_none() && self.max_frame_size.is_none() {
            return None;
        }
        let mut config = WebSocketConfig::default();
        if let Some(size) = self.max_message_size {
            config = config.max_message_size(Some(size));
        }
        if let Some(size) = self.max_frame_size {
            config = config.max_frame_size(Some(size));
        }
        Some(config)
    }
}

enum Outbound {
    Frame(String),
    Close,
}

/// One event-channel connection.
pub struct EventSocket {
    id: ConnectionId,
    connected: Arc<AtomicBool>,
    listeners: Arc<ListenerSet>,
    out_tx: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

impl EventSocket {
    /// Dial `url` and wait for the server's established frame.
    ///
    /// Every failure before that frame arrives, including the handshake
    /// outliving `timeout`, is reported as an invalid connection.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str, options: &TransportOptions, timeout: Duration) -> Result<Self> {
        let (ws, id) = match tokio::time::timeout(timeout, handshake(url, options)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(error = %e, "event channel connection failed");
                return Err(BridgeError::invalid_connection(e));
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "event channel handshake timed out");
                return Err(BridgeError::invalid_connection(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "handshake timed out",
                )));
            }
        };
        info!(conn_id = %id, "event channel connected");

        let connected = Arc::new(AtomicBool::new(true));
        let listeners = Arc::new(ListenerSet::new());
        let (out_tx, out_rx) = mpsc::channel(SEND_QUEUE);
        let task = tokio::spawn(socket_loop(
            ws,
            id.clone(),
            out_rx,
            Arc::clone(&listeners),
            Arc::clone(&connected),
        ));

        Ok(Self {
            id,
            connected,
            listeners,
            out_tx,
            task,
        })
    }

    /// Server-assigned connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Whether the socket is still open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Current id and connected flag.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            id: self.id.clone(),
            connected: self.is_connected(),
        }
    }

    /// Attach a one-shot listener for `event`.
    ///
    /// Events delivered before this call are not buffered.
    pub fn listen(&self, event: &str) -> (ListenerGuard, oneshot::Receiver<Value>) {
        self.listeners.once(event)
    }

    /// Queue `event` with `data`. Returns `false` when the frame was not queued.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        let text = match EventFrame::new(event, data).encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(event, error = %e, "failed to encode frame");
                return false;
            }
        };
        self.out_tx.try_send(Outbound::Frame(text)).is_ok()
    }

    /// Send a close frame and stop the socket task.
    pub async fn close(self) {
        let _ = self.out_tx.send(Outbound::Close).await;
        let mut task = self.task;
        if tokio::time::timeout(CLOSE_DRAIN, &mut task).await.is_err() {
            task.abort();
        }
        self.connected.store(false, Ordering::Release);
        self.listeners.close();
        debug!(conn_id = %self.id, "event channel closed");
    }
}

impl std::fmt::Debug for EventSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSocket")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

async fn handshake(
    url: &str,
    options: &TransportOptions,
) -> std::result::Result<(WsStream, ConnectionId), BoxError> {
    let mut request = url.into_client_request()?;
    for (name, value) in &options.headers {
        let _ = request.headers_mut().insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    let (mut ws, _) =
        connect_async_with_config(request, options.ws_config(), options.disable_nagle).await?;

    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                let id = EventFrame::decode(text.as_str())?
                    .established_id()
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "first frame was not an established frame")
                    })?;
                return Ok((ws, id));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed before established frame").into())
}

async fn socket_loop(
    ws: WsStream,
    id: ConnectionId,
    mut out_rx: mpsc::Receiver<Outbound>,
    listeners: Arc<ListenerSet>,
    connected: Arc<AtomicBool>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(conn_id = %id, error = %e, "send failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match EventFrame::decode(text.as_str()) {
                    Ok(frame) => {
                        let delivered = listeners.dispatch(&frame.event, frame.data);
                        debug!(conn_id = %id, event = %frame.event, delivered, "event received");
                    }
                    Err(e) => debug!(conn_id = %id, error = %e, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!(conn_id = %id, "event channel closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(conn_id = %id, error = %e, "event channel error");
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::Release);
    listeners.close();
}
