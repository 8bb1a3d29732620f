//! One event-channel connection correlated with HTTP triggers.
//!
//! Every wait is bounded by the bridge timeout. Listeners are one-shot and
//! detach as soon as the wait settles, whichever way it settles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wsreq_core::{BridgeError, HttpError, HttpTrigger, LocalServer, MESSAGE_EVENT, Result};

use crate::factory::clamp_timeout;
use crate::listeners::ListenerGuard;
use crate::request::RequestClient;
use crate::socket::{ConnectionStatus, EventSocket};

type HttpOutcome = std::result::Result<Value, HttpError>;

/// Result of [`ConnectionBridge::on_with_http`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BridgedResponse<T> {
    /// Payload of the awaited event.
    pub ws: T,
    /// HTTP response body, if the call had completed when the event arrived.
    pub http: Option<Value>,
}

/// What [`ConnectionBridge::multiple`] hands its callback.
#[derive(Clone, Debug)]
pub struct Controller<'a> {
    /// The bridge itself.
    pub ws: &'a ConnectionBridge,
    /// A fresh client bound to the bridge's HTTP base URL.
    pub http: RequestClient,
}

/// An event-channel connection plus the HTTP base URL derived from it.
pub struct ConnectionBridge {
    base_url: String,
    socket: EventSocket,
    timeout: Duration,
    server: Option<Arc<dyn LocalServer>>,
    http: RequestClient,
}

impl ConnectionBridge {
    /// Wrap a connected socket.
    ///
    /// `timeout` is raised to [`MIN_TIMEOUT`](crate::MIN_TIMEOUT) if lower.
    /// `server` is the owned server, present only on the local bootstrap path.
    pub fn new(
        base_url: impl Into<String>,
        socket: EventSocket,
        timeout: Duration,
        server: Option<Arc<dyn LocalServer>>,
    ) -> Self {
        Self::with_exact_timeout(base_url, socket, clamp_timeout(timeout), server)
    }

    fn with_exact_timeout(
        base_url: impl Into<String>,
        socket: EventSocket,
        timeout: Duration,
        server: Option<Arc<dyn LocalServer>>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: RequestClient::new(base_url.clone()),
            base_url,
            socket,
            timeout,
            server,
        }
    }

    /// HTTP base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bound on every wait.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Live connection id and connected flag.
    pub fn connection(&self) -> ConnectionStatus {
        self.socket.status()
    }

    /// Whether closing this bridge also closes a server.
    pub fn owns_server(&self) -> bool {
        self.server.is_some()
    }

    /// Client used for HTTP triggers.
    pub fn http(&self) -> &RequestClient {
        &self.http
    }

    /// Wait for the first payload on `event`.
    ///
    /// The listener is attached when this is called, not when the returned
    /// future is first polled, so a caller may create the wait, emit, then
    /// await. Fails with `"Invalid WS event."` when nothing arrives within
    /// the timeout or the connection closes first.
    pub fn on<T>(&self, event: &str) -> impl Future<Output = Result<T>> + Send + use<T>
    where
        T: DeserializeOwned + Send,
    {
        let (guard, rx) = self.socket.listen(event);
        let timeout = self.timeout;
        let event = event.to_owned();
        async move {
            let data = wait_for(guard, rx, timeout).await?;
            debug!(event = %event, "event received");
            decode(&event, data)
        }
    }

    /// Wait for `event`, firing `trigger` over HTTP after half the timeout.
    ///
    /// The event may arrive before, during or after the HTTP call; `http`
    /// holds the response body only if the call finished first. An HTTP
    /// failure before the event fails the wait with a copy of that error.
    pub async fn on_with_http<T>(&self, event: &str, trigger: HttpTrigger) -> Result<BridgedResponse<T>>
    where
        T: DeserializeOwned,
    {
        let (_guard, mut rx) = self.socket.listen(event);

        let deadline = tokio::time::sleep(self.timeout);
        let stagger = tokio::time::sleep(self.timeout / 2);
        tokio::pin!(deadline, stagger);

        let mut pending = Some(trigger);
        let mut http_rx: Option<oneshot::Receiver<HttpOutcome>> = None;
        let mut http: Option<Value> = None;

        loop {
            tokio::select! {
                biased;
                received = &mut rx => {
                    let Ok(data) = received else {
                        warn!(event, "connection closed while waiting for event");
                        return Err(BridgeError::invalid_event());
                    };
                    debug!(event, http_completed = http.is_some(), "event received");
                    return Ok(BridgedResponse { ws: decode(event, data)?, http });
                }
                outcome = recv_outcome(&mut http_rx), if http_rx.is_some() => match outcome {
                    Some(Ok(body)) => http = Some(body),
                    Some(Err(e)) => {
                        warn!(event, error = %e, "http trigger failed");
                        return Err(BridgeError::Http(e.detached()));
                    }
                    None => debug!(event, "http trigger dropped"),
                },
                () = &mut deadline => {
                    warn!(event, timeout_ms = self.timeout.as_millis(), "timed out waiting for event");
                    return Err(BridgeError::invalid_event());
                }
                () = &mut stagger, if pending.is_some() => {
                    if let Some(trigger) = pending.take() {
                        http_rx = Some(self.fire(trigger));
                    }
                }
            }
        }
    }

    /// Queue `event` on the event channel. Fire-and-forget; returns `self` for chaining.
    ///
    /// Nothing is buffered on the receiving side: emit first, then wait.
    pub fn emit<D: Serialize + ?Sized>(&self, event: &str, data: &D) -> &Self {
        match serde_json::to_value(data) {
            Ok(value) => {
                if !self.socket.emit(event, value) {
                    warn!(event, "emit dropped, connection closed or send queue full");
                }
            }
            Err(e) => warn!(event, error = %e, "emit payload is not serializable"),
        }
        self
    }

    /// Emit a `message` and wait for the reply on `message`.
    ///
    /// Fails with `"Request timeout."` when no reply arrives in time.
    pub async fn send<T, D>(&self, data: &D) -> Result<T>
    where
        T: DeserializeOwned + Send,
        D: Serialize + ?Sized,
    {
        let reply = self.on::<T>(MESSAGE_EVENT);
        let _ = self.emit(MESSAGE_EVENT, data);
        reply.await.map_err(|e| {
            if e.is_invalid_event() {
                BridgeError::request_timeout()
            } else {
                e
            }
        })
    }

    /// Run `f` with this bridge and a fresh HTTP client, returning whatever it returns.
    pub async fn multiple<'a, F, Fut, R>(&'a self, f: F) -> R
    where
        F: FnOnce(Controller<'a>) -> Fut,
        Fut: Future<Output = R>,
    {
        f(self.controller()).await
    }

    /// Controller handed to [`multiple`](Self::multiple).
    pub fn controller(&self) -> Controller<'_> {
        Controller {
            ws: self,
            http: RequestClient::new(self.base_url.clone()),
        }
    }

    /// Close the connection and, if owned, the server.
    ///
    /// Other bridges sharing that server lose their connections too.
    pub async fn close(self) {
        self.shutdown(false).await;
    }

    /// Close the connection and leave any owned server running.
    pub async fn close_keeping_server(self) {
        self.shutdown(true).await;
    }

    async fn shutdown(self, keep_server: bool) {
        let id = self.socket.id().clone();
        self.socket.close().await;
        if !keep_server {
            if let Some(server) = self.server {
                server.close().await;
            }
        }
        debug!(conn_id = %id, keep_server, "bridge closed");
    }

    /// Start the HTTP call on its own task; its result is discarded if nobody waits for it.
    fn fire(&self, trigger: HttpTrigger) -> oneshot::Receiver<HttpOutcome> {
        let (tx, rx) = oneshot::channel();
        let http = self.http.clone();
        let mut options = trigger.options();
        options.timeout = Some(self.timeout);
        debug!(method = %trigger.method, url = %trigger.url, "firing http trigger");
        let _ = tokio::spawn(async move {
            let outcome = http.request_value(trigger.method, &trigger.url, options).await;
            let _ = tx.send(outcome);
        });
        rx
    }
}

impl std::fmt::Debug for ConnectionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBridge")
            .field("base_url", &self.base_url)
            .field("socket", &self.socket)
            .field("timeout", &self.timeout)
            .field("owns_server", &self.server.is_some())
            .finish_non_exhaustive()
    }
}

async fn wait_for(guard: ListenerGuard, rx: oneshot::Receiver<Value>, timeout: Duration) -> Result<Value> {
    let outcome = tokio::time::timeout(timeout, rx).await;
    let event = guard.event();
    match outcome {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(_)) => {
            warn!(event, "connection closed while waiting for event");
            Err(BridgeError::invalid_event())
        }
        Err(_) => {
            warn!(event, timeout_ms = timeout.as_millis(), "timed out waiting for event");
            Err(BridgeError::invalid_event())
        }
    }
}

async fn recv_outcome(slot: &mut Option<oneshot::Receiver<HttpOutcome>>) -> Option<HttpOutcome> {
    let rx = slot.as_mut()?;
    let outcome = rx.await.ok();
    *slot = None;
    outcome
}

fn decode<T: DeserializeOwned>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|source| BridgeError::Payload {
        event: event.to_owned(),
        source,
    })
}
