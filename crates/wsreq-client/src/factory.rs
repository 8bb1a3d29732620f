//! Opens connected bridges, locally (boot a server, then dial it) or remotely.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, instrument, warn};
use wsreq_core::url::{join, normalize_path, to_http, to_ws};
use wsreq_core::{BridgeError, LocalServer, Result};

use crate::bridge::ConnectionBridge;
use crate::socket::{EventSocket, TransportOptions};

/// Port the local path listens on when none is given.
pub const DEFAULT_PORT: u16 = 45000;

/// Floor for every bridge timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(3000);

/// Listen attempts before an address-in-use condition is given up on.
pub const MAX_PORT_ATTEMPTS: usize = 32;

const FIRST_UNPRIVILEGED_PORT: u32 = 1024;

/// How bridges are opened.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    path: String,
    timeout: Duration,
    clients: usize,
    transport: TransportOptions,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            path: "/".into(),
            timeout: MIN_TIMEOUT,
            clients: 1,
            transport: TransportOptions::default(),
        }
    }
}

impl FactoryConfig {
    /// Event-channel path; empty means `/`.
    #[must_use]
    pub fn with_path(mut self, path: impl AsRef<str>) -> Self {
        self.path = normalize_path(path.as_ref());
        self
    }

    /// Wait timeout, raised to [`MIN_TIMEOUT`] if lower.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp_timeout(timeout);
        self
    }

    /// Number of independent connections, at least one.
    #[must_use]
    pub fn with_clients(mut self, clients: usize) -> Self {
        self.clients = clamp_clients(clients);
        self
    }

    /// Options passed through to the WebSocket client.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Event-channel path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Effective timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Effective client count.
    pub fn clients(&self) -> usize {
        self.clients
    }

    /// Transport options.
    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }
}

/// Apply the timeout floor.
pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.max(MIN_TIMEOUT)
}

/// Apply the client-count floor.
pub fn clamp_clients(clients: usize) -> usize {
    clients.max(1)
}

/// Produces connected [`ConnectionBridge`]s.
#[derive(Clone, Debug, Default)]
pub struct ConnectionFactory {
    config: FactoryConfig,
}

impl ConnectionFactory {
    /// Factory using `config`.
    pub fn new(config: FactoryConfig) -> Self {
        Self { config }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Start `server` on `port`, then dial it once per configured client.
    ///
    /// An address-in-use failure moves to a random port up to 1000 above,
    /// at most [`MAX_PORT_ATTEMPTS`] times. Any other listen error is
    /// returned as is and the server is left alone. Every returned bridge
    /// shares the server.
    #[instrument(skip(self, server))]
    pub async fn local(&self, server: Arc<dyn LocalServer>, port: u16) -> Result<Vec<ConnectionBridge>> {
        let addr = listen_with_retry(server.as_ref(), port).await?;
        let ip = if addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            addr.ip()
        };
        let uri = format!("http://{}", SocketAddr::new(ip, addr.port()));
        info!(%uri, "local server listening");
        self.connect_all(&uri, Some(server)).await
    }

    /// Dial an already-running endpoint once per configured client.
    #[instrument(skip(self))]
    pub async fn remote(&self, uri: &str) -> Result<Vec<ConnectionBridge>> {
        self.connect_all(uri, None).await
    }

    /// Open the bridges for `target`, using [`DEFAULT_PORT`] for a local server.
    pub async fn open(&self, target: Target) -> Result<Vec<ConnectionBridge>> {
        match target {
            Target::Remote(uri) => self.remote(&uri).await,
            Target::Local(server) => self.local(server, DEFAULT_PORT).await,
        }
    }

    /// Connect sequentially so bridges come back in client order.
    ///
    /// On the first failure every bridge opened so far is closed, and so is
    /// the owned server.
    async fn connect_all(
        &self,
        uri: &str,
        server: Option<Arc<dyn LocalServer>>,
    ) -> Result<Vec<ConnectionBridge>> {
        let base_url = to_http(uri);
        let dial = join(&to_ws(uri), &self.config.path);
        let mut bridges = Vec::with_capacity(self.config.clients);

        for index in 0..self.config.clients {
            match EventSocket::connect(&dial, &self.config.transport, self.config.timeout).await {
                Ok(socket) => bridges.push(ConnectionBridge::new(
                    base_url.clone(),
                    socket,
                    self.config.timeout,
                    server.clone(),
                )),
                Err(e) => {
                    warn!(index, url = %dial, error = %e, "client connection failed");
                    for bridge in bridges {
                        bridge.close_keeping_server().await;
                    }
                    if let Some(server) = server {
                        server.close().await;
                    }
                    return Err(e);
                }
            }
        }

        info!(clients = bridges.len(), url = %dial, "bridges connected");
        Ok(bridges)
    }
}

/// Where [`wsrequest`] connects.
#[derive(Clone)]
pub enum Target {
    /// A running endpoint, `ws(s)://` or `http(s)://`.
    Remote(String),
    /// A server to start on [`DEFAULT_PORT`].
    Local(Arc<dyn LocalServer>),
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(uri) => f.debug_tuple("Remote").field(uri).finish(),
            Self::Local(_) => f.write_str("Local(..)"),
        }
    }
}

impl From<&str> for Target {
    fn from(uri: &str) -> Self {
        Self::Remote(uri.to_owned())
    }
}

impl From<String> for Target {
    fn from(uri: String) -> Self {
        Self::Remote(uri)
    }
}

/// Open bridges for `target` with `config`.
pub async fn wsrequest(target: impl Into<Target>, config: FactoryConfig) -> Result<Vec<ConnectionBridge>> {
    ConnectionFactory::new(config).open(target.into()).await
}

async fn listen_with_retry(server: &dyn LocalServer, port: u16) -> Result<SocketAddr> {
    let mut port = port;
    let mut last_err = None;

    for attempt in 1..=MAX_PORT_ATTEMPTS {
        match server.listen(port).await {
            Ok(addr) => return Ok(addr),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = next_port(port, random_offset());
                warn!(port, next, attempt, "port in use, retrying");
                port = next;
                last_err = Some(e);
            }
            Err(e) => {
                warn!(port, error = %e, "listen failed");
                return Err(BridgeError::Listen(e));
            }
        }
    }

    warn!(attempts = MAX_PORT_ATTEMPTS, "giving up on free port");
    Err(BridgeError::Listen(
        last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrInUse)),
    ))
}

fn random_offset() -> u16 {
    rand::rng().random_range(1..1000)
}

/// `port + offset`, wrapped into the unprivileged range.
pub fn next_port(port: u16, offset: u16) -> u16 {
    let span = u32::from(u16::MAX) + 1 - FIRST_UNPRIVILEGED_PORT;
    let start = u32::from(port).max(FIRST_UNPRIVILEGED_PORT);
    let candidate = start + u32::from(offset) - FIRST_UNPRIVILEGED_PORT;
    u16::try_from(FIRST_UNPRIVILEGED_PORT + candidate % span).unwrap_or(DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Fails the first `busy` listens with `fail_kind`, then succeeds.
    struct FlakyServer {
        busy: usize,
        fail_kind: io::ErrorKind,
        ports: Mutex<Vec<u16>>,
        closes: Mutex<usize>,
    }

    impl FlakyServer {
        fn new(busy: usize, fail_kind: io::ErrorKind) -> Self {
            Self {
                busy,
                fail_kind,
                ports: Mutex::new(Vec::new()),
                closes: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LocalServer for FlakyServer {
        async fn listen(&self, port: u16) -> io::Result<SocketAddr> {
            let mut ports = self.ports.lock();
            ports.push(port);
            if ports.len() <= self.busy {
                return Err(io::Error::from(self.fail_kind));
            }
            Ok(SocketAddr::from(([127, 0, 0, 1], port)))
        }

        async fn close(&self) {
            *self.closes.lock() += 1;
        }
    }

    #[test]
    fn config_defaults() {
        let cfg = FactoryConfig::default();
        assert_eq!(cfg.path(), "/");
        assert_eq!(cfg.timeout(), Duration::from_millis(3000));
        assert_eq!(cfg.clients(), 1);
    }

    #[test]
    fn empty_path_becomes_root() {
        assert_eq!(FactoryConfig::default().with_path("").path(), "/");
        assert_eq!(FactoryConfig::default().with_path("api/ws").path(), "/api/ws");
    }

    #[test]
    fn zero_clients_becomes_one() {
        assert_eq!(FactoryConfig::default().with_clients(0).clients(), 1);
        assert_eq!(FactoryConfig::default().with_clients(3).clients(), 3);
    }

    #[tokio::test]
    async fn address_in_use_retries_on_new_port() {
        let server = FlakyServer::new(2, io::ErrorKind::AddrInUse);
        let addr = listen_with_retry(&server, 45000).await.unwrap();
        let ports = server.ports.lock().clone();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0], 45000);
        assert_ne!(ports[1], 45000);
        assert_eq!(addr.port(), ports[2]);
    }

    #[tokio::test]
    async fn other_listen_errors_propagate_without_closing() {
        let server = FlakyServer::new(1, io::ErrorKind::PermissionDenied);
        let err = listen_with_retry(&server, 80).await.unwrap_err();
        assert_matches!(&err, BridgeError::Listen(e) if e.kind() == io::ErrorKind::PermissionDenied);
        assert_eq!(server.ports.lock().len(), 1);
        assert_eq!(*server.closes.lock(), 0);
    }

    #[tokio::test]
    async fn retries_are_capped() {
        let server = FlakyServer::new(usize::MAX, io::ErrorKind::AddrInUse);
        let err = listen_with_retry(&server, 45000).await.unwrap_err();
        assert_matches!(&err, BridgeError::Listen(e) if e.kind() == io::ErrorKind::AddrInUse);
        assert_eq!(server.ports.lock().len(), MAX_PORT_ATTEMPTS);
    }

    #[tokio::test]
    async fn failed_dial_closes_owned_server() {
        let scratch = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = scratch.local_addr().unwrap().port();
        drop(scratch);

        let server = Arc::new(FlakyServer::new(0, io::ErrorKind::AddrInUse));
        let factory = ConnectionFactory::default();
        let err = factory
            .local(Arc::clone(&server) as Arc<dyn LocalServer>, port)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid WS connection.");
        assert_eq!(*server.closes.lock(), 1);
    }

    #[tokio::test]
    async fn failed_remote_dial_is_invalid_connection() {
        let scratch = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = scratch.local_addr().unwrap();
        drop(scratch);

        let err = wsrequest(format!("ws://{addr}"), FactoryConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid WS connection.");
        assert_eq!(err.name(), "Connection Error.");
    }

    #[test]
    fn target_debug_hides_server() {
        let target = Target::Local(Arc::new(FlakyServer::new(0, io::ErrorKind::AddrInUse)));
        assert_eq!(format!("{target:?}"), "Local(..)");
        assert_eq!(format!("{:?}", Target::from("ws://h")), "Remote(\"ws://h\")");
    }

    proptest! {
        #[test]
        fn timeout_never_below_floor(ms in 0u64..10_000) {
            let effective = clamp_timeout(Duration::from_millis(ms));
            prop_assert_eq!(effective, Duration::from_millis(ms.max(3000)));
        }

        #[test]
        fn clients_never_below_one(n in 0usize..64) {
            prop_assert_eq!(clamp_clients(n), n.max(1));
        }

        #[test]
        fn next_port_stays_unprivileged_and_moves(port in 1024u16..=u16::MAX, offset in 1u16..1000) {
            let next = next_port(port, offset);
            prop_assert!(next >= 1024);
            prop_assert_ne!(next, port);
        }
    }
}
