//! The seam between the connection factory and a caller-owned server.

use std::net::SocketAddr;

use async_trait::async_trait;

/// A server the factory can start and stop on the caller's behalf.
///
/// `listen` must report an address-in-use condition as
/// [`std::io::ErrorKind::AddrInUse`] so the factory can retry on another port.
#[async_trait]
pub trait LocalServer: Send + Sync {
    /// Start listening on `port` (`0` lets the OS choose) and return the bound address.
    async fn listen(&self, port: u16) -> std::io::Result<SocketAddr>;

    /// Stop listening and drop every accepted connection.
    async fn close(&self);
}
