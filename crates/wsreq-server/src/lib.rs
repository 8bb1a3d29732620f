//! # wsreq-server
//!
//! Axum WebSocket event server.
//!
//! - [`registry`]: declarative `(event, handler)` list with an explicit per-connection context
//! - [`connection`]: accepted connections and the id → connection map
//! - [`session`]: one client from upgrade through disconnect
//! - [`server`]: [`EventServer`], implementing `wsreq_core::LocalServer`
//! - [`demo`]: the demonstration app used by the CLI and integration tests

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod demo;
pub mod errors;
pub mod registry;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionMap};
pub use errors::{RegistryError, ServerError};
pub use registry::{EventHandler, EventRegistry, HandlerContext};
pub use server::EventServer;
