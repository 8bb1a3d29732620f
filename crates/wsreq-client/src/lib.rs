//! # wsreq-client
//!
//! Correlates WebSocket events with HTTP calls under a bounded wait.
//!
//! - [`socket`]: event-channel client and its connection status
//! - [`listeners`]: one-shot listeners that detach on drop
//! - [`request`]: [`RequestClient`], the HTTP half
//! - [`bridge`]: [`ConnectionBridge`], waits and emits on one connection
//! - [`factory`]: [`ConnectionFactory`] and [`wsrequest`], local or remote bootstrap

#![deny(unsafe_code)]

pub mod bridge;
pub mod factory;
pub mod listeners;
pub mod request;
pub mod socket;

pub use bridge::{BridgedResponse, ConnectionBridge, Controller};
pub use factory::{ConnectionFactory, DEFAULT_PORT, FactoryConfig, MIN_TIMEOUT, Target, wsrequest};
pub use request::RequestClient;
pub use socket::{ConnectionStatus, EventSocket, TransportOptions};
