//! # wsreq-core
//!
//! Types shared by the wsreq client and server crates.
//!
//! - [`errors`]: `BridgeError` / `HttpError` taxonomy
//! - [`frame`]: the `{event, data}` wire frame and reserved event names
//! - [`http`]: HTTP methods and per-call request options
//! - [`ids`]: branded identifiers
//! - [`server`]: the `LocalServer` seam used by the local bootstrap path
//! - [`url`]: scheme mapping between the event channel and HTTP

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod http;
pub mod ids;
pub mod server;
pub mod url;

pub use errors::{BridgeError, HttpError, HttpErrorKind, Result};
pub use frame::{ESTABLISHED_EVENT, EventFrame, MESSAGE_EVENT};
pub use http::{Credentials, HttpMethod, HttpTrigger, RequestOptions};
pub use ids::{ConnectionId, ListenerId};
pub use server::LocalServer;
