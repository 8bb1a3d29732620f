//! Demonstration app: a small REST surface whose handlers emit events.
//!
//! | Route | Effect |
//! |-------|--------|
//! | `GET /api/` | `{"msg":"Hello"}` |
//! | `GET /api/get` | emits `test` `{"msg":"from get"}` and returns it |
//! | `POST/PUT/DELETE /api/{post,put,delete}` | body `{"test": x}`; emits `test` `{"msg": x}` and returns it |
//!
//! Emits go to every live connection, or only to the one named by the
//! `x-connection-id` header. The WebSocket endpoint lives at `/api/ws` and
//! answers `ping` with `pong`, and echoes `message` and `echo`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use wsreq_core::{ConnectionId, MESSAGE_EVENT};

use crate::config::ServerConfig;
use crate::connection::ConnectionMap;
use crate::errors::{RegistryError, ServerError};
use crate::registry::{EventRegistry, HandlerContext};
use crate::server::EventServer;

/// WebSocket path of the demonstration app.
pub const WS_PATH: &str = "/api/ws";

/// Header selecting a single connection as the target of HTTP-triggered emits.
pub const CONNECTION_HEADER: &str = "x-connection-id";

/// Event emitted by every HTTP route.
pub const TEST_EVENT: &str = "test";

/// Handlers: `ping` → `pong`, `message` → `message`, `echo` → `echo`.
pub fn registry() -> Result<EventRegistry, RegistryError> {
    let mut registry = EventRegistry::new();
    let _ = registry
        .push("ping", |ctx: &HandlerContext, data: Value| {
            let _ = ctx.emit("pong", data);
        })?
        .push(MESSAGE_EVENT, |ctx: &HandlerContext, data: Value| {
            let _ = ctx.emit(MESSAGE_EVENT, data);
        })?
        .push("echo", |ctx: &HandlerContext, data: Value| {
            let _ = ctx.emit("echo", data);
        })?;
    Ok(registry)
}

/// HTTP routes emitting through `connections`.
pub fn routes(connections: Arc<ConnectionMap>) -> Router {
    Router::new()
        .route("/api", get(index))
        .route("/api/", get(index))
        .route("/api/get", get(some_get))
        .route("/api/post", post(some_write))
        .route("/api/put", put(some_write))
        .route("/api/delete", delete(some_write))
        .with_state(connections)
}

/// The demonstration app with an explicit config (its path is usually [`WS_PATH`]).
pub fn server(config: ServerConfig) -> Result<EventServer, ServerError> {
    let server = EventServer::new(config, Some(registry()?))?;
    let routes = routes(server.connections());
    Ok(server.with_routes(routes))
}

/// The demonstration app on `127.0.0.1`, WebSocket at [`WS_PATH`].
pub fn app() -> Result<EventServer, ServerError> {
    server(ServerConfig::with_path(WS_PATH))
}

#[derive(Debug, Deserialize)]
struct TestBody {
    #[serde(default)]
    test: Value,
}

async fn index() -> Json<Value> {
    Json(json!({ "msg": "Hello" }))
}

async fn some_get(State(connections): State<Arc<ConnectionMap>>, headers: HeaderMap) -> Json<Value> {
    let payload = json!({ "msg": "from get" });
    emit_test(&connections, &headers, payload.clone()).await;
    Json(payload)
}

async fn some_write(
    State(connections): State<Arc<ConnectionMap>>,
    headers: HeaderMap,
    Json(body): Json<TestBody>,
) -> Json<Value> {
    let payload = json!({ "msg": body.test });
    emit_test(&connections, &headers, payload.clone()).await;
    Json(payload)
}

async fn emit_test(connections: &ConnectionMap, headers: &HeaderMap, payload: Value) {
    let target = headers
        .get(CONNECTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ConnectionId::from_raw);
    match target {
        Some(id) => {
            let delivered = connections.emit_to(&id, TEST_EVENT, payload).await;
            debug!(conn_id = %id, delivered, "emitted to one connection");
        }
        None => {
            let recipients = connections.emit_all(TEST_EVENT, payload).await;
            debug!(recipients, "emitted to all connections");
        }
    }
}
