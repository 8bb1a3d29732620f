//! # wsreq
//!
//! Command-line front end: run the demonstration server, or watch a running
//! endpoint with one correlated WebSocket/HTTP wait per client.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use wsreq_client::{ConnectionBridge, FactoryConfig, wsrequest};
use wsreq_core::{HttpMethod, HttpTrigger, LocalServer};
use wsreq_logging::{LogConfig, init_subscriber};
use wsreq_server::{ServerConfig, demo};
use wsreq_settings::{WsreqSettings, load_settings};

/// Correlate WebSocket events with HTTP triggers.
#[derive(Parser, Debug)]
#[command(name = "wsreq", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demonstration server until Ctrl-C.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// WebSocket endpoint path.
        #[arg(long)]
        path: Option<String>,
    },
    /// Dial a running endpoint and wait for one event per client.
    Watch {
        /// Endpoint, `ws(s)://` or `http(s)://` (default `ws://localhost:<client port>`).
        uri: Option<String>,
        /// WebSocket endpoint path.
        #[arg(long)]
        path: Option<String>,
        /// Number of independent connections.
        #[arg(long)]
        clients: Option<usize>,
        /// Wait timeout in milliseconds (at least 3000).
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Event to wait for.
        #[arg(long)]
        event: String,
        /// Event to emit before waiting.
        #[arg(long)]
        emit: Option<String>,
        /// JSON payload for `--emit`.
        #[arg(long, requires = "emit")]
        data: Option<String>,
        /// HTTP call fired halfway through the wait.
        #[arg(long, num_args = 2, value_names = ["METHOD", "URL"], conflicts_with = "emit")]
        http: Option<Vec<String>>,
        /// JSON body for `--http`.
        #[arg(long, requires = "http")]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings come first so their log level applies.
    let (settings, settings_err) = match load_settings() {
        Ok(settings) => (settings, None),
        Err(e) => (WsreqSettings::default(), Some(e)),
    };
    init_subscriber(&LogConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
        ..LogConfig::default()
    })?;
    if let Some(e) = settings_err {
        tracing::warn!(error = %e, "failed to load settings, using defaults");
    }

    match cli.command {
        Command::Serve { host, port, path } => serve(&settings, host, port, path).await,
        Command::Watch {
            uri,
            path,
            clients,
            timeout_ms,
            event,
            emit,
            data,
            http,
            body,
        } => {
            let config = FactoryConfig::default()
                .with_path(path.unwrap_or_else(|| settings.client.path.clone()))
                .with_clients(clients.unwrap_or(settings.client.clients))
                .with_timeout(Duration::from_millis(
                    timeout_ms.unwrap_or(settings.client.timeout_ms),
                ));
            let action = match http {
                Some(parts) => Action::Http(trigger(&parts, body.as_deref())?),
                None => {
                    let emit = match emit {
                        Some(name) => {
                            let data = parse_json(data.as_deref().unwrap_or("null"), "--data")?;
                            Some((name, data))
                        }
                        None => None,
                    };
                    Action::Wait { emit }
                }
            };
            let uri = uri.unwrap_or_else(|| format!("ws://localhost:{}", settings.client.port));
            watch(&uri, config, &event, &action).await
        }
    }
}

async fn serve(
    settings: &WsreqSettings,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
) -> Result<()> {
    let config = ServerConfig {
        host: host.unwrap_or_else(|| settings.server.host.clone()),
        ..ServerConfig::with_path(path.unwrap_or_else(|| settings.server.ws_path.clone()))
    };
    let ws_path = config.path.clone();
    let server = demo::server(config).context("failed to build server")?;
    let addr = server
        .listen(port.unwrap_or(settings.server.port))
        .await
        .context("failed to listen")?;
    tracing::info!(%addr, ws_path = %ws_path, "demonstration server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    server.close().await;
    Ok(())
}

enum Action {
    Wait { emit: Option<(String, Value)> },
    Http(HttpTrigger),
}

fn trigger(parts: &[String], body: Option<&str>) -> Result<HttpTrigger> {
    let [method, url] = parts else {
        bail!("--http takes METHOD URL");
    };
    let method: HttpMethod = method.parse().map_err(anyhow::Error::msg)?;
    let mut trigger = HttpTrigger::new(method, url.clone());
    if let Some(body) = body {
        trigger = trigger.body(parse_json(body, "--body")?);
    }
    Ok(trigger)
}

fn parse_json(text: &str, flag: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("{flag} is not valid JSON"))
}

async fn watch(uri: &str, config: FactoryConfig, event: &str, action: &Action) -> Result<()> {
    let bridges = wsrequest(uri, config).await.context("failed to connect")?;

    let mut failed = false;
    for (index, bridge) in bridges.into_iter().enumerate() {
        let outcome = run(&bridge, event, action).await;
        bridge.close().await;
        match outcome {
            Ok(value) => println!("{}", serde_json::to_string(&value)?),
            Err(e) => {
                failed = true;
                tracing::error!(index, error = %e, kind = e.name(), "wait failed");
            }
        }
    }

    if failed {
        bail!("one or more waits failed");
    }
    Ok(())
}

async fn run(bridge: &ConnectionBridge, event: &str, action: &Action) -> wsreq_core::Result<Value> {
    match action {
        Action::Http(trigger) => {
            let response = bridge.on_with_http::<Value>(event, trigger.clone()).await?;
            Ok(serde_json::json!({ "ws": response.ws, "http": response.http }))
        }
        Action::Wait { emit } => {
            let wait = bridge.on::<Value>(event);
            if let Some((name, data)) = emit {
                let _ = bridge.emit(name, data);
            }
            wait.await
        }
    }
}
