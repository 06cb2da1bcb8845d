//! Vehicle gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client request
//!     ──────────────▶ http::server ──▶ http::admission ──▶ dispatch::dispatcher
//!                                        │  400 / 401          │
//!                                        ▼                     ▼
//!                                     rejection         session registry
//!                                                        (in-flight guard)
//!                                                              │
//!                                                              ▼
//!                                                     dispatch::relay
//!                                                              │
//!                                                              ▼
//!     Vehicle API  ◀──────────────────────────────── resilience::executor
//!                                               gate → bucket → retry/backoff
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use vehicle_gateway::config::load_config;
use vehicle_gateway::dispatch::RelayHandler;
use vehicle_gateway::http::HttpServer;
use vehicle_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use vehicle_gateway::observability::{init_logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "vehicle-gateway", version, about = "JSON-RPC gateway for vehicle APIs")]
struct Args {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vehicle-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.security.environment,
        auth_strategy = config.auth.strategy.as_str(),
        auth_enabled = config.auth.enabled,
        rps = config.outbound.rate_limit.tokens_per_second,
        burst = config.outbound.rate_limit.burst,
        concurrency = config.outbound.concurrency,
        retries = config.outbound.retries,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = RelayHandler::from_config(&config.outbound)?;
    if !relay.is_configured() {
        tracing::warn!("No upstream_url configured; only built-in methods will succeed");
    }
    let executor = relay.executor().clone();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, Arc::new(relay));
    server.run(listener, shutdown.subscribe()).await?;

    executor.close();
    tracing::info!("Shutdown complete");
    Ok(())
}
