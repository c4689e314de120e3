//! wsrelay: stream feed relay binary
//!
//! Keeps a subscription to a WebSocket stream feed alive and copies every
//! message, raw and in order, to the configured sinks.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsrelay_connector_lib::{
    build_fanout, run_server, ConnectionConfig, ConnectionManager, Pipeline, PipelineExit,
    ServerState, WebSocketDialer,
};
use wsrelay_metadata::{parse_bind_addr, RelayConfig};

/// Request id used for the startup subscription
const STARTUP_REQUEST_ID: u64 = 1;

#[derive(Parser, Debug)]
#[command(name = "wsrelay")]
#[command(about = "Resilient WebSocket stream relay")]
struct Args {
    /// Path to relay configuration file
    #[arg(short, long, env = "WSRELAY_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Health server bind address (overrides health.addr)
    #[arg(long)]
    health_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = RelayConfig::load(&args.config).map_err(|e| {
        error!(path = %args.config.display(), error = %e, "Failed to load configuration");
        e
    })?;
    info!(
        feed = %config.name,
        endpoint = %config.endpoint,
        streams = config.streams.len(),
        sinks = config.sinks.len(),
        "Loaded relay configuration"
    );

    let health_addr: SocketAddr = match &args.health_addr {
        Some(addr) => parse_bind_addr(addr)?,
        None => config.health.socket_addr()?,
    };

    let fanout = build_fanout(&config.sinks).map_err(|e| {
        error!(error = %e, "Failed to build sinks");
        e
    })?;

    let dialer = WebSocketDialer::new(&config.endpoint)?;
    let manager = ConnectionManager::new(
        &config.name,
        dialer,
        ConnectionConfig::from(&config.connection),
    );

    // Setup shutdown signal for the health server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_state = ServerState::new(&config.name, manager.connected_handle());
    tokio::spawn(async move {
        if let Err(e) = run_server(health_addr, server_state, shutdown_rx).await {
            error!(error = %e, "Health server error");
        }
    });

    // Handle Ctrl+C
    let signal_manager = manager.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        if let Err(e) = signal_manager.close().await {
            warn!(error = %e, "Error closing feed connection");
        }
        shutdown_tx.send(true).ok();
    });

    let (mut messages, mut errors) = match (manager.messages(), manager.errors()) {
        (Some(messages), Some(errors)) => (messages, errors),
        _ => return Err("relay queues already taken".into()),
    };

    let mut pipeline = Pipeline::new(&config.name, fanout);

    // Registered before the first dial; its replay carries the streams
    let started = match manager.subscribe(&config.streams, STARTUP_REQUEST_ID).await {
        Ok(()) => manager.connect().await,
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        error!(error = %e, "Failed to start feed connection");
        if let Err(e) = pipeline.close().await {
            warn!(error = %e, "Failed to close sinks");
        }
        return Err(e.into());
    }
    info!(streams = ?config.streams, "Subscribed to streams");

    let summary = pipeline.run(&mut messages, &mut errors).await;

    if let Err(e) = manager.close().await {
        warn!(error = %e, "Error closing feed connection");
    }
    if let Err(e) = pipeline.close().await {
        error!(error = %e, "Failed to close sinks");
    }

    info!(
        messages = summary.messages,
        failed_writes = summary.failed_writes,
        exit = ?summary.exit,
        "Relay stopped"
    );

    match summary.exit {
        PipelineExit::SourceEnded => Ok(()),
        PipelineExit::SourceError(e) => {
            error!(error = %e, "Feed source failed - exiting to trigger restart");
            std::process::exit(1);
        }
    }
}
