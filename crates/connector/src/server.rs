use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::metrics::encode_metrics;

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub feed_name: String,
    pub connected: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(feed_name: impl Into<String>, connected: Arc<AtomicBool>) -> Self {
        Self {
            feed_name: feed_name.into(),
            connected,
        }
    }
}

/// Liveness - always 200 while the process serves requests
async fn livez() -> &'static str {
    "ok"
}

/// Readiness - 200 only while a feed session is established
async fn readyz(State(state): State<ServerState>) -> (StatusCode, &'static str) {
    if state.connected.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Prometheus text exposition
async fn metrics() -> (StatusCode, String) {
    match encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server until the shutdown signal fires
pub async fn run_server(
    addr: SocketAddr,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let feed = state.feed_name.clone();
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(feed = %feed, addr = %listener.local_addr()?, "Health server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
