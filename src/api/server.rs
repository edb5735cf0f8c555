//! HTTP server for the read-only query API

use crate::api::handlers;
use crate::error::Result;
use crate::monitor::cancelled;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Serve the query API until the shutdown token fires.
pub async fn serve(
    state: Arc<AppState>,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/history", get(handlers::get_history))
        .route("/api/v1/status", get(handlers::get_status))
        .route("/api/v1/alerts", get(handlers::get_alert_states))
        .route("/api/v1/alerts/reset", post(handlers::reset_alert))
        .route(
            "/api/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting peerwatch API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancelled(&mut shutdown).await;
            info!("API server shutting down");
        })
        .await?;

    Ok(())
}
