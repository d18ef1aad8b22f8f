//! HTTP server — Axum router for the public stats feed and admin triggers.
//!
//! Runs as a background task alongside the scheduler.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use routes::{AppState, ServerState};

/// Bind the port and start serving in a background task.
pub async fn spawn_server(state: AppState, port: u16, allowed_origins: &[String]) -> Result<JoinHandle<()>> {
    let app = build_router(state, allowed_origins);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind server port {port}"))?;
    info!(port, "HTTP server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server stopped");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origins(allowed_origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/public/stats", get(routes::get_stats))
        .route("/admin/run-once", post(routes::run_once))
        .route("/admin/force-sync", post(routes::force_sync))
        .route("/health", get(routes::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when the list is empty, otherwise exactly the listed ones.
fn cors_origins(allowed: &[String]) -> AllowOrigin {
    let origins: Vec<HeaderValue> = allowed
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
