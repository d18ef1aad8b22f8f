//! HTTP route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ServerState>`.

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::engine::{CycleOrchestrator, CycleOutcome};
use crate::storage::LedgerStore;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ServerState {
    pub orchestrator: Arc<CycleOrchestrator>,
    pub store: Arc<dyn LedgerStore>,
    /// `None` rejects every admin request.
    pub admin_token: Option<SecretString>,
}

pub type AppState = Arc<ServerState>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// GET /public/stats — the ledger document as stored.
pub async fn get_stats(State(state): State<AppState>) -> Response {
    match state.store.load().await {
        Ok(ledger) => Json(ledger).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to load ledger for stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": format!("{e:#}") })),
            )
                .into_response()
        }
    }
}

/// POST /admin/run-once
pub async fn run_once(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&headers, state.admin_token.as_ref()) {
        return unauthorized();
    }
    let orchestrator = state.orchestrator.clone();
    outcome_response(detached(async move { orchestrator.run_cycle().await }).await)
}

/// POST /admin/force-sync
pub async fn force_sync(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&headers, state.admin_token.as_ref()) {
        return unauthorized();
    }
    let orchestrator = state.orchestrator.clone();
    outcome_response(detached(async move { orchestrator.force_sync().await }).await)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a cycle on its own task. A disconnecting client drops only the wait.
async fn detached<F>(cycle: F) -> anyhow::Result<CycleOutcome>
where
    F: Future<Output = anyhow::Result<CycleOutcome>> + Send + 'static,
{
    tokio::spawn(cycle).await.context("Cycle task did not finish")?
}

/// True when the request carries `Authorization: Bearer <token>` matching
/// the configured token.
pub fn authorized(headers: &HeaderMap, expected: Option<&SecretString>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| {
            !token.is_empty() && bool::from(token.as_bytes().ct_eq(expected.expose_secret().as_bytes()))
        })
}

fn unauthorized() -> Response {
    warn!("Rejected admin request with missing or wrong bearer token");
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
}

fn outcome_response(outcome: anyhow::Result<CycleOutcome>) -> Response {
    match outcome {
        Ok(CycleOutcome::Completed(result)) => Json(json!({ "ok": true, "result": result })).into_response(),
        Ok(CycleOutcome::Skipped) => Json(json!({ "ok": true, "skipped": true })).into_response(),
        Err(e) => {
            error!(error = %e, "Admin-triggered cycle failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": format!("{e:#}") })),
            )
                .into_response()
        }
    }
}
