//! HTTP router driven end to end against the simulated chain.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use secrecy::SecretString;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use flywheel::server::{build_router, ServerState};
use flywheel::storage::LedgerStore;
use flywheel::types::TokenProgram;
use flywheel::venues::SwapVenue;

use crate::sim::*;

const TOKEN: &str = "integration-token";

fn app() -> (axum::Router, Arc<SimChain>, Arc<MemoryStore>) {
    app_with_swap_delay(Duration::ZERO)
}

fn app_with_swap_delay(delay: Duration) -> (axum::Router, Arc<SimChain>, Arc<MemoryStore>) {
    let chain = Arc::new(SimChain::new(Pubkey::new_unique(), RESERVE));
    let venue: Arc<dyn SwapVenue> = Arc::new(
        SimVenue::new(
            "jupiter",
            chain.clone(),
            Route::Fill {
                program: TokenProgram::Token2022,
                raw: 2_500_000,
                stale_reads: 1,
            },
        )
        .with_delay(delay),
    );
    let claimer = Arc::new(SimClaimer::new(chain.clone(), 20_000_000));
    let store = Arc::new(MemoryStore::new(ledger_config(&chain)));
    let h = harness(chain.clone(), vec![venue], claimer, store.clone());

    let state = Arc::new(ServerState {
        orchestrator: h.orchestrator,
        store: store.clone(),
        admin_token: Some(SecretString::new(TOKEN.into())),
    });
    (build_router(state, &[]), chain, store)
}

fn admin(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn json(resp: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_run_once_returns_cycle_result() {
    let (app, chain, store) = app();

    let resp = app.oneshot(admin("/admin/run-once", TOKEN)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json(resp).await;
    assert_eq!(body["ok"], true);
    assert!(body["result"]["claim"].is_string());
    assert_eq!(body["result"]["buy"]["tokensAcquired"]["raw"], 2_500_000);
    assert_eq!(body["result"]["burn"]["method"], "burn-checked");
    assert_eq!(chain.held(TokenProgram::Token2022), 0);
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_stats_reflect_completed_cycle() {
    let (app, _chain, _store) = app();

    let resp = app.clone().oneshot(admin("/admin/run-once", TOKEN)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::builder().uri("/public/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let stats = json(resp).await;
    assert_eq!(stats["config"]["network"], "devnet");
    assert_eq!(stats["totals"]["claims"], 1);
    assert_eq!(stats["totals"]["tokensBurned"], "2.5");
    let history = stats["history"].as_array().unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["type"], "burn");
    assert_eq!(history[2]["type"], "claim");
}

#[tokio::test]
async fn test_concurrent_triggers_skip() {
    let (app, _chain, store) = app();

    let (a, b) = tokio::join!(
        app.clone().oneshot(admin("/admin/run-once", TOKEN)),
        app.oneshot(admin("/admin/force-sync", TOKEN)),
    );
    let (a, b) = (json(a.unwrap()).await, json(b.unwrap()).await);

    assert_eq!(a["ok"], true);
    assert!(a["result"].is_object());
    assert_eq!(b, serde_json::json!({ "ok": true, "skipped": true }));
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_wrong_token_runs_nothing() {
    let (app, chain, store) = app();

    let resp = app.oneshot(admin("/admin/run-once", "guess")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(resp).await["error"], "Unauthorized");
    assert_eq!(chain.sol(), RESERVE);
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_disconnected_client_does_not_cancel_cycle() {
    let (app, chain, store) = app_with_swap_delay(Duration::from_millis(200));

    // The client gives up while the swap is still in flight.
    let request = app.oneshot(admin("/admin/run-once", TOKEN));
    assert!(tokio::time::timeout(Duration::from_millis(20), request).await.is_err());
    assert_eq!(store.saves(), 0);

    for _ in 0..100 {
        if store.saves() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(store.saves(), 1);
    assert_eq!(chain.held(TokenProgram::Token2022), 0);
    let ledger = store.load().await.unwrap();
    assert_eq!(ledger.totals.claims, 1);
    assert_eq!(ledger.history.len(), 3);
}
