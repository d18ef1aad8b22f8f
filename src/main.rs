//! FLYWHEEL — creator-fee buyback and burn agent for a Solana token.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! seeds the ledger, starts the HTTP server and runs the periodic
//! claim→buy→burn cycle with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use flywheel::chain::{LedgerRpc, SolanaRpc};
use flywheel::config::AppConfig;
use flywheel::engine::burn::{burn_methods, BurnExecutor};
use flywheel::engine::settle::{Pause, TokioPause};
use flywheel::engine::swap::{SwapExecutor, SwapSettings};
use flywheel::engine::{CycleOrchestrator, CycleOutcome};
use flywheel::server::{self, ServerState};
use flywheel::storage::{JsonLedgerStore, LedgerStore};
use flywheel::types::{lamports_to_sol, LedgerConfig};
use flywheel::venues::jupiter::JupiterClient;
use flywheel::venues::pumpportal::PumpPortalClient;
use flywheel::venues::{venue_order, FeeClaimer, SwapVenue};

const BANNER: &str = r#"
  _____ _  __   ___        ___   _ _____ _____ _
 |  ___| | \ \ / \ \      / / | | | ____| ____| |
 | |_  | |  \ V / \ \ /\ / /| |_| |  _| |  _| | |
 |  _| | |___| |   \ V  V / |  _  | |___| |___| |___
 |_|   |_____|_|    \_/\_/  |_| |_|_____|_____|_____|

  Creator fees in, tokens out of circulation
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("FLYWHEEL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        network = %cfg.network(),
        mint = %cfg.network.mint,
        provider = %cfg.swap.provider,
        cycle_interval_secs = cfg.agent.cycle_interval_secs,
        "FLYWHEEL starting up"
    );

    // -- Initialise components -------------------------------------------

    let mint = cfg.mint_pubkey()?;
    let network = cfg.network();
    let secret = cfg.signer_secret()?;
    let rpc: Arc<dyn LedgerRpc> = Arc::new(SolanaRpc::new(&cfg.network.rpc_url, &secret)?);
    let operator = rpc.operator();
    info!(%operator, "Operator wallet loaded");

    let store = Arc::new(JsonLedgerStore::new(
        &cfg.agent.ledger_path,
        LedgerConfig {
            mint: mint.to_string(),
            operator: operator.to_string(),
            network,
        },
    ));
    let ledger = store.init().await.context("Failed to initialise ledger")?;
    info!(
        path = %cfg.agent.ledger_path,
        claims = ledger.totals.claims,
        burned = %ledger.totals.tokens_burned,
        "Ledger ready"
    );

    let pause: Arc<dyn Pause> = Arc::new(TokioPause);

    let jupiter: Arc<dyn SwapVenue> = Arc::new(JupiterClient::new(
        rpc.clone(),
        cfg.swap.jupiter_base_url.clone(),
        cfg.swap.slippage_bps,
        cfg.swap.prioritization_fee_lamports,
    )?);
    let pump = Arc::new(PumpPortalClient::new(rpc.clone(), cfg.swap.pump_url.clone(), cfg.pump_settings())?);
    let claimer: Arc<dyn FeeClaimer> = pump.clone();
    let venues = venue_order(cfg.swap.provider, jupiter, pump);

    let swap = SwapExecutor::new(
        rpc.clone(),
        venues,
        pause.clone(),
        mint,
        SwapSettings {
            min_spend_lamports: cfg.min_swap_lamports(),
            confirm: cfg.confirm_policy(),
            settle_reads: cfg.read_policy(),
        },
    );
    let burn = BurnExecutor::new(
        rpc.clone(),
        burn_methods(cfg.burn.strategy, rpc.clone(), cfg.burn.priority_fee_micro_lamports),
        pause,
        mint,
        cfg.burn_settle_delay(),
    );

    let ledger_store: Arc<dyn LedgerStore> = store;
    let orchestrator = Arc::new(CycleOrchestrator::new(
        ledger_store.clone(),
        claimer,
        rpc,
        swap,
        burn,
        cfg.reserve_lamports(),
        network,
    ));
    info!(
        reserve_sol = %lamports_to_sol(cfg.reserve_lamports()),
        min_swap_sol = %lamports_to_sol(cfg.min_swap_lamports()),
        burn_strategy = ?cfg.burn.strategy,
        "Cycle orchestrator ready"
    );

    // -- HTTP server -----------------------------------------------------

    if cfg.server.enabled {
        let admin_token = cfg.admin_token();
        if admin_token.is_none() {
            warn!(env = %cfg.server.admin_token_env, "No admin token set, admin endpoints are locked");
        }
        let state = Arc::new(ServerState {
            orchestrator: orchestrator.clone(),
            store: ledger_store,
            admin_token,
        });
        let _server = server::spawn_server(state, cfg.server.port, &cfg.server.allowed_origins).await?;
    }

    // -- Scheduler -------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if !cfg.agent.scheduler_enabled {
        info!("Scheduler disabled, serving admin triggers only. Press Ctrl+C to stop.");
        shutdown.await.context("Failed to listen for shutdown signal")?;
        info!("FLYWHEEL shut down cleanly.");
        return Ok(());
    }

    let period = cfg.cycle_interval();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = cfg.agent.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match orchestrator.run_cycle().await {
                    Ok(CycleOutcome::Completed(result)) => info!(
                        claimed = result.claim.is_some(),
                        bought = result.buy.is_some(),
                        burned = result.burn.is_some(),
                        "Scheduled cycle finished"
                    ),
                    Ok(CycleOutcome::Skipped) => debug!("Scheduled cycle skipped, previous still running"),
                    Err(e) => error!(error = %e, "Cycle failed — continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("FLYWHEEL shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flywheel=info,tower_http=info"));

    let json_logging = std::env::var("FLYWHEEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
