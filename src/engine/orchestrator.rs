//! Cycle orchestrator.
//!
//! Runs claim → buy → burn in sequence behind a single-flight latch,
//! reconciles the results into the ledger and persists it. A step that
//! comes up empty never stops the steps after it: an unburned balance
//! from an earlier cycle still gets burned when this cycle's buy fails.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::accountant::Accountant;
use super::burn::BurnExecutor;
use super::swap::SwapExecutor;
use crate::chain::LedgerRpc;
use crate::storage::LedgerStore;
use crate::types::{lamports_to_sol, CycleResult, Network};
use crate::venues::FeeClaimer;

/// Outcome of a trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleResult),
    /// Another cycle was already in flight.
    Skipped,
}

/// Clears the in-flight latch when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CycleOrchestrator {
    store: Arc<dyn LedgerStore>,
    claimer: Arc<dyn FeeClaimer>,
    rpc: Arc<dyn LedgerRpc>,
    swap: SwapExecutor,
    burn: BurnExecutor,
    /// Lamports that are never spent.
    reserve_lamports: u64,
    network: Network,
    in_flight: AtomicBool,
}

impl CycleOrchestrator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        claimer: Arc<dyn FeeClaimer>,
        rpc: Arc<dyn LedgerRpc>,
        swap: SwapExecutor,
        burn: BurnExecutor,
        reserve_lamports: u64,
        network: Network,
    ) -> Self {
        Self {
            store,
            claimer,
            rpc,
            swap,
            burn,
            reserve_lamports,
            network,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a cycle or sync is currently running.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.in_flight))
    }

    /// Run one claim → buy → burn cycle.
    ///
    /// Returns `Skipped` at once if a cycle is already running. Errors only
    /// when the ledger cannot be loaded or saved; per-step failures show up
    /// as empty fields of the result.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(_guard) = self.try_begin() else {
            info!("Cycle already in flight, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let cycle_id = Uuid::new_v4();
        async {
            info!("Starting cycle");
            let mut ledger = self.store.load().await.context("Failed to load ledger")?;

            let claim = self.claim().await;
            let buy = match self.spendable_budget().await {
                Some(budget) => self.swap.buy(budget).await,
                None => None,
            };
            let burn = self.burn.burn().await;

            let result = CycleResult { claim, buy, burn };
            Accountant::reconcile(&mut ledger, &result, self.network);
            self.store.save(&ledger).await.context("Failed to persist ledger")?;

            info!(
                claimed = result.claim.is_some(),
                bought = result.buy.is_some(),
                burned = result.burn.is_some(),
                "Cycle complete"
            );
            Ok(CycleOutcome::Completed(result))
        }
        .instrument(tracing::info_span!("cycle", %cycle_id))
        .await
    }

    /// Burn whatever is currently held without claiming or buying. Catches
    /// up after an interrupted cycle without spending again.
    pub async fn force_sync(&self) -> Result<CycleOutcome> {
        let Some(_guard) = self.try_begin() else {
            info!("Cycle already in flight, skipping sync");
            return Ok(CycleOutcome::Skipped);
        };

        let sync_id = Uuid::new_v4();
        async {
            info!("Starting sync");
            let mut ledger = self.store.load().await.context("Failed to load ledger")?;

            let result = CycleResult {
                claim: None,
                buy: None,
                burn: self.burn.burn().await,
            };
            Accountant::reconcile(&mut ledger, &result, self.network);
            self.store.save(&ledger).await.context("Failed to persist ledger")?;

            Ok(CycleOutcome::Completed(result))
        }
        .instrument(tracing::info_span!("sync", %sync_id))
        .await
    }

    async fn claim(&self) -> Option<String> {
        match self.claimer.claim().await {
            Ok(Some(signature)) => Some(signature.to_string()),
            Ok(None) => {
                info!("Nothing to claim");
                None
            }
            Err(e) => {
                warn!(error = %e, "Fee claim failed, continuing");
                None
            }
        }
    }

    /// Operator balance minus the reserve. `None` if the balance can't be read.
    async fn spendable_budget(&self) -> Option<u64> {
        match self.rpc.sol_balance().await {
            Ok(balance) => {
                let budget = balance.saturating_sub(self.reserve_lamports);
                info!(
                    balance_sol = %lamports_to_sol(balance),
                    reserve_sol = %lamports_to_sol(self.reserve_lamports),
                    budget_sol = %lamports_to_sol(budget),
                    "Spendable budget"
                );
                Some(budget)
            }
            Err(e) => {
                warn!(error = %e, "Could not read SOL balance, skipping buy");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
