//! Swap executor.
//!
//! Spends a SOL budget on the target token through the first venue that
//! produces a swap, then measures what actually arrived on chain.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::prober::BalanceProber;
use super::settle::{poll_until, Pause, RetryPolicy};
use crate::chain::{LedgerRpc, SignatureStatus};
use crate::types::{lamports_to_sol, BuyResult, Confirmation, TokenAmount};
use crate::venues::SwapVenue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSettings {
    /// Budgets below this are not worth a swap.
    pub min_spend_lamports: u64,
    /// Waiting for the swap signature to confirm.
    pub confirm: RetryPolicy,
    /// Re-reading the token balance until the swap output shows up.
    pub settle_reads: RetryPolicy,
}

pub struct SwapExecutor {
    rpc: Arc<dyn LedgerRpc>,
    prober: BalanceProber,
    venues: Vec<Arc<dyn SwapVenue>>,
    pause: Arc<dyn Pause>,
    mint: Pubkey,
    settings: SwapSettings,
}

impl SwapExecutor {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        venues: Vec<Arc<dyn SwapVenue>>,
        pause: Arc<dyn Pause>,
        mint: Pubkey,
        settings: SwapSettings,
    ) -> Self {
        Self {
            prober: BalanceProber::new(rpc.clone()),
            rpc,
            venues,
            pause,
            mint,
            settings,
        }
    }

    /// Buy the target token with `budget_lamports` (already net of the
    /// reserve).
    ///
    /// Returns `None` when the budget is below the minimum, when no venue
    /// has a route, or when every venue fails. None of these are errors.
    pub async fn buy(&self, budget_lamports: u64) -> Option<BuyResult> {
        if budget_lamports < self.settings.min_spend_lamports {
            info!(
                budget_sol = %lamports_to_sol(budget_lamports),
                min_sol = %lamports_to_sol(self.settings.min_spend_lamports),
                "Not enough SOL to swap"
            );
            return None;
        }

        let owner = self.rpc.operator();
        let before = self.prober.held_total(&self.mint, &owner).await;
        debug!(before = %before, "Token balance before swap");

        for venue in &self.venues {
            let fill = match venue.quote_and_submit(&self.mint, budget_lamports).await {
                Ok(Some(fill)) => fill,
                Ok(None) => {
                    info!(venue = venue.name(), "No route, trying next venue");
                    continue;
                }
                Err(e) => {
                    warn!(venue = venue.name(), error = %e, "Venue attempt failed, trying next venue");
                    continue;
                }
            };

            let confirmation = match self.await_confirmation(&fill.signature).await {
                Ok(confirmation) => confirmation,
                Err(reason) => {
                    warn!(
                        venue = venue.name(),
                        signature = %fill.signature,
                        reason = %reason,
                        "Swap failed on chain, trying next venue"
                    );
                    continue;
                }
            };
            let acquired = self.measure_acquired(&owner, before).await;

            info!(
                venue = venue.name(),
                signature = %fill.signature,
                sol_spent = %lamports_to_sol(fill.spent_lamports),
                acquired = %acquired,
                quoted_out = ?fill.quoted_out,
                confirmation = ?confirmation,
                "Buy complete"
            );

            return Some(BuyResult {
                signature: fill.signature.to_string(),
                venue: venue.name().to_string(),
                sol_spent: lamports_to_sol(fill.spent_lamports),
                tokens_acquired: acquired,
                quoted_out: fill.quoted_out,
                confirmation,
            });
        }

        info!(venues = self.venues.len(), "No venue produced a swap this cycle");
        None
    }

    /// Poll the swap signature. `Err` carries the on-chain failure reason;
    /// a signature still pending after the budget is `Unknown`.
    async fn await_confirmation(&self, signature: &Signature) -> Result<Confirmation, String> {
        let rpc = &self.rpc;
        let signature = *signature;
        let settled = poll_until(self.pause.as_ref(), self.settings.confirm, |attempt| async move {
            match rpc.signature_status(&signature).await {
                Ok(SignatureStatus::Confirmed) => Some(Ok(())),
                Ok(SignatureStatus::Failed(reason)) => Some(Err(reason)),
                Ok(SignatureStatus::Pending) => None,
                Err(e) => {
                    debug!(%signature, attempt, error = %e, "Confirmation check failed");
                    None
                }
            }
        })
        .await;

        match settled {
            Some(Ok(())) => Ok(Confirmation::Confirmed),
            Some(Err(reason)) => Err(reason),
            None => {
                warn!(%signature, "Swap not confirmed within retry budget, measuring anyway");
                Ok(Confirmation::Unknown)
            }
        }
    }

    /// `max(0, after - before)`, re-reading until the balance rises or the
    /// read budget runs out.
    async fn measure_acquired(&self, owner: &Pubkey, before: TokenAmount) -> TokenAmount {
        let prober = &self.prober;
        let mint = self.mint;
        let owner = *owner;
        let risen = poll_until(self.pause.as_ref(), self.settings.settle_reads, |attempt| async move {
            let after = prober.held_total(&mint, &owner).await;
            debug!(attempt, after = %after, "Token balance after swap");
            (after.raw > before.raw).then(|| TokenAmount::new(after.raw - before.raw, after.decimals))
        })
        .await;

        risen.unwrap_or_else(|| {
            warn!("Token balance did not rise after swap, recording zero acquired");
            TokenAmount::zero(before.decimals)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
