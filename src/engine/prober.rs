//! Balance prober.
//!
//! Finds which token program actually holds the operator's balance of the
//! mint. Reads only; a failed or missing read counts as a zero balance.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::debug;

use crate::chain::LedgerRpc;
use crate::types::{Holding, TokenAmount, TokenProgram};

#[derive(Clone)]
pub struct BalanceProber {
    rpc: Arc<dyn LedgerRpc>,
}

impl BalanceProber {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Read the associated token account under every known program.
    ///
    /// Always returns one candidate per program. Missing accounts and read
    /// errors both yield a zero amount.
    pub async fn survey(&self, mint: &Pubkey, owner: &Pubkey) -> Vec<Holding> {
        let mut candidates = Vec::with_capacity(TokenProgram::ALL.len());
        for program in TokenProgram::ALL {
            let account = program.associated_account(mint, owner);
            let amount = match self.rpc.token_balance(&account).await {
                Ok(Some(amount)) => amount,
                Ok(None) => TokenAmount::default(),
                Err(e) => {
                    debug!(%program, %account, error = %e, "Token balance read failed, treating as empty");
                    TokenAmount::default()
                }
            };
            candidates.push(Holding {
                program,
                mint: *mint,
                account,
                amount,
            });
        }
        candidates
    }

    /// The holding to act on, if any program holds a positive balance.
    pub async fn probe(&self, mint: &Pubkey, owner: &Pubkey) -> Option<Holding> {
        select(self.survey(mint, owner).await)
    }

    /// Total held across all programs. Decimals come from whichever
    /// account reported them.
    pub async fn held_total(&self, mint: &Pubkey, owner: &Pubkey) -> TokenAmount {
        total(&self.survey(mint, owner).await)
    }
}

/// Pick the candidate with a positive balance; on a tie prefer the newer
/// program.
pub fn select(candidates: Vec<Holding>) -> Option<Holding> {
    candidates
        .into_iter()
        .filter(|h| h.amount.is_positive())
        .max_by_key(|h| h.program.generation())
}

fn total(candidates: &[Holding]) -> TokenAmount {
    let raw = candidates
        .iter()
        .fold(0u64, |acc, h| acc.saturating_add(h.amount.raw));
    let decimals = candidates
        .iter()
        .map(|h| h.amount.decimals)
        .find(|d| *d > 0)
        .unwrap_or(0);
    TokenAmount::new(raw, decimals)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
