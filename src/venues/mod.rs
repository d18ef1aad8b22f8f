//! Swap venue and fee-claim integrations.
//!
//! Defines the `SwapVenue` and `FeeClaimer` traits and provides
//! implementations for:
//! - Jupiter: quote-based routing aggregator (venue A)
//! - PumpPortal: local-transaction builder for the launch platform
//!   (venue B), which also builds the creator-fee claim

pub mod jupiter;
pub mod pumpportal;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;
use std::sync::Arc;

/// A swap a venue submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueFill {
    pub signature: Signature,
    /// Lamports the venue was asked to spend.
    pub spent_lamports: u64,
    /// Venue's estimated output in raw units, when it gives one.
    pub quoted_out: Option<u64>,
}

/// Abstraction over swap venues.
///
/// `Ok(None)` means the venue has no route (or the amount is below what it
/// will trade) and nothing was submitted. `Err` is a provider or network
/// failure; callers fall back to the next venue either way.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapVenue: Send + Sync {
    /// Venue name for logging and the ledger.
    fn name(&self) -> &str;

    /// Quote a SOL → `mint` swap for `budget_lamports` and, if routable,
    /// build, sign and submit it.
    async fn quote_and_submit(&self, mint: &Pubkey, budget_lamports: u64) -> Result<Option<VenueFill>>;
}

/// Claims accrued creator fees. One call, no retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeClaimer: Send + Sync {
    /// Submit a claim. `Ok(None)` when there was nothing to submit.
    async fn claim(&self) -> Result<Option<Signature>>;
}

/// Which venues the swap executor may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapProvider {
    /// Jupiter first, PumpPortal when Jupiter has no route or fails.
    #[default]
    Auto,
    Jupiter,
    Pump,
}

impl fmt::Display for SwapProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapProvider::Auto => write!(f, "auto"),
            SwapProvider::Jupiter => write!(f, "jupiter"),
            SwapProvider::Pump => write!(f, "pump"),
        }
    }
}

/// Eligible venues, in the order they are attempted.
pub fn venue_order(
    provider: SwapProvider,
    aggregator: Arc<dyn SwapVenue>,
    launchpad: Arc<dyn SwapVenue>,
) -> Vec<Arc<dyn SwapVenue>> {
    match provider {
        SwapProvider::Auto => vec![aggregator, launchpad],
        SwapProvider::Jupiter => vec![aggregator],
        SwapProvider::Pump => vec![launchpad],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
