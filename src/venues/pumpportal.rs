//! PumpPortal local-transaction integration (venue B and fee claimer).
//!
//! API docs: https://pumpportal.fun/local-trading-api/trading-api
//! POST `/api/trade-local` returns a serialized `VersionedTransaction`
//! (raw bytes) for the operator to sign. The same endpoint builds buys
//! (`action = "buy"`) and creator-fee claims (`action = "collectCreatorFee"`).
//! Auth: none; the transaction is only valid once signed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use tracing::info;

use super::{FeeClaimer, SwapVenue, VenueFill};
use crate::chain::LedgerRpc;
use crate::types::{lamports_to_sol, FlywheelError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_TRADE_LOCAL_URL: &str = "https://pumpportal.fun/api/trade-local";
const VENUE_NAME: &str = "pumpportal";
const POOL: &str = "pump";

/// Amounts are sent as SOL with six decimals.
const AMOUNT_STEP_LAMPORTS: u64 = 1_000;

/// Spend limits for PumpPortal buys, in lamports.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpSettings {
    /// Smallest buy worth submitting.
    pub floor_lamports: u64,
    /// Optional upper bound on a single buy.
    pub cap_lamports: Option<u64>,
    /// Held back from the budget to pay transaction fees.
    pub buffer_lamports: u64,
    /// Slippage tolerance, percent.
    pub slippage_pct: f64,
    /// Priority fee, SOL.
    pub priority_fee_sol: f64,
}

/// Amount to spend out of `budget`: capped, minus the fee buffer, rounded
/// down to the amount step. `None` when the result falls below the floor.
pub fn spend_amount(budget: u64, settings: &PumpSettings) -> Option<u64> {
    let capped = match settings.cap_lamports {
        Some(cap) if cap > 0 => budget.min(cap),
        _ => budget,
    };
    let amount = capped.saturating_sub(settings.buffer_lamports) / AMOUNT_STEP_LAMPORTS * AMOUNT_STEP_LAMPORTS;
    (amount > 0 && amount >= settings.floor_lamports).then_some(amount)
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeLocalRequest {
    public_key: String,
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denominated_in_sol: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slippage: Option<f64>,
    priority_fee: f64,
    pool: &'static str,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PumpPortalClient {
    http: Client,
    url: String,
    rpc: Arc<dyn LedgerRpc>,
    settings: PumpSettings,
}

impl PumpPortalClient {
    pub fn new(rpc: Arc<dyn LedgerRpc>, url: Option<String>, settings: PumpSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("FLYWHEEL/0.1.0")
            .build()
            .context("Failed to build HTTP client for PumpPortal")?;

        Ok(Self {
            http,
            url: url.unwrap_or_else(|| DEFAULT_TRADE_LOCAL_URL.to_string()),
            rpc,
            settings,
        })
    }

    fn buy_request(&self, mint: &Pubkey, amount_lamports: u64) -> TradeLocalRequest {
        TradeLocalRequest {
            public_key: self.rpc.operator().to_string(),
            action: "buy",
            mint: Some(mint.to_string()),
            amount: Some(format!("{:.6}", lamports_to_sol(amount_lamports))),
            denominated_in_sol: Some(true),
            slippage: Some(self.settings.slippage_pct),
            priority_fee: self.settings.priority_fee_sol,
            pool: POOL,
        }
    }

    fn claim_request(&self) -> TradeLocalRequest {
        TradeLocalRequest {
            public_key: self.rpc.operator().to_string(),
            action: "collectCreatorFee",
            mint: None,
            amount: None,
            denominated_in_sol: None,
            slippage: None,
            priority_fee: self.settings.priority_fee_sol,
            pool: POOL,
        }
    }

    /// Ask PumpPortal to build a transaction and return its bytes.
    async fn trade_local(&self, request: &TradeLocalRequest) -> Result<Vec<u8>> {
        let resp = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .context("PumpPortal trade-local request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FlywheelError::Venue {
                venue: VENUE_NAME.to_string(),
                message: format!("{} HTTP {status}: {body}", request.action),
            }
            .into());
        }

        let bytes = resp
            .bytes()
            .await
            .context("Failed to read PumpPortal transaction bytes")?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SwapVenue for PumpPortalClient {
    fn name(&self) -> &str {
        VENUE_NAME
    }

    async fn quote_and_submit(&self, mint: &Pubkey, budget_lamports: u64) -> Result<Option<VenueFill>> {
        let Some(amount) = spend_amount(budget_lamports, &self.settings) else {
            info!(
                budget_sol = %lamports_to_sol(budget_lamports),
                floor_sol = %lamports_to_sol(self.settings.floor_lamports),
                "Budget below PumpPortal floor after cap and fee buffer, skipping"
            );
            return Ok(None);
        };

        let transaction = self.trade_local(&self.buy_request(mint, amount)).await?;
        let signature = self.rpc.submit_serialized(transaction).await?;

        info!(%signature, amount_sol = %lamports_to_sol(amount), "PumpPortal buy submitted");

        Ok(Some(VenueFill {
            signature,
            spent_lamports: amount,
            quoted_out: None,
        }))
    }
}

#[async_trait]
impl FeeClaimer for PumpPortalClient {
    async fn claim(&self) -> Result<Option<Signature>> {
        let transaction = self.trade_local(&self.claim_request()).await?;
        let signature = self.rpc.submit_serialized(transaction).await?;
        info!(%signature, "Creator fee claim submitted");
        Ok(Some(signature))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
