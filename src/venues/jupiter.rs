//! Jupiter aggregator integration (venue A).
//!
//! API docs: https://station.jup.ag/docs/apis/swap-api
//! Flow: GET `/quote` for the full budget, then POST `/swap` with the quote
//! to receive a base64 `VersionedTransaction` which the operator signs.
//! Auth: none.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info};

use super::{SwapVenue, VenueFill};
use crate::chain::LedgerRpc;
use crate::types::FlywheelError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://quote-api.jup.ag/v6";
const VENUE_NAME: &str = "jupiter";

/// Error codes Jupiter uses when a pair simply has no route.
const NO_ROUTE_CODES: [&str; 3] = [
    "COULD_NOT_FIND_ANY_ROUTE",
    "NO_ROUTES_FOUND",
    "TOKEN_NOT_TRADABLE",
];

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    prioritization_fee_lamports: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct JupiterClient {
    http: Client,
    base_url: String,
    rpc: Arc<dyn LedgerRpc>,
    slippage_bps: u16,
    prioritization_fee_lamports: u64,
}

impl JupiterClient {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        base_url: Option<String>,
        slippage_bps: u16,
        prioritization_fee_lamports: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("FLYWHEEL/0.1.0")
            .build()
            .context("Failed to build HTTP client for Jupiter")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            rpc,
            slippage_bps,
            prioritization_fee_lamports,
        })
    }

    /// Request a quote. `Ok(None)` when Jupiter has no route.
    async fn quote(&self, mint: &Pubkey, amount_lamports: u64) -> Result<Option<Value>> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&onlyDirectRoutes=false",
            self.base_url,
            urlencoding::encode(&spl_token::native_mint::id().to_string()),
            urlencoding::encode(&mint.to_string()),
            amount_lamports,
            self.slippage_bps,
        );
        debug!(url = %url, "Requesting Jupiter quote");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Jupiter quote request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if is_no_route_error(&body) {
                return Ok(None);
            }
            return Err(venue_error(format!("quote HTTP {status}: {body}")));
        }

        let quote: Value = resp
            .json()
            .await
            .context("Failed to parse Jupiter quote response")?;

        Ok(has_route(&quote).then_some(quote))
    }

    /// Exchange a quote for the serialized swap transaction.
    async fn swap_transaction(&self, quote: &Value) -> Result<Vec<u8>> {
        let request = SwapRequest {
            quote_response: quote,
            user_public_key: self.rpc.operator().to_string(),
            wrap_and_unwrap_sol: true,
            prioritization_fee_lamports: self.prioritization_fee_lamports,
        };

        let resp = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Jupiter swap request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(venue_error(format!("swap HTTP {status}: {body}")));
        }

        let body: SwapResponse = resp
            .json()
            .await
            .context("Failed to parse Jupiter swap response")?;

        base64::engine::general_purpose::STANDARD
            .decode(body.swap_transaction.as_bytes())
            .map_err(|e| FlywheelError::Transaction(format!("Jupiter transaction is not base64: {e}")).into())
    }
}

#[async_trait]
impl SwapVenue for JupiterClient {
    fn name(&self) -> &str {
        VENUE_NAME
    }

    async fn quote_and_submit(&self, mint: &Pubkey, budget_lamports: u64) -> Result<Option<VenueFill>> {
        let Some(quote) = self.quote(mint, budget_lamports).await? else {
            return Ok(None);
        };
        let quoted_out = out_amount(&quote);

        let transaction = self.swap_transaction(&quote).await?;
        let signature = self.rpc.submit_serialized(transaction).await?;

        info!(
            %signature,
            amount_lamports = budget_lamports,
            quoted_out = ?quoted_out,
            "Jupiter swap submitted"
        );

        Ok(Some(VenueFill {
            signature,
            spent_lamports: budget_lamports,
            quoted_out,
        }))
    }
}

fn venue_error(message: String) -> anyhow::Error {
    FlywheelError::Venue {
        venue: VENUE_NAME.to_string(),
        message,
    }
    .into()
}

/// A quote is routable when it has a non-empty route plan and a positive
/// output.
fn has_route(quote: &Value) -> bool {
    let planned = quote
        .get("routePlan")
        .and_then(Value::as_array)
        .is_some_and(|plan| !plan.is_empty());
    planned && out_amount(quote).is_some_and(|out| out > 0)
}

/// `outAmount` is a decimal string in raw output units.
fn out_amount(quote: &Value) -> Option<u64> {
    quote.get("outAmount")?.as_str()?.parse().ok()
}

fn is_no_route_error(body: &str) -> bool {
    NO_ROUTE_CODES.iter().any(|code| body.contains(code))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
