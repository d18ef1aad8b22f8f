//! Shared types for the flywheel.
//!
//! The ledger document, the per-step results of a cycle, and the token
//! program variants an asset balance can live under. Engine, venue and
//! server modules all depend on these without depending on each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

/// Maximum number of events kept in the ledger history.
pub const HISTORY_LIMIT: usize = 200;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Convert lamports to SOL, exactly.
pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(lamports as i128, 9)
}

/// Convert a configured SOL amount to lamports. Non-finite or
/// non-positive values map to zero.
pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// A raw token quantity together with its mint's decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: u64, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self { raw: 0, decimals }
    }

    pub fn is_positive(&self) -> bool {
        self.raw > 0
    }

    /// UI quantity: `raw / 10^decimals`.
    pub fn ui(&self) -> Decimal {
        // Scales above 28 are not representable; no real mint uses them.
        Decimal::try_from_i128_with_scale(self.raw as i128, u32::from(self.decimals))
            .unwrap_or_default()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} raw)", self.ui(), self.raw)
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Devnet,
}

impl Network {
    /// Infer the cluster from an RPC endpoint URL.
    pub fn from_rpc_url(url: &str) -> Self {
        if url.contains("devnet") {
            Network::Devnet
        } else {
            Network::Mainnet
        }
    }

    /// Public explorer link for a transaction signature.
    pub fn explorer_link(&self, signature: &str) -> String {
        match self {
            Network::Mainnet => format!("https://solscan.io/tx/{signature}"),
            Network::Devnet => format!("https://solscan.io/tx/{signature}?cluster=devnet"),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Devnet => write!(f, "devnet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Token programs
// ---------------------------------------------------------------------------

/// The mutually exclusive token programs a balance of the mint can be
/// held under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenProgram {
    /// The original SPL Token program.
    Legacy,
    /// Token-2022 (token extensions).
    Token2022,
}

impl TokenProgram {
    pub const ALL: [TokenProgram; 2] = [TokenProgram::Legacy, TokenProgram::Token2022];

    pub fn program_id(&self) -> Pubkey {
        match self {
            TokenProgram::Legacy => spl_token::id(),
            TokenProgram::Token2022 => spl_token_2022::id(),
        }
    }

    /// Associated token account of `owner` for `mint` under this program.
    pub fn associated_account(&self, mint: &Pubkey, owner: &Pubkey) -> Pubkey {
        spl_associated_token_account::get_associated_token_address_with_program_id(
            owner,
            mint,
            &self.program_id(),
        )
    }

    /// Higher is newer. Breaks ties when both programs hold a balance.
    pub fn generation(&self) -> u8 {
        match self {
            TokenProgram::Legacy => 0,
            TokenProgram::Token2022 => 1,
        }
    }
}

impl fmt::Display for TokenProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenProgram::Legacy => write!(f, "spl-token"),
            TokenProgram::Token2022 => write!(f, "token-2022"),
        }
    }
}

/// A balance of the mint observed in one token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    pub program: TokenProgram,
    pub mint: Pubkey,
    pub account: Pubkey,
    pub amount: TokenAmount,
}

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// Outcome of waiting for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    Confirmed,
    /// Not observed as confirmed within the retry budget. The transaction
    /// may still land.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyResult {
    pub signature: String,
    pub venue: String,
    pub sol_spent: Decimal,
    /// Measured on chain: `max(0, after - before)`.
    pub tokens_acquired: TokenAmount,
    /// The venue's own estimate, when it gave one.
    pub quoted_out: Option<u64>,
    pub confirmation: Confirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnResult {
    pub signature: String,
    pub method: String,
    pub program: TokenProgram,
    pub burned: TokenAmount,
}

impl BurnResult {
    pub fn burned_raw(&self) -> u64 {
        self.burned.raw
    }

    pub fn burned_ui(&self) -> Decimal {
        self.burned.ui()
    }
}

/// Result of one claim→buy→burn cycle. Each step is independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub claim: Option<String>,
    pub buy: Option<BuyResult>,
    pub burn: Option<BurnResult>,
}

// ---------------------------------------------------------------------------
// Ledger document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub mint: String,
    pub operator: String,
    pub network: Network,
}

/// Running sums. Amounts are written as decimal strings so they stay exact
/// however large they grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub claims: u64,
    #[serde(with = "exact_decimal")]
    pub sol_spent: Decimal,
    #[serde(with = "exact_decimal")]
    pub tokens_bought: Decimal,
    #[serde(with = "exact_decimal")]
    pub tokens_burned: Decimal,
}

/// Decimal as a JSON string. Ledgers that stored plain numbers still load.
mod exact_decimal {
    use rust_decimal::Decimal;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Text(String),
        Number(f64),
    }

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::str::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        match Stored::deserialize(deserializer)? {
            Stored::Text(text) => Decimal::from_str(&text).map_err(de::Error::custom),
            Stored::Number(number) => Decimal::try_from(number).map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Claim,
    Buy,
    Burn,
}

/// One recorded on-chain action. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub signature: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_in_sol: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_out: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_tokens: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burned_raw: Option<u64>,
}

impl Event {
    fn bare(kind: EventKind, signature: &str, network: Network) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            signature: signature.to_string(),
            link: network.explorer_link(signature),
            venue: None,
            amount_in_sol: None,
            tokens_out: None,
            quoted_out: None,
            method: None,
            amount_tokens: None,
            burned_raw: None,
        }
    }

    pub fn claim(signature: &str, network: Network) -> Self {
        Self::bare(EventKind::Claim, signature, network)
    }

    pub fn buy(buy: &BuyResult, network: Network) -> Self {
        Self {
            venue: Some(buy.venue.clone()),
            amount_in_sol: Some(buy.sol_spent),
            tokens_out: Some(buy.tokens_acquired.ui()),
            quoted_out: buy.quoted_out,
            ..Self::bare(EventKind::Buy, &buy.signature, network)
        }
    }

    pub fn burn(burn: &BurnResult, network: Network) -> Self {
        Self {
            method: Some(burn.method.clone()),
            amount_tokens: Some(burn.burned_ui()),
            burned_raw: Some(burn.burned_raw()),
            ..Self::bare(EventKind::Burn, &burn.signature, network)
        }
    }
}

/// The persisted document: config snapshot, running totals, and recent
/// history (newest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub config: LedgerConfig,
    #[serde(default)]
    pub totals: Totals,
    #[serde(default)]
    pub history: Vec<Event>,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            totals: Totals::default(),
            history: Vec::new(),
        }
    }

    /// Record an event as the newest entry.
    pub fn prepend(&mut self, event: Event) {
        self.history.insert(0, event);
    }

    /// Drop everything beyond the most recent [`HISTORY_LIMIT`] events.
    pub fn truncate_history(&mut self) {
        self.history.truncate(HISTORY_LIMIT);
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the flywheel.
#[derive(Debug, thiserror::Error)]
pub enum FlywheelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing secret: environment variable {0} is not set")]
    MissingSecret(String),

    #[error("Venue error ({venue}): {message}")]
    Venue { venue: String, message: String },

    #[error("Transaction error: {0}")]
    Transaction(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
