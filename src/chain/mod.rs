//! Ledger-network access.
//!
//! Defines the `LedgerRpc` trait the engine talks to and the Solana
//! JSON-RPC implementation of it. Everything that reads chain state or
//! signs and submits a transaction goes through this seam.

pub mod rpc;

pub use rpc::SolanaRpc;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::types::TokenAmount;

/// Where a submitted transaction stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not seen yet, or seen below confirmed commitment.
    Pending,
    Confirmed,
    /// Landed with an error. It will never succeed.
    Failed(String),
}

/// Abstraction over the chain client and the operator's signer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Public key of the signing operator.
    fn operator(&self) -> Pubkey;

    /// Operator SOL balance in lamports.
    async fn sol_balance(&self) -> Result<u64>;

    /// Balance of a token account. `Ok(None)` when the account does not exist.
    async fn token_balance(&self, account: &Pubkey) -> Result<Option<TokenAmount>>;

    /// Status of a submitted signature at confirmed commitment.
    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus>;

    /// Build a transaction from `instructions`, sign it as the operator
    /// (fee payer), and submit it.
    async fn submit_instructions(&self, instructions: Vec<Instruction>) -> Result<Signature>;

    /// Sign and submit a serialized transaction built by an external venue.
    async fn submit_serialized(&self, transaction: Vec<u8>) -> Result<Signature>;
}
