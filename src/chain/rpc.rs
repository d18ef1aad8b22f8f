//! Solana JSON-RPC implementation of [`LedgerRpc`].
//!
//! Wraps the nonblocking `RpcClient` at confirmed commitment and the
//! operator `Keypair`, decoded from a base58 secret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use tracing::debug;

use super::{LedgerRpc, SignatureStatus};
use crate::types::{FlywheelError, TokenAmount};

/// Node-side resubmission attempts for each sent transaction.
const SEND_MAX_RETRIES: usize = 3;

pub struct SolanaRpc {
    client: RpcClient,
    signer: Keypair,
}

impl SolanaRpc {
    /// Create a client for `url`, signing with the base58-encoded keypair
    /// in `secret`.
    pub fn new(url: &str, secret: &SecretString) -> Result<Self> {
        let signer = decode_keypair(secret)?;
        let client = RpcClient::new_with_commitment(url.to_string(), CommitmentConfig::confirmed());
        Ok(Self { client, signer })
    }

    fn send_config(&self) -> RpcSendTransactionConfig {
        RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.client.commitment().commitment),
            max_retries: Some(SEND_MAX_RETRIES),
            ..RpcSendTransactionConfig::default()
        }
    }
}

/// Decode a base58 secret key (64 bytes) into a keypair.
pub fn decode_keypair(secret: &SecretString) -> Result<Keypair> {
    let bytes = bs58::decode(secret.expose_secret().trim())
        .into_vec()
        .map_err(|e| FlywheelError::Config(format!("signer secret is not valid base58: {e}")))?;
    let keypair = Keypair::from_bytes(&bytes)
        .map_err(|e| FlywheelError::Config(format!("signer secret is not a valid keypair: {e}")))?;
    Ok(keypair)
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    fn operator(&self) -> Pubkey {
        self.signer.pubkey()
    }

    async fn sol_balance(&self) -> Result<u64> {
        self.client
            .get_balance(&self.signer.pubkey())
            .await
            .context("Failed to read operator SOL balance")
    }

    async fn token_balance(&self, account: &Pubkey) -> Result<Option<TokenAmount>> {
        let exists = self
            .client
            .get_account_with_commitment(account, self.client.commitment())
            .await
            .with_context(|| format!("Failed to read account {account}"))?
            .value
            .is_some();
        if !exists {
            return Ok(None);
        }

        let balance = self
            .client
            .get_token_account_balance(account)
            .await
            .with_context(|| format!("Failed to read token balance of {account}"))?;
        let raw = balance
            .amount
            .parse::<u64>()
            .with_context(|| format!("Unparseable token amount {:?}", balance.amount))?;

        Ok(Some(TokenAmount::new(raw, balance.decimals)))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .context("Failed to read signature status")?;

        let Some(status) = statuses.value.into_iter().next().flatten() else {
            return Ok(SignatureStatus::Pending);
        };
        if let Some(err) = status.err {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Pending)
        }
    }

    async fn submit_instructions(&self, instructions: Vec<Instruction>) -> Result<Signature> {
        let blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .context("Failed to fetch recent blockhash")?;
        let payer = self.signer.pubkey();
        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&payer),
            &[&self.signer],
            blockhash,
        );

        let signature = self
            .client
            .send_transaction_with_config(&tx, self.send_config())
            .await
            .context("Failed to send transaction")?;
        debug!(%signature, instructions = instructions.len(), "Transaction submitted");
        Ok(signature)
    }

    async fn submit_serialized(&self, transaction: Vec<u8>) -> Result<Signature> {
        let unsigned: VersionedTransaction = bincode::deserialize(&transaction)
            .map_err(|e| FlywheelError::Transaction(format!("undecodable transaction: {e}")))?;
        let tx = VersionedTransaction::try_new(unsigned.message, &[&self.signer])
            .map_err(|e| FlywheelError::Transaction(format!("signing failed: {e}")))?;

        let signature = self
            .client
            .send_transaction_with_config(&tx, self.send_config())
            .await
            .context("Failed to send venue transaction")?;
        debug!(%signature, "Venue transaction submitted");
        Ok(signature)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
