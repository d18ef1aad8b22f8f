//! Burn executor.
//!
//! Destroys the operator's whole balance of the mint. Burn methods are
//! tried in order until one lands; a true `burn_checked` by default, with
//! a transfer to the incinerator as the fallback.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::incinerator;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::prober::BalanceProber;
use super::settle::Pause;
use crate::chain::LedgerRpc;
use crate::types::{BurnResult, Holding};

// ---------------------------------------------------------------------------
// Burn methods
// ---------------------------------------------------------------------------

/// One way of taking a holding permanently out of circulation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BurnMethod: Send + Sync {
    fn name(&self) -> &str;

    /// Remove the entire `holding` in a single transaction.
    async fn execute(&self, holding: &Holding) -> Result<Signature>;
}

/// Which burn method runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnStrategy {
    /// `burn_checked` first, incinerator transfer as fallback.
    #[default]
    Burn,
    /// Incinerator transfer first, `burn_checked` as fallback.
    Incinerate,
}

/// The standard pair of burn methods in strategy order.
pub fn burn_methods(
    strategy: BurnStrategy,
    rpc: Arc<dyn LedgerRpc>,
    priority_fee_micro_lamports: u64,
) -> Vec<Arc<dyn BurnMethod>> {
    let checked: Arc<dyn BurnMethod> = Arc::new(BurnChecked::new(rpc.clone(), priority_fee_micro_lamports));
    let incinerate: Arc<dyn BurnMethod> = Arc::new(Incinerate::new(rpc, priority_fee_micro_lamports));
    match strategy {
        BurnStrategy::Burn => vec![checked, incinerate],
        BurnStrategy::Incinerate => vec![incinerate, checked],
    }
}

fn priority_fee(micro_lamports: u64) -> Option<Instruction> {
    (micro_lamports > 0).then(|| ComputeBudgetInstruction::set_compute_unit_price(micro_lamports))
}

/// `burn_checked` against the holding's own token program.
pub struct BurnChecked {
    rpc: Arc<dyn LedgerRpc>,
    priority_fee_micro_lamports: u64,
}

impl BurnChecked {
    pub fn new(rpc: Arc<dyn LedgerRpc>, priority_fee_micro_lamports: u64) -> Self {
        Self {
            rpc,
            priority_fee_micro_lamports,
        }
    }

    pub fn instructions(&self, owner: &Pubkey, holding: &Holding) -> Result<Vec<Instruction>> {
        let mut instructions: Vec<Instruction> = priority_fee(self.priority_fee_micro_lamports).into_iter().collect();
        instructions.push(spl_token_2022::instruction::burn_checked(
            &holding.program.program_id(),
            &holding.account,
            &holding.mint,
            owner,
            &[],
            holding.amount.raw,
            holding.amount.decimals,
        )?);
        Ok(instructions)
    }
}

#[async_trait]
impl BurnMethod for BurnChecked {
    fn name(&self) -> &str {
        "burn-checked"
    }

    async fn execute(&self, holding: &Holding) -> Result<Signature> {
        let instructions = self.instructions(&self.rpc.operator(), holding)?;
        self.rpc.submit_instructions(instructions).await
    }
}

/// Transfer to the incinerator's token account, then close the emptied
/// source account. All in one transaction.
pub struct Incinerate {
    rpc: Arc<dyn LedgerRpc>,
    priority_fee_micro_lamports: u64,
}

impl Incinerate {
    pub fn new(rpc: Arc<dyn LedgerRpc>, priority_fee_micro_lamports: u64) -> Self {
        Self {
            rpc,
            priority_fee_micro_lamports,
        }
    }

    pub fn instructions(&self, owner: &Pubkey, holding: &Holding) -> Result<Vec<Instruction>> {
        let program_id = holding.program.program_id();
        let destination = holding.program.associated_account(&holding.mint, &incinerator::id());

        let mut instructions: Vec<Instruction> = priority_fee(self.priority_fee_micro_lamports).into_iter().collect();
        instructions.push(
            spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                owner,
                &incinerator::id(),
                &holding.mint,
                &program_id,
            ),
        );
        instructions.push(spl_token_2022::instruction::transfer_checked(
            &program_id,
            &holding.account,
            &holding.mint,
            &destination,
            owner,
            &[],
            holding.amount.raw,
            holding.amount.decimals,
        )?);
        // Rent goes back to the operator.
        instructions.push(spl_token_2022::instruction::close_account(
            &program_id,
            &holding.account,
            owner,
            owner,
            &[],
        )?);
        Ok(instructions)
    }
}

#[async_trait]
impl BurnMethod for Incinerate {
    fn name(&self) -> &str {
        "incinerate"
    }

    async fn execute(&self, holding: &Holding) -> Result<Signature> {
        let instructions = self.instructions(&self.rpc.operator(), holding)?;
        self.rpc.submit_instructions(instructions).await
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct BurnExecutor {
    rpc: Arc<dyn LedgerRpc>,
    prober: BalanceProber,
    methods: Vec<Arc<dyn BurnMethod>>,
    pause: Arc<dyn Pause>,
    mint: Pubkey,
    settle_delay: Duration,
}

impl BurnExecutor {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        methods: Vec<Arc<dyn BurnMethod>>,
        pause: Arc<dyn Pause>,
        mint: Pubkey,
        settle_delay: Duration,
    ) -> Self {
        Self {
            prober: BalanceProber::new(rpc.clone()),
            rpc,
            methods,
            pause,
            mint,
            settle_delay,
        }
    }

    /// Burn everything the operator holds of the mint.
    ///
    /// Returns `None` when there is nothing to burn or every method
    /// failed; in the latter case the balance stays for the next cycle.
    pub async fn burn(&self) -> Option<BurnResult> {
        // Let a same-cycle buy land before probing.
        self.pause.pause(self.settle_delay).await;

        let owner = self.rpc.operator();
        let Some(holding) = self.prober.probe(&self.mint, &owner).await else {
            info!("Nothing to burn");
            return None;
        };

        for method in &self.methods {
            match method.execute(&holding).await {
                Ok(signature) => {
                    info!(
                        method = method.name(),
                        program = %holding.program,
                        %signature,
                        amount = %holding.amount,
                        "Burn complete"
                    );
                    return Some(BurnResult {
                        signature: signature.to_string(),
                        method: method.name().to_string(),
                        program: holding.program,
                        burned: holding.amount,
                    });
                }
                Err(e) => {
                    warn!(
                        method = method.name(),
                        program = %holding.program,
                        error = %e,
                        "Burn method failed, trying next"
                    );
                }
            }
        }

        warn!(amount = %holding.amount, "All burn methods failed, balance left for next cycle");
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
