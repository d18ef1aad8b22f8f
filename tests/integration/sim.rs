//! In-memory chain, venues, claimer and ledger store for integration tests.
//!
//! `SimChain` implements `LedgerRpc` by interpreting the token, associated
//! token account and compute-budget instructions the burn methods emit. A
//! transaction applies all of its instructions or none of them.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use spl_token_2022::instruction::TokenInstruction;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flywheel::chain::{LedgerRpc, SignatureStatus};
use flywheel::engine::burn::{burn_methods, BurnExecutor, BurnStrategy};
use flywheel::engine::settle::{NoPause, Pause, RetryPolicy};
use flywheel::engine::swap::{SwapExecutor, SwapSettings};
use flywheel::engine::CycleOrchestrator;
use flywheel::storage::LedgerStore;
use flywheel::types::{Ledger, LedgerConfig, Network, TokenAmount, TokenProgram};
use flywheel::venues::{FeeClaimer, SwapVenue, VenueFill};

pub const DECIMALS: u8 = 6;
pub const RESERVE: u64 = 10_000_000;
pub const MIN_SPEND: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Accounts {
    /// Token account -> raw balance.
    balances: HashMap<Pubkey, u64>,
}

#[derive(Debug)]
struct PendingCredit {
    account: Pubkey,
    raw: u64,
    stale_reads: u32,
}

pub struct SimChain {
    operator: Pubkey,
    mint: Pubkey,
    sol: Mutex<u64>,
    accounts: Mutex<Accounts>,
    pending: Mutex<Option<PendingCredit>>,
    reject_burn_checked: Mutex<bool>,
    landed: Mutex<Vec<Vec<Instruction>>>,
    attempts: AtomicU32,
}

impl SimChain {
    pub fn new(mint: Pubkey, sol_lamports: u64) -> Self {
        Self {
            operator: Pubkey::new_unique(),
            mint,
            sol: Mutex::new(sol_lamports),
            accounts: Mutex::new(Accounts::default()),
            pending: Mutex::new(None),
            reject_burn_checked: Mutex::new(false),
            landed: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn ata(&self, program: TokenProgram) -> Pubkey {
        program.associated_account(&self.mint, &self.operator)
    }

    pub fn incinerator_ata(&self, program: TokenProgram) -> Pubkey {
        program.associated_account(&self.mint, &solana_sdk::incinerator::id())
    }

    /// Set the operator's balance under `program` directly.
    pub fn fund_tokens(&self, program: TokenProgram, raw: u64) {
        let account = self.ata(program);
        self.accounts.lock().unwrap().balances.insert(account, raw);
    }

    /// Credit `raw` to the operator's `program` account, invisible to the
    /// first `stale_reads` balance reads of that account.
    pub fn credit_lagged(&self, program: TokenProgram, raw: u64, stale_reads: u32) {
        *self.pending.lock().unwrap() = Some(PendingCredit {
            account: self.ata(program),
            raw,
            stale_reads,
        });
    }

    pub fn reject_burn_checked(&self) {
        *self.reject_burn_checked.lock().unwrap() = true;
    }

    pub fn balance_of(&self, account: &Pubkey) -> Option<u64> {
        self.accounts.lock().unwrap().balances.get(account).copied()
    }

    pub fn held(&self, program: TokenProgram) -> u64 {
        self.balance_of(&self.ata(program)).unwrap_or(0)
    }

    pub fn sol(&self) -> u64 {
        *self.sol.lock().unwrap()
    }

    pub fn add_sol(&self, lamports: u64) {
        *self.sol.lock().unwrap() += lamports;
    }

    pub fn spend_sol(&self, lamports: u64) {
        let mut sol = self.sol.lock().unwrap();
        *sol = sol.saturating_sub(lamports);
    }

    /// Transactions that landed, in order.
    pub fn landed(&self) -> Vec<Vec<Instruction>> {
        self.landed.lock().unwrap().clone()
    }

    /// Every submitted transaction, landed or rejected.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn apply(&self, accounts: &mut Accounts, ix: &Instruction) -> Result<()> {
        if ix.program_id == solana_sdk::compute_budget::id() {
            return Ok(());
        }

        if ix.program_id == spl_associated_token_account::id() {
            // create_idempotent: [payer, ata, wallet, mint, system, token_program]
            let ata = ix.accounts[1].pubkey;
            accounts.balances.entry(ata).or_insert(0);
            return Ok(());
        }

        if ix.program_id != spl_token::id() && ix.program_id != spl_token_2022::id() {
            bail!("unknown program {}", ix.program_id);
        }

        match TokenInstruction::unpack(&ix.data).map_err(|e| anyhow!("bad token instruction: {e}"))? {
            TokenInstruction::BurnChecked { amount, decimals } => {
                if *self.reject_burn_checked.lock().unwrap() {
                    bail!("custom program error: 0x11");
                }
                check_decimals(decimals)?;
                debit(accounts, &ix.accounts[0].pubkey, amount)
            }
            TokenInstruction::TransferChecked { amount, decimals } => {
                check_decimals(decimals)?;
                let destination = ix.accounts[2].pubkey;
                if !accounts.balances.contains_key(&destination) {
                    bail!("destination account {destination} does not exist");
                }
                debit(accounts, &ix.accounts[0].pubkey, amount)?;
                *accounts.balances.entry(destination).or_insert(0) += amount;
                Ok(())
            }
            TokenInstruction::CloseAccount => {
                let account = ix.accounts[0].pubkey;
                match accounts.balances.get(&account) {
                    Some(0) => {
                        accounts.balances.remove(&account);
                        Ok(())
                    }
                    Some(_) => bail!("cannot close account {account} with a balance"),
                    None => bail!("account {account} does not exist"),
                }
            }
            other => bail!("unsupported token instruction {other:?}"),
        }
    }
}

fn check_decimals(decimals: u8) -> Result<()> {
    if decimals != DECIMALS {
        bail!("decimals mismatch: {decimals}");
    }
    Ok(())
}

fn debit(accounts: &mut Accounts, account: &Pubkey, amount: u64) -> Result<()> {
    let balance = accounts
        .balances
        .get_mut(account)
        .ok_or_else(|| anyhow!("account {account} does not exist"))?;
    if *balance < amount {
        bail!("insufficient funds in {account}: {balance} < {amount}");
    }
    *balance -= amount;
    Ok(())
}

#[async_trait]
impl LedgerRpc for SimChain {
    fn operator(&self) -> Pubkey {
        self.operator
    }

    async fn sol_balance(&self) -> Result<u64> {
        Ok(self.sol())
    }

    async fn token_balance(&self, account: &Pubkey) -> Result<Option<TokenAmount>> {
        let mut pending = self.pending.lock().unwrap();
        if let Some(credit) = pending.as_mut().filter(|c| c.account == *account) {
            if credit.stale_reads > 0 {
                credit.stale_reads -= 1;
            } else {
                let raw = credit.raw;
                *pending = None;
                *self.accounts.lock().unwrap().balances.entry(*account).or_insert(0) += raw;
            }
        }
        drop(pending);

        Ok(self
            .balance_of(account)
            .map(|raw| TokenAmount::new(raw, DECIMALS)))
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<SignatureStatus> {
        Ok(SignatureStatus::Confirmed)
    }

    async fn submit_instructions(&self, instructions: Vec<Instruction>) -> Result<Signature> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut accounts = self.accounts.lock().unwrap();
        let mut staged = accounts.clone();
        for ix in &instructions {
            self.apply(&mut staged, ix)?;
        }
        *accounts = staged;
        drop(accounts);

        self.landed.lock().unwrap().push(instructions);
        Ok(Signature::new_unique())
    }

    async fn submit_serialized(&self, _transaction: Vec<u8>) -> Result<Signature> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        bail!("the simulated chain does not accept serialized transactions")
    }
}

// ---------------------------------------------------------------------------
// Venues and claimer
// ---------------------------------------------------------------------------

pub enum Route {
    /// Spend the budget and deliver `raw` tokens after `stale_reads` reads.
    Fill { program: TokenProgram, raw: u64, stale_reads: u32 },
    NoRoute,
    Fail,
}

pub struct SimVenue {
    name: String,
    chain: Arc<SimChain>,
    route: Route,
    delay: Duration,
    calls: AtomicU32,
}

impl SimVenue {
    pub fn new(name: &str, chain: Arc<SimChain>, route: Route) -> Self {
        Self {
            name: name.to_string(),
            chain,
            route,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Hold each swap open for `delay` before it lands.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapVenue for SimVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote_and_submit(&self, _mint: &Pubkey, budget_lamports: u64) -> Result<Option<VenueFill>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield like a real HTTP round trip would.
        tokio::task::yield_now().await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.route {
            Route::Fill { program, raw, stale_reads } => {
                self.chain.spend_sol(budget_lamports);
                self.chain.credit_lagged(program, raw, stale_reads);
                Ok(Some(VenueFill {
                    signature: Signature::new_unique(),
                    spent_lamports: budget_lamports,
                    quoted_out: Some(raw),
                }))
            }
            Route::NoRoute => Ok(None),
            Route::Fail => Err(anyhow!("venue returned HTTP 503")),
        }
    }
}

/// Claims `fee_lamports` on every call; zero means nothing to claim.
pub struct SimClaimer {
    chain: Arc<SimChain>,
    fee_lamports: u64,
}

impl SimClaimer {
    pub fn new(chain: Arc<SimChain>, fee_lamports: u64) -> Self {
        Self { chain, fee_lamports }
    }
}

#[async_trait]
impl FeeClaimer for SimClaimer {
    async fn claim(&self) -> Result<Option<Signature>> {
        if self.fee_lamports == 0 {
            bail!("no creator fees to collect");
        }
        self.chain.add_sol(self.fee_lamports);
        Ok(Some(Signature::new_unique()))
    }
}

// ---------------------------------------------------------------------------
// Ledger store
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    defaults: LedgerConfig,
    ledger: Mutex<Option<Ledger>>,
    saves: AtomicU32,
}

impl MemoryStore {
    pub fn new(defaults: LedgerConfig) -> Self {
        Self {
            defaults,
            ledger: Mutex::new(None),
            saves: AtomicU32::new(0),
        }
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> Result<Ledger> {
        tokio::task::yield_now().await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ledger::new(self.defaults.clone())))
    }

    async fn save(&self, ledger: &Ledger) -> Result<()> {
        *self.ledger.lock().unwrap() = Some(ledger.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub chain: Arc<SimChain>,
    pub orchestrator: Arc<CycleOrchestrator>,
}

pub fn ledger_config(chain: &SimChain) -> LedgerConfig {
    LedgerConfig {
        mint: chain.mint.to_string(),
        operator: chain.operator.to_string(),
        network: Network::Devnet,
    }
}

pub fn swap_settings() -> SwapSettings {
    SwapSettings {
        min_spend_lamports: MIN_SPEND,
        confirm: RetryPolicy::from_millis(3, 0),
        settle_reads: RetryPolicy::from_millis(5, 0),
    }
}

pub fn burn_executor(chain: &Arc<SimChain>, strategy: BurnStrategy) -> BurnExecutor {
    let rpc: Arc<dyn LedgerRpc> = chain.clone();
    BurnExecutor::new(
        rpc.clone(),
        burn_methods(strategy, rpc, 0),
        Arc::new(NoPause),
        chain.mint,
        Duration::ZERO,
    )
}

/// Orchestrator over `chain` with the given venues, claimer and store.
pub fn harness(
    chain: Arc<SimChain>,
    venues: Vec<Arc<dyn SwapVenue>>,
    claimer: Arc<dyn FeeClaimer>,
    store: Arc<dyn LedgerStore>,
) -> Harness {
    let rpc: Arc<dyn LedgerRpc> = chain.clone();
    let pause: Arc<dyn Pause> = Arc::new(NoPause);
    let swap = SwapExecutor::new(rpc.clone(), venues, pause, chain.mint, swap_settings());
    let burn = burn_executor(&chain, BurnStrategy::Burn);
    let orchestrator = CycleOrchestrator::new(store, claimer, rpc, swap, burn, RESERVE, Network::Devnet);

    Harness {
        chain,
        orchestrator: Arc::new(orchestrator),
    }
}
