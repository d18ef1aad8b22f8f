//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (signer key, admin token) are referenced by env-var name in the
//! config and resolved at runtime via `AppConfig::resolve_env`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::burn::BurnStrategy;
use crate::engine::settle::RetryPolicy;
use crate::types::{sol_to_lamports, FlywheelError, Network};
use crate::venues::pumpportal::PumpSettings;
use crate::venues::SwapProvider;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub network: NetworkConfig,
    pub operator: OperatorConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub burn: BurnConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub ledger_path: String,
    pub cycle_interval_secs: u64,
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Target token mint, base58.
    pub mint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorConfig {
    /// Env var holding the base58-encoded signer keypair.
    pub signer_secret_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SwapConfig {
    pub provider: SwapProvider,
    /// SOL always left in the operator wallet.
    pub reserve_sol: f64,
    /// Budgets below this are not swapped.
    pub min_swap_sol: f64,
    pub jupiter_base_url: Option<String>,
    pub slippage_bps: u16,
    pub prioritization_fee_lamports: u64,
    pub pump_url: Option<String>,
    pub pump_min_sol: f64,
    /// Per-buy cap; zero means uncapped.
    pub pump_target_sol: f64,
    pub pump_buffer_sol: f64,
    pub pump_slippage_pct: f64,
    pub priority_fee_sol: f64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            provider: SwapProvider::Auto,
            reserve_sol: 0.01,
            min_swap_sol: 0.001,
            jupiter_base_url: None,
            slippage_bps: 300,
            prioritization_fee_lamports: 0,
            pump_url: None,
            pump_min_sol: 0.01,
            pump_target_sol: 0.0,
            pump_buffer_sol: 0.0005,
            pump_slippage_pct: 3.0,
            priority_fee_sol: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BurnConfig {
    pub strategy: BurnStrategy,
    /// Compute-unit price in micro-lamports; zero adds no instruction.
    pub priority_fee_micro_lamports: u64,
    /// Wait before probing, so a just-landed buy is visible.
    pub settle_delay_ms: u64,
}

impl Default for BurnConfig {
    fn default() -> Self {
        Self {
            strategy: BurnStrategy::Burn,
            priority_fee_micro_lamports: 0,
            settle_delay_ms: 700,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettlementConfig {
    pub confirm_attempts: u32,
    pub confirm_delay_ms: u64,
    pub read_attempts: u32,
    pub read_delay_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            confirm_attempts: 30,
            confirm_delay_ms: 1_000,
            read_attempts: 10,
            read_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
    pub admin_token_env: String,
    /// CORS allow-list; empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8787,
            admin_token_env: "ADMIN_BEARER_TOKEN".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every cycle fail or misbehave.
    pub fn validate(&self) -> Result<(), FlywheelError> {
        self.mint_pubkey()?;

        if self.network.rpc_url.trim().is_empty() {
            return Err(FlywheelError::Config("network.rpc_url is empty".into()));
        }
        if self.agent.scheduler_enabled && self.agent.cycle_interval_secs == 0 {
            return Err(FlywheelError::Config(
                "agent.cycle_interval_secs must be positive when the scheduler is enabled".into(),
            ));
        }

        let s = &self.swap;
        for (name, value) in [
            ("swap.reserve_sol", s.reserve_sol),
            ("swap.min_swap_sol", s.min_swap_sol),
            ("swap.pump_min_sol", s.pump_min_sol),
            ("swap.pump_target_sol", s.pump_target_sol),
            ("swap.pump_buffer_sol", s.pump_buffer_sol),
            ("swap.priority_fee_sol", s.priority_fee_sol),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FlywheelError::Config(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        if s.slippage_bps > 10_000 {
            return Err(FlywheelError::Config(format!("swap.slippage_bps out of range: {}", s.slippage_bps)));
        }
        if !(0.0..=100.0).contains(&s.pump_slippage_pct) {
            return Err(FlywheelError::Config(format!(
                "swap.pump_slippage_pct out of range: {}",
                s.pump_slippage_pct
            )));
        }
        if self.settlement.confirm_attempts == 0 || self.settlement.read_attempts == 0 {
            return Err(FlywheelError::Config("settlement attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn network(&self) -> Network {
        Network::from_rpc_url(&self.network.rpc_url)
    }

    pub fn mint_pubkey(&self) -> Result<Pubkey, FlywheelError> {
        let mint = self.network.mint.trim();
        if mint.is_empty() {
            return Err(FlywheelError::Config("network.mint is not set".into()));
        }
        Pubkey::from_str(mint).map_err(|e| FlywheelError::Config(format!("network.mint {mint:?} is invalid: {e}")))
    }

    /// The operator's signing key. Required.
    pub fn signer_secret(&self) -> Result<SecretString, FlywheelError> {
        let name = &self.operator.signer_secret_env;
        match Self::resolve_env(name) {
            Ok(value) if !value.trim().is_empty() => Ok(SecretString::new(value.trim().to_string())),
            _ => Err(FlywheelError::MissingSecret(name.clone())),
        }
    }

    /// The admin bearer token. `None` when unset, which locks the admin
    /// endpoints entirely.
    pub fn admin_token(&self) -> Option<SecretString> {
        Self::resolve_env(&self.server.admin_token_env)
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::new)
    }

    pub fn reserve_lamports(&self) -> u64 {
        sol_to_lamports(self.swap.reserve_sol)
    }

    pub fn min_swap_lamports(&self) -> u64 {
        sol_to_lamports(self.swap.min_swap_sol)
    }

    pub fn pump_settings(&self) -> PumpSettings {
        let cap = sol_to_lamports(self.swap.pump_target_sol);
        PumpSettings {
            floor_lamports: sol_to_lamports(self.swap.pump_min_sol),
            cap_lamports: (cap > 0).then_some(cap),
            buffer_lamports: sol_to_lamports(self.swap.pump_buffer_sol),
            slippage_pct: self.swap.pump_slippage_pct,
            priority_fee_sol: self.swap.priority_fee_sol,
        }
    }

    pub fn confirm_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.settlement.confirm_attempts, self.settlement.confirm_delay_ms)
    }

    pub fn read_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.settlement.read_attempts, self.settlement.read_delay_ms)
    }

    pub fn burn_settle_delay(&self) -> Duration {
        Duration::from_millis(self.burn.settle_delay_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.agent.cycle_interval_secs)
    }
}
