//! Persistence layer.
//!
//! Saves and loads the ledger document as pretty JSON. The whole document
//! is rewritten after every cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{Ledger, LedgerConfig};

/// Default ledger file path.
pub const DEFAULT_LEDGER_FILE: &str = "flywheel_ledger.json";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current ledger; a fresh document if nothing is stored yet.
    async fn load(&self) -> Result<Ledger>;

    /// Replace the stored ledger.
    async fn save(&self, ledger: &Ledger) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

pub struct JsonLedgerStore {
    path: PathBuf,
    defaults: LedgerConfig,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>, defaults: LedgerConfig) -> Self {
        Self {
            path: path.into(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed the file with an empty ledger if it doesn't exist, and make
    /// sure an existing one still parses.
    pub async fn init(&self) -> Result<Ledger> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return self.load().await;
        }
        let ledger = Ledger::new(self.defaults.clone());
        self.save(&ledger).await?;
        info!(path = %self.path.display(), "Ledger initialised");
        Ok(ledger)
    }

    /// Delete the ledger file (for testing or reset).
    pub async fn delete(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tokio::fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to delete ledger file {}", self.path.display()))?;
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LedgerStore for JsonLedgerStore {
    async fn load(&self) -> Result<Ledger> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No ledger found, starting fresh");
                return Ok(Ledger::new(self.defaults.clone()));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read ledger from {}", self.path.display()))
            }
        };

        let ledger: Ledger = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse ledger from {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            claims = ledger.totals.claims,
            history = ledger.history.len(),
            "Ledger loaded"
        );
        Ok(ledger)
    }

    async fn save(&self, ledger: &Ledger) -> Result<()> {
        let json = serde_json::to_string_pretty(ledger).context("Failed to serialise ledger")?;

        // Write then rename so a crash never leaves a half-written ledger.
        let staging = self.staging_path();
        tokio::fs::write(&staging, json)
            .await
            .with_context(|| format!("Failed to write ledger to {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("Failed to move ledger into {}", self.path.display()))?;

        debug!(path = %self.path.display(), burned = %ledger.totals.tokens_burned, "Ledger saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
