//! Accountant — ledger bookkeeping.
//!
//! Reconciles each cycle into the ledger: records one event per completed
//! step (newest first), accumulates totals, and caps the history.

use rust_decimal::Decimal;
use tracing::info;

use crate::types::{CycleResult, Event, Ledger, Network};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// What a single reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub events_recorded: usize,
    pub sol_spent: Decimal,
    pub tokens_bought: Decimal,
    pub tokens_burned: Decimal,
    pub history_len: usize,
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

pub struct Accountant;

impl Accountant {
    /// Record a cycle's results. Steps are recorded in execution order so
    /// the last step to run ends up first in the history.
    pub fn reconcile(ledger: &mut Ledger, result: &CycleResult, network: Network) -> CycleReport {
        let mut report = CycleReport::default();

        if let Some(signature) = &result.claim {
            ledger.prepend(Event::claim(signature, network));
            ledger.totals.claims += 1;
            report.events_recorded += 1;
        }

        if let Some(buy) = &result.buy {
            ledger.prepend(Event::buy(buy, network));
            let bought = buy.tokens_acquired.ui();
            ledger.totals.sol_spent += buy.sol_spent;
            ledger.totals.tokens_bought += bought;
            report.sol_spent = buy.sol_spent;
            report.tokens_bought = bought;
            report.events_recorded += 1;
        }

        if let Some(burn) = &result.burn {
            ledger.prepend(Event::burn(burn, network));
            let burned = burn.burned_ui();
            ledger.totals.tokens_burned += burned;
            report.tokens_burned = burned;
            report.events_recorded += 1;
        }

        ledger.truncate_history();
        report.history_len = ledger.history.len();

        info!(
            events = report.events_recorded,
            sol_spent = %report.sol_spent,
            tokens_bought = %report.tokens_bought,
            tokens_burned = %report.tokens_burned,
            total_claims = ledger.totals.claims,
            total_burned = %ledger.totals.tokens_burned,
            "Cycle reconciled"
        );

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
