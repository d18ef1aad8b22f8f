//! Core engine — the claim → buy → burn cycle.

pub mod prober;
pub mod settle;
pub mod swap;
pub mod burn;
pub mod accountant;
pub mod orchestrator;

pub use orchestrator::{CycleOrchestrator, CycleOutcome};
