//! FLYWHEEL — creator-fee buyback and burn agent for a Solana token.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod chain;
pub mod venues;
pub mod engine;
pub mod storage;
pub mod server;
