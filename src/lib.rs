//! Raydium AMM v4 new-pool sniper
//!
//! The library holds the whole pipeline so the binary stays thin and the
//! integration tests can drive the engine with in-memory collaborators.

pub mod broadcast;
pub mod buy_executor;
pub mod chain;
pub mod config;
pub mod control;
pub mod dedup;
pub mod endpoints;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod gate;
pub mod layouts;
pub mod metrics;
pub mod monitor;
pub mod oracles;
pub mod registry;
pub mod sell_executor;
pub mod stream;
pub mod structured_logging;
pub mod swap;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
