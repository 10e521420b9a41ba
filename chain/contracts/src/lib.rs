//! Contract Logic for the RealCoin Security-Token Sale
//!
//! This crate implements the contract layer of the token sale and its
//! liquidation path: escrowed crowdsale rounds, scheduled liquidation votes
//! and the liquidation payout.
//!
//! # Modules
//! - `events`: Contract events, one struct per event
//! - `errors`: Contract-specific error types mapped onto `ErrorKind`
//! - `security`: Manager roster and at-most-once registries
//! - `ledger`: Token ledger capability and the in-memory snapshot ledger
//! - `bank`: Native asset transfer capability and in-memory balances
//! - `hooks`: Cross-engine capabilities and shared engine handles
//! - `vault`: Escrow of contributions until settlement
//! - `crowdsale`: Investments, confirmation, ordered settlement, rounds
//! - `voting`: Scheduled liquidation proposals and weighted votes
//! - `liquidation`: Claim phases of the liquidation payout
//! - `wallet`: Pull-payment wallet holding the payout token
//!
//! # Version
//! v0.1.0

pub mod errors;
pub mod events;
pub mod security;
pub mod ledger;
pub mod bank;
pub mod hooks;
pub mod vault;
pub mod crowdsale;
pub mod voting;
pub mod liquidation;
pub mod wallet;

/// Contract ABI version — frozen after release
pub const CONTRACT_ABI_VERSION: &str = "1.0.0";
