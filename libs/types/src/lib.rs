//! Types library for the RealCoin sale and liquidation contracts
//!
//! This library provides the core type definitions shared by the contract
//! engines, ensuring deterministic arithmetic and a single error taxonomy.
//!
//! # Modules
//! - `ids`: Participant addresses and record identifiers
//! - `numeric`: Fixed-point decimal quantities and per-mille ratios
//! - `time`: Timestamps and time sources
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod time;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::time::*;
    pub use crate::errors::*;
}
