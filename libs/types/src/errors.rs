//! Error taxonomy shared by all contracts
//!
//! Each contract defines its own detailed error enum; every variant maps onto
//! exactly one [`ErrorKind`] so callers can react to the class of failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of a rejected contract operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller lacks the required role
    Unauthorized,
    /// Operation not valid in the current stage or phase
    InvalidState,
    /// Zero or out-of-range argument
    InvalidParameter,
    /// Idempotency violation: already settled, claimed, triggered or enabled
    AlreadyDone,
    /// Batch ids not ascending, or settlement ahead of its predecessor
    OutOfOrder,
    /// Id out of range
    NotFound,
    /// Parallel array length mismatch
    LengthMismatch,
    /// Spender has no (or too little) approved allowance
    InsufficientAllowance,
    /// Nothing to withdraw, refund or sweep
    ZeroBalance,
    /// Cumulative token amount would exceed the cap
    CapExceeded,
    /// Component permanently disabled
    Disabled,
    /// Arithmetic overflow in a balance calculation
    Overflow,
}

impl ErrorKind {
    /// Idempotency violations are safe to ignore on resubmission.
    pub fn is_idempotency_violation(&self) -> bool {
        matches!(self, ErrorKind::AlreadyDone)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
