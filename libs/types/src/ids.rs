//! Identifier types for contract participants and records
//!
//! Participants are identified by 20-byte addresses rendered as `0x`-prefixed
//! hex. Investments and proposals are identified by their position in the
//! append-only sequences owned by the respective engines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sequential investment identifier (index into the investment ledger).
///
/// Never reset across crowdsale rounds.
pub type InvestmentId = u64;

/// Index into the fixed proposal schedule of the voting engine.
pub type ProposalIndex = usize;

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Error returned when parsing an address from text fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("Address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("Address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Identity of a participant (investor, manager, notary, wallet, engine).
///
/// The all-zero address is the null identity and is rejected wherever a
/// real beneficiary or wallet is required.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The null address.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic address from a human-readable label.
    ///
    /// Uses the last 20 bytes of `SHA-256(label)`, so distinct labels map to
    /// distinct, non-null addresses in practice.
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the null address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError::MissingPrefix(s.to_string()))?;

        // "0x0" is accepted as shorthand for the null address
        if body.chars().all(|c| c == '0') && !body.is_empty() && body.len() < ADDRESS_LEN * 2 {
            return Ok(Self::ZERO);
        }

        let raw = hex::decode(body).map_err(|_| AddressParseError::InvalidHex(s.to_string()))?;
        if raw.len() != ADDRESS_LEN {
            return Err(AddressParseError::InvalidLength {
                expected: ADDRESS_LEN,
                actual: raw.len(),
            });
        }

        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}
