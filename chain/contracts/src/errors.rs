//! Contract-specific error types
//!
//! One error enum per component. Every variant maps onto the shared
//! [`ErrorKind`] taxonomy through `kind()`, and collaborator failures are
//! wrapped so the original cause is preserved.

use realcoin_types::errors::ErrorKind;
use realcoin_types::ids::{Address, InvestmentId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::crowdsale::CrowdsaleStage;
use crate::liquidation::LiquidationState;
use crate::voting::VotingStage;

/// Token ledger collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Token transfers are disabled")]
    TransfersDisabled,

    #[error("Insufficient token balance for {holder}: required {required}, available {available}")]
    InsufficientBalance {
        holder: Address,
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance { required: Decimal, available: Decimal },

    #[error("Token amount must be positive")]
    InvalidAmount,

    #[error("Arithmetic overflow in token balance")]
    Overflow,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::TransfersDisabled => ErrorKind::InvalidState,
            LedgerError::InsufficientBalance { .. } => ErrorKind::ZeroBalance,
            LedgerError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            LedgerError::InvalidAmount => ErrorKind::InvalidParameter,
            LedgerError::Overflow => ErrorKind::Overflow,
        }
    }
}

/// Native asset transfer collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    #[error("Insufficient funds for {holder}: required {required}, available {available}")]
    InsufficientFunds {
        holder: Address,
        required: Decimal,
        available: Decimal,
    },

    #[error("Receiver {0} does not accept payments")]
    ReceiverRejected(Address),

    #[error("Transfer amount must be positive")]
    InvalidAmount,

    #[error("Arithmetic overflow in asset balance")]
    Overflow,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InsufficientFunds { .. } => ErrorKind::ZeroBalance,
            TransferError::ReceiverRejected(_) => ErrorKind::InvalidState,
            TransferError::InvalidAmount => ErrorKind::InvalidParameter,
            TransferError::Overflow => ErrorKind::Overflow,
        }
    }
}

/// Escrow vault errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaultError {
    #[error("Unauthorized: caller is not the vault owner")]
    Unauthorized,

    #[error("Vault is closed")]
    NotActive,

    #[error("Vault is already active")]
    AlreadyActive,

    #[error("Invalid wallet: null address")]
    InvalidWallet,

    #[error("Invalid owner: null address")]
    InvalidOwner,

    #[error("Deposit amount must be positive")]
    InvalidAmount,

    #[error("Nothing to refund for {0}")]
    NothingToRefund(Address),

    #[error("Refund of {required} exceeds deposit of {available} for {beneficiary}")]
    RefundExceedsDeposit {
        beneficiary: Address,
        required: Decimal,
        available: Decimal,
    },

    #[error("Direct transfers are rejected; use deposit")]
    DirectTransferRejected,

    #[error("Arithmetic overflow in vault balance")]
    Overflow,

    #[error("Asset transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Unauthorized | VaultError::DirectTransferRejected => ErrorKind::Unauthorized,
            VaultError::NotActive | VaultError::AlreadyActive => ErrorKind::InvalidState,
            VaultError::InvalidWallet | VaultError::InvalidOwner | VaultError::InvalidAmount => {
                ErrorKind::InvalidParameter
            }
            VaultError::NothingToRefund(_) | VaultError::RefundExceedsDeposit { .. } => {
                ErrorKind::ZeroBalance
            }
            VaultError::Overflow => ErrorKind::Overflow,
            VaultError::Transfer(inner) => inner.kind(),
        }
    }
}

/// Crowdsale engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrowdsaleError {
    #[error("Unauthorized: caller is not the owner")]
    NotOwner,

    #[error("Unauthorized: caller is not a manager")]
    NotManager,

    #[error("{operation} is not allowed in stage {stage:?}")]
    InvalidStage {
        operation: &'static str,
        stage: CrowdsaleStage,
    },

    #[error("Invalid beneficiary: null address")]
    InvalidBeneficiary,

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Invalid crowdsale parameter: {0}")]
    InvalidParameter(String),

    #[error("Token cap exceeded: requested {requested}, remaining {remaining}")]
    CapExceeded { requested: Decimal, remaining: Decimal },

    #[error("Length mismatch: {beneficiaries} beneficiaries, {amounts} amounts")]
    LengthMismatch { beneficiaries: usize, amounts: usize },

    #[error("Investment not found: {0}")]
    InvestmentNotFound(InvestmentId),

    #[error("Investment {0} already settled")]
    AlreadySettled(InvestmentId),

    #[error("Investment {0} settled out of order")]
    SettlementOutOfOrder(InvestmentId),

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Confirmation period already finalized")]
    ConfirmationAlreadyFinalized,

    #[error("Crowdsale already finalized")]
    AlreadyFinalized,

    #[error("{count} investments are not settled yet")]
    UnsettledInvestments { count: usize },

    #[error("Previous round is not finalized")]
    NotFinalized,

    #[error("Crowdsale permanently disabled")]
    Disabled,

    #[error("Arithmetic overflow in token accounting")]
    Overflow,

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl CrowdsaleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrowdsaleError::NotOwner | CrowdsaleError::NotManager => ErrorKind::Unauthorized,
            CrowdsaleError::InvalidStage { .. }
            | CrowdsaleError::UnsettledInvestments { .. }
            | CrowdsaleError::NotFinalized => ErrorKind::InvalidState,
            CrowdsaleError::InvalidBeneficiary
            | CrowdsaleError::InvalidAmount
            | CrowdsaleError::InvalidParameter(_)
            | CrowdsaleError::EmptyBatch => ErrorKind::InvalidParameter,
            CrowdsaleError::CapExceeded { .. } => ErrorKind::CapExceeded,
            CrowdsaleError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            CrowdsaleError::InvestmentNotFound(_) => ErrorKind::NotFound,
            CrowdsaleError::AlreadySettled(_)
            | CrowdsaleError::ConfirmationAlreadyFinalized
            | CrowdsaleError::AlreadyFinalized => ErrorKind::AlreadyDone,
            CrowdsaleError::SettlementOutOfOrder(_) => ErrorKind::OutOfOrder,
            CrowdsaleError::Disabled => ErrorKind::Disabled,
            CrowdsaleError::Overflow => ErrorKind::Overflow,
            CrowdsaleError::Vault(inner) => inner.kind(),
            CrowdsaleError::Ledger(inner) => inner.kind(),
        }
    }
}

/// Liquidation voting errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VotingError {
    #[error("Unauthorized: caller is not the notary")]
    NotNotary,

    #[error("Voting already enabled")]
    AlreadyEnabled,

    #[error("{operation} is not allowed in stage {stage:?}")]
    InvalidStage {
        operation: &'static str,
        stage: VotingStage,
    },

    #[error("Quorum rate {0} outside 1..=1000")]
    InvalidQuorumRate(u32),

    #[error("{0} already voted on this proposal")]
    AlreadyVoted(Address),

    #[error("{0} held no tokens when the proposal opened")]
    NoVotingPower(Address),

    #[error("Invalid voting configuration: {0}")]
    InvalidConfig(String),

    #[error("Arithmetic overflow in vote tally")]
    Overflow,

    #[error("Liquidation trigger failed: {0}")]
    Trigger(#[from] LiquidationError),
}

impl VotingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VotingError::NotNotary => ErrorKind::Unauthorized,
            VotingError::AlreadyEnabled | VotingError::AlreadyVoted(_) => ErrorKind::AlreadyDone,
            VotingError::InvalidStage { .. } => ErrorKind::InvalidState,
            VotingError::InvalidQuorumRate(_) | VotingError::InvalidConfig(_) => {
                ErrorKind::InvalidParameter
            }
            VotingError::NoVotingPower(_) => ErrorKind::ZeroBalance,
            VotingError::Overflow => ErrorKind::Overflow,
            VotingError::Trigger(inner) => inner.kind(),
        }
    }
}

/// Liquidation payout engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiquidationError {
    #[error("Unauthorized: caller is not a manager")]
    NotManager,

    #[error("Liquidation already triggered")]
    AlreadyTriggered,

    #[error("Liquidation not triggered")]
    NotTriggered,

    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LiquidationState,
    },

    #[error("Rate must be positive")]
    InvalidRate,

    #[error("Start time {0} is not in the future")]
    InvalidStartTime(i64),

    #[error("Invalid destination: null address")]
    InvalidDestination,

    #[error("Invalid liquidation configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} already claimed in this phase")]
    AlreadyClaimed(Address),

    #[error("No allowance approved by {0}")]
    NoAllowance(Address),

    #[error("Claim by {0} would pay nothing at the current rate")]
    ZeroPayment(Address),

    #[error("Liquidation has ended")]
    Ended,

    #[error("Arithmetic overflow in payout calculation")]
    Overflow,

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl LiquidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LiquidationError::NotManager => ErrorKind::Unauthorized,
            LiquidationError::AlreadyTriggered
            | LiquidationError::AlreadyClaimed(_)
            | LiquidationError::Ended => ErrorKind::AlreadyDone,
            LiquidationError::NotTriggered | LiquidationError::InvalidState { .. } => {
                ErrorKind::InvalidState
            }
            LiquidationError::InvalidRate
            | LiquidationError::InvalidStartTime(_)
            | LiquidationError::InvalidDestination
            | LiquidationError::InvalidConfig(_)
            | LiquidationError::ZeroPayment(_) => ErrorKind::InvalidParameter,
            LiquidationError::NoAllowance(_) => ErrorKind::InsufficientAllowance,
            LiquidationError::Overflow => ErrorKind::Overflow,
            LiquidationError::Wallet(inner) => inner.kind(),
            LiquidationError::Ledger(inner) => inner.kind(),
        }
    }
}

/// Pull-payment wallet errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Unauthorized: caller is not the wallet owner")]
    Unauthorized,

    #[error("Invalid address: null identity")]
    InvalidAddress,

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error("No payments pending for {0}")]
    NoPayments(Address),

    #[error("Wallet holds no payout tokens")]
    EmptyBalance,

    #[error("Direct transfers are rejected")]
    DirectTransferRejected,

    #[error("Arithmetic overflow in pending payments")]
    Overflow,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Unauthorized | WalletError::DirectTransferRejected => ErrorKind::Unauthorized,
            WalletError::InvalidAddress | WalletError::InvalidAmount => ErrorKind::InvalidParameter,
            WalletError::NoPayments(_) | WalletError::EmptyBalance => ErrorKind::ZeroBalance,
            WalletError::Overflow => ErrorKind::Overflow,
            WalletError::Ledger(inner) => inner.kind(),
        }
    }
}
