//! Contract events
//!
//! Events are immutable records emitted by contract operations. Every engine
//! keeps an append-only log of the events it emitted; the log is the audit
//! trail of the sale and liquidation process.

use realcoin_types::ids::{Address, InvestmentId, ProposalIndex};
use realcoin_types::time::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ───────────────────────── Crowdsale ─────────────────────────

/// Manager flag set or cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedManager {
    pub manager: Address,
    pub active: bool,
}

/// Presale allocation recorded (tokens minted on settlement)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresalePurchase {
    pub investment_id: InvestmentId,
    pub beneficiary: Address,
    pub token_amount: Decimal,
}

/// Native-currency purchase recorded and deposited into the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPurchase {
    pub investment_id: InvestmentId,
    pub purchaser: Address,
    pub beneficiary: Address,
    pub value: Decimal,
    pub amount: Decimal,
}

/// Purchase paid outside the native currency, recorded by a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonEthTokenPurchase {
    pub investment_id: InvestmentId,
    pub investment_type: u8,
    pub beneficiary: Address,
    pub token_amount: Decimal,
}

/// Investment confirmation flag changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedInvestmentConfirmation {
    pub investment_id: InvestmentId,
    pub investor: Address,
    pub confirmed: bool,
}

/// Confirmation window closed early by a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPeriodFinalized {
    pub finalized_at: Timestamp,
}

/// Settlement attempted; tokens minted if confirmed, contribution refunded otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentSettled {
    pub investment_id: InvestmentId,
    pub beneficiary: Address,
    pub completed: bool,
    pub token_amount: Decimal,
    pub refunded: Decimal,
}

/// Round finalized: vault closed, token transfers enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdsaleFinalized {
    pub tokens_minted: Decimal,
    pub forwarded: Decimal,
}

/// New sale round opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCrowdsaleRound {
    pub start_time: Timestamp,
    pub duration: i64,
    pub rate: Decimal,
    pub delta_cap: Decimal,
}

/// Crowdsale permanently disabled by a passed liquidation vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdsaleDisabled {
    pub disabled_at: Timestamp,
}

// ───────────────────────── Escrow Vault ─────────────────────────

/// Contribution moved into the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub beneficiary: Address,
    pub amount: Decimal,
}

/// Contribution returned from the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refunded {
    pub beneficiary: Address,
    pub amount: Decimal,
}

/// Vault closed, balance forwarded to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultClosed {
    pub wallet: Address,
    pub amount: Decimal,
}

/// Vault reopened for a new round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultReopened {
    pub occurrence: u64,
}

// ───────────────────────── Voting ─────────────────────────

/// Voting switched on by the notary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingEnabled {
    pub enabled_at: Timestamp,
}

/// Quorum rate of the pending proposal changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumRateChanged {
    pub proposal: ProposalIndex,
    pub quorum_rate: u32,
}

/// Weighted vote cast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalVoted {
    pub proposal: ProposalIndex,
    pub voter: Address,
    pub votes: Decimal,
    pub is_yes: bool,
}

/// Proposal outcome computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub proposal: ProposalIndex,
    pub did_pass: bool,
    pub q_result: u32,
}

// ───────────────────────── Liquidation ─────────────────────────

/// Liquidation switched on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTriggered {
    pub timestamp: Timestamp,
    pub start_time: Timestamp,
}

/// Payout parameter changed by a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutParameter {
    StartTime(Timestamp),
    Rate(Decimal),
    UnclaimedRate(Decimal),
    PayoutToken(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutParameterChanged {
    pub parameter: PayoutParameter,
}

/// Principal tokens exchanged for a payout and vouchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsClaimed {
    pub claimant: Address,
    pub amount: Decimal,
    pub payment: Decimal,
}

/// Vouchers exchanged for the unclaimed-funds payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclaimedFundsClaimed {
    pub claimant: Address,
    pub amount: Decimal,
    pub payment: Decimal,
}

/// Remaining payout tokens swept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainderClaimed {
    pub destination: Address,
    pub amount: Decimal,
}

// ───────────────────────── Liquidation Wallet ─────────────────────────

/// Payment credited to a payee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorized {
    pub payee: Address,
    pub amount: Decimal,
}

/// Pending payments withdrawn by a payee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWithdrawn {
    pub payee: Address,
    pub amount: Decimal,
}

/// Enum wrapper for all contract events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    ChangedManager(ChangedManager),
    PresalePurchase(PresalePurchase),
    TokenPurchase(TokenPurchase),
    NonEthTokenPurchase(NonEthTokenPurchase),
    ChangedInvestmentConfirmation(ChangedInvestmentConfirmation),
    ConfirmationPeriodFinalized(ConfirmationPeriodFinalized),
    InvestmentSettled(InvestmentSettled),
    CrowdsaleFinalized(CrowdsaleFinalized),
    NewCrowdsaleRound(NewCrowdsaleRound),
    CrowdsaleDisabled(CrowdsaleDisabled),
    Deposited(Deposited),
    Refunded(Refunded),
    VaultClosed(VaultClosed),
    VaultReopened(VaultReopened),
    VotingEnabled(VotingEnabled),
    QuorumRateChanged(QuorumRateChanged),
    ProposalVoted(ProposalVoted),
    LiquidationResult(LiquidationResult),
    LiquidationTriggered(LiquidationTriggered),
    PayoutParameterChanged(PayoutParameterChanged),
    FundsClaimed(FundsClaimed),
    UnclaimedFundsClaimed(UnclaimedFundsClaimed),
    RemainderClaimed(RemainderClaimed),
    PaymentAuthorized(PaymentAuthorized),
    PaymentWithdrawn(PaymentWithdrawn),
}
