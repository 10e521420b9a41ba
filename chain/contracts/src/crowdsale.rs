//! Crowdsale Engine — investments, confirmation, settlement and rounds
//!
//! Implements the token sale lifecycle:
//! - Presale allocations before opening, purchases during contribution
//! - Manager confirmation of each investment during the confirmation window
//! - Strictly ordered, at-most-once settlement (mint if confirmed, refund otherwise)
//! - Finalization (vault closed, token transfers enabled) and re-opening
//!   for further rounds under a raised token cap
//!
//! Stages are derived from the clock on every call and never stored.

use realcoin_types::ids::{Address, InvestmentId};
use realcoin_types::numeric::{convert, is_positive};
use realcoin_types::time::{Clock, Timestamp, DAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bank::AssetTransfer;
use crate::errors::{CrowdsaleError, VaultError};
use crate::events::{
    ChangedInvestmentConfirmation, ChangedManager, ConfirmationPeriodFinalized, ContractEvent,
    CrowdsaleDisabled, CrowdsaleFinalized, InvestmentSettled, NewCrowdsaleRound,
    NonEthTokenPurchase, PresalePurchase, TokenPurchase,
};
use crate::ledger::TokenLedger;
use crate::security::ManagerRoster;
use crate::vault::EscrowVault;

/// Default token cap (whole tokens).
pub const DEFAULT_TOKEN_CAP: i64 = 150_000_000;

/// Default confirmation window after closing time.
pub const DEFAULT_CONFIRMATION_PERIOD: i64 = 30 * DAY;

fn default_token_cap() -> Decimal {
    Decimal::from(DEFAULT_TOKEN_CAP)
}

fn default_confirmation_period() -> i64 {
    DEFAULT_CONFIRMATION_PERIOD
}

fn default_address() -> Address {
    Address::from_label("realcoin-crowdsale")
}

fn default_vault_address() -> Address {
    Address::from_label("realcoin-escrow-vault")
}

/// Crowdsale deployment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdsaleConfig {
    /// Owner; always a manager
    pub owner: Address,
    /// Identity of the engine itself (vault owner)
    #[serde(default = "default_address")]
    pub address: Address,
    /// Identity holding the escrowed contributions
    #[serde(default = "default_vault_address")]
    pub vault_address: Address,
    /// Receiver of the contributions on finalization
    pub wallet: Address,
    pub opening_time: Timestamp,
    pub closing_time: Timestamp,
    /// Tokens per unit of native currency
    pub rate: Decimal,
    #[serde(default = "default_token_cap")]
    pub token_cap: Decimal,
    /// Seconds after closing during which managers confirm investments
    #[serde(default = "default_confirmation_period")]
    pub confirmation_period: i64,
}

impl CrowdsaleConfig {
    /// Config with default identities, cap and confirmation period.
    pub fn new(
        owner: Address,
        wallet: Address,
        opening_time: Timestamp,
        closing_time: Timestamp,
        rate: Decimal,
    ) -> Self {
        Self {
            owner,
            address: default_address(),
            vault_address: default_vault_address(),
            wallet,
            opening_time,
            closing_time,
            rate,
            token_cap: default_token_cap(),
            confirmation_period: DEFAULT_CONFIRMATION_PERIOD,
        }
    }

    /// Load from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, CrowdsaleError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CrowdsaleError::InvalidParameter(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CrowdsaleError> {
        let invalid = |msg: &str| Err(CrowdsaleError::InvalidParameter(msg.to_string()));
        if self.owner.is_zero() || self.address.is_zero() {
            return invalid("owner and engine address must be set");
        }
        if self.wallet.is_zero() {
            return invalid("wallet must not be the null address");
        }
        if self.opening_time <= 0 || self.closing_time <= 0 {
            return invalid("opening and closing time must be set");
        }
        if self.closing_time <= self.opening_time {
            return invalid("closing time must be after opening time");
        }
        if !is_positive(self.rate) {
            return invalid("rate must be positive");
        }
        if !is_positive(self.token_cap) {
            return invalid("token cap must be positive");
        }
        if self.confirmation_period <= 0 {
            return invalid("confirmation period must be positive");
        }
        Ok(())
    }
}

/// Time-derived stage of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdsaleStage {
    /// Presale allocations only
    BeforeOpening,
    /// `opening_time <= now <= closing_time`; purchases accepted
    Contribution,
    /// After closing, until the window elapses or is finalized early
    Confirmation,
    /// Confirmation over; investments settle, then the round finalizes
    Settlement,
    Finalized,
}

/// A single recorded purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub investor: Address,
    pub beneficiary: Address,
    /// Native currency paid; zero for presale and non-native purchases
    pub wei_amount: Decimal,
    pub token_amount: Decimal,
    pub confirmed: bool,
    pub attempted_settlement: bool,
    pub completed_settlement: bool,
}

/// Collaborator effect of one settlement, kept so a failed batch can be undone.
#[derive(Debug, Clone, Copy)]
enum SettlementEffect {
    Minted { beneficiary: Address, amount: Decimal },
    Refunded { investor: Address, amount: Decimal },
}

/// Crowdsale contract managing investments across sale rounds.
///
/// Owns the escrow vault exclusively. Investment ids are indices into the
/// append-only investment list and are never reused across rounds.
pub struct CrowdsaleEngine {
    address: Address,
    roster: ManagerRoster,
    opening_time: Timestamp,
    closing_time: Timestamp,
    rate: Decimal,
    token_cap: Decimal,
    confirmation_period: i64,
    /// Set early by a manager; the window also ends by elapsing
    confirmation_period_finalized: bool,
    finalized: bool,
    disabled: bool,
    investments: Vec<Investment>,
    tokens_minted: Decimal,
    /// Reserved by unsettled investments
    tokens_to_mint: Decimal,
    vault: EscrowVault,
    token: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    /// Emitted events log (append-only)
    events: Vec<ContractEvent>,
}

impl std::fmt::Debug for CrowdsaleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdsaleEngine")
            .field("address", &self.address)
            .field("opening_time", &self.opening_time)
            .field("closing_time", &self.closing_time)
            .field("rate", &self.rate)
            .field("token_cap", &self.token_cap)
            .field("investments", &self.investments.len())
            .field("finalized", &self.finalized)
            .field("disabled", &self.disabled)
            .field("vault", &self.vault)
            .finish()
    }
}

impl CrowdsaleEngine {
    /// Deploy the crowdsale and its vault. Locks token transfers until finalization.
    pub fn new(
        config: CrowdsaleConfig,
        token: Arc<dyn TokenLedger>,
        transfer: Arc<dyn AssetTransfer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CrowdsaleError> {
        config.validate()?;
        let vault = EscrowVault::new(config.address, config.vault_address, config.wallet, transfer)?;
        token.set_transfers_enabled(false);

        info!(
            opening_time = config.opening_time,
            closing_time = config.closing_time,
            rate = %config.rate,
            token_cap = %config.token_cap,
            "CrowdsaleEngine initialized"
        );

        Ok(Self {
            address: config.address,
            roster: ManagerRoster::new(config.owner),
            opening_time: config.opening_time,
            closing_time: config.closing_time,
            rate: config.rate,
            token_cap: config.token_cap,
            confirmation_period: config.confirmation_period,
            confirmation_period_finalized: false,
            finalized: false,
            disabled: false,
            investments: Vec::new(),
            tokens_minted: Decimal::ZERO,
            tokens_to_mint: Decimal::ZERO,
            vault,
            token,
            clock,
            events: Vec::new(),
        })
    }

    // ───────────────────────── Managers ─────────────────────────

    /// Set or clear a manager. Owner-only, idempotent.
    pub fn set_manager(
        &mut self,
        caller: &Address,
        manager: Address,
        active: bool,
    ) -> Result<ContractEvent, CrowdsaleError> {
        if manager.is_zero() {
            return Err(CrowdsaleError::InvalidParameter("manager must not be the null address".into()));
        }
        if !self.roster.set_manager(caller, manager, active) {
            return Err(CrowdsaleError::NotOwner);
        }
        debug!(manager = %manager, active, "Manager changed");
        Ok(self.emit(ContractEvent::ChangedManager(ChangedManager { manager, active })))
    }

    // ───────────────────────── Purchases ─────────────────────────

    /// Record a presale allocation. Owner-only, strictly before opening.
    pub fn mint_presale_tokens(
        &mut self,
        caller: &Address,
        beneficiary: Address,
        token_amount: Decimal,
    ) -> Result<ContractEvent, CrowdsaleError> {
        self.check_presale(caller)?;
        Self::check_allocation(&beneficiary, token_amount)?;
        self.check_cap(token_amount)?;
        Ok(self.record_presale(beneficiary, token_amount))
    }

    /// Record several presale allocations at once.
    pub fn batch_mint_token_presale(
        &mut self,
        caller: &Address,
        beneficiaries: &[Address],
        token_amounts: &[Decimal],
    ) -> Result<Vec<ContractEvent>, CrowdsaleError> {
        self.check_presale(caller)?;
        if beneficiaries.len() != token_amounts.len() {
            return Err(CrowdsaleError::LengthMismatch {
                beneficiaries: beneficiaries.len(),
                amounts: token_amounts.len(),
            });
        }
        if beneficiaries.is_empty() {
            return Err(CrowdsaleError::EmptyBatch);
        }

        let mut total = Decimal::ZERO;
        for (beneficiary, amount) in beneficiaries.iter().zip(token_amounts) {
            Self::check_allocation(beneficiary, *amount)?;
            total = total.checked_add(*amount).ok_or(CrowdsaleError::Overflow)?;
        }
        self.check_cap(total)?;

        Ok(beneficiaries
            .iter()
            .zip(token_amounts)
            .map(|(beneficiary, amount)| self.record_presale(*beneficiary, *amount))
            .collect())
    }

    /// Buy tokens for `beneficiary`, paying `value` from `caller` into the vault.
    pub fn buy_tokens(
        &mut self,
        caller: &Address,
        beneficiary: Address,
        value: Decimal,
    ) -> Result<ContractEvent, CrowdsaleError> {
        self.check_stage("buy_tokens", CrowdsaleStage::Contribution)?;
        if beneficiary.is_zero() {
            return Err(CrowdsaleError::InvalidBeneficiary);
        }
        if !is_positive(value) {
            return Err(CrowdsaleError::InvalidAmount);
        }
        let token_amount = convert(value, self.rate).ok_or(CrowdsaleError::Overflow)?;
        self.check_cap(token_amount)?;

        let owner = self.address;
        self.vault.deposit(&owner, caller, *caller, value)?;

        let investment_id = self.push_investment(*caller, beneficiary, value, token_amount);
        Ok(self.emit(ContractEvent::TokenPurchase(TokenPurchase {
            investment_id,
            purchaser: *caller,
            beneficiary,
            value,
            amount: token_amount,
        })))
    }

    /// Plain payment to the crowdsale: buys tokens for the sender.
    pub fn receive(&mut self, caller: &Address, value: Decimal) -> Result<ContractEvent, CrowdsaleError> {
        self.buy_tokens(caller, *caller, value)
    }

    /// Record a purchase paid outside the native currency. Manager-only.
    pub fn non_eth_purchase(
        &mut self,
        caller: &Address,
        investment_type: u8,
        beneficiary: Address,
        token_amount: Decimal,
    ) -> Result<ContractEvent, CrowdsaleError> {
        self.check_manager(caller)?;
        self.check_stage("non_eth_purchase", CrowdsaleStage::Contribution)?;
        Self::check_allocation(&beneficiary, token_amount)?;
        self.check_cap(token_amount)?;

        let investment_id = self.push_investment(*caller, beneficiary, Decimal::ZERO, token_amount);
        Ok(self.emit(ContractEvent::NonEthTokenPurchase(NonEthTokenPurchase {
            investment_id,
            investment_type,
            beneficiary,
            token_amount,
        })))
    }

    // ───────────────────────── Confirmation ─────────────────────────

    /// Confirm an investment. Manager-only, confirmation window only.
    pub fn confirm_payment(
        &mut self,
        caller: &Address,
        investment_id: InvestmentId,
    ) -> Result<ContractEvent, CrowdsaleError> {
        let mut events = self.set_confirmation(caller, &[investment_id], true, "confirm_payment")?;
        events.pop().ok_or(CrowdsaleError::EmptyBatch)
    }

    /// Confirm several investments; nothing changes if any id is invalid.
    pub fn batch_confirm_payments(
        &mut self,
        caller: &Address,
        investment_ids: &[InvestmentId],
    ) -> Result<Vec<ContractEvent>, CrowdsaleError> {
        self.set_confirmation(caller, investment_ids, true, "batch_confirm_payments")
    }

    /// Withdraw a confirmation. Manager-only, confirmation window only.
    pub fn un_confirm_payment(
        &mut self,
        caller: &Address,
        investment_id: InvestmentId,
    ) -> Result<ContractEvent, CrowdsaleError> {
        let mut events = self.set_confirmation(caller, &[investment_id], false, "un_confirm_payment")?;
        events.pop().ok_or(CrowdsaleError::EmptyBatch)
    }

    /// Close the confirmation window ahead of schedule. Manager-only, once.
    pub fn finalize_confirmation_period(&mut self, caller: &Address) -> Result<ContractEvent, CrowdsaleError> {
        self.check_manager(caller)?;
        if self.confirmation_period_finalized {
            return Err(CrowdsaleError::ConfirmationAlreadyFinalized);
        }
        self.check_stage("finalize_confirmation_period", CrowdsaleStage::Confirmation)?;

        let now = self.clock.now();
        self.confirmation_period_finalized = true;
        info!(finalized_at = now, "Confirmation period finalized early");
        Ok(self.emit(ContractEvent::ConfirmationPeriodFinalized(
            ConfirmationPeriodFinalized { finalized_at: now },
        )))
    }

    fn set_confirmation(
        &mut self,
        caller: &Address,
        investment_ids: &[InvestmentId],
        confirmed: bool,
        operation: &'static str,
    ) -> Result<Vec<ContractEvent>, CrowdsaleError> {
        self.check_manager(caller)?;
        self.check_stage(operation, CrowdsaleStage::Confirmation)?;
        if investment_ids.is_empty() {
            return Err(CrowdsaleError::EmptyBatch);
        }
        for &id in investment_ids {
            let investment = self.lookup(id)?;
            if investment.attempted_settlement {
                return Err(CrowdsaleError::AlreadySettled(id));
            }
        }

        let mut events = Vec::with_capacity(investment_ids.len());
        for &id in investment_ids {
            let investment = &mut self.investments[id as usize];
            investment.confirmed = confirmed;
            let investor = investment.investor;
            debug!(investment_id = id, confirmed, "Investment confirmation changed");
            events.push(self.emit(ContractEvent::ChangedInvestmentConfirmation(
                ChangedInvestmentConfirmation {
                    investment_id: id,
                    investor,
                    confirmed,
                },
            )));
        }
        Ok(events)
    }

    // ───────────────────────── Settlement ─────────────────────────

    /// Settle one investment. Anyone may call once confirmation is over.
    ///
    /// The investment must be the first one or follow an already attempted one.
    pub fn settle_investment(&mut self, investment_id: InvestmentId) -> Result<ContractEvent, CrowdsaleError> {
        self.check_stage("settle_investment", CrowdsaleStage::Settlement)?;
        self.plan_settlement(&[investment_id]).map_err(|e| {
            warn!(investment_id, error = %e, "Settlement rejected");
            e
        })?;
        let mut events = self.apply_settlements(&[investment_id])?;
        events.pop().ok_or(CrowdsaleError::EmptyBatch)
    }

    /// Settle several investments in non-decreasing id order.
    ///
    /// The whole batch is validated before the first settlement is applied.
    /// A collaborator failure reverts the settlements already applied.
    pub fn batch_settle_investments(
        &mut self,
        investment_ids: &[InvestmentId],
    ) -> Result<Vec<ContractEvent>, CrowdsaleError> {
        self.check_stage("batch_settle_investments", CrowdsaleStage::Settlement)?;
        if investment_ids.is_empty() {
            return Err(CrowdsaleError::EmptyBatch);
        }
        if let Some(pair) = investment_ids.windows(2).find(|pair| pair[1] < pair[0]) {
            warn!(ids = ?investment_ids, "Settlement batch out of order");
            return Err(CrowdsaleError::SettlementOutOfOrder(pair[1]));
        }
        self.plan_settlement(investment_ids).map_err(|e| {
            warn!(ids = ?investment_ids, error = %e, "Settlement batch rejected");
            e
        })?;

        self.apply_settlements(investment_ids)
    }

    /// Validate a settlement sequence against current state without mutating it.
    fn plan_settlement(&self, investment_ids: &[InvestmentId]) -> Result<(), CrowdsaleError> {
        let mut attempted: HashSet<InvestmentId> = HashSet::new();
        let mut refunds: HashMap<Address, Decimal> = HashMap::new();

        for &id in investment_ids {
            let investment = self.lookup(id)?;
            if investment.attempted_settlement || attempted.contains(&id) {
                return Err(CrowdsaleError::AlreadySettled(id));
            }
            if id > 0 {
                let previous = id - 1;
                let previous_done = self.investments[previous as usize].attempted_settlement
                    || attempted.contains(&previous);
                if !previous_done {
                    return Err(CrowdsaleError::SettlementOutOfOrder(id));
                }
            }

            if !investment.confirmed && is_positive(investment.wei_amount) {
                let owed = refunds.entry(investment.investor).or_insert(Decimal::ZERO);
                *owed = owed
                    .checked_add(investment.wei_amount)
                    .ok_or(CrowdsaleError::Overflow)?;
                let available = self.vault.deposited_of(&investment.investor);
                if available < *owed {
                    return Err(VaultError::RefundExceedsDeposit {
                        beneficiary: investment.investor,
                        required: *owed,
                        available,
                    }
                    .into());
                }
            }
            attempted.insert(id);
        }
        Ok(())
    }

    /// Mint or refund every investment of a validated sequence, then record
    /// them as settled. Nothing is recorded unless every effect succeeds.
    fn apply_settlements(&mut self, investment_ids: &[InvestmentId]) -> Result<Vec<ContractEvent>, CrowdsaleError> {
        let settled: Vec<Investment> = investment_ids
            .iter()
            .map(|&id| self.investments[id as usize].clone())
            .collect();

        let mut tokens_minted = self.tokens_minted;
        let mut tokens_to_mint = self.tokens_to_mint;
        for investment in &settled {
            if investment.confirmed {
                tokens_minted = tokens_minted
                    .checked_add(investment.token_amount)
                    .ok_or(CrowdsaleError::Overflow)?;
            }
            tokens_to_mint = tokens_to_mint
                .checked_sub(investment.token_amount)
                .ok_or(CrowdsaleError::Overflow)?;
        }

        let owner = self.address;
        let mut applied: Vec<SettlementEffect> = Vec::with_capacity(settled.len());
        for (&investment_id, investment) in investment_ids.iter().zip(&settled) {
            let result = if investment.confirmed {
                self.token
                    .mint(&investment.beneficiary, investment.token_amount)
                    .map(|()| {
                        Some(SettlementEffect::Minted {
                            beneficiary: investment.beneficiary,
                            amount: investment.token_amount,
                        })
                    })
                    .map_err(CrowdsaleError::from)
            } else if is_positive(investment.wei_amount) {
                self.vault
                    .refund(&owner, investment.investor, investment.wei_amount)
                    .map(|_| {
                        Some(SettlementEffect::Refunded {
                            investor: investment.investor,
                            amount: investment.wei_amount,
                        })
                    })
                    .map_err(CrowdsaleError::from)
            } else {
                Ok(None)
            };

            match result {
                Ok(effect) => applied.extend(effect),
                Err(e) => {
                    warn!(investment_id, error = %e, reverted = applied.len(), "Settlement failed");
                    self.revert_settlements(&applied);
                    return Err(e);
                }
            }
        }

        self.tokens_minted = tokens_minted;
        self.tokens_to_mint = tokens_to_mint;

        let mut events = Vec::with_capacity(settled.len());
        for (&investment_id, investment) in investment_ids.iter().zip(settled) {
            let record = &mut self.investments[investment_id as usize];
            record.attempted_settlement = true;
            record.completed_settlement = investment.confirmed;

            let refunded = if investment.confirmed {
                Decimal::ZERO
            } else {
                investment.wei_amount
            };
            debug!(
                investment_id,
                completed = investment.confirmed,
                tokens = %investment.token_amount,
                %refunded,
                "Investment settled"
            );
            events.push(self.emit(ContractEvent::InvestmentSettled(InvestmentSettled {
                investment_id,
                beneficiary: investment.beneficiary,
                completed: investment.confirmed,
                token_amount: investment.token_amount,
                refunded,
            })));
        }
        Ok(events)
    }

    /// Undo applied effects in reverse order.
    fn revert_settlements(&mut self, applied: &[SettlementEffect]) {
        let owner = self.address;
        for effect in applied.iter().rev() {
            let reverted = match *effect {
                SettlementEffect::Minted { beneficiary, amount } => {
                    self.token.burn(&beneficiary, amount).map_err(CrowdsaleError::from)
                }
                SettlementEffect::Refunded { investor, amount } => self
                    .vault
                    .deposit(&owner, &investor, investor, amount)
                    .map(|_| ())
                    .map_err(CrowdsaleError::from),
            };
            if let Err(e) = reverted {
                error!(?effect, error = %e, "Settlement revert failed");
            }
        }
    }

    // ───────────────────────── Rounds ─────────────────────────

    /// Close the round: forward the vault to the wallet and enable token transfers.
    ///
    /// Requires the confirmation period to be over and every investment settled.
    pub fn finalize(&mut self) -> Result<ContractEvent, CrowdsaleError> {
        if self.finalized {
            return Err(CrowdsaleError::AlreadyFinalized);
        }
        self.check_stage("finalize", CrowdsaleStage::Settlement)?;
        let unsettled = self
            .investments
            .iter()
            .filter(|inv| !inv.attempted_settlement)
            .count();
        if unsettled > 0 {
            return Err(CrowdsaleError::UnsettledInvestments { count: unsettled });
        }

        let owner = self.address;
        let forwarded = self.vault.balance();
        self.vault.close(&owner)?;
        self.token.set_transfers_enabled(true);
        self.finalized = true;

        info!(
            tokens_minted = %self.tokens_minted,
            %forwarded,
            "Crowdsale finalized"
        );
        Ok(self.emit(ContractEvent::CrowdsaleFinalized(CrowdsaleFinalized {
            tokens_minted: self.tokens_minted,
            forwarded,
        })))
    }

    /// Open a further sale round. Owner-only, after finalization, never once disabled.
    pub fn new_crowdsale(
        &mut self,
        caller: &Address,
        start_time: Timestamp,
        duration: i64,
        rate: Decimal,
        delta_cap: Decimal,
    ) -> Result<ContractEvent, CrowdsaleError> {
        if !self.roster.is_owner(caller) {
            return Err(CrowdsaleError::NotOwner);
        }
        if self.disabled {
            return Err(CrowdsaleError::Disabled);
        }
        if !self.finalized {
            return Err(CrowdsaleError::NotFinalized);
        }
        let now = self.clock.now();
        if start_time <= now {
            return Err(CrowdsaleError::InvalidParameter("start time must be in the future".into()));
        }
        if duration <= 0 {
            return Err(CrowdsaleError::InvalidParameter("duration must be positive".into()));
        }
        if !is_positive(rate) {
            return Err(CrowdsaleError::InvalidParameter("rate must be positive".into()));
        }
        if !is_positive(delta_cap) {
            return Err(CrowdsaleError::InvalidParameter("delta cap must be positive".into()));
        }
        let closing_time = start_time.checked_add(duration).ok_or(CrowdsaleError::Overflow)?;
        let token_cap = self.token_cap.checked_add(delta_cap).ok_or(CrowdsaleError::Overflow)?;

        let owner = self.address;
        self.vault.open(&owner)?;

        self.opening_time = start_time;
        self.closing_time = closing_time;
        self.rate = rate;
        self.token_cap = token_cap;
        self.confirmation_period_finalized = false;
        self.finalized = false;

        info!(
            start_time,
            closing_time,
            rate = %rate,
            token_cap = %token_cap,
            next_investment_id = self.investments.len(),
            "New crowdsale round opened"
        );
        Ok(self.emit(ContractEvent::NewCrowdsaleRound(NewCrowdsaleRound {
            start_time,
            duration,
            rate,
            delta_cap,
        })))
    }

    /// Permanently block further rounds. Returns `false` if already disabled.
    pub fn disable(&mut self) -> bool {
        if self.disabled {
            return false;
        }
        let now = self.clock.now();
        self.disabled = true;
        info!(disabled_at = now, "Crowdsale disabled");
        self.emit(ContractEvent::CrowdsaleDisabled(CrowdsaleDisabled { disabled_at: now }));
        true
    }

    // ───────────────────────── Queries ─────────────────────────

    /// Stage of the current round at the current time.
    pub fn current_stage(&self) -> CrowdsaleStage {
        self.stage_at(self.clock.now())
    }

    fn stage_at(&self, now: Timestamp) -> CrowdsaleStage {
        if self.finalized {
            CrowdsaleStage::Finalized
        } else if now < self.opening_time {
            CrowdsaleStage::BeforeOpening
        } else if now <= self.closing_time {
            CrowdsaleStage::Contribution
        } else if !self.confirmation_over_at(now) {
            CrowdsaleStage::Confirmation
        } else {
            CrowdsaleStage::Settlement
        }
    }

    fn confirmation_over_at(&self, now: Timestamp) -> bool {
        self.confirmation_period_finalized
            || now > self.closing_time.saturating_add(self.confirmation_period)
    }

    /// Whether the confirmation window of the current round is over.
    pub fn confirmation_period_over(&self) -> bool {
        self.confirmation_over_at(self.clock.now())
    }

    pub fn has_closed(&self) -> bool {
        self.clock.now() > self.closing_time
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_manager(&self, who: &Address) -> bool {
        self.roster.is_manager(who)
    }

    pub fn owner(&self) -> Address {
        self.roster.owner()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn opening_time(&self) -> Timestamp {
        self.opening_time
    }

    pub fn closing_time(&self) -> Timestamp {
        self.closing_time
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn confirmation_period(&self) -> i64 {
        self.confirmation_period
    }

    pub fn token_cap(&self) -> Decimal {
        self.token_cap
    }

    pub fn tokens_minted(&self) -> Decimal {
        self.tokens_minted
    }

    pub fn tokens_to_mint(&self) -> Decimal {
        self.tokens_to_mint
    }

    pub fn investments_len(&self) -> usize {
        self.investments.len()
    }

    pub fn investment(&self, investment_id: InvestmentId) -> Option<&Investment> {
        self.investments.get(usize::try_from(investment_id).ok()?)
    }

    pub fn investments(&self) -> &[Investment] {
        &self.investments
    }

    /// The escrow vault of the current round.
    pub fn vault(&self) -> &EscrowVault {
        &self.vault
    }

    // ───────────────────────── Events ─────────────────────────

    /// Get all emitted events.
    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Drain all events (consume and clear).
    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: ContractEvent) -> ContractEvent {
        self.events.push(event.clone());
        event
    }

    // ───────────────────────── Internal ─────────────────────────

    fn lookup(&self, investment_id: InvestmentId) -> Result<&Investment, CrowdsaleError> {
        self.investment(investment_id)
            .ok_or(CrowdsaleError::InvestmentNotFound(investment_id))
    }

    fn record_presale(&mut self, beneficiary: Address, token_amount: Decimal) -> ContractEvent {
        let owner = self.roster.owner();
        let investment_id = self.push_investment(owner, beneficiary, Decimal::ZERO, token_amount);
        self.emit(ContractEvent::PresalePurchase(PresalePurchase {
            investment_id,
            beneficiary,
            token_amount,
        }))
    }

    fn push_investment(
        &mut self,
        investor: Address,
        beneficiary: Address,
        wei_amount: Decimal,
        token_amount: Decimal,
    ) -> InvestmentId {
        let investment_id = self.investments.len() as InvestmentId;
        self.investments.push(Investment {
            investor,
            beneficiary,
            wei_amount,
            token_amount,
            confirmed: false,
            attempted_settlement: false,
            completed_settlement: false,
        });
        self.tokens_to_mint += token_amount;
        debug!(
            investment_id,
            investor = %investor,
            beneficiary = %beneficiary,
            wei = %wei_amount,
            tokens = %token_amount,
            "Investment recorded"
        );
        investment_id
    }

    fn check_manager(&self, caller: &Address) -> Result<(), CrowdsaleError> {
        if !self.roster.is_manager(caller) {
            return Err(CrowdsaleError::NotManager);
        }
        Ok(())
    }

    fn check_presale(&self, caller: &Address) -> Result<(), CrowdsaleError> {
        if !self.roster.is_owner(caller) {
            return Err(CrowdsaleError::NotOwner);
        }
        self.check_stage("mint_presale_tokens", CrowdsaleStage::BeforeOpening)
    }

    fn check_stage(&self, operation: &'static str, expected: CrowdsaleStage) -> Result<(), CrowdsaleError> {
        let stage = self.current_stage();
        if stage != expected {
            return Err(CrowdsaleError::InvalidStage { operation, stage });
        }
        Ok(())
    }

    fn check_allocation(beneficiary: &Address, token_amount: Decimal) -> Result<(), CrowdsaleError> {
        if beneficiary.is_zero() {
            return Err(CrowdsaleError::InvalidBeneficiary);
        }
        if !is_positive(token_amount) {
            return Err(CrowdsaleError::InvalidAmount);
        }
        Ok(())
    }

    fn check_cap(&self, additional: Decimal) -> Result<(), CrowdsaleError> {
        let committed = self
            .tokens_minted
            .checked_add(self.tokens_to_mint)
            .ok_or(CrowdsaleError::Overflow)?;
        let remaining = self.token_cap - committed;
        if additional > remaining {
            return Err(CrowdsaleError::CapExceeded {
                requested: additional,
                remaining,
            });
        }
        Ok(())
    }
}
