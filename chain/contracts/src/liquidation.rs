//! Liquidation Payout Engine — claim phases after a passed liquidation vote
//!
//! Phases are derived from the clock and the payout start time:
//! - Inactive until triggered (by a manager or the voting engine)
//! - Active until `start_time`; managers may still tune the parameters
//! - ClaimFunds: principal tokens are burned for a payout plus vouchers
//! - ClaimUnclaimed: vouchers are burned for the unclaimed-funds payout
//! - ClaimRemainder: a manager sweeps what is left and the engine ends
//!
//! Payouts are never pushed; they are credited to the [`LiquidationWallet`]
//! and withdrawn by the payees.

use realcoin_types::ids::Address;
use realcoin_types::numeric::{convert, is_positive};
use realcoin_types::time::{Clock, Timestamp, DAY, YEAR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::LiquidationError;
use crate::events::{
    ChangedManager, ContractEvent, FundsClaimed, LiquidationTriggered, PayoutParameter,
    PayoutParameterChanged, RemainderClaimed, UnclaimedFundsClaimed,
};
use crate::ledger::TokenLedger;
use crate::security::{ManagerRoster, OnceRegistry};
use crate::wallet::LiquidationWallet;

/// Default delay between the trigger and the first claim phase.
pub const DEFAULT_START_DELAY: i64 = 30 * DAY;

fn default_address() -> Address {
    Address::from_label("realcoin-liquidator")
}

fn default_wallet_address() -> Address {
    Address::from_label("realcoin-liquidation-wallet")
}

fn default_duration() -> i64 {
    YEAR
}

fn default_start_delay() -> i64 {
    DEFAULT_START_DELAY
}

fn default_rate() -> Decimal {
    Decimal::ONE
}

/// Payout engine deployment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    pub owner: Address,
    #[serde(default = "default_address")]
    pub address: Address,
    /// Identity of the pull-payment wallet
    #[serde(default = "default_wallet_address")]
    pub wallet_address: Address,
    #[serde(default = "default_duration")]
    pub claim_funds_duration: i64,
    /// Half-length of the window ending the unclaimed phase
    #[serde(default = "default_duration")]
    pub claim_unclaimed_duration: i64,
    #[serde(default = "default_start_delay")]
    pub start_delay: i64,
    /// Payout tokens per principal token
    #[serde(default = "default_rate")]
    pub rate: Decimal,
    /// Payout tokens per voucher
    #[serde(default = "default_rate")]
    pub unclaimed_rate: Decimal,
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self::new(Address::from_label("realcoin-owner"))
    }
}

impl LiquidationConfig {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            address: default_address(),
            wallet_address: default_wallet_address(),
            claim_funds_duration: YEAR,
            claim_unclaimed_duration: YEAR,
            start_delay: DEFAULT_START_DELAY,
            rate: Decimal::ONE,
            unclaimed_rate: Decimal::ONE,
        }
    }

    /// Load from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, LiquidationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LiquidationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LiquidationError> {
        let invalid = |msg: &str| Err(LiquidationError::InvalidConfig(msg.to_string()));
        if self.owner.is_zero() || self.address.is_zero() || self.wallet_address.is_zero() {
            return invalid("owner, engine and wallet addresses must be set");
        }
        if self.claim_funds_duration <= 0 || self.claim_unclaimed_duration <= 0 {
            return invalid("claim durations must be positive");
        }
        if self.claim_unclaimed_duration.saturating_mul(2) <= self.claim_funds_duration {
            return invalid("unclaimed phase would be empty");
        }
        if self.start_delay < 0 {
            return invalid("start delay must not be negative");
        }
        if !is_positive(self.rate) || !is_positive(self.unclaimed_rate) {
            return invalid("rates must be positive");
        }
        Ok(())
    }
}

/// Time-derived payout phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationState {
    Inactive,
    /// Triggered, waiting for `start_time`
    Active,
    /// `[start, start + claim_funds_duration)`
    ClaimFunds,
    /// `[start + claim_funds_duration, start + 2 * claim_unclaimed_duration)`
    ClaimUnclaimed,
    ClaimRemainder,
}

/// Liquidation payout engine.
///
/// Holds the principal token it burns, the voucher token it issues and the
/// pull-payment wallet that owns the payout token.
pub struct LiquidationEngine {
    address: Address,
    roster: ManagerRoster,
    enabled: bool,
    ended: bool,
    start_time: Timestamp,
    start_delay: i64,
    claim_funds_duration: i64,
    claim_unclaimed_duration: i64,
    rate: Decimal,
    unclaimed_rate: Decimal,
    claimed_funds: OnceRegistry<Address>,
    claimed_unclaimed: OnceRegistry<Address>,
    principal: Arc<dyn TokenLedger>,
    voucher: Arc<dyn TokenLedger>,
    wallet: LiquidationWallet,
    clock: Arc<dyn Clock>,
    /// Emitted events log (append-only)
    events: Vec<ContractEvent>,
}

impl std::fmt::Debug for LiquidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidationEngine")
            .field("address", &self.address)
            .field("enabled", &self.enabled)
            .field("ended", &self.ended)
            .field("start_time", &self.start_time)
            .field("rate", &self.rate)
            .field("unclaimed_rate", &self.unclaimed_rate)
            .field("wallet", &self.wallet)
            .finish()
    }
}

impl LiquidationEngine {
    pub fn new(
        config: LiquidationConfig,
        principal: Arc<dyn TokenLedger>,
        voucher: Arc<dyn TokenLedger>,
        payout: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LiquidationError> {
        config.validate()?;
        let wallet = LiquidationWallet::new(config.address, config.wallet_address, payout)?;

        info!(
            address = %config.address,
            principal = %principal.address(),
            voucher = %voucher.address(),
            "Liquidation engine deployed"
        );

        Ok(Self {
            address: config.address,
            roster: ManagerRoster::new(config.owner),
            enabled: false,
            ended: false,
            start_time: 0,
            start_delay: config.start_delay,
            claim_funds_duration: config.claim_funds_duration,
            claim_unclaimed_duration: config.claim_unclaimed_duration,
            rate: config.rate,
            unclaimed_rate: config.unclaimed_rate,
            claimed_funds: OnceRegistry::new(),
            claimed_unclaimed: OnceRegistry::new(),
            principal,
            voucher,
            wallet,
            clock,
            events: Vec::new(),
        })
    }

    /// Grant or revoke manager rights. Owner-only.
    pub fn set_manager(
        &mut self,
        caller: &Address,
        manager: Address,
        active: bool,
    ) -> Result<ContractEvent, LiquidationError> {
        if manager.is_zero() {
            return Err(LiquidationError::InvalidConfig("manager must not be the null address".into()));
        }
        if !self.roster.set_manager(caller, manager, active) {
            return Err(LiquidationError::NotManager);
        }
        debug!(manager = %manager, active, "Manager changed");
        Ok(self.emit(ContractEvent::ChangedManager(ChangedManager { manager, active })))
    }

    // ───────────────────────── Trigger ─────────────────────────

    /// Start the liquidation. Manager-only, once.
    pub fn trigger_liquidation(&mut self, caller: &Address) -> Result<ContractEvent, LiquidationError> {
        self.check_manager(caller)?;
        self.trigger()
    }

    /// Trigger path used by the voting capability.
    pub(crate) fn trigger(&mut self) -> Result<ContractEvent, LiquidationError> {
        if self.enabled {
            return Err(LiquidationError::AlreadyTriggered);
        }
        let now = self.clock.now();
        let start_time = now
            .checked_add(self.start_delay)
            .ok_or(LiquidationError::Overflow)?;

        self.enabled = true;
        self.start_time = start_time;
        info!(timestamp = now, start_time, "Liquidation triggered");

        Ok(self.emit(ContractEvent::LiquidationTriggered(LiquidationTriggered {
            timestamp: now,
            start_time,
        })))
    }

    // ───────────────────────── Parameters ─────────────────────────

    /// Move the payout start. Only while still `Active` and only into the future.
    pub fn set_start_time(
        &mut self,
        caller: &Address,
        start_time: Timestamp,
    ) -> Result<ContractEvent, LiquidationError> {
        self.check_configurable(caller)?;
        self.check_state("set_start_time", LiquidationState::Active)?;
        if start_time <= self.clock.now() {
            return Err(LiquidationError::InvalidStartTime(start_time));
        }
        self.start_time = start_time;
        info!(start_time, "Payout start time changed");
        Ok(self.parameter_changed(PayoutParameter::StartTime(start_time)))
    }

    pub fn set_rate(&mut self, caller: &Address, rate: Decimal) -> Result<ContractEvent, LiquidationError> {
        self.check_configurable(caller)?;
        if !is_positive(rate) {
            return Err(LiquidationError::InvalidRate);
        }
        self.rate = rate;
        info!(%rate, "Payout rate changed");
        Ok(self.parameter_changed(PayoutParameter::Rate(rate)))
    }

    pub fn set_unclaimed_rate(
        &mut self,
        caller: &Address,
        rate: Decimal,
    ) -> Result<ContractEvent, LiquidationError> {
        self.check_configurable(caller)?;
        if !is_positive(rate) {
            return Err(LiquidationError::InvalidRate);
        }
        self.unclaimed_rate = rate;
        info!(%rate, "Unclaimed payout rate changed");
        Ok(self.parameter_changed(PayoutParameter::UnclaimedRate(rate)))
    }

    /// Replace the payout token held by the wallet.
    pub fn set_new_erc20_token(
        &mut self,
        caller: &Address,
        token: Arc<dyn TokenLedger>,
    ) -> Result<ContractEvent, LiquidationError> {
        self.check_configurable(caller)?;
        let token_address = token.address();
        self.wallet.set_token(&self.address, token)?;
        Ok(self.parameter_changed(PayoutParameter::PayoutToken(token_address)))
    }

    // ───────────────────────── Claims ─────────────────────────

    /// Burn the principal approved to this engine; credit `amount × rate`
    /// and issue the same amount of vouchers.
    pub fn claim_funds(&mut self, caller: &Address) -> Result<ContractEvent, LiquidationError> {
        self.check_state("claim_funds", LiquidationState::ClaimFunds)?;
        if self.claimed_funds.is_used(caller) {
            warn!(claimant = %caller, "Repeated principal claim rejected");
            return Err(LiquidationError::AlreadyClaimed(*caller));
        }
        let amount = self.principal.allowance(caller, &self.address);
        if !is_positive(amount) {
            return Err(LiquidationError::NoAllowance(*caller));
        }
        let payment = self.claim_payment(caller, amount, self.rate)?;

        self.principal.burn_from(&self.address, caller, amount)?;
        if let Err(e) = self.voucher.mint(caller, amount) {
            restore_burned(self.principal.as_ref(), caller, &self.address, amount);
            return Err(e.into());
        }
        if let Err(e) = self.wallet.authorize_payment(&self.address, *caller, payment) {
            if let Err(burn) = self.voucher.burn(caller, amount) {
                error!(claimant = %caller, %amount, error = %burn, "Voucher revert failed");
            }
            restore_burned(self.principal.as_ref(), caller, &self.address, amount);
            return Err(e.into());
        }
        self.claimed_funds.mark(*caller);
        debug!(claimant = %caller, %amount, %payment, "Principal claimed");

        Ok(self.emit(ContractEvent::FundsClaimed(FundsClaimed {
            claimant: *caller,
            amount,
            payment,
        })))
    }

    /// Burn the vouchers approved to this engine; credit `amount × unclaimed_rate`.
    pub fn claim_unclaim_funds(&mut self, caller: &Address) -> Result<ContractEvent, LiquidationError> {
        self.check_state("claim_unclaim_funds", LiquidationState::ClaimUnclaimed)?;
        if self.claimed_unclaimed.is_used(caller) {
            warn!(claimant = %caller, "Repeated voucher claim rejected");
            return Err(LiquidationError::AlreadyClaimed(*caller));
        }
        let amount = self.voucher.allowance(caller, &self.address);
        if !is_positive(amount) {
            return Err(LiquidationError::NoAllowance(*caller));
        }
        let payment = self.claim_payment(caller, amount, self.unclaimed_rate)?;

        self.voucher.burn_from(&self.address, caller, amount)?;
        if let Err(e) = self.wallet.authorize_payment(&self.address, *caller, payment) {
            restore_burned(self.voucher.as_ref(), caller, &self.address, amount);
            return Err(e.into());
        }
        self.claimed_unclaimed.mark(*caller);
        debug!(claimant = %caller, %amount, %payment, "Vouchers claimed");

        Ok(self.emit(ContractEvent::UnclaimedFundsClaimed(UnclaimedFundsClaimed {
            claimant: *caller,
            amount,
            payment,
        })))
    }

    /// Sweep the wallet balance to `destination` and end the liquidation.
    pub fn claim_remainder(
        &mut self,
        caller: &Address,
        destination: Address,
    ) -> Result<ContractEvent, LiquidationError> {
        self.check_manager(caller)?;
        self.check_state("claim_remainder", LiquidationState::ClaimRemainder)?;
        if self.ended {
            return Err(LiquidationError::Ended);
        }
        if destination.is_zero() {
            return Err(LiquidationError::InvalidDestination);
        }

        let amount = self.wallet.deposit_remainding_funds(&self.address, destination)?;
        self.ended = true;
        info!(destination = %destination, %amount, "Liquidation ended");

        Ok(self.emit(ContractEvent::RemainderClaimed(RemainderClaimed {
            destination,
            amount,
        })))
    }

    /// Payout owed for `amount` at `rate`, checked against the wallet before
    /// anything is burned.
    fn claim_payment(&self, claimant: &Address, amount: Decimal, rate: Decimal) -> Result<Decimal, LiquidationError> {
        let payment = convert(amount, rate).ok_or(LiquidationError::Overflow)?;
        if !is_positive(payment) {
            warn!(claimant = %claimant, %amount, %rate, "Claim pays nothing");
            return Err(LiquidationError::ZeroPayment(*claimant));
        }
        self.wallet.check_payment(&self.address, claimant, payment)?;
        Ok(payment)
    }

    /// Withdraw the caller's pending payout from the wallet.
    pub fn withdraw_payments(&mut self, caller: &Address) -> Result<ContractEvent, LiquidationError> {
        Ok(self.wallet.withdraw_payments(caller)?)
    }

    // ───────────────────────── Queries ─────────────────────────

    /// Phase at the current time.
    pub fn current_state(&self) -> LiquidationState {
        self.state_at(self.clock.now())
    }

    pub fn state_at(&self, now: Timestamp) -> LiquidationState {
        if !self.enabled {
            return LiquidationState::Inactive;
        }
        if now < self.start_time {
            return LiquidationState::Active;
        }
        let elapsed = now.saturating_sub(self.start_time);
        if elapsed < self.claim_funds_duration {
            LiquidationState::ClaimFunds
        } else if elapsed < self.claim_unclaimed_duration.saturating_mul(2) {
            LiquidationState::ClaimUnclaimed
        } else {
            LiquidationState::ClaimRemainder
        }
    }

    /// Pending payout of `payee`.
    pub fn payments(&self, payee: &Address) -> Decimal {
        self.wallet.payments(payee)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn is_manager(&self, who: &Address) -> bool {
        self.roster.is_manager(who)
    }

    pub fn has_claimed_funds(&self, who: &Address) -> bool {
        self.claimed_funds.is_used(who)
    }

    pub fn has_claimed_unclaimed(&self, who: &Address) -> bool {
        self.claimed_unclaimed.is_used(who)
    }

    pub fn owner(&self) -> Address {
        self.roster.owner()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn unclaimed_rate(&self) -> Decimal {
        self.unclaimed_rate
    }

    pub fn claim_funds_duration(&self) -> i64 {
        self.claim_funds_duration
    }

    pub fn claim_unclaimed_duration(&self) -> i64 {
        self.claim_unclaimed_duration
    }

    pub fn wallet(&self) -> &LiquidationWallet {
        &self.wallet
    }

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

    fn parameter_changed(&mut self, parameter: PayoutParameter) -> ContractEvent {
        self.emit(ContractEvent::PayoutParameterChanged(PayoutParameterChanged { parameter }))
    }

    fn check_manager(&self, caller: &Address) -> Result<(), LiquidationError> {
        if !self.roster.is_manager(caller) {
            return Err(LiquidationError::NotManager);
        }
        Ok(())
    }

    fn check_configurable(&self, caller: &Address) -> Result<(), LiquidationError> {
        self.check_manager(caller)?;
        if !self.enabled {
            return Err(LiquidationError::NotTriggered);
        }
        if self.ended {
            return Err(LiquidationError::Ended);
        }
        Ok(())
    }

    fn check_state(&self, operation: &'static str, expected: LiquidationState) -> Result<(), LiquidationError> {
        let state = self.current_state();
        if state != expected {
            return Err(LiquidationError::InvalidState { operation, state });
        }
        Ok(())
    }
}

/// Give back tokens burned out of `holder`'s allowance to `spender`.
fn restore_burned(ledger: &dyn TokenLedger, holder: &Address, spender: &Address, amount: Decimal) {
    let restored = ledger
        .mint(holder, amount)
        .and_then(|()| ledger.approve(holder, spender, amount));
    if let Err(e) = restored {
        error!(token = %ledger.address(), holder = %holder, %amount, error = %e, "Claim revert failed");
    }
}
