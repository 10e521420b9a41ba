//! Liquidation Wallet — pull payments in the payout token
//!
//! The payout engine credits payees here; payees withdraw themselves.
//! - `authorize_payment`: owner (payout engine) only
//! - `withdraw_payments`: any payee with a pending balance
//! - `deposit_remainding_funds`: owner only, sweeps the whole token balance
//! - Direct transfers are rejected

use realcoin_types::ids::Address;
use realcoin_types::numeric::is_positive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::WalletError;
use crate::events::{ContractEvent, PaymentAuthorized, PaymentWithdrawn};
use crate::ledger::TokenLedger;

/// Pull-payment escrow holding the payout token.
pub struct LiquidationWallet {
    owner: Address,
    address: Address,
    token: Arc<dyn TokenLedger>,
    /// Pending payments per payee
    payments: HashMap<Address, Decimal>,
    total_payments: Decimal,
    /// Emitted events log (append-only)
    events: Vec<ContractEvent>,
}

impl std::fmt::Debug for LiquidationWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidationWallet")
            .field("owner", &self.owner)
            .field("address", &self.address)
            .field("token", &self.token.address())
            .field("total_payments", &self.total_payments)
            .finish()
    }
}

impl LiquidationWallet {
    pub fn new(owner: Address, address: Address, token: Arc<dyn TokenLedger>) -> Result<Self, WalletError> {
        if owner.is_zero() || address.is_zero() || token.address().is_zero() {
            return Err(WalletError::InvalidAddress);
        }
        Ok(Self {
            owner,
            address,
            token,
            payments: HashMap::new(),
            total_payments: Decimal::ZERO,
            events: Vec::new(),
        })
    }

    /// Credit `amount` to `payee`. Owner-only.
    pub fn authorize_payment(
        &mut self,
        caller: &Address,
        payee: Address,
        amount: Decimal,
    ) -> Result<ContractEvent, WalletError> {
        let (pending, total) = self.check_payment(caller, &payee, amount)?;
        self.payments.insert(payee, pending);
        self.total_payments = total;
        debug!(payee = %payee, %amount, "Payment authorized");

        let event = ContractEvent::PaymentAuthorized(PaymentAuthorized { payee, amount });
        self.events.push(event.clone());
        Ok(event)
    }

    /// Validate a payment without recording it; returns the new pending
    /// amount of `payee` and the new total.
    pub fn check_payment(
        &self,
        caller: &Address,
        payee: &Address,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), WalletError> {
        self.check_owner(caller)?;
        if payee.is_zero() {
            return Err(WalletError::InvalidAddress);
        }
        if !is_positive(amount) {
            return Err(WalletError::InvalidAmount);
        }
        let pending = self
            .payments(payee)
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        let total = self
            .total_payments
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        Ok((pending, total))
    }

    /// Pay out everything pending for `caller`.
    pub fn withdraw_payments(&mut self, caller: &Address) -> Result<ContractEvent, WalletError> {
        let amount = self.payments(caller);
        if !is_positive(amount) {
            return Err(WalletError::NoPayments(*caller));
        }
        let total = self
            .total_payments
            .checked_sub(amount)
            .ok_or(WalletError::Overflow)?;

        self.token.transfer(&self.address, caller, amount)?;

        self.payments.remove(caller);
        self.total_payments = total;
        debug!(payee = %caller, %amount, "Payment withdrawn");

        let event = ContractEvent::PaymentWithdrawn(PaymentWithdrawn {
            payee: *caller,
            amount,
        });
        self.events.push(event.clone());
        Ok(event)
    }

    /// Sweep the whole token balance to `destination`. Owner-only.
    ///
    /// Pending payments stay recorded but are no longer covered.
    pub fn deposit_remainding_funds(
        &mut self,
        caller: &Address,
        destination: Address,
    ) -> Result<Decimal, WalletError> {
        self.check_owner(caller)?;
        if destination.is_zero() {
            return Err(WalletError::InvalidAddress);
        }
        let balance = self.balance();
        if !is_positive(balance) {
            return Err(WalletError::EmptyBalance);
        }

        self.token.transfer(&self.address, &destination, balance)?;
        info!(destination = %destination, amount = %balance, "Remaining payout funds swept");
        Ok(balance)
    }

    /// Replace the payout token. Owner-only.
    pub fn set_token(&mut self, caller: &Address, token: Arc<dyn TokenLedger>) -> Result<(), WalletError> {
        self.check_owner(caller)?;
        if token.address().is_zero() {
            return Err(WalletError::InvalidAddress);
        }
        info!(token = %token.address(), "Payout token replaced");
        self.token = token;
        Ok(())
    }

    /// Reject value sent to the wallet directly.
    pub fn receive(&self, _from: &Address, _amount: Decimal) -> Result<(), WalletError> {
        Err(WalletError::DirectTransferRejected)
    }

    // ───────────────────────── Queries ─────────────────────────

    /// Pending payment of `payee`.
    pub fn payments(&self, payee: &Address) -> Decimal {
        self.payments.get(payee).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_payments(&self) -> Decimal {
        self.total_payments
    }

    /// Payout tokens held by the wallet.
    pub fn balance(&self) -> Decimal {
        self.token.balance_of(&self.address)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token_address(&self) -> Address {
        self.token.address()
    }

    /// Get all emitted events.
    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Drain all events (consume and clear).
    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }

    fn check_owner(&self, caller: &Address) -> Result<(), WalletError> {
        if *caller != self.owner {
            return Err(WalletError::Unauthorized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use realcoin_types::time::ManualClock;

    fn setup_wallet() -> (Arc<InMemoryLedger>, LiquidationWallet, Address) {
        let clock = Arc::new(ManualClock::new(1));
        let weth = Arc::new(InMemoryLedger::new(Address::from_label("WETH"), clock));
        let owner = Address::from_label("liquidator");
        let wallet = LiquidationWallet::new(owner, Address::from_label("liquidation-wallet"), weth.clone()).unwrap();
        weth.mint(&wallet.address(), Decimal::from(100_000)).unwrap();
        (weth, wallet, owner)
    }

    #[test]
    fn test_new_rejects_null_identities() {
        let clock = Arc::new(ManualClock::new(1));
        let weth = Arc::new(InMemoryLedger::new(Address::ZERO, clock));
        let result = LiquidationWallet::new(
            Address::from_label("liquidator"),
            Address::from_label("liquidation-wallet"),
            weth,
        );
        assert!(matches!(result, Err(WalletError::InvalidAddress)));
    }

    #[test]
    fn test_authorize_and_withdraw() {
        let (weth, mut wallet, owner) = setup_wallet();
        let payee = Address::from_label("investor");

        wallet.authorize_payment(&owner, payee, Decimal::from(1_000)).unwrap();
        assert_eq!(wallet.payments(&payee), Decimal::from(1_000));

        wallet.withdraw_payments(&payee).unwrap();
        assert_eq!(weth.balance_of(&payee), Decimal::from(1_000));
        assert_eq!(wallet.payments(&payee), Decimal::ZERO);
        assert_eq!(wallet.total_payments(), Decimal::ZERO);

        assert_eq!(
            wallet.withdraw_payments(&payee),
            Err(WalletError::NoPayments(payee))
        );
    }

    #[test]
    fn test_authorize_owner_only() {
        let (_, mut wallet, _) = setup_wallet();
        let payee = Address::from_label("investor");
        assert_eq!(
            wallet.authorize_payment(&payee, payee, Decimal::from(1)),
            Err(WalletError::Unauthorized)
        );
    }

    #[test]
    fn test_withdraw_uncovered_payment_keeps_credit() {
        let (_, mut wallet, owner) = setup_wallet();
        let payee = Address::from_label("investor");
        wallet.authorize_payment(&owner, payee, Decimal::from(200_000)).unwrap();

        let result = wallet.withdraw_payments(&payee);
        assert!(matches!(result, Err(WalletError::Ledger(_))));
        assert_eq!(wallet.payments(&payee), Decimal::from(200_000));
    }

    #[test]
    fn test_deposit_remainding_funds() {
        let (weth, mut wallet, owner) = setup_wallet();
        let destination = Address::from_label("company-wallet");

        let swept = wallet.deposit_remainding_funds(&owner, destination).unwrap();
        assert_eq!(swept, Decimal::from(100_000));
        assert_eq!(weth.balance_of(&destination), Decimal::from(100_000));
        assert_eq!(wallet.balance(), Decimal::ZERO);

        assert_eq!(
            wallet.deposit_remainding_funds(&owner, destination),
            Err(WalletError::EmptyBalance)
        );
    }

    #[test]
    fn test_check_payment_leaves_state() {
        let (_, wallet, owner) = setup_wallet();
        let payee = Address::from_label("investor");
        assert_eq!(
            wallet.check_payment(&owner, &payee, Decimal::from(7)),
            Ok((Decimal::from(7), Decimal::from(7)))
        );
        assert_eq!(
            wallet.check_payment(&owner, &payee, Decimal::ZERO),
            Err(WalletError::InvalidAmount)
        );
        assert_eq!(wallet.payments(&payee), Decimal::ZERO);
        assert_eq!(wallet.total_payments(), Decimal::ZERO);
    }

    #[test]
    fn test_receive_rejected() {
        let (_, wallet, owner) = setup_wallet();
        assert_eq!(
            wallet.receive(&owner, Decimal::from(5)),
            Err(WalletError::DirectTransferRejected)
        );
    }

    #[test]
    fn test_set_token() {
        let (_, mut wallet, owner) = setup_wallet();
        let clock = Arc::new(ManualClock::new(1));
        let other = Arc::new(InMemoryLedger::new(Address::from_label("DAI"), clock));
        assert_eq!(
            wallet.set_token(&Address::from_label("eve"), other.clone()),
            Err(WalletError::Unauthorized)
        );
        wallet.set_token(&owner, other).unwrap();
        assert_eq!(wallet.token_address(), Address::from_label("DAI"));
        assert_eq!(wallet.balance(), Decimal::ZERO);
    }
}
