//! Token ledger capability
//!
//! The engines never keep token balances themselves. They call into a
//! [`TokenLedger`]: fungible balances with historical snapshots, allowances,
//! mint/burn and a transfer-enable gate. [`InMemoryLedger`] is the reference
//! implementation used by tests and embedders.

use parking_lot::Mutex;
use realcoin_types::ids::Address;
use realcoin_types::numeric::is_positive;
use realcoin_types::time::{Clock, Timestamp};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::errors::LedgerError;

/// Fungible token ledger consumed by the contract engines.
///
/// Access control over `mint`/`burn` is the implementation's concern; the
/// engines only call them on behalf of their own policy.
pub trait TokenLedger: Send + Sync {
    /// Identity of the token contract.
    fn address(&self) -> Address;

    fn balance_of(&self, holder: &Address) -> Decimal;

    /// Balance held at the end of `time`.
    fn balance_of_at(&self, holder: &Address, time: Timestamp) -> Decimal;

    fn total_supply(&self) -> Decimal;

    fn transfers_enabled(&self) -> bool;

    fn set_transfers_enabled(&self, enabled: bool);

    fn mint(&self, to: &Address, amount: Decimal) -> Result<(), LedgerError>;

    fn burn(&self, from: &Address, amount: Decimal) -> Result<(), LedgerError>;

    fn transfer(&self, from: &Address, to: &Address, amount: Decimal) -> Result<(), LedgerError>;

    fn approve(&self, owner: &Address, spender: &Address, amount: Decimal) -> Result<(), LedgerError>;

    fn allowance(&self, owner: &Address, spender: &Address) -> Decimal;

    /// Move `amount` from `from` to `to` against the allowance granted to `spender`.
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Decimal,
    ) -> Result<(), LedgerError>;

    /// Burn `amount` of `from`'s tokens against the allowance granted to `spender`.
    ///
    /// Not subject to the transfer gate.
    fn burn_from(&self, spender: &Address, from: &Address, amount: Decimal) -> Result<(), LedgerError>;
}

/// Balance valid from `from_time` until the next checkpoint.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    from_time: Timestamp,
    balance: Decimal,
}

#[derive(Debug)]
struct LedgerState {
    checkpoints: HashMap<Address, Vec<Checkpoint>>,
    allowances: HashMap<(Address, Address), Decimal>,
    total_supply: Decimal,
    transfers_enabled: bool,
}

impl LedgerState {
    fn balance_at(&self, holder: &Address, time: Option<Timestamp>) -> Decimal {
        let Some(history) = self.checkpoints.get(holder) else {
            return Decimal::ZERO;
        };
        let idx = match time {
            Some(t) => history.partition_point(|cp| cp.from_time <= t),
            None => history.len(),
        };
        if idx == 0 {
            Decimal::ZERO
        } else {
            history[idx - 1].balance
        }
    }

    fn write_balance(&mut self, holder: Address, now: Timestamp, balance: Decimal) {
        let history = self.checkpoints.entry(holder).or_default();
        match history.last_mut() {
            Some(last) if last.from_time >= now => last.balance = balance,
            _ => history.push(Checkpoint {
                from_time: now,
                balance,
            }),
        }
    }

    fn debit(&mut self, holder: &Address, amount: Decimal, now: Timestamp) -> Result<(), LedgerError> {
        let available = self.balance_at(holder, None);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                holder: *holder,
                required: amount,
                available,
            });
        }
        let balance = available.checked_sub(amount).ok_or(LedgerError::Overflow)?;
        self.write_balance(*holder, now, balance);
        Ok(())
    }

    fn credit(&mut self, holder: &Address, amount: Decimal, now: Timestamp) -> Result<(), LedgerError> {
        let balance = self
            .balance_at(holder, None)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.write_balance(*holder, now, balance);
        Ok(())
    }

    fn check_allowance(&self, owner: &Address, spender: &Address, amount: Decimal) -> Result<(), LedgerError> {
        let available = self
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(Decimal::ZERO);
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Allowance left after spending `amount`.
    fn remaining_allowance(&self, owner: &Address, spender: &Address, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.check_allowance(owner, spender, amount)?;
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(Decimal::ZERO)
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)
    }
}

/// In-memory token ledger with balance checkpoints.
///
/// Transfers start enabled; an engine that needs a lock-up disables them.
pub struct InMemoryLedger {
    address: Address,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(address: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            address,
            clock,
            state: Mutex::new(LedgerState {
                checkpoints: HashMap::new(),
                allowances: HashMap::new(),
                total_supply: Decimal::ZERO,
                transfers_enabled: true,
            }),
        }
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("address", &self.address)
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn check_amount(amount: Decimal) -> Result<(), LedgerError> {
    if !is_positive(amount) {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

impl TokenLedger for InMemoryLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, holder: &Address) -> Decimal {
        self.state.lock().balance_at(holder, None)
    }

    fn balance_of_at(&self, holder: &Address, time: Timestamp) -> Decimal {
        self.state.lock().balance_at(holder, Some(time))
    }

    fn total_supply(&self) -> Decimal {
        self.state.lock().total_supply
    }

    fn transfers_enabled(&self) -> bool {
        self.state.lock().transfers_enabled
    }

    fn set_transfers_enabled(&self, enabled: bool) {
        self.state.lock().transfers_enabled = enabled;
        debug!(token = %self.address, enabled, "Transfer gate changed");
    }

    fn mint(&self, to: &Address, amount: Decimal) -> Result<(), LedgerError> {
        check_amount(amount)?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        state.credit(to, amount, now)?;
        state.total_supply = supply;
        debug!(token = %self.address, to = %to, %amount, "Minted");
        Ok(())
    }

    fn burn(&self, from: &Address, amount: Decimal) -> Result<(), LedgerError> {
        check_amount(amount)?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        let supply = state
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        state.debit(from, amount, now)?;
        state.total_supply = supply;
        debug!(token = %self.address, from = %from, %amount, "Burned");
        Ok(())
    }

    fn transfer(&self, from: &Address, to: &Address, amount: Decimal) -> Result<(), LedgerError> {
        check_amount(amount)?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        if !state.transfers_enabled {
            return Err(LedgerError::TransfersDisabled);
        }
        state.debit(from, amount, now)?;
        state.credit(to, amount, now)?;
        Ok(())
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.state.lock().allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Decimal {
        self.state
            .lock()
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        check_amount(amount)?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        if !state.transfers_enabled {
            return Err(LedgerError::TransfersDisabled);
        }
        let remaining = state.remaining_allowance(from, spender, amount)?;
        state.debit(from, amount, now)?;
        state.credit(to, amount, now)?;
        state.allowances.insert((*from, *spender), remaining);
        Ok(())
    }

    fn burn_from(&self, spender: &Address, from: &Address, amount: Decimal) -> Result<(), LedgerError> {
        check_amount(amount)?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        let remaining = state.remaining_allowance(from, spender, amount)?;
        let supply = state
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        state.debit(from, amount, now)?;
        state.allowances.insert((*from, *spender), remaining);
        state.total_supply = supply;
        debug!(token = %self.address, from = %from, %amount, "Burned from allowance");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realcoin_types::time::ManualClock;

    fn setup_ledger() -> (Arc<ManualClock>, InMemoryLedger) {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = InMemoryLedger::new(Address::from_label("SRC"), clock.clone());
        (clock, ledger)
    }

    #[test]
    fn test_mint_and_balance() {
        let (_, ledger) = setup_ledger();
        let alice = Address::from_label("alice");
        ledger.mint(&alice, Decimal::from(500)).unwrap();
        assert_eq!(ledger.balance_of(&alice), Decimal::from(500));
        assert_eq!(ledger.total_supply(), Decimal::from(500));
    }

    #[test]
    fn test_mint_rejects_zero() {
        let (_, ledger) = setup_ledger();
        let result = ledger.mint(&Address::from_label("alice"), Decimal::ZERO);
        assert_eq!(result, Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn test_balance_snapshots() {
        let (clock, ledger) = setup_ledger();
        let alice = Address::from_label("alice");

        ledger.mint(&alice, Decimal::from(100)).unwrap();
        clock.advance_to(2_000);
        ledger.mint(&alice, Decimal::from(50)).unwrap();

        assert_eq!(ledger.balance_of_at(&alice, 999), Decimal::ZERO);
        assert_eq!(ledger.balance_of_at(&alice, 1_000), Decimal::from(100));
        assert_eq!(ledger.balance_of_at(&alice, 1_999), Decimal::from(100));
        assert_eq!(ledger.balance_of_at(&alice, 2_000), Decimal::from(150));
        assert_eq!(ledger.balance_of(&alice), Decimal::from(150));
    }

    #[test]
    fn test_transfer_gate() {
        let (_, ledger) = setup_ledger();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        ledger.mint(&alice, Decimal::from(10)).unwrap();

        ledger.set_transfers_enabled(false);
        assert_eq!(
            ledger.transfer(&alice, &bob, Decimal::from(5)),
            Err(LedgerError::TransfersDisabled)
        );

        ledger.set_transfers_enabled(true);
        ledger.transfer(&alice, &bob, Decimal::from(5)).unwrap();
        assert_eq!(ledger.balance_of(&alice), Decimal::from(5));
        assert_eq!(ledger.balance_of(&bob), Decimal::from(5));
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let (_, ledger) = setup_ledger();
        let alice = Address::from_label("alice");
        let result = ledger.transfer(&alice, &Address::from_label("bob"), Decimal::from(1));
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let (_, ledger) = setup_ledger();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let spender = Address::from_label("spender");
        ledger.mint(&alice, Decimal::from(20)).unwrap();

        assert_eq!(ledger.allowance(&alice, &spender), Decimal::ZERO);
        ledger.approve(&alice, &spender, Decimal::from(15)).unwrap();
        assert!(matches!(
            ledger.transfer_from(&spender, &alice, &bob, Decimal::from(16)),
            Err(LedgerError::InsufficientAllowance { .. })
        ));

        ledger.transfer_from(&spender, &alice, &bob, Decimal::from(15)).unwrap();
        assert_eq!(ledger.allowance(&alice, &spender), Decimal::ZERO);
        assert_eq!(ledger.balance_of(&bob), Decimal::from(15));
    }

    #[test]
    fn test_burn_from_ignores_transfer_gate() {
        let (_, ledger) = setup_ledger();
        let alice = Address::from_label("alice");
        let spender = Address::from_label("liquidator");
        ledger.mint(&alice, Decimal::from(20)).unwrap();
        ledger.set_transfers_enabled(false);
        ledger.approve(&alice, &spender, Decimal::from(20)).unwrap();

        ledger.burn_from(&spender, &alice, Decimal::from(20)).unwrap();
        assert_eq!(ledger.balance_of(&alice), Decimal::ZERO);
        assert_eq!(ledger.total_supply(), Decimal::ZERO);
        assert_eq!(ledger.allowance(&alice, &spender), Decimal::ZERO);
    }

    #[test]
    fn test_burn_from_short_balance_keeps_allowance() {
        let (_, ledger) = setup_ledger();
        let alice = Address::from_label("alice");
        let spender = Address::from_label("liquidator");
        ledger.mint(&alice, Decimal::from(5)).unwrap();
        ledger.approve(&alice, &spender, Decimal::from(20)).unwrap();

        assert!(matches!(
            ledger.burn_from(&spender, &alice, Decimal::from(20)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.allowance(&alice, &spender), Decimal::from(20));
        assert_eq!(ledger.balance_of(&alice), Decimal::from(5));
        assert_eq!(ledger.total_supply(), Decimal::from(5));
    }
}
