//! Native asset transfer capability
//!
//! Contributions are paid in the native currency. The escrow vault moves them
//! through an [`AssetTransfer`] implementation; [`InMemoryBank`] keeps plain
//! balances and can mark receivers that refuse payments.

use parking_lot::Mutex;
use realcoin_types::ids::Address;
use realcoin_types::numeric::is_positive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::errors::TransferError;

/// Movement of native value between two parties.
pub trait AssetTransfer: Send + Sync {
    fn send(&self, from: &Address, to: &Address, amount: Decimal) -> Result<(), TransferError>;

    fn balance(&self, holder: &Address) -> Decimal;
}

#[derive(Debug, Default)]
struct BankState {
    balances: HashMap<Address, Decimal>,
    rejecting: HashSet<Address>,
}

/// In-memory native currency balances.
#[derive(Debug, Default)]
pub struct InMemoryBank {
    state: Mutex<BankState>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `holder` out of thin air.
    pub fn fund(&self, holder: Address, amount: Decimal) -> Result<(), TransferError> {
        let mut state = self.state.lock();
        let balance = state.balances.entry(holder).or_insert(Decimal::ZERO);
        *balance = balance.checked_add(amount).ok_or(TransferError::Overflow)?;
        Ok(())
    }

    /// Make `holder` refuse every incoming payment.
    pub fn reject_payments(&self, holder: Address) {
        self.state.lock().rejecting.insert(holder);
    }
}

impl AssetTransfer for InMemoryBank {
    fn send(&self, from: &Address, to: &Address, amount: Decimal) -> Result<(), TransferError> {
        if !is_positive(amount) {
            return Err(TransferError::InvalidAmount);
        }

        let mut state = self.state.lock();
        if state.rejecting.contains(to) {
            return Err(TransferError::ReceiverRejected(*to));
        }

        let available = state.balances.get(from).copied().unwrap_or(Decimal::ZERO);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                holder: *from,
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let received = state
            .balances
            .get(to)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        state.balances.insert(*from, available - amount);
        state.balances.insert(*to, received);

        debug!(from = %from, to = %to, %amount, "Native transfer");
        Ok(())
    }

    fn balance(&self, holder: &Address) -> Decimal {
        self.state
            .lock()
            .balances
            .get(holder)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_moves_funds() {
        let bank = InMemoryBank::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        bank.fund(alice, Decimal::from(10)).unwrap();

        bank.send(&alice, &bob, Decimal::from(4)).unwrap();
        assert_eq!(bank.balance(&alice), Decimal::from(6));
        assert_eq!(bank.balance(&bob), Decimal::from(4));
    }

    #[test]
    fn test_send_to_self_is_neutral() {
        let bank = InMemoryBank::new();
        let alice = Address::from_label("alice");
        bank.fund(alice, Decimal::from(10)).unwrap();
        bank.send(&alice, &alice, Decimal::from(4)).unwrap();
        assert_eq!(bank.balance(&alice), Decimal::from(10));
    }

    #[test]
    fn test_send_insufficient_funds() {
        let bank = InMemoryBank::new();
        let alice = Address::from_label("alice");
        let result = bank.send(&alice, &Address::from_label("bob"), Decimal::from(1));
        assert!(matches!(result, Err(TransferError::InsufficientFunds { .. })));
    }

    #[test]
    fn test_rejecting_receiver() {
        let bank = InMemoryBank::new();
        let alice = Address::from_label("alice");
        let contract = Address::from_label("token-contract");
        bank.fund(alice, Decimal::from(10)).unwrap();
        bank.reject_payments(contract);

        let result = bank.send(&alice, &contract, Decimal::from(1));
        assert_eq!(result, Err(TransferError::ReceiverRejected(contract)));
        assert_eq!(bank.balance(&alice), Decimal::from(10));
    }

    #[test]
    fn test_send_rejects_zero() {
        let bank = InMemoryBank::new();
        let alice = Address::from_label("alice");
        assert_eq!(
            bank.send(&alice, &alice, Decimal::ZERO),
            Err(TransferError::InvalidAmount)
        );
    }
}
