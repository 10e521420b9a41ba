//! Escrow Vault — pooled contributions pending round finalization
//!
//! Holds the native-currency contributions of a sale round:
//! - Deposit flow, owner (crowdsale engine) only
//! - Per-beneficiary refund tracking, full or per-investment
//! - Close-to-wallet at finalization, reopen for the next round
//! - Direct transfers that bypass `deposit` are rejected

use realcoin_types::ids::Address;
use realcoin_types::numeric::is_positive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bank::AssetTransfer;
use crate::errors::VaultError;
use crate::events::{ContractEvent, Deposited, Refunded, VaultClosed, VaultReopened};

/// Vault lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultState {
    Active,
    Closed,
}

/// Escrow contract owned by a crowdsale engine.
///
/// `balance` always equals deposits minus refunds since the last reopening;
/// closing forwards it to the wallet and drives it to zero.
pub struct EscrowVault {
    /// Engine allowed to deposit, refund and close
    owner: Address,
    /// Identity holding the pooled funds
    address: Address,
    /// Receiver of the pooled funds on close
    wallet: Address,
    state: VaultState,
    /// Number of reopenings
    occurrence: u64,
    /// Refundable deposits per beneficiary, current occurrence only
    deposited: HashMap<Address, Decimal>,
    balance: Decimal,
    transfer: Arc<dyn AssetTransfer>,
    /// Emitted events log (append-only)
    events: Vec<ContractEvent>,
}

impl std::fmt::Debug for EscrowVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowVault")
            .field("owner", &self.owner)
            .field("address", &self.address)
            .field("wallet", &self.wallet)
            .field("state", &self.state)
            .field("occurrence", &self.occurrence)
            .field("balance", &self.balance)
            .finish()
    }
}

impl EscrowVault {
    /// Create an active vault forwarding to `wallet` on close.
    pub fn new(
        owner: Address,
        address: Address,
        wallet: Address,
        transfer: Arc<dyn AssetTransfer>,
    ) -> Result<Self, VaultError> {
        if wallet.is_zero() {
            return Err(VaultError::InvalidWallet);
        }
        if owner.is_zero() || address.is_zero() {
            return Err(VaultError::InvalidOwner);
        }
        Ok(Self {
            owner,
            address,
            wallet,
            state: VaultState::Active,
            occurrence: 0,
            deposited: HashMap::new(),
            balance: Decimal::ZERO,
            transfer,
            events: Vec::new(),
        })
    }

    // ───────────────────────── Deposit ─────────────────────────

    /// Move `amount` from `payer` into the vault, refundable to `beneficiary`.
    pub fn deposit(
        &mut self,
        caller: &Address,
        payer: &Address,
        beneficiary: Address,
        amount: Decimal,
    ) -> Result<ContractEvent, VaultError> {
        self.check_owner(caller)?;
        self.check_active()?;
        if !is_positive(amount) {
            return Err(VaultError::InvalidAmount);
        }

        let tracked = self
            .deposited_of(&beneficiary)
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        let balance = self.balance.checked_add(amount).ok_or(VaultError::Overflow)?;

        self.transfer.send(payer, &self.address, amount)?;

        self.deposited.insert(beneficiary, tracked);
        self.balance = balance;
        debug!(vault = %self.address, beneficiary = %beneficiary, %amount, "Deposit recorded");

        let event = ContractEvent::Deposited(Deposited { beneficiary, amount });
        self.events.push(event.clone());
        Ok(event)
    }

    /// Reject value sent to the vault outside of `deposit`.
    pub fn receive(&self, _from: &Address, _amount: Decimal) -> Result<(), VaultError> {
        Err(VaultError::DirectTransferRejected)
    }

    // ───────────────────────── Refund ─────────────────────────

    /// Return the whole tracked deposit of `beneficiary`.
    pub fn push_refund(
        &mut self,
        caller: &Address,
        beneficiary: Address,
    ) -> Result<ContractEvent, VaultError> {
        self.check_owner(caller)?;
        self.check_active()?;
        let amount = self.deposited_of(&beneficiary);
        if !is_positive(amount) {
            return Err(VaultError::NothingToRefund(beneficiary));
        }
        self.pay_out(beneficiary, amount)
    }

    /// Return exactly `amount` of `beneficiary`'s tracked deposit.
    pub fn refund(
        &mut self,
        caller: &Address,
        beneficiary: Address,
        amount: Decimal,
    ) -> Result<ContractEvent, VaultError> {
        self.check_owner(caller)?;
        self.check_active()?;
        if !is_positive(amount) {
            return Err(VaultError::InvalidAmount);
        }
        let available = self.deposited_of(&beneficiary);
        if available < amount {
            return Err(VaultError::RefundExceedsDeposit {
                beneficiary,
                required: amount,
                available,
            });
        }
        self.pay_out(beneficiary, amount)
    }

    fn pay_out(&mut self, beneficiary: Address, amount: Decimal) -> Result<ContractEvent, VaultError> {
        let tracked = self
            .deposited_of(&beneficiary)
            .checked_sub(amount)
            .ok_or(VaultError::Overflow)?;
        let balance = self.balance.checked_sub(amount).ok_or(VaultError::Overflow)?;

        self.transfer.send(&self.address, &beneficiary, amount)?;

        self.deposited.insert(beneficiary, tracked);
        self.balance = balance;
        debug!(vault = %self.address, beneficiary = %beneficiary, %amount, "Refund paid");

        let event = ContractEvent::Refunded(Refunded { beneficiary, amount });
        self.events.push(event.clone());
        Ok(event)
    }

    // ───────────────────────── Lifecycle ─────────────────────────

    /// Forward the whole balance to the wallet and close the vault.
    pub fn close(&mut self, caller: &Address) -> Result<ContractEvent, VaultError> {
        self.check_owner(caller)?;
        self.check_active()?;

        let amount = self.balance;
        if is_positive(amount) {
            self.transfer.send(&self.address, &self.wallet, amount)?;
        }

        self.balance = Decimal::ZERO;
        self.state = VaultState::Closed;
        info!(vault = %self.address, wallet = %self.wallet, %amount, "Vault closed");

        let event = ContractEvent::VaultClosed(VaultClosed {
            wallet: self.wallet,
            amount,
        });
        self.events.push(event.clone());
        Ok(event)
    }

    /// Reopen a closed vault for a new round.
    pub fn open(&mut self, caller: &Address) -> Result<ContractEvent, VaultError> {
        self.check_owner(caller)?;
        if self.state == VaultState::Active {
            return Err(VaultError::AlreadyActive);
        }

        self.deposited.clear();
        self.occurrence += 1;
        self.state = VaultState::Active;
        info!(vault = %self.address, occurrence = self.occurrence, "Vault reopened");

        let event = ContractEvent::VaultReopened(VaultReopened {
            occurrence: self.occurrence,
        });
        self.events.push(event.clone());
        Ok(event)
    }

    // ───────────────────────── Queries ─────────────────────────

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn occurrence(&self) -> u64 {
        self.occurrence
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Refundable deposit tracked for `beneficiary`.
    pub fn deposited_of(&self, beneficiary: &Address) -> Decimal {
        self.deposited
            .get(beneficiary)
            .copied()
            .unwrap_or(Decimal::ZERO)
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

    // ───────────────────────── Internal Guards ─────────────────────────

    fn check_owner(&self, caller: &Address) -> Result<(), VaultError> {
        if *caller != self.owner {
            return Err(VaultError::Unauthorized);
        }
        Ok(())
    }

    fn check_active(&self) -> Result<(), VaultError> {
        if self.state != VaultState::Active {
            return Err(VaultError::NotActive);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryBank;

    struct Fixture {
        bank: Arc<InMemoryBank>,
        vault: EscrowVault,
        owner: Address,
        wallet: Address,
        alice: Address,
        bob: Address,
    }

    fn setup_vault() -> Fixture {
        let bank = Arc::new(InMemoryBank::new());
        let owner = Address::from_label("crowdsale");
        let wallet = Address::from_label("wallet");
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        bank.fund(owner, Decimal::from(100)).unwrap();
        bank.fund(alice, Decimal::from(100)).unwrap();
        let vault = EscrowVault::new(owner, Address::from_label("vault"), wallet, bank.clone()).unwrap();
        Fixture {
            bank,
            vault,
            owner,
            wallet,
            alice,
            bob,
        }
    }

    // ─── Construction ───

    #[test]
    fn test_new_rejects_null_wallet() {
        let bank = Arc::new(InMemoryBank::new());
        let result = EscrowVault::new(
            Address::from_label("crowdsale"),
            Address::from_label("vault"),
            Address::ZERO,
            bank,
        );
        assert!(matches!(result, Err(VaultError::InvalidWallet)));
    }

    #[test]
    fn test_new_vault_is_active() {
        let f = setup_vault();
        assert_eq!(f.vault.state(), VaultState::Active);
        assert_eq!(f.vault.occurrence(), 0);
        assert_eq!(f.vault.balance(), Decimal::ZERO);
    }

    // ─── Deposit ───

    #[test]
    fn test_deposit_from_owner() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.owner, f.alice, Decimal::from(5)).unwrap();
        f.vault.deposit(&f.owner, &f.owner, f.bob, Decimal::from(5)).unwrap();

        assert_eq!(f.vault.balance(), Decimal::from(10));
        assert_eq!(f.bank.balance(&f.vault.address()), Decimal::from(10));
        assert_eq!(f.vault.deposited_of(&f.alice), Decimal::from(5));
    }

    #[test]
    fn test_deposit_from_non_owner() {
        let mut f = setup_vault();
        let result = f.vault.deposit(&f.alice, &f.alice, f.alice, Decimal::from(5));
        assert_eq!(result, Err(VaultError::Unauthorized));
    }

    #[test]
    fn test_deposit_insufficient_payer_funds_leaves_state() {
        let mut f = setup_vault();
        let result = f.vault.deposit(&f.owner, &f.bob, f.bob, Decimal::from(5));
        assert!(matches!(result, Err(VaultError::Transfer(_))));
        assert_eq!(f.vault.balance(), Decimal::ZERO);
        assert_eq!(f.vault.deposited_of(&f.bob), Decimal::ZERO);
    }

    #[test]
    fn test_receive_rejected() {
        let f = setup_vault();
        assert_eq!(
            f.vault.receive(&f.owner, Decimal::from(5)),
            Err(VaultError::DirectTransferRejected)
        );
    }

    // ─── Refund ───

    #[test]
    fn test_push_refund() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.alice, f.alice, Decimal::from(5)).unwrap();
        f.vault.push_refund(&f.owner, f.alice).unwrap();

        assert_eq!(f.bank.balance(&f.alice), Decimal::from(100));
        assert_eq!(f.vault.balance(), Decimal::ZERO);
        assert_eq!(
            f.vault.push_refund(&f.owner, f.alice),
            Err(VaultError::NothingToRefund(f.alice))
        );
    }

    #[test]
    fn test_push_refund_from_non_owner() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.owner, f.bob, Decimal::from(5)).unwrap();
        assert_eq!(f.vault.push_refund(&f.bob, f.bob), Err(VaultError::Unauthorized));
    }

    #[test]
    fn test_partial_refund() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.alice, f.alice, Decimal::from(7)).unwrap();
        f.vault.refund(&f.owner, f.alice, Decimal::from(3)).unwrap();
        assert_eq!(f.vault.deposited_of(&f.alice), Decimal::from(4));
        assert_eq!(f.vault.balance(), Decimal::from(4));

        let result = f.vault.refund(&f.owner, f.alice, Decimal::from(5));
        assert!(matches!(result, Err(VaultError::RefundExceedsDeposit { .. })));
    }

    // ─── Lifecycle ───

    #[test]
    fn test_close_forwards_balance() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.owner, f.alice, Decimal::from(5)).unwrap();
        f.vault.deposit(&f.owner, &f.owner, f.bob, Decimal::from(5)).unwrap();
        f.vault.push_refund(&f.owner, f.alice).unwrap();

        f.vault.close(&f.owner).unwrap();
        assert_eq!(f.vault.state(), VaultState::Closed);
        assert_eq!(f.vault.balance(), Decimal::ZERO);
        assert_eq!(f.bank.balance(&f.vault.address()), Decimal::ZERO);
        assert_eq!(f.bank.balance(&f.wallet), Decimal::from(5));
    }

    #[test]
    fn test_closed_vault_rejects_everything() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.owner, f.bob, Decimal::from(5)).unwrap();
        f.vault.close(&f.owner).unwrap();

        assert_eq!(f.vault.push_refund(&f.owner, f.bob), Err(VaultError::NotActive));
        assert_eq!(
            f.vault.deposit(&f.owner, &f.owner, f.alice, Decimal::from(5)),
            Err(VaultError::NotActive)
        );
        assert_eq!(f.vault.close(&f.owner), Err(VaultError::NotActive));
    }

    #[test]
    fn test_open_only_when_closed() {
        let mut f = setup_vault();
        assert_eq!(f.vault.open(&f.owner), Err(VaultError::AlreadyActive));

        f.vault.deposit(&f.owner, &f.owner, f.bob, Decimal::from(5)).unwrap();
        f.vault.close(&f.owner).unwrap();
        f.vault.open(&f.owner).unwrap();

        assert_eq!(f.vault.state(), VaultState::Active);
        assert_eq!(f.vault.occurrence(), 1);
        assert_eq!(f.vault.deposited_of(&f.bob), Decimal::ZERO);
    }

    #[test]
    fn test_events_logged() {
        let mut f = setup_vault();
        f.vault.deposit(&f.owner, &f.owner, f.bob, Decimal::from(5)).unwrap();
        f.vault.close(&f.owner).unwrap();
        assert_eq!(f.vault.events().len(), 2);
        let drained = f.vault.drain_events();
        assert!(matches!(drained[1], ContractEvent::VaultClosed(_)));
        assert!(f.vault.events().is_empty());
    }
}
