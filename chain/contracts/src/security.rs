//! Shared security primitives for contract modules
//!
//! Provides the manager roster used by the crowdsale and liquidation engines
//! and the at-most-once registry behind votes and claims.

use realcoin_types::ids::Address;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Owner plus a set of managers.
///
/// The owner is always a manager; only the owner may change the roster.
#[derive(Debug, Clone)]
pub struct ManagerRoster {
    owner: Address,
    managers: HashMap<Address, bool>,
}

impl ManagerRoster {
    /// Create a roster with an initial owner.
    pub fn new(owner: Address) -> Self {
        let mut managers = HashMap::new();
        managers.insert(owner, true);
        Self { owner, managers }
    }

    /// Check if a caller is the owner.
    pub fn is_owner(&self, caller: &Address) -> bool {
        *caller == self.owner
    }

    /// Check if a caller is an active manager.
    pub fn is_manager(&self, caller: &Address) -> bool {
        self.is_owner(caller) || self.managers.get(caller).copied().unwrap_or(false)
    }

    /// Set or clear a manager flag. Only the owner can change the roster.
    ///
    /// Returns `false` if the caller is not the owner. Clearing the owner's
    /// flag is accepted but has no effect on [`is_manager`](Self::is_manager).
    pub fn set_manager(&mut self, caller: &Address, manager: Address, active: bool) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        self.managers.insert(manager, active);
        true
    }

    /// Get the owner.
    pub fn owner(&self) -> Address {
        self.owner
    }
}

/// Registry of keys that may be used only once.
///
/// Backs once-per-voter-per-proposal voting and once-per-claimant claims.
#[derive(Debug, Clone)]
pub struct OnceRegistry<K: Eq + Hash> {
    used: HashSet<K>,
}

impl<K: Eq + Hash> OnceRegistry<K> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            used: HashSet::new(),
        }
    }

    /// Check if a key has been used.
    pub fn is_used(&self, key: &K) -> bool {
        self.used.contains(key)
    }

    /// Mark a key as used. Returns `false` if already used.
    pub fn mark(&mut self, key: K) -> bool {
        self.used.insert(key)
    }
}

impl<K: Eq + Hash> Default for OnceRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- ManagerRoster tests ---

    #[test]
    fn test_owner_is_manager() {
        let owner = Address::from_label("owner");
        let roster = ManagerRoster::new(owner);
        assert!(roster.is_owner(&owner));
        assert!(roster.is_manager(&owner));
        assert!(!roster.is_manager(&Address::from_label("bob")));
    }

    #[test]
    fn test_set_manager() {
        let owner = Address::from_label("owner");
        let bob = Address::from_label("bob");
        let mut roster = ManagerRoster::new(owner);

        assert!(roster.set_manager(&owner, bob, true));
        assert!(roster.is_manager(&bob));

        // idempotent
        assert!(roster.set_manager(&owner, bob, true));
        assert!(roster.is_manager(&bob));

        assert!(roster.set_manager(&owner, bob, false));
        assert!(!roster.is_manager(&bob));
    }

    #[test]
    fn test_non_owner_cannot_set_manager() {
        let owner = Address::from_label("owner");
        let bob = Address::from_label("bob");
        let mut roster = ManagerRoster::new(owner);
        roster.set_manager(&owner, bob, true);

        // managers cannot grant
        assert!(!roster.set_manager(&bob, Address::from_label("carol"), true));
    }

    #[test]
    fn test_owner_cannot_be_demoted() {
        let owner = Address::from_label("owner");
        let mut roster = ManagerRoster::new(owner);
        assert!(roster.set_manager(&owner, owner, false));
        assert!(roster.is_manager(&owner));
        assert!(roster.is_owner(&owner));
    }

    // --- OnceRegistry tests ---

    #[test]
    fn test_once_registry_use_once() {
        let mut registry = OnceRegistry::new();
        let voter = Address::from_label("voter");
        assert!(registry.mark((0usize, voter)));
        assert!(registry.is_used(&(0usize, voter)));
        assert!(!registry.mark((0usize, voter)), "Second use must return false");
    }

    #[test]
    fn test_once_registry_distinct_keys() {
        let mut registry = OnceRegistry::new();
        let voter = Address::from_label("voter");
        assert!(registry.mark((0usize, voter)));
        assert!(registry.mark((1usize, voter)), "Same voter on another proposal is OK");
        assert!(registry.is_used(&(1usize, voter)));
    }
}
