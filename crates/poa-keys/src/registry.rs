// Key registry: validator identity and delegate bindings.
//
// SAFETY INVARIANTS:
// 1. A mining key is active here if and only if it is in the validator set's
//    pending membership — every mutation here stages the matching set change
// 2. A voting or payout key is bound to at most one mining key at any moment;
//    rebinding clears the old reverse mapping first
// 3. Initial keys move Unused -> Activated -> Consumed and never regress
// 4. Predecessor history is walked through an explicit hop bound, never an
//    unbounded traversal
//
// Atomicity: every operation validates, then performs the (fallible) staging
// call, then applies its own state changes. A failure at any point leaves the
// registry untouched.

use crate::events::KeyEvent;
use log::info;
use poa_core::{Address, AuthorityConfig, PayoutResolver, ValidatorSetError, ValidatorSetStaging};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Lifecycle of a one-time bootstrap credential. Absence from the table
/// means the key was never activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialKeyState {
    /// Issued by the master of ceremony, not yet used.
    Activated,
    /// Spent on a `create_keys` call; can never be used again.
    Consumed,
}

/// Authoritative record for one mining key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningKeyRecord {
    pub is_active: bool,
    pub activation_block: u64,
    pub deactivation_block: Option<u64>,
    pub voting_key: Option<Address>,
    pub payout_key: Option<Address>,
}

impl MiningKeyRecord {
    fn new(activation_block: u64) -> Self {
        MiningKeyRecord {
            is_active: true,
            activation_block,
            deactivation_block: None,
            voting_key: None,
            payout_key: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyRegistryError {
    #[error("caller {0} is not authorized for this operation")]
    Unauthorized(Address),
    #[error("initial key {0} was already activated or consumed")]
    AlreadyActive(Address),
    #[error("initial key limit of {0} reached")]
    InitialKeyLimit(u32),
    #[error("initial key {0} is not activated")]
    KeyNotActivated(Address),
    #[error("mining key {0} already exists")]
    DuplicateMiningKey(Address),
    #[error("mining key {0} not found")]
    NotFound(Address),
    #[error("mining key {0} is not active")]
    MiningKeyNotActive(Address),
    #[error("mining key {0} has no bound voting key")]
    NoVotingKey(Address),
    #[error("mining key {0} has no bound payout key")]
    NoPayoutKey(Address),
    #[error("key must not be the zero address")]
    EmptyKey,
    #[error("mining, voting, payout and initial keys must be distinct")]
    OverlappingKeys,
    #[error("limit {0} is invalid for this registry")]
    InvalidLimit(u32),
    #[error("{0} was already migrated into this registry")]
    AlreadyMigrated(Address),
    #[error("validator set rejected the change: {0}")]
    Set(#[from] ValidatorSetError),
}

/// Mapping between permanent validator identities (mining keys) and their
/// rebindable delegates, plus the initial-key bootstrap lifecycle and the
/// append-only key-succession history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRegistry {
    config: AuthorityConfig,
    initial_keys: BTreeMap<Address, InitialKeyState>,
    initial_keys_issued: u32,
    mining_keys: BTreeMap<Address, MiningKeyRecord>,
    voting_owner: BTreeMap<Address, Address>,
    payout_owner: BTreeMap<Address, Address>,
    /// mining key -> the key it replaced
    key_history: BTreeMap<Address, Address>,
    migrated: BTreeSet<Address>,
    events: Vec<KeyEvent>,
}

impl KeyRegistry {
    pub fn new(config: AuthorityConfig) -> Self {
        KeyRegistry {
            config,
            initial_keys: BTreeMap::new(),
            initial_keys_issued: 0,
            mining_keys: BTreeMap::new(),
            voting_owner: BTreeMap::new(),
            payout_owner: BTreeMap::new(),
            key_history: BTreeMap::new(),
            migrated: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    /// Activate `candidate` as a one-time initial key.
    ///
    /// Master of ceremony only, bounded by `max_initial_keys`.
    pub fn initiate_key(
        &mut self,
        caller: Address,
        candidate: Address,
    ) -> Result<(), KeyRegistryError> {
        if caller != self.config.master_of_ceremony {
            return Err(KeyRegistryError::Unauthorized(caller));
        }
        if candidate.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if self.initial_keys.contains_key(&candidate) {
            return Err(KeyRegistryError::AlreadyActive(candidate));
        }
        if self.initial_keys_issued >= self.config.max_initial_keys {
            return Err(KeyRegistryError::InitialKeyLimit(
                self.config.max_initial_keys,
            ));
        }

        self.initial_keys.insert(candidate, InitialKeyState::Activated);
        self.initial_keys_issued += 1;
        info!("initial key activated: {candidate}");
        self.events.push(KeyEvent::InitialKeyActivated {
            initial_key: candidate,
        });
        Ok(())
    }

    /// Self-register a validator's key triple, spending the caller's initial
    /// key, and stage the mining key into the pending validator set.
    pub fn create_keys(
        &mut self,
        set: &mut dyn ValidatorSetStaging,
        caller: Address,
        mining_key: Address,
        voting_key: Address,
        payout_key: Address,
        current_block: u64,
    ) -> Result<(), KeyRegistryError> {
        match self.initial_keys.get(&caller) {
            Some(InitialKeyState::Activated) => {}
            _ => return Err(KeyRegistryError::KeyNotActivated(caller)),
        }
        if mining_key.is_zero() || voting_key.is_zero() || payout_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if mining_key == voting_key
            || mining_key == payout_key
            || voting_key == payout_key
            || mining_key == caller
            || voting_key == caller
            || payout_key == caller
        {
            return Err(KeyRegistryError::OverlappingKeys);
        }
        if self.mining_keys.contains_key(&mining_key) {
            return Err(KeyRegistryError::DuplicateMiningKey(mining_key));
        }

        set.stage_addition(self.config.key_registry, mining_key)?;

        self.initial_keys.insert(caller, InitialKeyState::Consumed);
        self.mining_keys
            .insert(mining_key, MiningKeyRecord::new(current_block));
        let old_voting = self.bind_voting(mining_key, voting_key);
        let old_payout = self.bind_payout(mining_key, payout_key);

        info!("keys created for validator {mining_key} (initial key {caller} consumed)");
        self.events.push(KeyEvent::InitialKeyConsumed {
            initial_key: caller,
        });
        self.events.push(KeyEvent::MiningKeyAdded { mining_key });
        self.events.push(KeyEvent::VotingKeyBound {
            mining_key,
            old: old_voting,
            new: voting_key,
        });
        self.events.push(KeyEvent::PayoutKeyBound {
            mining_key,
            old: old_payout,
            new: payout_key,
        });
        Ok(())
    }

    /// Create (or reactivate) a mining key on behalf of voting governance and
    /// stage it into the pending validator set.
    pub fn add_mining_key(
        &mut self,
        set: &mut dyn ValidatorSetStaging,
        caller: Address,
        mining_key: Address,
        current_block: u64,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if mining_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if let Some(record) = self.mining_keys.get(&mining_key) {
            if record.is_active {
                return Err(KeyRegistryError::DuplicateMiningKey(mining_key));
            }
        }

        set.stage_addition(self.config.key_registry, mining_key)?;

        let record = self
            .mining_keys
            .entry(mining_key)
            .or_insert_with(|| MiningKeyRecord::new(current_block));
        record.is_active = true;
        record.activation_block = current_block;
        record.deactivation_block = None;

        info!("mining key added: {mining_key}");
        self.events.push(KeyEvent::MiningKeyAdded { mining_key });
        Ok(())
    }

    /// Deactivate a mining key, clear its delegates and stage its removal
    /// from the pending validator set.
    pub fn remove_mining_key(
        &mut self,
        set: &mut dyn ValidatorSetStaging,
        caller: Address,
        mining_key: Address,
        current_block: u64,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        match self.mining_keys.get(&mining_key) {
            Some(record) if record.is_active => {}
            _ => return Err(KeyRegistryError::NotFound(mining_key)),
        }

        set.stage_removal(self.config.key_registry, mining_key)?;

        self.clear_delegates(mining_key);
        if let Some(record) = self.mining_keys.get_mut(&mining_key) {
            record.is_active = false;
            record.deactivation_block = Some(current_block);
        }

        info!("mining key removed: {mining_key}");
        self.events.push(KeyEvent::MiningKeyRemoved { mining_key });
        Ok(())
    }

    /// Replace `old_key` with `new_key` in place: delegates move over, the
    /// set membership is re-staged, and `old_key` becomes the predecessor of
    /// `new_key` in the succession history.
    pub fn swap_mining_key(
        &mut self,
        set: &mut dyn ValidatorSetStaging,
        caller: Address,
        old_key: Address,
        new_key: Address,
        current_block: u64,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if new_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if new_key == old_key {
            return Err(KeyRegistryError::OverlappingKeys);
        }
        if self.mining_keys.contains_key(&new_key) {
            return Err(KeyRegistryError::DuplicateMiningKey(new_key));
        }
        let old_record = match self.mining_keys.get(&old_key) {
            Some(record) if record.is_active => record.clone(),
            _ => return Err(KeyRegistryError::NotFound(old_key)),
        };
        // Both memberships checked before either staging call: the set may
        // have diverged (ballot governance stages directly), and a failure
        // between the two calls would leave the new key staged with no
        // registry record.
        if set.is_staged(&new_key) {
            return Err(KeyRegistryError::Set(ValidatorSetError::AlreadyPresent(
                new_key,
            )));
        }
        if !set.is_staged(&old_key) {
            return Err(KeyRegistryError::Set(ValidatorSetError::NotPresent(
                old_key,
            )));
        }

        set.stage_addition(self.config.key_registry, new_key)?;
        set.stage_removal(self.config.key_registry, old_key)?;

        let mut new_record = MiningKeyRecord::new(current_block);
        new_record.voting_key = old_record.voting_key;
        new_record.payout_key = old_record.payout_key;
        self.mining_keys.insert(new_key, new_record);
        if let Some(voting) = old_record.voting_key {
            self.voting_owner.insert(voting, new_key);
        }
        if let Some(payout) = old_record.payout_key {
            self.payout_owner.insert(payout, new_key);
        }
        if let Some(record) = self.mining_keys.get_mut(&old_key) {
            record.is_active = false;
            record.deactivation_block = Some(current_block);
            record.voting_key = None;
            record.payout_key = None;
        }
        self.key_history.insert(new_key, old_key);

        info!("mining key swapped: {old_key} -> {new_key}");
        self.events.push(KeyEvent::MiningKeySwapped { old_key, new_key });
        Ok(())
    }

    pub fn add_voting_key(
        &mut self,
        caller: Address,
        voting_key: Address,
        mining_key: Address,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if voting_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if voting_key == mining_key {
            return Err(KeyRegistryError::OverlappingKeys);
        }
        self.check_mining_active(&mining_key)?;

        let old = self.bind_voting(mining_key, voting_key);
        info!("voting key {voting_key} bound to {mining_key}");
        self.events.push(KeyEvent::VotingKeyBound {
            mining_key,
            old,
            new: voting_key,
        });
        Ok(())
    }

    pub fn remove_voting_key(
        &mut self,
        caller: Address,
        mining_key: Address,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        self.check_mining_active(&mining_key)?;
        let old = match self.mining_keys.get(&mining_key).and_then(|r| r.voting_key) {
            Some(old) => old,
            None => return Err(KeyRegistryError::NoVotingKey(mining_key)),
        };

        self.voting_owner.remove(&old);
        if let Some(record) = self.mining_keys.get_mut(&mining_key) {
            record.voting_key = None;
        }
        self.events.push(KeyEvent::VotingKeyUnbound { mining_key, old });
        Ok(())
    }

    pub fn add_payout_key(
        &mut self,
        caller: Address,
        payout_key: Address,
        mining_key: Address,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if payout_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if payout_key == mining_key {
            return Err(KeyRegistryError::OverlappingKeys);
        }
        self.check_mining_active(&mining_key)?;

        let old = self.bind_payout(mining_key, payout_key);
        info!("payout key {payout_key} bound to {mining_key}");
        self.events.push(KeyEvent::PayoutKeyBound {
            mining_key,
            old,
            new: payout_key,
        });
        Ok(())
    }

    pub fn remove_payout_key(
        &mut self,
        caller: Address,
        mining_key: Address,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        self.check_mining_active(&mining_key)?;
        let old = match self.mining_keys.get(&mining_key).and_then(|r| r.payout_key) {
            Some(old) => old,
            None => return Err(KeyRegistryError::NoPayoutKey(mining_key)),
        };

        self.payout_owner.remove(&old);
        if let Some(record) = self.mining_keys.get_mut(&mining_key) {
            record.payout_key = None;
        }
        self.events.push(KeyEvent::PayoutKeyUnbound { mining_key, old });
        Ok(())
    }

    /// One-shot import of an initial key from a predecessor registry
    /// instance. Callable by anyone: the predecessor's recorded state is the
    /// only authority consulted.
    pub fn migrate_initial_key(
        &mut self,
        predecessor: &KeyRegistry,
        initial_key: Address,
    ) -> Result<(), KeyRegistryError> {
        if initial_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if self.initial_keys.contains_key(&initial_key) {
            return Err(KeyRegistryError::AlreadyMigrated(initial_key));
        }
        let state = match predecessor.initial_keys.get(&initial_key) {
            Some(state) => *state,
            None => return Err(KeyRegistryError::NotFound(initial_key)),
        };

        self.initial_keys.insert(initial_key, state);
        self.initial_keys_issued += 1;
        info!("initial key migrated: {initial_key}");
        self.events.push(KeyEvent::InitialKeyMigrated { initial_key });
        Ok(())
    }

    /// One-shot import of a mining key and its delegate bindings from a
    /// predecessor registry instance. The full bounded predecessor chain is
    /// copied so history walks are identical on both instances.
    ///
    /// The validator set is not re-staged: migration targets a fresh registry
    /// bound to the same, already-populated set manager.
    pub fn migrate_mining_key(
        &mut self,
        caller: Address,
        predecessor: &KeyRegistry,
        mining_key: Address,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if mining_key.is_zero() {
            return Err(KeyRegistryError::EmptyKey);
        }
        if self.migrated.contains(&mining_key) || self.mining_keys.contains_key(&mining_key) {
            return Err(KeyRegistryError::AlreadyMigrated(mining_key));
        }
        let record = match predecessor.mining_keys.get(&mining_key) {
            Some(record) => record.clone(),
            None => return Err(KeyRegistryError::NotFound(mining_key)),
        };

        if let Some(voting) = record.voting_key {
            self.voting_owner.insert(voting, mining_key);
        }
        if let Some(payout) = record.payout_key {
            self.payout_owner.insert(payout, mining_key);
        }
        self.mining_keys.insert(mining_key, record);

        // Copy the succession chain link by link, bounded exactly like the
        // history walk itself.
        let mut cursor = mining_key;
        for _ in 0..self.config.max_history_hops {
            match predecessor.key_history.get(&cursor) {
                Some(prev) => {
                    self.key_history.insert(cursor, *prev);
                    cursor = *prev;
                }
                None => break,
            }
        }

        self.migrated.insert(mining_key);
        info!("mining key migrated: {mining_key}");
        self.events.push(KeyEvent::MiningKeyMigrated { mining_key });
        Ok(())
    }

    /// Succession history of `mining_key`, oldest last, following at most
    /// `max_history_hops` predecessor links.
    pub fn mining_key_history(&self, mining_key: &Address) -> Vec<Address> {
        let mut history = Vec::new();
        let mut cursor = *mining_key;
        for _ in 0..self.config.max_history_hops {
            match self.key_history.get(&cursor) {
                Some(prev) => {
                    history.push(*prev);
                    cursor = *prev;
                }
                None => break,
            }
        }
        history
    }

    pub fn predecessor_of(&self, mining_key: &Address) -> Option<Address> {
        self.key_history.get(mining_key).copied()
    }

    pub fn record(&self, mining_key: &Address) -> Option<&MiningKeyRecord> {
        self.mining_keys.get(mining_key)
    }

    pub fn is_mining_active(&self, mining_key: &Address) -> bool {
        self.mining_keys
            .get(mining_key)
            .map(|r| r.is_active)
            .unwrap_or(false)
    }

    pub fn voting_key_of(&self, mining_key: &Address) -> Option<Address> {
        self.mining_keys.get(mining_key).and_then(|r| r.voting_key)
    }

    pub fn mining_key_of_voting(&self, voting_key: &Address) -> Option<Address> {
        self.voting_owner.get(voting_key).copied()
    }

    pub fn mining_key_of_payout(&self, payout_key: &Address) -> Option<Address> {
        self.payout_owner.get(payout_key).copied()
    }

    pub fn initial_key_state(&self, initial_key: &Address) -> Option<InitialKeyState> {
        self.initial_keys.get(initial_key).copied()
    }

    pub fn active_mining_keys(&self) -> Vec<Address> {
        self.mining_keys
            .iter()
            .filter(|(_, r)| r.is_active)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Raise or lower the initial-key cap. Voting governance only; the cap
    /// can never drop below what has already been issued.
    pub fn set_max_initial_keys(
        &mut self,
        caller: Address,
        limit: u32,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if limit == 0 || limit < self.initial_keys_issued {
            return Err(KeyRegistryError::InvalidLimit(limit));
        }
        self.config.max_initial_keys = limit;
        info!("initial key limit set to {limit}");
        Ok(())
    }

    /// Change the predecessor-walk depth bound. Voting governance only.
    pub fn set_max_history_hops(
        &mut self,
        caller: Address,
        hops: u32,
    ) -> Result<(), KeyRegistryError> {
        self.check_voting_governance(caller)?;
        if hops == 0 {
            return Err(KeyRegistryError::InvalidLimit(hops));
        }
        self.config.max_history_hops = hops;
        info!("history hop limit set to {hops}");
        Ok(())
    }

    /// Drain accumulated notifications.
    pub fn take_events(&mut self) -> Vec<KeyEvent> {
        std::mem::take(&mut self.events)
    }

    fn check_voting_governance(&self, caller: Address) -> Result<(), KeyRegistryError> {
        if caller != self.config.voting_governance {
            return Err(KeyRegistryError::Unauthorized(caller));
        }
        Ok(())
    }

    fn check_mining_active(&self, mining_key: &Address) -> Result<(), KeyRegistryError> {
        match self.mining_keys.get(mining_key) {
            Some(record) if record.is_active => Ok(()),
            Some(_) => Err(KeyRegistryError::MiningKeyNotActive(*mining_key)),
            None => Err(KeyRegistryError::NotFound(*mining_key)),
        }
    }

    /// Install `voting_key` on `mining_key`, clearing any reverse mapping the
    /// delegate held elsewhere. Returns the delegate the mining key held
    /// before, if any.
    fn bind_voting(&mut self, mining_key: Address, voting_key: Address) -> Option<Address> {
        if let Some(prev_owner) = self.voting_owner.insert(voting_key, mining_key) {
            if prev_owner != mining_key {
                if let Some(record) = self.mining_keys.get_mut(&prev_owner) {
                    record.voting_key = None;
                }
            }
        }
        let old = match self.mining_keys.get_mut(&mining_key) {
            Some(record) => record.voting_key.replace(voting_key),
            None => None,
        };
        if let Some(old_key) = old {
            if old_key != voting_key {
                self.voting_owner.remove(&old_key);
            }
        }
        old
    }

    fn bind_payout(&mut self, mining_key: Address, payout_key: Address) -> Option<Address> {
        if let Some(prev_owner) = self.payout_owner.insert(payout_key, mining_key) {
            if prev_owner != mining_key {
                if let Some(record) = self.mining_keys.get_mut(&prev_owner) {
                    record.payout_key = None;
                }
            }
        }
        let old = match self.mining_keys.get_mut(&mining_key) {
            Some(record) => record.payout_key.replace(payout_key),
            None => None,
        };
        if let Some(old_key) = old {
            if old_key != payout_key {
                self.payout_owner.remove(&old_key);
            }
        }
        old
    }

    fn clear_delegates(&mut self, mining_key: Address) {
        let (voting, payout) = match self.mining_keys.get(&mining_key) {
            Some(record) => (record.voting_key, record.payout_key),
            None => return,
        };
        if let Some(voting) = voting {
            self.voting_owner.remove(&voting);
            self.events.push(KeyEvent::VotingKeyUnbound {
                mining_key,
                old: voting,
            });
        }
        if let Some(payout) = payout {
            self.payout_owner.remove(&payout);
            self.events.push(KeyEvent::PayoutKeyUnbound {
                mining_key,
                old: payout,
            });
        }
        if let Some(record) = self.mining_keys.get_mut(&mining_key) {
            record.voting_key = None;
            record.payout_key = None;
        }
    }
}

impl PayoutResolver for KeyRegistry {
    fn payout_key_of(&self, mining_key: &Address) -> Option<Address> {
        self.mining_keys.get(mining_key).and_then(|r| r.payout_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poa_core::{ValidatorSetSource, DEFAULT_MAX_HISTORY_HOPS};
    use poa_validators::ValidatorSetManager;

    /// Minimal staging stub for unit tests; the real manager is exercised in
    /// the lockstep tests below and in the workspace integration suite.
    #[derive(Default)]
    struct StubSet {
        pending: BTreeSet<Address>,
        additions: Vec<Address>,
        removals: Vec<Address>,
        reject: Option<ValidatorSetError>,
    }

    impl ValidatorSetStaging for StubSet {
        fn stage_addition(
            &mut self,
            _caller: Address,
            mining_key: Address,
        ) -> Result<(), ValidatorSetError> {
            if let Some(err) = self.reject.clone() {
                return Err(err);
            }
            self.pending.insert(mining_key);
            self.additions.push(mining_key);
            Ok(())
        }

        fn stage_removal(
            &mut self,
            _caller: Address,
            mining_key: Address,
        ) -> Result<(), ValidatorSetError> {
            if let Some(err) = self.reject.clone() {
                return Err(err);
            }
            self.pending.remove(&mining_key);
            self.removals.push(mining_key);
            Ok(())
        }

        fn is_staged(&self, mining_key: &Address) -> bool {
            self.pending.contains(mining_key)
        }
    }

    fn test_config() -> AuthorityConfig {
        AuthorityConfig::new(
            Address::from_low_u64(100), // master of ceremony
            Address::from_low_u64(101), // voting governance
            Address::from_low_u64(102), // ballot governance
            Address::from_low_u64(103), // key registry
            Address::from_low_u64(104), // system
            Address::from_low_u64(105), // bridge
        )
    }

    fn moc() -> Address {
        Address::from_low_u64(100)
    }

    fn voting_gov() -> Address {
        Address::from_low_u64(101)
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_initiate_key_requires_master_of_ceremony() {
        let mut registry = KeyRegistry::new(test_config());
        assert_eq!(
            registry.initiate_key(addr(999), addr(1)),
            Err(KeyRegistryError::Unauthorized(addr(999)))
        );
        registry.initiate_key(moc(), addr(1)).unwrap();
        assert_eq!(
            registry.initial_key_state(&addr(1)),
            Some(InitialKeyState::Activated)
        );
    }

    #[test]
    fn test_initiate_key_rejects_reuse() {
        let mut registry = KeyRegistry::new(test_config());
        registry.initiate_key(moc(), addr(1)).unwrap();
        assert_eq!(
            registry.initiate_key(moc(), addr(1)),
            Err(KeyRegistryError::AlreadyActive(addr(1)))
        );
    }

    #[test]
    fn test_initiate_key_enforces_cap() {
        let mut config = test_config();
        config.max_initial_keys = 2;
        let mut registry = KeyRegistry::new(config);
        registry.initiate_key(moc(), addr(1)).unwrap();
        registry.initiate_key(moc(), addr(2)).unwrap();
        assert_eq!(
            registry.initiate_key(moc(), addr(3)),
            Err(KeyRegistryError::InitialKeyLimit(2))
        );
    }

    #[test]
    fn test_set_max_initial_keys_guarded_and_validated() {
        let mut config = test_config();
        config.max_initial_keys = 2;
        let mut registry = KeyRegistry::new(config);
        registry.initiate_key(moc(), addr(1)).unwrap();
        registry.initiate_key(moc(), addr(2)).unwrap();

        assert_eq!(
            registry.set_max_initial_keys(moc(), 5),
            Err(KeyRegistryError::Unauthorized(moc()))
        );
        assert_eq!(
            registry.set_max_initial_keys(voting_gov(), 0),
            Err(KeyRegistryError::InvalidLimit(0))
        );
        // cannot drop below the two keys already issued
        assert_eq!(
            registry.set_max_initial_keys(voting_gov(), 1),
            Err(KeyRegistryError::InvalidLimit(1))
        );

        // a raised cap takes effect immediately
        registry.set_max_initial_keys(voting_gov(), 3).unwrap();
        registry.initiate_key(moc(), addr(3)).unwrap();
        assert_eq!(
            registry.initiate_key(moc(), addr(4)),
            Err(KeyRegistryError::InitialKeyLimit(3))
        );
    }

    #[test]
    fn test_set_max_history_hops_bounds_the_walk() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(1000), 0)
            .unwrap();
        let mut current = addr(1000);
        for n in 1..=5u64 {
            let next = addr(1000 + n);
            registry
                .swap_mining_key(&mut set, voting_gov(), current, next, n)
                .unwrap();
            current = next;
        }

        assert_eq!(registry.mining_key_history(&current).len(), 5);
        assert_eq!(
            registry.set_max_history_hops(voting_gov(), 0),
            Err(KeyRegistryError::InvalidLimit(0))
        );
        registry.set_max_history_hops(voting_gov(), 2).unwrap();
        assert_eq!(
            registry.mining_key_history(&current),
            vec![addr(1004), addr(1003)]
        );
    }

    #[test]
    fn test_create_keys_consumes_initial_key() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry.initiate_key(moc(), addr(1)).unwrap();

        registry
            .create_keys(&mut set, addr(1), addr(10), addr(11), addr(12), 50)
            .unwrap();

        assert_eq!(
            registry.initial_key_state(&addr(1)),
            Some(InitialKeyState::Consumed)
        );
        assert!(registry.is_mining_active(&addr(10)));
        assert_eq!(registry.voting_key_of(&addr(10)), Some(addr(11)));
        assert_eq!(registry.payout_key_of(&addr(10)), Some(addr(12)));
        assert_eq!(registry.mining_key_of_voting(&addr(11)), Some(addr(10)));
        assert_eq!(set.additions, vec![addr(10)]);
        assert_eq!(registry.record(&addr(10)).unwrap().activation_block, 50);

        // the credential is spent
        assert_eq!(
            registry.create_keys(&mut set, addr(1), addr(20), addr(21), addr(22), 51),
            Err(KeyRegistryError::KeyNotActivated(addr(1)))
        );
    }

    #[test]
    fn test_create_keys_rejects_overlapping_triple() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry.initiate_key(moc(), addr(1)).unwrap();
        assert_eq!(
            registry.create_keys(&mut set, addr(1), addr(10), addr(10), addr(12), 0),
            Err(KeyRegistryError::OverlappingKeys)
        );
    }

    #[test]
    fn test_create_keys_rejects_duplicate_mining_key() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry.initiate_key(moc(), addr(1)).unwrap();
        registry.initiate_key(moc(), addr(2)).unwrap();
        registry
            .create_keys(&mut set, addr(1), addr(10), addr(11), addr(12), 0)
            .unwrap();
        assert_eq!(
            registry.create_keys(&mut set, addr(2), addr(10), addr(21), addr(22), 0),
            Err(KeyRegistryError::DuplicateMiningKey(addr(10)))
        );
    }

    #[test]
    fn test_staging_failure_leaves_registry_untouched() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet {
            reject: Some(ValidatorSetError::Unauthorized(addr(103))),
            ..StubSet::default()
        };
        registry.initiate_key(moc(), addr(1)).unwrap();

        let result = registry.create_keys(&mut set, addr(1), addr(10), addr(11), addr(12), 0);
        assert!(matches!(result, Err(KeyRegistryError::Set(_))));

        // no partial effect: the initial key is still spendable and no
        // mining record exists
        assert_eq!(
            registry.initial_key_state(&addr(1)),
            Some(InitialKeyState::Activated)
        );
        assert!(registry.record(&addr(10)).is_none());
    }

    #[test]
    fn test_add_mining_key_requires_voting_governance() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        assert_eq!(
            registry.add_mining_key(&mut set, moc(), addr(10), 0),
            Err(KeyRegistryError::Unauthorized(moc()))
        );
    }

    #[test]
    fn test_remove_then_readd_mining_key() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 5)
            .unwrap();
        registry
            .remove_mining_key(&mut set, voting_gov(), addr(10), 9)
            .unwrap();
        assert!(!registry.is_mining_active(&addr(10)));
        assert_eq!(registry.record(&addr(10)).unwrap().deactivation_block, Some(9));

        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 14)
            .unwrap();
        let record = registry.record(&addr(10)).unwrap();
        assert!(record.is_active);
        assert_eq!(record.activation_block, 14);
        assert_eq!(record.deactivation_block, None);
        assert_eq!(set.additions, vec![addr(10), addr(10)]);
        assert_eq!(set.removals, vec![addr(10)]);
    }

    #[test]
    fn test_remove_mining_key_clears_delegates() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry.initiate_key(moc(), addr(1)).unwrap();
        registry
            .create_keys(&mut set, addr(1), addr(10), addr(11), addr(12), 0)
            .unwrap();

        registry
            .remove_mining_key(&mut set, voting_gov(), addr(10), 1)
            .unwrap();
        assert_eq!(registry.voting_key_of(&addr(10)), None);
        assert_eq!(registry.payout_key_of(&addr(10)), None);
        assert_eq!(registry.mining_key_of_voting(&addr(11)), None);
        assert_eq!(registry.mining_key_of_payout(&addr(12)), None);
    }

    #[test]
    fn test_remove_missing_mining_key_fails() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        assert_eq!(
            registry.remove_mining_key(&mut set, voting_gov(), addr(10), 0),
            Err(KeyRegistryError::NotFound(addr(10)))
        );
    }

    #[test]
    fn test_rebinding_clears_old_reverse_mapping() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(20), 0)
            .unwrap();

        registry.add_voting_key(voting_gov(), addr(30), addr(10)).unwrap();
        assert_eq!(registry.mining_key_of_voting(&addr(30)), Some(addr(10)));

        // the same delegate moves to another mining key
        registry.add_voting_key(voting_gov(), addr(30), addr(20)).unwrap();
        assert_eq!(registry.mining_key_of_voting(&addr(30)), Some(addr(20)));
        assert_eq!(registry.voting_key_of(&addr(10)), None);
        assert_eq!(registry.voting_key_of(&addr(20)), Some(addr(30)));
    }

    #[test]
    fn test_replacing_a_delegate_clears_its_reverse_mapping() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        registry.add_payout_key(voting_gov(), addr(30), addr(10)).unwrap();
        registry.add_payout_key(voting_gov(), addr(31), addr(10)).unwrap();

        assert_eq!(registry.payout_key_of(&addr(10)), Some(addr(31)));
        assert_eq!(registry.mining_key_of_payout(&addr(30)), None);
        assert_eq!(registry.mining_key_of_payout(&addr(31)), Some(addr(10)));
    }

    #[test]
    fn test_delegate_ops_require_active_mining_key() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        registry
            .remove_mining_key(&mut set, voting_gov(), addr(10), 1)
            .unwrap();

        assert_eq!(
            registry.add_voting_key(voting_gov(), addr(30), addr(10)),
            Err(KeyRegistryError::MiningKeyNotActive(addr(10)))
        );
        assert_eq!(
            registry.add_payout_key(voting_gov(), addr(30), addr(99)),
            Err(KeyRegistryError::NotFound(addr(99)))
        );
    }

    #[test]
    fn test_remove_unbound_delegate_fails() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        assert_eq!(
            registry.remove_voting_key(voting_gov(), addr(10)),
            Err(KeyRegistryError::NoVotingKey(addr(10)))
        );
        assert_eq!(
            registry.remove_payout_key(voting_gov(), addr(10)),
            Err(KeyRegistryError::NoPayoutKey(addr(10)))
        );
    }

    #[test]
    fn test_swap_moves_delegates_and_records_history() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry.initiate_key(moc(), addr(1)).unwrap();
        registry
            .create_keys(&mut set, addr(1), addr(10), addr(11), addr(12), 0)
            .unwrap();

        registry
            .swap_mining_key(&mut set, voting_gov(), addr(10), addr(20), 7)
            .unwrap();

        assert!(!registry.is_mining_active(&addr(10)));
        assert!(registry.is_mining_active(&addr(20)));
        assert_eq!(registry.voting_key_of(&addr(20)), Some(addr(11)));
        assert_eq!(registry.payout_key_of(&addr(20)), Some(addr(12)));
        assert_eq!(registry.mining_key_of_voting(&addr(11)), Some(addr(20)));
        assert_eq!(registry.predecessor_of(&addr(20)), Some(addr(10)));
        assert_eq!(registry.mining_key_history(&addr(20)), vec![addr(10)]);
        assert_eq!(set.additions, vec![addr(10), addr(20)]);
        assert_eq!(set.removals, vec![addr(10)]);
    }

    #[test]
    fn test_swap_aborts_cleanly_when_old_key_left_the_set() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        // the set diverged behind the registry's back
        set.pending.remove(&addr(10));

        assert_eq!(
            registry.swap_mining_key(&mut set, voting_gov(), addr(10), addr(20), 1),
            Err(KeyRegistryError::Set(ValidatorSetError::NotPresent(addr(10))))
        );
        // nothing was staged and nothing was recorded
        assert_eq!(set.additions, vec![addr(10)]);
        assert!(set.removals.is_empty());
        assert!(!set.is_staged(&addr(20)));
        assert!(registry.record(&addr(20)).is_none());
        assert!(registry.is_mining_active(&addr(10)));
        assert_eq!(registry.predecessor_of(&addr(20)), None);
    }

    #[test]
    fn test_swap_aborts_cleanly_when_new_key_already_staged() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        set.pending.insert(addr(20)); // staged by someone else

        assert_eq!(
            registry.swap_mining_key(&mut set, voting_gov(), addr(10), addr(20), 1),
            Err(KeyRegistryError::Set(ValidatorSetError::AlreadyPresent(
                addr(20)
            )))
        );
        assert_eq!(set.additions, vec![addr(10)]);
        assert!(set.removals.is_empty());
        assert!(registry.is_mining_active(&addr(10)));
        assert!(registry.record(&addr(20)).is_none());
    }

    #[test]
    fn test_swap_against_real_set_never_half_applies() {
        let config = test_config();
        let mut registry = KeyRegistry::new(config.clone());
        let mut set = ValidatorSetManager::new(config);
        let ballot = Address::from_low_u64(102);

        registry
            .add_mining_key(&mut set, voting_gov(), addr(10), 0)
            .unwrap();
        // ballot governance removes the key directly, bypassing the registry
        set.stage_removal(ballot, addr(10)).unwrap();

        assert_eq!(
            registry.swap_mining_key(&mut set, voting_gov(), addr(10), addr(20), 1),
            Err(KeyRegistryError::Set(ValidatorSetError::NotPresent(addr(10))))
        );
        // the failed swap must not leave the new key staged in the pending
        // set while the registry knows nothing about it
        assert!(!set.is_pending_validator(&addr(20)));
        assert!(registry.record(&addr(20)).is_none());
        assert!(registry.is_mining_active(&addr(10)));
    }

    #[test]
    fn test_history_walk_is_bounded() {
        let mut registry = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(1000), 0)
            .unwrap();
        let mut current = addr(1000);
        for n in 1..=30u64 {
            let next = addr(1000 + n);
            registry
                .swap_mining_key(&mut set, voting_gov(), current, next, n)
                .unwrap();
            current = next;
        }

        let history = registry.mining_key_history(&current);
        assert_eq!(history.len(), DEFAULT_MAX_HISTORY_HOPS as usize);
        assert_eq!(history[0], addr(1029));
    }

    #[test]
    fn test_migrate_initial_key_copies_state() {
        let mut old = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        old.initiate_key(moc(), addr(1)).unwrap();
        old.initiate_key(moc(), addr(2)).unwrap();
        old.create_keys(&mut set, addr(2), addr(10), addr(11), addr(12), 0)
            .unwrap();

        let mut fresh = KeyRegistry::new(test_config());
        fresh.migrate_initial_key(&old, addr(1)).unwrap();
        fresh.migrate_initial_key(&old, addr(2)).unwrap();
        assert_eq!(
            fresh.initial_key_state(&addr(1)),
            Some(InitialKeyState::Activated)
        );
        assert_eq!(
            fresh.initial_key_state(&addr(2)),
            Some(InitialKeyState::Consumed)
        );

        assert_eq!(
            fresh.migrate_initial_key(&old, addr(1)),
            Err(KeyRegistryError::AlreadyMigrated(addr(1)))
        );
        assert_eq!(
            fresh.migrate_initial_key(&old, addr(3)),
            Err(KeyRegistryError::NotFound(addr(3)))
        );
    }

    #[test]
    fn test_migrate_mining_key_reproduces_predecessor_outputs() {
        let mut old = KeyRegistry::new(test_config());
        let mut set = StubSet::default();
        old.add_mining_key(&mut set, voting_gov(), addr(1000), 0).unwrap();
        let mut current = addr(1000);
        for n in 1..=26u64 {
            let next = addr(1000 + n);
            old.swap_mining_key(&mut set, voting_gov(), current, next, n)
                .unwrap();
            current = next;
        }
        old.add_voting_key(voting_gov(), addr(11), current).unwrap();
        old.add_payout_key(voting_gov(), addr(12), current).unwrap();

        let mut fresh = KeyRegistry::new(test_config());
        fresh.migrate_mining_key(voting_gov(), &old, current).unwrap();

        assert_eq!(fresh.record(&current), old.record(&current));
        assert_eq!(fresh.voting_key_of(&current), old.voting_key_of(&current));
        assert_eq!(
            fresh.mining_key_of_voting(&addr(11)),
            old.mining_key_of_voting(&addr(11))
        );
        // identical bounded walk, all 25 hops
        assert_eq!(
            fresh.mining_key_history(&current),
            old.mining_key_history(&current)
        );
        assert_eq!(
            fresh.mining_key_history(&current).len(),
            DEFAULT_MAX_HISTORY_HOPS as usize
        );

        assert_eq!(
            fresh.migrate_mining_key(voting_gov(), &old, current),
            Err(KeyRegistryError::AlreadyMigrated(current))
        );
    }

    #[test]
    fn test_registry_and_real_set_stay_in_lockstep() {
        let config = test_config();
        let mut registry = KeyRegistry::new(config.clone());
        let mut set = ValidatorSetManager::new(config);
        let system = Address::from_low_u64(104);

        registry.initiate_key(moc(), addr(1)).unwrap();
        registry
            .create_keys(&mut set, addr(1), addr(10), addr(11), addr(12), 0)
            .unwrap();
        registry
            .add_mining_key(&mut set, voting_gov(), addr(20), 0)
            .unwrap();
        set.finalize(system).unwrap();
        registry
            .remove_mining_key(&mut set, voting_gov(), addr(10), 1)
            .unwrap();
        set.finalize(system).unwrap();

        let mut active = registry.active_mining_keys();
        let mut current: Vec<Address> = set
            .current_validators()
            .into_iter()
            .filter(|v| *v != moc())
            .collect();
        active.sort();
        current.sort();
        assert_eq!(active, current);
    }
}
