// Two-phase validator-set commit.
//
// SAFETY INVARIANTS:
// 1. The pending set reflects every staged change; the current set reflects
//    only those committed by the last finalize
// 2. `finalized` is true exactly when pending == current
// 3. Removal uses swap-with-last-and-truncate: membership is preserved but
//    relative order is not stable across a removal
// 4. Only the key registry or ballot governance may stage; only the system
//    caller may finalize

use log::info;
use poa_core::{Address, AuthorityConfig, ValidatorSetError, ValidatorSetSource, ValidatorSetStaging};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-key membership bookkeeping.
///
/// Slots are kept for removed keys too: a key can be out of the pending set
/// while still in the current set until the next finalize.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Slot {
    /// Present in the pending set.
    in_pending: bool,
    /// Present in the current (committed) set.
    in_current: bool,
    /// Position in the pending list; only meaningful while `in_pending`.
    index_in_pending: usize,
}

/// Notifications emitted by the set manager.
///
/// Both carry the entire new ordering: consumers must treat the list as
/// authoritative, never as an incremental diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidatorSetEvent {
    ChangeProposed { pending: Vec<Address> },
    ChangeFinalized { current: Vec<Address> },
}

/// Canonical owner of the pending and current validator sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSetManager {
    config: AuthorityConfig,
    current: Vec<Address>,
    pending: Vec<Address>,
    slots: BTreeMap<Address, Slot>,
    finalized: bool,
    events: Vec<ValidatorSetEvent>,
}

impl ValidatorSetManager {
    /// Create the set with the master of ceremony as the sole committed
    /// validator, mirroring the bootstrap arrangement: the MoC validates
    /// alone until initial keys bring real validators in.
    pub fn new(config: AuthorityConfig) -> Self {
        let mut manager = ValidatorSetManager {
            config,
            current: Vec::new(),
            pending: Vec::new(),
            slots: BTreeMap::new(),
            finalized: true,
            events: Vec::new(),
        };
        let moc = manager.config.master_of_ceremony;
        if !moc.is_zero() {
            manager.current.push(moc);
            manager.pending.push(moc);
            manager.slots.insert(
                moc,
                Slot {
                    in_pending: true,
                    in_current: true,
                    index_in_pending: 0,
                },
            );
        }
        manager
    }

    /// Commit the pending set verbatim as the new current set.
    ///
    /// Callable only by the system identity. A finalize with no staged
    /// changes is a strict no-op: nothing is re-copied and no notification
    /// is re-emitted.
    pub fn finalize(&mut self, caller: Address) -> Result<(), ValidatorSetError> {
        if caller != self.config.system {
            return Err(ValidatorSetError::Unauthorized(caller));
        }
        if self.finalized {
            return Ok(());
        }

        for slot in self.slots.values_mut() {
            slot.in_current = false;
        }
        for key in &self.pending {
            if let Some(slot) = self.slots.get_mut(key) {
                slot.in_current = true;
            }
        }
        self.current = self.pending.clone();
        // a slot in neither set can never be referenced again
        self.slots.retain(|_, slot| slot.in_pending || slot.in_current);
        self.finalized = true;

        info!("validator set finalized with {} members", self.current.len());
        self.events.push(ValidatorSetEvent::ChangeFinalized {
            current: self.current.clone(),
        });
        Ok(())
    }

    pub fn pending_validators(&self) -> &[Address] {
        &self.pending
    }

    pub fn is_pending_validator(&self, key: &Address) -> bool {
        self.slots.get(key).map(|s| s.in_pending).unwrap_or(false)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn current_validator_count(&self) -> usize {
        self.current.len()
    }

    /// Drain accumulated notifications.
    pub fn take_events(&mut self) -> Vec<ValidatorSetEvent> {
        std::mem::take(&mut self.events)
    }

    fn check_stage_caller(&self, caller: Address) -> Result<(), ValidatorSetError> {
        if caller != self.config.key_registry && caller != self.config.ballot_governance {
            return Err(ValidatorSetError::Unauthorized(caller));
        }
        Ok(())
    }

    fn emit_proposed(&mut self) {
        self.events.push(ValidatorSetEvent::ChangeProposed {
            pending: self.pending.clone(),
        });
    }
}

impl ValidatorSetStaging for ValidatorSetManager {
    fn stage_addition(
        &mut self,
        caller: Address,
        mining_key: Address,
    ) -> Result<(), ValidatorSetError> {
        self.check_stage_caller(caller)?;
        if mining_key.is_zero() {
            return Err(ValidatorSetError::EmptyKey);
        }
        if self.is_pending_validator(&mining_key) {
            return Err(ValidatorSetError::AlreadyPresent(mining_key));
        }

        let index = self.pending.len();
        self.pending.push(mining_key);
        let slot = self.slots.entry(mining_key).or_default();
        slot.in_pending = true;
        slot.index_in_pending = index;
        self.finalized = false;

        info!("staged validator addition: {mining_key}");
        self.emit_proposed();
        Ok(())
    }

    fn stage_removal(
        &mut self,
        caller: Address,
        mining_key: Address,
    ) -> Result<(), ValidatorSetError> {
        self.check_stage_caller(caller)?;
        if mining_key.is_zero() {
            return Err(ValidatorSetError::EmptyKey);
        }
        let index = match self.slots.get(&mining_key) {
            Some(slot) if slot.in_pending => slot.index_in_pending,
            _ => return Err(ValidatorSetError::NotPresent(mining_key)),
        };

        // O(1) removal; the key that was last in the list takes over the
        // vacated slot, so relative order changes here.
        self.pending.swap_remove(index);
        if index < self.pending.len() {
            let moved = self.pending[index];
            if let Some(slot) = self.slots.get_mut(&moved) {
                slot.index_in_pending = index;
            }
        }
        if let Some(slot) = self.slots.get_mut(&mining_key) {
            slot.in_pending = false;
        }
        self.finalized = false;

        info!("staged validator removal: {mining_key}");
        self.emit_proposed();
        Ok(())
    }

    fn is_staged(&self, mining_key: &Address) -> bool {
        self.is_pending_validator(mining_key)
    }
}

impl ValidatorSetSource for ValidatorSetManager {
    fn current_validators(&self) -> Vec<Address> {
        self.current.clone()
    }

    fn is_current_validator(&self, mining_key: &Address) -> bool {
        self.slots
            .get(mining_key)
            .map(|s| s.in_current)
            .unwrap_or(false)
    }
}
