// Trait seams between the federation components.
//
// The key registry drives the validator set only through `ValidatorSetStaging`
// and the reward schedulers read it only through `ValidatorSetSource` +
// `PayoutResolver`. Components never hold each other; the integration layer
// owns the concrete instances and passes them across these seams, so a
// replacement implementation can be swapped in without the callers noticing.

use crate::address::Address;
use thiserror::Error;

/// Failures surfaced by the validator-set manager.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidatorSetError {
    #[error("caller {0} is not authorized for this validator-set operation")]
    Unauthorized(Address),
    #[error("mining key {0} is already present in the pending set")]
    AlreadyPresent(Address),
    #[error("mining key {0} is not present in the pending set")]
    NotPresent(Address),
    #[error("mining key must not be the zero address")]
    EmptyKey,
}

/// Write seam: stage membership changes into the pending validator set.
///
/// Both operations append to the pending set only; nothing becomes part of
/// the current set until the system caller finalizes.
///
/// `is_staged` exposes pending membership so a caller that must issue more
/// than one staging call can verify every precondition up front and never
/// leave the set half-updated.
pub trait ValidatorSetStaging {
    fn stage_addition(
        &mut self,
        caller: Address,
        mining_key: Address,
    ) -> Result<(), ValidatorSetError>;

    fn stage_removal(
        &mut self,
        caller: Address,
        mining_key: Address,
    ) -> Result<(), ValidatorSetError>;

    fn is_staged(&self, mining_key: &Address) -> bool;
}

/// Read seam: the committed validator membership in its current ordering.
///
/// The ordering is only stable between removals; removal reorders the set, so
/// consumers must re-read it on every use and never cache positions.
pub trait ValidatorSetSource {
    fn current_validators(&self) -> Vec<Address>;

    fn is_current_validator(&self, mining_key: &Address) -> bool;
}

/// Read seam: resolve a mining key to its bound payout key, if any.
pub trait PayoutResolver {
    fn payout_key_of(&self, mining_key: &Address) -> Option<Address>;
}
