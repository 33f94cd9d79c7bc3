// Round-robin payout cycle shared by both scheduler variants.
//
// SAFETY INVARIANTS:
// 1. One reward per elapsed period, recipients visited in strict round-robin
//    order with wraparound — no validator skipped, none paid twice
// 2. The ordered payout list is a projection rebuilt on every invocation from
//    the validator set and the key registry, never cached
// 3. On an empty projection nothing is paid and the cycle does not advance,
//    so pending periods are not silently lost
// 4. The cursor is reduced modulo the current list length before paying, so a
//    list that shrank below the previous cursor stays in rotation

use poa_core::{Address, PayoutResolver, ValidatorSetSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RewardError {
    #[error("caller {0} is not authorized to trigger rewards")]
    Unauthorized(Address),
    #[error("extra receiver {0} is already registered")]
    DuplicateReceiver(Address),
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("receiver must not be the zero address")]
    ZeroAddress,
    #[error("trigger threshold must be greater than zero")]
    ZeroThreshold,
}

/// Fixed reward parameters, set at initialization and changed only through
/// the external governance collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardParameters {
    /// Amount paid to one payout key per elapsed period.
    pub reward_amount: u128,
    /// Emission-fund cut accrued per elapsed period.
    pub emission_amount: u128,
    /// Treasury recipient of the emission cut.
    pub emission_fund: Address,
    /// Trigger units (seconds or blocks) between reward periods.
    pub threshold: u64,
}

impl RewardParameters {
    pub fn validate(&self) -> Result<(), RewardError> {
        if self.threshold == 0 {
            return Err(RewardError::ZeroThreshold);
        }
        if self.emission_fund.is_zero() {
            return Err(RewardError::ZeroAddress);
        }
        Ok(())
    }
}

/// Batched reward notification for one trigger invocation.
///
/// `receivers` and `amounts` are parallel; the last entry is always the
/// emission fund, carrying `emission_amount * periods`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBatch {
    pub receivers: Vec<Address>,
    pub amounts: Vec<u128>,
    /// Number of full threshold periods settled by this invocation.
    pub periods: u64,
}

/// Working state of one scheduler: the last settled trigger unit and the
/// round-robin cursor. The payout list itself is deliberately absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PayoutCycle {
    last_trigger: u64,
    cursor: usize,
}

impl PayoutCycle {
    pub fn new(start_trigger: u64) -> Self {
        PayoutCycle {
            last_trigger: start_trigger,
            cursor: 0,
        }
    }

    pub fn last_trigger(&self) -> u64 {
        self.last_trigger
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Settle every full period elapsed up to `now` against `payout_keys`,
    /// returning the ordered per-period recipients and the period count.
    ///
    /// Zero elapsed periods and an empty payout list are defined successes:
    /// nothing is returned and the cycle state is untouched. Catch-up is
    /// unbounded: a single call settles however many periods have elapsed.
    pub(crate) fn settle(
        &mut self,
        params: &RewardParameters,
        now: u64,
        payout_keys: &[Address],
    ) -> (Vec<Address>, u64) {
        if payout_keys.is_empty() {
            return (Vec::new(), 0);
        }
        let periods = now.saturating_sub(self.last_trigger) / params.threshold;
        if periods == 0 {
            return (Vec::new(), 0);
        }

        let len = payout_keys.len() as u64;
        // the list may have shrunk since the previous invocation
        self.cursor %= payout_keys.len();

        let mut recipients = Vec::with_capacity(periods as usize);
        for n in 0..periods {
            let index = (self.cursor as u64 + n) % len;
            recipients.push(payout_keys[index as usize]);
        }

        self.last_trigger += params.threshold * periods;
        self.cursor = ((self.cursor as u64 + periods) % len) as usize;
        (recipients, periods)
    }
}

/// Rebuild the ordered payout projection: the current validator set mapped
/// through the registry to payout keys, mining key standing in where no
/// payout key is bound. Ordering is whatever the set currently reports.
pub(crate) fn ordered_payout_keys(
    set: &dyn ValidatorSetSource,
    keys: &dyn PayoutResolver,
) -> Vec<Address> {
    set.current_validators()
        .into_iter()
        .map(|mining| keys.payout_key_of(&mining).unwrap_or(mining))
        .collect()
}
