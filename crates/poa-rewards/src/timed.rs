// Time-driven reward scheduler.

use crate::cycle::{ordered_payout_keys, PayoutCycle, RewardBatch, RewardError, RewardParameters};
use log::info;
use poa_core::{Address, AuthorityConfig, PayoutResolver, ValidatorSetSource};
use serde::{Deserialize, Serialize};

/// Pays `reward_amount` per elapsed time threshold, round-robin over the
/// payout projection, plus the emission-fund cut. Triggered by the system
/// caller; tolerant of irregular invocation cadence via catch-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedRewardScheduler {
    config: AuthorityConfig,
    params: RewardParameters,
    cycle: PayoutCycle,
    events: Vec<RewardBatch>,
}

impl TimedRewardScheduler {
    pub fn new(
        config: AuthorityConfig,
        params: RewardParameters,
        start_time: u64,
    ) -> Result<Self, RewardError> {
        params.validate()?;
        Ok(TimedRewardScheduler {
            config,
            params,
            cycle: PayoutCycle::new(start_time),
            events: Vec::new(),
        })
    }

    /// Set the per-period validator reward. Voting governance only.
    pub fn set_reward_amount(
        &mut self,
        caller: Address,
        amount: u128,
    ) -> Result<(), RewardError> {
        self.check_governance(caller)?;
        self.params.reward_amount = amount;
        info!("reward amount set to {amount}");
        Ok(())
    }

    /// Set the per-period emission-fund cut. Voting governance only.
    pub fn set_emission_amount(
        &mut self,
        caller: Address,
        amount: u128,
    ) -> Result<(), RewardError> {
        self.check_governance(caller)?;
        self.params.emission_amount = amount;
        info!("emission amount set to {amount}");
        Ok(())
    }

    /// Set the time threshold between reward periods. Voting governance
    /// only; already-elapsed time is re-measured against the new threshold
    /// on the next trigger.
    pub fn set_threshold(&mut self, caller: Address, threshold: u64) -> Result<(), RewardError> {
        self.check_governance(caller)?;
        if threshold == 0 {
            return Err(RewardError::ZeroThreshold);
        }
        self.params.threshold = threshold;
        info!("reward threshold set to {threshold}");
        Ok(())
    }

    /// Settle all periods elapsed up to `now`.
    ///
    /// Returns `Ok(None)` when no full period has elapsed — a defined
    /// success, not an error.
    pub fn trigger(
        &mut self,
        caller: Address,
        now: u64,
        set: &dyn ValidatorSetSource,
        keys: &dyn PayoutResolver,
    ) -> Result<Option<RewardBatch>, RewardError> {
        if caller != self.config.system {
            return Err(RewardError::Unauthorized(caller));
        }

        let projection = ordered_payout_keys(set, keys);
        let (recipients, periods) = self.cycle.settle(&self.params, now, &projection);
        if periods == 0 {
            return Ok(None);
        }

        let mut receivers = recipients;
        let mut amounts = vec![self.params.reward_amount; receivers.len()];
        receivers.push(self.params.emission_fund);
        amounts.push(self.params.emission_amount * u128::from(periods));

        let batch = RewardBatch {
            receivers,
            amounts,
            periods,
        };
        info!(
            "time rewards settled: {} periods, {} receivers",
            periods,
            batch.receivers.len()
        );
        self.events.push(batch.clone());
        Ok(Some(batch))
    }

    pub fn cursor(&self) -> usize {
        self.cycle.cursor()
    }

    pub fn last_trigger_time(&self) -> u64 {
        self.cycle.last_trigger()
    }

    /// Drain accumulated reward notifications.
    pub fn take_events(&mut self) -> Vec<RewardBatch> {
        std::mem::take(&mut self.events)
    }

    fn check_governance(&self, caller: Address) -> Result<(), RewardError> {
        if caller != self.config.voting_governance {
            return Err(RewardError::Unauthorized(caller));
        }
        Ok(())
    }
}
