// Block-driven reward scheduler.
//
// Same cycle algorithm as the time-driven variant, plus one-shot "extra
// receivers": the bridge registers (receiver, amount) pairs between triggers
// and the next trigger pays each exactly once and clears the list, whether or
// not a threshold period elapsed.

use crate::cycle::{ordered_payout_keys, PayoutCycle, RewardBatch, RewardError, RewardParameters};
use log::info;
use poa_core::{Address, AuthorityConfig, PayoutResolver, ValidatorSetSource};
use serde::{Deserialize, Serialize};

/// A bridge-registered one-shot reward recipient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtraReceiver {
    pub receiver: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRewardScheduler {
    config: AuthorityConfig,
    params: RewardParameters,
    cycle: PayoutCycle,
    extra_receivers: Vec<ExtraReceiver>,
    events: Vec<RewardBatch>,
}

impl BlockRewardScheduler {
    pub fn new(
        config: AuthorityConfig,
        params: RewardParameters,
        start_block: u64,
    ) -> Result<Self, RewardError> {
        params.validate()?;
        Ok(BlockRewardScheduler {
            config,
            params,
            cycle: PayoutCycle::new(start_block),
            extra_receivers: Vec::new(),
            events: Vec::new(),
        })
    }

    /// Register a one-shot receiver, paid on the next trigger.
    ///
    /// Bridge caller only. A receiver may not be registered again until it
    /// has been paid.
    pub fn register_extra_receiver(
        &mut self,
        caller: Address,
        receiver: Address,
        amount: u128,
    ) -> Result<(), RewardError> {
        if caller != self.config.bridge {
            return Err(RewardError::Unauthorized(caller));
        }
        if receiver.is_zero() {
            return Err(RewardError::ZeroAddress);
        }
        if amount == 0 {
            return Err(RewardError::ZeroAmount);
        }
        if self.extra_receivers.iter().any(|e| e.receiver == receiver) {
            return Err(RewardError::DuplicateReceiver(receiver));
        }

        self.extra_receivers.push(ExtraReceiver { receiver, amount });
        info!("extra receiver registered: {receiver} for {amount}");
        Ok(())
    }

    pub fn pending_extra_receivers(&self) -> &[ExtraReceiver] {
        &self.extra_receivers
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

    /// Set the block threshold between reward periods. Voting governance
    /// only.
    pub fn set_threshold(&mut self, caller: Address, threshold: u64) -> Result<(), RewardError> {
        self.check_governance(caller)?;
        if threshold == 0 {
            return Err(RewardError::ZeroThreshold);
        }
        self.params.threshold = threshold;
        info!("reward threshold set to {threshold}");
        Ok(())
    }

    /// Settle all periods elapsed up to `block_height` and flush every
    /// pending extra receiver.
    ///
    /// `Ok(None)` only when there is nothing at all to pay: zero periods and
    /// no pending extras.
    pub fn trigger(
        &mut self,
        caller: Address,
        block_height: u64,
        set: &dyn ValidatorSetSource,
        keys: &dyn PayoutResolver,
    ) -> Result<Option<RewardBatch>, RewardError> {
        if caller != self.config.system {
            return Err(RewardError::Unauthorized(caller));
        }

        let projection = ordered_payout_keys(set, keys);
        let (recipients, periods) = self.cycle.settle(&self.params, block_height, &projection);
        let extras = std::mem::take(&mut self.extra_receivers);
        if periods == 0 && extras.is_empty() {
            return Ok(None);
        }

        let mut receivers = recipients;
        let mut amounts = vec![self.params.reward_amount; receivers.len()];
        for extra in extras {
            receivers.push(extra.receiver);
            amounts.push(extra.amount);
        }
        receivers.push(self.params.emission_fund);
        amounts.push(self.params.emission_amount * u128::from(periods));

        let batch = RewardBatch {
            receivers,
            amounts,
            periods,
        };
        info!(
            "block rewards settled at height {}: {} periods, {} receivers",
            block_height,
            periods,
            batch.receivers.len()
        );
        self.events.push(batch.clone());
        Ok(Some(batch))
    }

    pub fn cursor(&self) -> usize {
        self.cycle.cursor()
    }

    pub fn last_trigger_block(&self) -> u64 {
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
