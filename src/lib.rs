/// POA VALIDATOR FEDERATION
///
/// Integration layer over the three core components:
/// - `poa-keys`: mining/voting/payout key registry with bootstrap credentials
///   and migration from a predecessor instance
/// - `poa-validators`: two-phase pending/current validator set
/// - `poa-rewards`: round-robin reward schedulers (time- and block-driven)
///
/// `Federation` owns the concrete components and passes them across the
/// trait seams defined in `poa-core`, standing in for the host runtime that
/// would otherwise dispatch between deployed instances.

pub use poa_core::{Address, AuthorityConfig, ValidatorSetError};
pub use poa_keys::{KeyEvent, KeyRegistry, KeyRegistryError, MiningKeyRecord};
pub use poa_rewards::{
    BlockRewardScheduler, RewardBatch, RewardError, RewardParameters, TimedRewardScheduler,
};
pub use poa_validators::{ValidatorSetEvent, ValidatorSetManager};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FederationError {
    #[error("key registry error: {0}")]
    Keys(#[from] KeyRegistryError),
    #[error("validator set error: {0}")]
    Set(#[from] ValidatorSetError),
    #[error("reward error: {0}")]
    Rewards(#[from] RewardError),
}

/// A fully wired federation instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Federation {
    pub keys: KeyRegistry,
    pub validators: ValidatorSetManager,
    pub timed_rewards: TimedRewardScheduler,
    pub block_rewards: BlockRewardScheduler,
}

impl Federation {
    /// Wire all components against one authority configuration. The master
    /// of ceremony starts as the sole committed validator.
    pub fn new(
        config: AuthorityConfig,
        reward_params: RewardParameters,
        start_time: u64,
        start_block: u64,
    ) -> Result<Self, FederationError> {
        Ok(Federation {
            keys: KeyRegistry::new(config.clone()),
            validators: ValidatorSetManager::new(config.clone()),
            timed_rewards: TimedRewardScheduler::new(
                config.clone(),
                reward_params.clone(),
                start_time,
            )?,
            block_rewards: BlockRewardScheduler::new(config, reward_params, start_block)?,
        })
    }

    pub fn initiate_key(
        &mut self,
        caller: Address,
        candidate: Address,
    ) -> Result<(), FederationError> {
        Ok(self.keys.initiate_key(caller, candidate)?)
    }

    pub fn create_keys(
        &mut self,
        caller: Address,
        mining_key: Address,
        voting_key: Address,
        payout_key: Address,
        current_block: u64,
    ) -> Result<(), FederationError> {
        Ok(self.keys.create_keys(
            &mut self.validators,
            caller,
            mining_key,
            voting_key,
            payout_key,
            current_block,
        )?)
    }

    pub fn add_mining_key(
        &mut self,
        caller: Address,
        mining_key: Address,
        current_block: u64,
    ) -> Result<(), FederationError> {
        Ok(self
            .keys
            .add_mining_key(&mut self.validators, caller, mining_key, current_block)?)
    }

    pub fn remove_mining_key(
        &mut self,
        caller: Address,
        mining_key: Address,
        current_block: u64,
    ) -> Result<(), FederationError> {
        Ok(self
            .keys
            .remove_mining_key(&mut self.validators, caller, mining_key, current_block)?)
    }

    pub fn swap_mining_key(
        &mut self,
        caller: Address,
        old_key: Address,
        new_key: Address,
        current_block: u64,
    ) -> Result<(), FederationError> {
        Ok(self.keys.swap_mining_key(
            &mut self.validators,
            caller,
            old_key,
            new_key,
            current_block,
        )?)
    }

    pub fn add_voting_key(
        &mut self,
        caller: Address,
        voting_key: Address,
        mining_key: Address,
    ) -> Result<(), FederationError> {
        Ok(self.keys.add_voting_key(caller, voting_key, mining_key)?)
    }

    pub fn add_payout_key(
        &mut self,
        caller: Address,
        payout_key: Address,
        mining_key: Address,
    ) -> Result<(), FederationError> {
        Ok(self.keys.add_payout_key(caller, payout_key, mining_key)?)
    }

    /// Commit staged validator-set changes. System caller only.
    pub fn finalize(&mut self, caller: Address) -> Result<(), FederationError> {
        Ok(self.validators.finalize(caller)?)
    }

    pub fn trigger_time_rewards(
        &mut self,
        caller: Address,
        now: u64,
    ) -> Result<Option<RewardBatch>, FederationError> {
        Ok(self
            .timed_rewards
            .trigger(caller, now, &self.validators, &self.keys)?)
    }

    pub fn register_extra_receiver(
        &mut self,
        caller: Address,
        receiver: Address,
        amount: u128,
    ) -> Result<(), FederationError> {
        Ok(self
            .block_rewards
            .register_extra_receiver(caller, receiver, amount)?)
    }

    pub fn trigger_block_rewards(
        &mut self,
        caller: Address,
        block_height: u64,
    ) -> Result<Option<RewardBatch>, FederationError> {
        Ok(self
            .block_rewards
            .trigger(caller, block_height, &self.validators, &self.keys)?)
    }
}
