// Off-chain federation walkthrough: bootstrap three validators, rotate a few
// reward periods, remove one validator mid-rotation.

use log::info;
use poa_federation::{Address, AuthorityConfig, Federation, FederationError, RewardParameters};

fn main() -> Result<(), FederationError> {
    env_logger::init();
    info!("starting federation walkthrough");

    let moc = Address::from_low_u64(100);
    let voting_gov = Address::from_low_u64(101);
    let ballot_gov = Address::from_low_u64(102);
    let registry = Address::from_low_u64(103);
    let system = Address::from_low_u64(104);
    let bridge = Address::from_low_u64(105);
    let config = AuthorityConfig::new(moc, voting_gov, ballot_gov, registry, system, bridge);

    let params = RewardParameters {
        reward_amount: 1_000_000,
        emission_amount: 250_000,
        emission_fund: Address::from_low_u64(900),
        threshold: 5,
    };
    let mut federation = Federation::new(config, params, 0, 0)?;

    // bootstrap three validators through one-time initial keys
    for n in 1..=3u64 {
        let initial = Address::from_low_u64(n);
        federation.initiate_key(moc, initial)?;
        federation.create_keys(
            initial,
            Address::from_low_u64(10 + n), // mining
            Address::from_low_u64(20 + n), // voting
            Address::from_low_u64(30 + n), // payout
            n,
        )?;
    }
    federation.finalize(system)?;
    println!(
        "committed validator set: {} members",
        federation.validators.current_validator_count()
    );

    for now in [5u64, 12, 31] {
        if let Some(batch) = federation.trigger_time_rewards(system, now)? {
            println!("t={now}: settled {} periods", batch.periods);
            for (receiver, amount) in batch.receivers.iter().zip(&batch.amounts) {
                println!("  {receiver} <- {amount}");
            }
        }
    }

    // drop one validator and show the rotation absorbing the reorder
    federation.remove_mining_key(voting_gov, Address::from_low_u64(11), 40)?;
    federation.finalize(system)?;
    if let Some(batch) = federation.trigger_time_rewards(system, 50)? {
        println!("after removal: settled {} periods", batch.periods);
        for (receiver, amount) in batch.receivers.iter().zip(&batch.amounts) {
            println!("  {receiver} <- {amount}");
        }
    }

    Ok(())
}
