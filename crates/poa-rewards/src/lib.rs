/// POA FEDERATION REWARD SCHEDULERS
///
/// Round-robin reward distribution over a validator set that changes under
/// it. Two variants share one cycle algorithm:
/// - `TimedRewardScheduler`: one reward period per elapsed time threshold
/// - `BlockRewardScheduler`: one reward period per elapsed block threshold,
///   plus one-shot bridge-registered extra receivers
///
/// Both rebuild the ordered payout-key projection on every trigger from the
/// validator set and the key registry; neither ever caches positions across
/// calls, so set mutations (including reordering removals) are absorbed
/// automatically.

pub mod block;
pub mod cycle;
pub mod timed;

pub use block::{BlockRewardScheduler, ExtraReceiver};
pub use cycle::{PayoutCycle, RewardBatch, RewardError, RewardParameters};
pub use timed::TimedRewardScheduler;
