// Notifications emitted by the key registry for off-chain observers.

use poa_core::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyEvent {
    InitialKeyActivated {
        initial_key: Address,
    },
    InitialKeyConsumed {
        initial_key: Address,
    },
    MiningKeyAdded {
        mining_key: Address,
    },
    MiningKeyRemoved {
        mining_key: Address,
    },
    MiningKeySwapped {
        old_key: Address,
        new_key: Address,
    },
    /// `old` is the delegate the mining key held before this binding, if any.
    VotingKeyBound {
        mining_key: Address,
        old: Option<Address>,
        new: Address,
    },
    VotingKeyUnbound {
        mining_key: Address,
        old: Address,
    },
    PayoutKeyBound {
        mining_key: Address,
        old: Option<Address>,
        new: Address,
    },
    PayoutKeyUnbound {
        mining_key: Address,
        old: Address,
    },
    MiningKeyMigrated {
        mining_key: Address,
    },
    InitialKeyMigrated {
        initial_key: Address,
    },
}
