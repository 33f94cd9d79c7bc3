// Federation authority configuration.
//
// Every privileged caller identity is fixed here at construction time and
// checked by simple address equality inside the components. Nothing in the
// federation reads ambient global state, so tests can vary the authorized
// identities freely.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// Number of initial keys the master of ceremony may activate.
pub const DEFAULT_MAX_INITIAL_KEYS: u32 = 12;

/// Depth bound on the mining-key predecessor walk.
pub const DEFAULT_MAX_HISTORY_HOPS: u32 = 25;

/// Privileged identities and structural limits shared by all components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Bootstrap identity allowed to activate initial keys.
    pub master_of_ceremony: Address,

    /// Governance contract allowed to mutate key bindings.
    pub voting_governance: Address,

    /// Governance contract allowed to stage validator-set changes directly.
    pub ballot_governance: Address,

    /// The key registry's own identity, used when it stages set changes.
    pub key_registry: Address,

    /// Host-runtime identity that finalizes the set and triggers rewards.
    pub system: Address,

    /// Bridge identity allowed to register one-shot extra reward receivers.
    pub bridge: Address,

    /// Cap on master-of-ceremony initial-key activations.
    pub max_initial_keys: u32,

    /// Cap on predecessor hops when walking mining-key history.
    pub max_history_hops: u32,
}

impl AuthorityConfig {
    pub fn new(
        master_of_ceremony: Address,
        voting_governance: Address,
        ballot_governance: Address,
        key_registry: Address,
        system: Address,
        bridge: Address,
    ) -> Self {
        AuthorityConfig {
            master_of_ceremony,
            voting_governance,
            ballot_governance,
            key_registry,
            system,
            bridge,
            max_initial_keys: DEFAULT_MAX_INITIAL_KEYS,
            max_history_hops: DEFAULT_MAX_HISTORY_HOPS,
        }
    }
}
