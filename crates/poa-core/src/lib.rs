/// POA FEDERATION CORE
///
/// Shared leaf crate for the proof-of-authority validator federation:
/// - The `Address` identity every component speaks in
/// - The `AuthorityConfig` that fixes privileged caller identities
/// - The trait seams the components interact through

pub mod address;
pub mod config;
pub mod traits;

pub use address::{Address, AddressError};
pub use config::{AuthorityConfig, DEFAULT_MAX_HISTORY_HOPS, DEFAULT_MAX_INITIAL_KEYS};
pub use traits::{PayoutResolver, ValidatorSetError, ValidatorSetSource, ValidatorSetStaging};
