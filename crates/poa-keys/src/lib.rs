/// POA FEDERATION KEY REGISTRY
///
/// Authoritative mapping between a validator's permanent identity (mining
/// key) and its rebindable delegates (voting key, payout key), plus the
/// one-time initial-key bootstrap lifecycle, bounded key-succession history,
/// and one-shot migration from a predecessor registry instance.

pub mod events;
pub mod registry;

pub use events::KeyEvent;
pub use registry::{InitialKeyState, KeyRegistry, KeyRegistryError, MiningKeyRecord};
