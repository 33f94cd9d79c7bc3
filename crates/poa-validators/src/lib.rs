/// POA FEDERATION VALIDATOR SET
///
/// Owns the canonical current validator set and the pending set staged by the
/// key registry (or ballot governance), and performs the two-phase commit:
/// stage into pending, then a single system-caller finalize promotes pending
/// to current.

pub mod manager;

pub use manager::{ValidatorSetEvent, ValidatorSetManager};
