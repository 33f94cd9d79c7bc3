// 20-byte account identity shared by every federation component.
//
// SAFETY INVARIANTS:
// 1. The zero address is never a valid validator, delegate or receiver identity
// 2. Parsing is strict: exactly 40 hex digits, optional 0x prefix
// 3. Ordering is the raw byte ordering, so BTreeMap iteration is deterministic

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 20-byte account address.
///
/// Mining keys, voting keys, payout keys, governance contracts and fund
/// recipients are all plain addresses; which role an address plays is decided
/// entirely by the component that records it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address([u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    /// The all-zero address. Rejected as input by every mutating operation.
    pub fn zero() -> Self {
        Address([0u8; Self::LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Build an address whose trailing eight bytes encode `value`.
    ///
    /// Handy for tests and simulations that need distinct, readable
    /// identities without real key material.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; Self::LEN];
        bytes[Self::LEN - 8..].copy_from_slice(&value.to_be_bytes());
        Address(bytes)
    }

    /// Parse from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(stripped)?;
        if raw.len() != Self::LEN {
            return Err(AddressError::InvalidLength(raw.len()));
        }
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(&raw);
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressError {
    #[error("address must be {} bytes, got {0}", Address::LEN)]
    InvalidLength(usize),
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address() {
        assert!(Address::zero().is_zero());
        assert!(!Address::from_low_u64(1).is_zero());
    }

    #[test]
    fn test_hex_round_trip() {
        let addr = Address::from_low_u64(0xdeadbeef);
        let parsed = Address::from_hex(&addr.to_string()).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_hex_without_prefix() {
        let addr = Address::from_low_u64(7);
        let bare = addr.to_string().trim_start_matches("0x").to_string();
        assert_eq!(Address::from_hex(&bare).unwrap(), addr);
    }

    #[test]
    fn test_invalid_length_rejected() {
        assert!(matches!(
            Address::from_hex("0xabcd"),
            Err(AddressError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_ordering_is_byte_ordering() {
        let a = Address::from_low_u64(1);
        let b = Address::from_low_u64(2);
        assert!(a < b);
    }
}
