//! Transaction hash type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{strip_hex_prefix, TypesError};

/// A 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let digits = strip_hex_prefix(s.trim());
        if digits.len() != 64 {
            return Err(TypesError::InvalidHash(s.to_string()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|_| TypesError::InvalidHash(s.to_string()))?;
        Ok(Self(out))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash(0x{})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse an Ethereum JSON-RPC hex quantity (`"0x1a"`) into a `u64`.
pub fn parse_quantity(s: &str) -> Result<u64, TypesError> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() {
        return Err(TypesError::InvalidQuantity(s.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| TypesError::InvalidQuantity(s.to_string()))
}

/// Format a `u64` as an Ethereum JSON-RPC hex quantity.
pub fn format_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}
