//! EVM account address (20 bytes).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{strip_hex_prefix, TypesError};

/// A 20-byte EVM address.
///
/// Always rendered lower-case with a `0x` prefix, which is also the form used
/// as a store key so that checksummed and plain inputs resolve to the same row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvmAddress([u8; 20]);

impl EvmAddress {
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Parse a `0x`-prefixed (or bare) 40-digit hex address. Case is ignored.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let digits = strip_hex_prefix(s.trim());
        if digits.len() != 40 {
            return Err(TypesError::InvalidAddress(s.to_string()));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|_| TypesError::InvalidAddress(s.to_string()))?;
        Ok(Self(out))
    }

    /// Extract an address from a left-padded ABI word.
    ///
    /// Returns `None` when any of the 12 padding bytes is non-zero.
    pub fn from_word(word: &[u8; 32]) -> Option<Self> {
        if word[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Some(Self(out))
    }

    /// Left-pad into a 32-byte ABI word (used for topic filters and `eth_call`).
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmAddress(0x{})", hex::encode(&self.0[..4]))
    }
}

impl FromStr for EvmAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
