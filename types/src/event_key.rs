//! Stable identity of an on-chain log entry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TxHash;

/// `(tx_hash, log_index)`: globally unique, never reused. This is the
/// idempotency key for projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub tx_hash: TxHash,
    pub log_index: u64,
}

impl EventKey {
    /// Length of the binary key produced by [`EventKey::to_bytes`].
    pub const ENCODED_LEN: usize = 40;

    pub fn new(tx_hash: TxHash, log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }

    /// Binary key `tx_hash ++ log_index (big-endian)`.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut key = [0u8; Self::ENCODED_LEN];
        key[..32].copy_from_slice(self.tx_hash.as_bytes());
        key[32..].copy_from_slice(&self.log_index.to_be_bytes());
        key
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&bytes[32..]);
        Some(Self {
            tx_hash: TxHash::new(hash),
            log_index: u64::from_be_bytes(idx),
        })
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.log_index)
    }
}
