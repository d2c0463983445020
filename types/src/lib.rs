//! Fundamental types for the Typhoon mirror.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! EVM addresses, transaction hashes, token amounts, timestamps, event identities
//! and block ranges.

pub mod address;
pub mod amount;
pub mod error;
pub mod event_key;
pub mod hash;
pub mod range;
pub mod time;

pub use address::EvmAddress;
pub use amount::TokenAmount;
pub use error::TypesError;
pub use event_key::EventKey;
pub use hash::{format_quantity, parse_quantity, TxHash};
pub use range::BlockRange;
pub use time::Timestamp;

/// Strip an optional `0x`/`0X` prefix from a hex string.
pub(crate) fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
