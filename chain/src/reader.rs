//! The chain read interface used by the reconciler.

use async_trait::async_trait;

use typhoon_events::{EventKind, RawLog};
use typhoon_types::EvmAddress;

use crate::ChainError;

/// Read-only view of the chain.
///
/// Implementations bound every call with a timeout; a call that does not
/// complete in time fails with [`ChainError::Timeout`].
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Highest block considered final: the node's head minus the configured
    /// confirmation depth.
    async fn current_height(&self) -> Result<u64, ChainError>;

    /// Contract logs of the given kinds in the inclusive range `from..=to`.
    ///
    /// An inverted range (`from > to`) yields no logs and is never sent to
    /// the node. A range the node refuses to serve fails with
    /// [`ChainError::RangeTooLarge`].
    async fn fetch_logs(
        &self,
        from: u64,
        to: u64,
        kinds: &[EventKind],
    ) -> Result<Vec<RawLog>, ChainError>;

    /// Unix timestamp of chain block `number`.
    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError>;

    /// `decimals()` of the ERC-20 token at `token`.
    async fn token_decimals(&self, token: &EvmAddress) -> Result<u8, ChainError>;
}
