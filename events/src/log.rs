//! Raw log entries as returned by `eth_getLogs`.

use serde::{Deserialize, Serialize};
use typhoon_types::{EventKey, EvmAddress, TxHash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: EvmAddress,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: u64,
    /// Only some nodes include `blockTimestamp` in log objects.
    pub block_timestamp: Option<u64>,
    pub tx_hash: TxHash,
    pub log_index: u64,
    /// Set by the node when the log was dropped by a re-org.
    pub removed: bool,
}

impl RawLog {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.tx_hash, self.log_index)
    }

    /// Emission order: block first, then position within the block.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}
