//! Purchase record storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use typhoon_types::{EvmAddress, Timestamp, TokenAmount, TxHash};

/// One snowball purchase, keyed by its transaction hash. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub tx_hash: TxHash,
    pub account_id: u64,
    pub wallet: EvmAddress,
    /// Investment block the snowballs were bought into.
    pub investment_block_id: u128,
    pub quantity: u128,
    pub total_paid: TokenAmount,
    /// Chain block that included the purchase.
    pub chain_block_number: u64,
    pub purchased_at: Timestamp,
}

pub trait PurchaseStore {
    fn purchase_by_tx(&self, tx_hash: &TxHash) -> Result<Option<PurchaseRecord>, StoreError>;

    /// All purchases of `wallet`, newest first.
    fn purchases_for_wallet(&self, wallet: &EvmAddress) -> Result<Vec<PurchaseRecord>, StoreError>;

    fn purchase_count(&self) -> Result<u64, StoreError>;
}
