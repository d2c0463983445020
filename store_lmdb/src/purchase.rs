//! LMDB implementation of PurchaseStore.

use heed::{RoTxn, RwTxn};

use typhoon_store::purchase::{PurchaseRecord, PurchaseStore};
use typhoon_store::StoreError;
use typhoon_types::{EvmAddress, TxHash};

use crate::environment::Databases;
use crate::{LmdbError, LmdbStore};

fn wallet_purchase_key(wallet: &EvmAddress, tx_hash: &TxHash) -> [u8; 52] {
    let mut key = [0u8; 52];
    key[..20].copy_from_slice(wallet.as_bytes());
    key[20..].copy_from_slice(tx_hash.as_bytes());
    key
}

pub(crate) fn read_purchase(
    dbs: &Databases,
    txn: &RoTxn,
    tx_hash: &TxHash,
) -> Result<Option<PurchaseRecord>, LmdbError> {
    match dbs.purchases.get(txn, tx_hash.as_bytes())? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        None => Ok(None),
    }
}

/// Insert a purchase and its wallet index entry. Returns `false` if the
/// transaction hash is already present.
pub(crate) fn insert_purchase_row(
    dbs: &Databases,
    txn: &mut RwTxn,
    record: &PurchaseRecord,
) -> Result<bool, LmdbError> {
    if dbs.purchases.get(&*txn, record.tx_hash.as_bytes())?.is_some() {
        return Ok(false);
    }
    let bytes = bincode::serialize(record)?;
    dbs.purchases.put(txn, record.tx_hash.as_bytes(), &bytes)?;
    dbs.wallet_purchases
        .put(txn, &wallet_purchase_key(&record.wallet, &record.tx_hash), b"")?;
    Ok(true)
}

/// Overwrite a purchase row in place. The wallet index is left as is, so the
/// wallet must not change.
pub(crate) fn replace_purchase_row(
    dbs: &Databases,
    txn: &mut RwTxn,
    record: &PurchaseRecord,
) -> Result<(), StoreError> {
    let existing = read_purchase(dbs, &*txn, &record.tx_hash)?
        .ok_or_else(|| StoreError::NotFound(format!("purchase {}", record.tx_hash)))?;
    if existing.wallet != record.wallet {
        return Err(StoreError::Invalid(format!(
            "purchase {} cannot change wallet",
            record.tx_hash
        )));
    }
    let bytes = bincode::serialize(record).map_err(LmdbError::from)?;
    dbs.purchases
        .put(txn, record.tx_hash.as_bytes(), &bytes)
        .map_err(LmdbError::from)?;
    Ok(())
}

impl PurchaseStore for LmdbStore {
    fn purchase_by_tx(&self, tx_hash: &TxHash) -> Result<Option<PurchaseRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(read_purchase(&self.dbs, &rtxn, tx_hash)?)
    }

    fn purchases_for_wallet(&self, wallet: &EvmAddress) -> Result<Vec<PurchaseRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self
            .dbs
            .wallet_purchases
            .prefix_iter(&rtxn, wallet.as_bytes())
            .map_err(LmdbError::from)?;
        let mut records = Vec::new();
        for entry in iter {
            let (key, _) = entry.map_err(LmdbError::from)?;
            let hash: [u8; 32] = key[20..]
                .try_into()
                .map_err(|_| LmdbError::Corruption("wallet purchase key length".into()))?;
            let record = read_purchase(&self.dbs, &rtxn, &TxHash::new(hash))?.ok_or_else(|| {
                LmdbError::Corruption(format!("indexed purchase {} missing", TxHash::new(hash)))
            })?;
            records.push(record);
        }
        // Index order is by hash; callers want newest first.
        records.sort_by(|a, b| {
            b.chain_block_number
                .cmp(&a.chain_block_number)
                .then(b.purchased_at.cmp(&a.purchased_at))
        });
        Ok(records)
    }

    fn purchase_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.dbs.purchases.len(&rtxn).map_err(LmdbError::from)?)
    }
}
