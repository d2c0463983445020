//! LMDB implementation of AccountStore, plus the row helpers shared with the
//! projection transaction.

use heed::{RoTxn, RwTxn};

use typhoon_store::account::{check_account_update, Account, AccountStore};
use typhoon_store::StoreError;
use typhoon_types::{EvmAddress, Timestamp};

use crate::environment::{next_sequence, Databases};
use crate::{LmdbError, LmdbStore};

const NEXT_ACCOUNT_ID_KEY: &str = "next_account_id";

/// Composite key `sponsor_referral_id ++ 0x00 ++ account_id(BE)`.
///
/// Referral ids never contain a NUL byte, so the separator keeps one code
/// from being a prefix scan match for a longer code.
fn sponsor_key(sponsor_referral_id: &str, account_id: u64) -> Vec<u8> {
    let mut key = sponsor_prefix(sponsor_referral_id);
    key.extend_from_slice(&account_id.to_be_bytes());
    key
}

fn sponsor_prefix(sponsor_referral_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(sponsor_referral_id.len() + 9);
    key.extend_from_slice(sponsor_referral_id.as_bytes());
    key.push(0);
    key
}

pub(crate) fn wallet_from_bytes(bytes: &[u8]) -> Result<EvmAddress, LmdbError> {
    let arr: [u8; 20] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption("wallet index value is not 20 bytes".into()))?;
    Ok(EvmAddress::new(arr))
}

pub(crate) fn read_account(
    dbs: &Databases,
    txn: &RoTxn,
    wallet: &EvmAddress,
) -> Result<Option<Account>, LmdbError> {
    match dbs.accounts.get(txn, wallet.as_bytes())? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn read_account_by_referral(
    dbs: &Databases,
    txn: &RoTxn,
    referral_id: &str,
) -> Result<Option<Account>, LmdbError> {
    match dbs.referral_index.get(txn, referral_id.as_bytes())? {
        Some(bytes) => {
            let wallet = wallet_from_bytes(bytes)?;
            let account = read_account(dbs, txn, &wallet)?.ok_or_else(|| {
                LmdbError::Corruption(format!("referral id {referral_id} points at missing account"))
            })?;
            Ok(Some(account))
        }
        None => Ok(None),
    }
}

/// Overwrite an existing account row and keep the sponsor index in step.
pub(crate) fn update_account_row(
    dbs: &Databases,
    txn: &mut RwTxn,
    account: &Account,
) -> Result<(), StoreError> {
    let previous = read_account(dbs, &*txn, &account.wallet)?
        .ok_or_else(|| StoreError::NotFound(format!("account {}", account.wallet)))?;
    check_account_update(&previous, account)?;

    let bytes = bincode::serialize(account).map_err(LmdbError::from)?;
    dbs.accounts
        .put(txn, account.wallet.as_bytes(), &bytes)
        .map_err(LmdbError::from)?;

    if previous.sponsor_referral_id.is_none() {
        if let Some(sponsor) = &account.sponsor_referral_id {
            dbs.sponsor_index
                .put(txn, &sponsor_key(sponsor, account.id), account.wallet.as_bytes())
                .map_err(LmdbError::from)?;
        }
    }
    Ok(())
}

impl AccountStore for LmdbStore {
    fn account_by_wallet(&self, wallet: &EvmAddress) -> Result<Option<Account>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(read_account(&self.dbs, &rtxn, wallet)?)
    }

    fn account_by_referral_id(&self, referral_id: &str) -> Result<Option<Account>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(read_account_by_referral(&self.dbs, &rtxn, referral_id)?)
    }

    fn direct_referrals(&self, referral_id: &str) -> Result<Vec<Account>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = sponsor_prefix(referral_id);
        let iter = self
            .dbs
            .sponsor_index
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in iter {
            let (_key, value) = entry.map_err(LmdbError::from)?;
            let wallet = wallet_from_bytes(value)?;
            if let Some(account) = read_account(&self.dbs, &rtxn, &wallet)? {
                results.push(account);
            }
        }
        Ok(results)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.dbs.accounts.len(&rtxn).map_err(LmdbError::from)?)
    }

    fn register_account(
        &self,
        wallet: &EvmAddress,
        username: &str,
        referral_id: &str,
        created_at: Timestamp,
    ) -> Result<Account, StoreError> {
        let username_key = username.to_lowercase();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        if self
            .dbs
            .accounts
            .get(&wtxn, wallet.as_bytes())
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("wallet {wallet}")));
        }
        if self
            .dbs
            .username_index
            .get(&wtxn, username_key.as_bytes())
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("username {username}")));
        }
        if self
            .dbs
            .referral_index
            .get(&wtxn, referral_id.as_bytes())
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("referral id {referral_id}")));
        }

        let id = next_sequence(&self.dbs, &mut wtxn, NEXT_ACCOUNT_ID_KEY)?;
        let account = Account::new(id, *wallet, username, referral_id, created_at);
        let bytes = bincode::serialize(&account).map_err(LmdbError::from)?;

        self.dbs
            .accounts
            .put(&mut wtxn, wallet.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        self.dbs
            .username_index
            .put(&mut wtxn, username_key.as_bytes(), wallet.as_bytes())
            .map_err(LmdbError::from)?;
        self.dbs
            .referral_index
            .put(&mut wtxn, referral_id.as_bytes(), wallet.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(%wallet, id, "account registered");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, LmdbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path(), 16 * 1024 * 1024).unwrap();
        (dir, store)
    }

    fn wallet(byte: u8) -> EvmAddress {
        EvmAddress::new([byte; 20])
    }

    #[test]
    fn register_and_read_back() {
        let (_dir, store) = open();
        let a = store
            .register_account(&wallet(1), "Alice", "alice001", Timestamp::new(10))
            .unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(store.account_by_wallet(&wallet(1)).unwrap(), Some(a.clone()));
        assert_eq!(store.account_by_referral_id("alice001").unwrap(), Some(a));
        assert_eq!(store.account_count().unwrap(), 1);
    }

    #[test]
    fn uniqueness_constraints() {
        let (_dir, store) = open();
        store
            .register_account(&wallet(1), "alice", "code0001", Timestamp::new(0))
            .unwrap();
        let dup_wallet = store.register_account(&wallet(1), "bob", "code0002", Timestamp::new(0));
        assert!(matches!(dup_wallet, Err(StoreError::Duplicate(_))));
        let dup_name = store.register_account(&wallet(2), "ALICE", "code0002", Timestamp::new(0));
        assert!(matches!(dup_name, Err(StoreError::Duplicate(_))));
        let dup_code = store.register_account(&wallet(2), "bob", "code0001", Timestamp::new(0));
        assert!(matches!(dup_code, Err(StoreError::Duplicate(_))));
        assert_eq!(store.account_count().unwrap(), 1);
    }

    #[test]
    fn sponsor_index_tracks_first_link_only() {
        let (_dir, store) = open();
        let sponsor = store
            .register_account(&wallet(1), "sponsor", "spon0001", Timestamp::new(0))
            .unwrap();
        let mut child = store
            .register_account(&wallet(2), "child", "chil0001", Timestamp::new(0))
            .unwrap();
        let unrelated = store
            .register_account(&wallet(3), "other", "spon00010", Timestamp::new(0))
            .unwrap();

        child.sponsor_referral_id = Some(sponsor.referral_id.clone());
        let mut wtxn = store.env.write_txn().unwrap();
        update_account_row(&store.dbs, &mut wtxn, &child).unwrap();
        wtxn.commit().unwrap();

        let refs = store.direct_referrals("spon0001").unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].wallet, child.wallet);
        assert!(store.direct_referrals(&unrelated.referral_id).unwrap().is_empty());
    }
}
