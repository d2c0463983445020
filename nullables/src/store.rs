//! Nullable mirror store: thread-safe, in-memory, with failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use typhoon_store::{
    check_account_update, Account, AccountStore, ApplyOutcome, AuditEntry, AuditStore,
    CursorStore, MetaStore, MirrorStore, MirrorTxn, PurchaseRecord, PurchaseStore, StoreError,
};
use typhoon_types::{EventKey, EvmAddress, Timestamp, TxHash};

#[derive(Clone, Default)]
struct MirrorState {
    accounts: BTreeMap<EvmAddress, Account>,
    referral_index: HashMap<String, EvmAddress>,
    usernames: HashSet<String>,
    purchases: HashMap<TxHash, PurchaseRecord>,
    audit: Vec<AuditEntry>,
    applied: HashSet<EventKey>,
    cursor: Option<u64>,
    meta: HashMap<String, Vec<u8>>,
    next_account_id: u64,
}

impl MirrorState {
    fn account_by_referral_id(&self, referral_id: &str) -> Option<Account> {
        self.referral_index
            .get(referral_id)
            .and_then(|wallet| self.accounts.get(wallet))
            .cloned()
    }

    fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let previous = self
            .accounts
            .get(&account.wallet)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", account.wallet)))?;
        check_account_update(previous, account)?;
        self.accounts.insert(account.wallet, account.clone());
        Ok(())
    }

    fn insert_purchase(&mut self, record: &PurchaseRecord) -> bool {
        if self.purchases.contains_key(&record.tx_hash) {
            return false;
        }
        self.purchases.insert(record.tx_hash, record.clone());
        true
    }

    fn replace_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError> {
        let existing = self
            .purchases
            .get_mut(&record.tx_hash)
            .ok_or_else(|| StoreError::NotFound(format!("purchase {}", record.tx_hash)))?;
        if existing.wallet != record.wallet {
            return Err(StoreError::Invalid(format!(
                "purchase {} cannot change wallet",
                record.tx_hash
            )));
        }
        *existing = record.clone();
        Ok(())
    }
}

/// Projection view over a scratch copy of the state.
struct NullTxn<'a> {
    state: &'a mut MirrorState,
}

impl MirrorTxn for NullTxn<'_> {
    fn account_by_wallet(&self, wallet: &EvmAddress) -> Result<Option<Account>, StoreError> {
        Ok(self.state.accounts.get(wallet).cloned())
    }

    fn account_by_referral_id(&self, referral_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.state.account_by_referral_id(referral_id))
    }

    fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.state.update_account(account)
    }

    fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<bool, StoreError> {
        Ok(self.state.insert_purchase(record))
    }

    fn purchase_by_tx(&self, tx_hash: &TxHash) -> Result<Option<PurchaseRecord>, StoreError> {
        Ok(self.state.purchases.get(tx_hash).cloned())
    }

    fn replace_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError> {
        self.state.replace_purchase(record)
    }

    fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.state.audit.push(entry.clone());
        Ok(())
    }
}

/// An in-memory [`MirrorStore`] for testing.
///
/// `apply_event` runs the projection against a copy of the state and swaps it
/// in only on success, which gives the same all-or-nothing behaviour as the
/// LMDB write transaction.
#[derive(Default)]
pub struct NullMirrorStore {
    state: Mutex<MirrorState>,
    fail_keys: Mutex<HashSet<EventKey>>,
    apply_attempts: Mutex<u64>,
}

impl NullMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `apply_event` for `key` fail with a backend error.
    pub fn fail_next_apply(&self, key: EventKey) {
        self.fail_keys.lock().unwrap().insert(key);
    }

    /// Number of `apply_event` calls that reached the projection or failed
    /// by injection. Duplicates are not counted.
    pub fn apply_attempts(&self) -> u64 {
        *self.apply_attempts.lock().unwrap()
    }

    /// Every audit entry, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().unwrap().audit.clone()
    }
}

impl AccountStore for NullMirrorStore {
    fn account_by_wallet(&self, wallet: &EvmAddress) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().unwrap().accounts.get(wallet).cloned())
    }

    fn account_by_referral_id(&self, referral_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().unwrap().account_by_referral_id(referral_id))
    }

    fn direct_referrals(&self, referral_id: &str) -> Result<Vec<Account>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut referrals: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.sponsor_referral_id.as_deref() == Some(referral_id))
            .cloned()
            .collect();
        referrals.sort_by_key(|a| a.id);
        Ok(referrals)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().accounts.len() as u64)
    }

    fn register_account(
        &self,
        wallet: &EvmAddress,
        username: &str,
        referral_id: &str,
        created_at: Timestamp,
    ) -> Result<Account, StoreError> {
        let mut state = self.state.lock().unwrap();
        let username_key = username.to_lowercase();
        if state.accounts.contains_key(wallet) {
            return Err(StoreError::Duplicate(format!("wallet {wallet}")));
        }
        if state.usernames.contains(&username_key) {
            return Err(StoreError::Duplicate(format!("username {username}")));
        }
        if state.referral_index.contains_key(referral_id) {
            return Err(StoreError::Duplicate(format!("referral id {referral_id}")));
        }
        state.next_account_id += 1;
        let account = Account::new(state.next_account_id, *wallet, username, referral_id, created_at);
        state.accounts.insert(*wallet, account.clone());
        state.usernames.insert(username_key);
        state.referral_index.insert(referral_id.to_string(), *wallet);
        Ok(account)
    }
}

impl PurchaseStore for NullMirrorStore {
    fn purchase_by_tx(&self, tx_hash: &TxHash) -> Result<Option<PurchaseRecord>, StoreError> {
        Ok(self.state.lock().unwrap().purchases.get(tx_hash).cloned())
    }

    fn purchases_for_wallet(&self, wallet: &EvmAddress) -> Result<Vec<PurchaseRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<PurchaseRecord> = state
            .purchases
            .values()
            .filter(|p| p.wallet == *wallet)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.chain_block_number
                .cmp(&a.chain_block_number)
                .then(b.purchased_at.cmp(&a.purchased_at))
        });
        Ok(records)
    }

    fn purchase_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().purchases.len() as u64)
    }
}

impl AuditStore for NullMirrorStore {
    fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.audit.iter().rev().take(limit).cloned().collect())
    }

    fn audit_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().audit.len() as u64)
    }
}

impl CursorStore for NullMirrorStore {
    fn cursor(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.state.lock().unwrap().cursor)
    }

    fn init_cursor(&self, initial: u64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(*state.cursor.get_or_insert(initial))
    }

    fn advance_cursor(&self, height: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(current) = state.cursor {
            if height < current {
                return Err(StoreError::CursorRegression {
                    current,
                    requested: height,
                });
            }
        }
        state.cursor = Some(height);
        Ok(())
    }
}

impl MetaStore for NullMirrorStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .meta
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.lock().unwrap().meta.get(key).cloned())
    }

    fn get_schema_version(&self) -> Result<u32, StoreError> {
        Ok(1)
    }

    fn set_schema_version(&self, _version: u32) -> Result<(), StoreError> {
        Ok(())
    }
}

impl MirrorStore for NullMirrorStore {
    fn apply_event<T, F>(&self, key: &EventKey, project: F) -> Result<ApplyOutcome<T>, StoreError>
    where
        F: FnOnce(&mut dyn MirrorTxn) -> Result<T, StoreError>,
    {
        let mut state = self.state.lock().unwrap();
        if state.applied.contains(key) {
            return Ok(ApplyOutcome::Duplicate);
        }
        *self.apply_attempts.lock().unwrap() += 1;
        if self.fail_keys.lock().unwrap().remove(key) {
            return Err(StoreError::Backend(format!("injected failure for {key}")));
        }

        let mut scratch = state.clone();
        let value = project(&mut NullTxn {
            state: &mut scratch,
        })?;
        scratch.applied.insert(*key);
        *state = scratch;
        Ok(ApplyOutcome::Applied(value))
    }

    fn is_applied(&self, key: &EventKey) -> Result<bool, StoreError> {
        Ok(self.state.lock().unwrap().applied.contains(key))
    }

    fn applied_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().applied.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typhoon_store::AuditKind;
    use typhoon_types::TokenAmount;

    fn key(n: u8) -> EventKey {
        EventKey::new(TxHash::new([n; 32]), 0)
    }

    #[test]
    fn failed_projection_leaves_state_untouched() {
        let store = NullMirrorStore::new();
        let wallet = EvmAddress::new([1; 20]);
        store
            .register_account(&wallet, "alice", "alice001", Timestamp::EPOCH)
            .unwrap();

        let result: Result<ApplyOutcome<()>, _> = store.apply_event(&key(1), |txn| {
            let mut a = txn.account_by_wallet(&wallet)?.unwrap();
            a.total_purchased = TokenAmount::new(5);
            txn.update_account(&a)?;
            txn.append_audit(&AuditEntry::new(
                key(1),
                AuditKind::Anomaly,
                0,
                Timestamp::EPOCH,
                serde_json::json!({}),
            ))?;
            Err(StoreError::Invalid("late failure".into()))
        });
        assert!(result.is_err());
        assert_eq!(
            store.account_by_wallet(&wallet).unwrap().unwrap().total_purchased,
            TokenAmount::ZERO
        );
        assert_eq!(store.audit_count().unwrap(), 0);
        assert!(!store.is_applied(&key(1)).unwrap());
    }

    #[test]
    fn injected_failure_fires_once() {
        let store = NullMirrorStore::new();
        store.fail_next_apply(key(2));
        assert!(store.apply_event(&key(2), |_| Ok(())).is_err());
        assert_eq!(
            store.apply_event(&key(2), |_| Ok(())).unwrap(),
            ApplyOutcome::Applied(())
        );
        assert!(store.apply_event(&key(2), |_| Ok(())).unwrap().is_duplicate());
        assert_eq!(store.apply_attempts(), 2);
    }

    #[test]
    fn cursor_rejects_regression() {
        let store = NullMirrorStore::new();
        assert_eq!(store.init_cursor(9).unwrap(), 9);
        assert_eq!(store.init_cursor(1).unwrap(), 9);
        store.advance_cursor(20).unwrap();
        assert!(matches!(
            store.advance_cursor(10),
            Err(StoreError::CursorRegression { current: 20, .. })
        ));
    }
}
