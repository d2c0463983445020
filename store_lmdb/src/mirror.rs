//! LMDB implementation of MirrorStore.
//!
//! One event is one LMDB write transaction: the marker lookup, every row the
//! projection touches, and the marker itself. Returning early (or an error
//! from the projection) drops the transaction, which aborts it.

use heed::RwTxn;

use typhoon_store::mirror::{ApplyOutcome, MirrorStore, MirrorTxn};
use typhoon_store::{Account, AuditEntry, PurchaseRecord, StoreError};
use typhoon_types::{EventKey, EvmAddress, TxHash};

use crate::account::{read_account, read_account_by_referral, update_account_row};
use crate::audit::append_audit_row;
use crate::environment::Databases;
use crate::purchase::{insert_purchase_row, read_purchase, replace_purchase_row};
use crate::{LmdbError, LmdbStore};

struct LmdbMirrorTxn<'a, 'e> {
    dbs: &'a Databases,
    txn: &'a mut RwTxn<'e>,
}

impl MirrorTxn for LmdbMirrorTxn<'_, '_> {
    fn account_by_wallet(&self, wallet: &EvmAddress) -> Result<Option<Account>, StoreError> {
        Ok(read_account(self.dbs, &*self.txn, wallet)?)
    }

    fn account_by_referral_id(&self, referral_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(read_account_by_referral(self.dbs, &*self.txn, referral_id)?)
    }

    fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        update_account_row(self.dbs, &mut *self.txn, account)
    }

    fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<bool, StoreError> {
        Ok(insert_purchase_row(self.dbs, &mut *self.txn, record)?)
    }

    fn purchase_by_tx(&self, tx_hash: &TxHash) -> Result<Option<PurchaseRecord>, StoreError> {
        Ok(read_purchase(self.dbs, &*self.txn, tx_hash)?)
    }

    fn replace_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError> {
        replace_purchase_row(self.dbs, &mut *self.txn, record)
    }

    fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        append_audit_row(self.dbs, &mut *self.txn, entry)?;
        Ok(())
    }
}

impl MirrorStore for LmdbStore {
    fn apply_event<T, F>(&self, key: &EventKey, project: F) -> Result<ApplyOutcome<T>, StoreError>
    where
        F: FnOnce(&mut dyn MirrorTxn) -> Result<T, StoreError>,
    {
        let marker = key.to_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .dbs
            .applied_events
            .get(&wtxn, &marker)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Ok(ApplyOutcome::Duplicate);
        }

        let value = {
            let mut mirror_txn = LmdbMirrorTxn {
                dbs: &self.dbs,
                txn: &mut wtxn,
            };
            project(&mut mirror_txn)?
        };

        self.dbs
            .applied_events
            .put(&mut wtxn, &marker, b"")
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(ApplyOutcome::Applied(value))
    }

    fn is_applied(&self, key: &EventKey) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .dbs
            .applied_events
            .get(&rtxn, &key.to_bytes())
            .map_err(LmdbError::from)?
            .is_some())
    }

    fn applied_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.dbs.applied_events.len(&rtxn).map_err(LmdbError::from)?)
    }
}
