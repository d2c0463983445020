//! LMDB implementation of AuditStore.

use heed::RwTxn;

use typhoon_store::audit::{AuditEntry, AuditStore};
use typhoon_store::StoreError;

use crate::environment::{next_sequence, Databases};
use crate::{LmdbError, LmdbStore};

const NEXT_AUDIT_SEQ_KEY: &str = "next_audit_seq";

pub(crate) fn append_audit_row(
    dbs: &Databases,
    txn: &mut RwTxn,
    entry: &AuditEntry,
) -> Result<u64, LmdbError> {
    let seq = next_sequence(dbs, txn, NEXT_AUDIT_SEQ_KEY)?;
    let bytes = bincode::serialize(entry)?;
    dbs.audit.put(txn, &seq.to_be_bytes(), &bytes)?;
    Ok(seq)
}

impl AuditStore for LmdbStore {
    fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self.dbs.audit.rev_iter(&rtxn).map_err(LmdbError::from)?;
        let mut entries = Vec::new();
        for item in iter.take(limit) {
            let (_, value) = item.map_err(LmdbError::from)?;
            entries.push(bincode::deserialize(value).map_err(LmdbError::from)?);
        }
        Ok(entries)
    }

    fn audit_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.dbs.audit.len(&rtxn).map_err(LmdbError::from)?)
    }
}
