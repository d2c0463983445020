//! LMDB database integrity checks.
//!
//! Run on startup to detect corruption early, before the reconciler begins
//! projecting events.

use std::path::Path;

use crate::environment::DATABASE_NAMES;
use crate::{LmdbError, LmdbStore};

/// Summary of an integrity check run.
#[derive(Debug)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Open each expected database and count its entries.
///
/// Read failures are recorded in the report rather than causing a hard error.
/// Account rows are additionally cross-checked against the referral index,
/// since a missing index entry would make sponsor links unresolvable.
pub fn check_integrity(store: &LmdbStore) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport {
        databases_checked: 0,
        total_entries: 0,
        errors: Vec::new(),
    };

    let rtxn = store.env.read_txn()?;

    for &db_name in DATABASE_NAMES {
        match store
            .env
            .open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(db_name))
        {
            Ok(Some(db)) => {
                report.databases_checked += 1;
                match db.len(&rtxn) {
                    Ok(count) => report.total_entries += count,
                    Err(e) => report
                        .errors
                        .push(format!("failed to read database '{}': {}", db_name, e)),
                }
            }
            Ok(None) => report
                .errors
                .push(format!("database '{}' is missing", db_name)),
            Err(e) => report
                .errors
                .push(format!("failed to open database '{}': {}", db_name, e)),
        }
    }

    for entry in store.dbs.accounts.iter(&rtxn)? {
        let (key, value) = entry?;
        let account: typhoon_store::Account = match bincode::deserialize(value) {
            Ok(a) => a,
            Err(e) => {
                report
                    .errors
                    .push(format!("undecodable account {}: {e}", hex_key(key)));
                continue;
            }
        };
        match store
            .dbs
            .referral_index
            .get(&rtxn, account.referral_id.as_bytes())?
        {
            Some(wallet) if wallet == account.wallet.as_bytes() => {}
            _ => report.errors.push(format!(
                "referral id {} of {} is not indexed",
                account.referral_id, account.wallet
            )),
        }
    }

    Ok(report)
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

/// Check if the LMDB data directory looks valid before opening.
///
/// Returns `Ok(())` for a fresh (nonexistent) directory. Returns an error
/// if the directory exists but `data.mdb` is missing, which suggests
/// misconfiguration.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let data_file = path.join("data.mdb");
    if !data_file.exists() && path.read_dir().map(|mut d| d.next().is_some()).unwrap_or(false) {
        return Err(format!(
            "directory {} is not empty but has no data.mdb",
            path.display()
        ));
    }
    Ok(())
}
