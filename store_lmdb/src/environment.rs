//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::migration::Migrator;
use crate::LmdbError;

/// Default LMDB map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Names of every database in a Typhoon mirror environment.
pub const DATABASE_NAMES: &[&str] = &[
    "accounts",
    "referral_index",
    "username_index",
    "sponsor_index",
    "purchases",
    "wallet_purchases",
    "applied_events",
    "audit",
    "meta",
];

const MAX_DBS: u32 = 16;

/// Handles to all named databases.
///
/// Key layouts:
/// - `accounts`: `wallet(20)` → bincode [`typhoon_store::Account`]
/// - `referral_index`: `referral_id` → `wallet(20)`
/// - `username_index`: lower-cased username → `wallet(20)`
/// - `sponsor_index`: `sponsor_referral_id ++ 0x00 ++ account_id(8, BE)` → `wallet(20)`
/// - `purchases`: `tx_hash(32)` → bincode [`typhoon_store::PurchaseRecord`]
/// - `wallet_purchases`: `wallet(20) ++ tx_hash(32)` → empty
/// - `applied_events`: `tx_hash(32) ++ log_index(8, BE)` → empty
/// - `audit`: `seq(8, BE)` → bincode [`typhoon_store::AuditEntry`]
/// - `meta`: utf-8 key → raw bytes
pub(crate) struct Databases {
    pub(crate) accounts: Database<Bytes, Bytes>,
    pub(crate) referral_index: Database<Bytes, Bytes>,
    pub(crate) username_index: Database<Bytes, Bytes>,
    pub(crate) sponsor_index: Database<Bytes, Bytes>,
    pub(crate) purchases: Database<Bytes, Bytes>,
    pub(crate) wallet_purchases: Database<Bytes, Bytes>,
    pub(crate) applied_events: Database<Bytes, Bytes>,
    pub(crate) audit: Database<Bytes, Bytes>,
    pub(crate) meta: Database<Bytes, Bytes>,
}

/// The mirror store: one LMDB environment holding every database.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) dbs: Databases,
}

impl LmdbStore {
    /// Open or create the mirror at `path`, then bring its schema up to date.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create {}: {e}", path.display())))?;

        // SAFETY: the environment is opened once per process and never
        // concurrently from another process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let dbs = Databases {
            accounts: env.create_database(&mut wtxn, Some("accounts"))?,
            referral_index: env.create_database(&mut wtxn, Some("referral_index"))?,
            username_index: env.create_database(&mut wtxn, Some("username_index"))?,
            sponsor_index: env.create_database(&mut wtxn, Some("sponsor_index"))?,
            purchases: env.create_database(&mut wtxn, Some("purchases"))?,
            wallet_purchases: env.create_database(&mut wtxn, Some("wallet_purchases"))?,
            applied_events: env.create_database(&mut wtxn, Some("applied_events"))?,
            audit: env.create_database(&mut wtxn, Some("audit"))?,
            meta: env.create_database(&mut wtxn, Some("meta"))?,
        };
        wtxn.commit()?;

        let store = Self { env, dbs };
        Migrator::run(&store)?;
        tracing::info!(path = %path.display(), "mirror store opened");
        Ok(store)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}

/// Read a big-endian `u64` counter from `meta`, defaulting to `default`.
pub(crate) fn read_counter(
    dbs: &Databases,
    txn: &heed::RoTxn,
    key: &str,
    default: u64,
) -> Result<u64, LmdbError> {
    match dbs.meta.get(txn, key.as_bytes())? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .try_into()
                .map_err(|_| LmdbError::Corruption(format!("meta counter '{key}'")))?;
            Ok(u64::from_be_bytes(arr))
        }
        None => Ok(default),
    }
}

/// Return the next value of a sequence counter and bump it.
pub(crate) fn next_sequence(
    dbs: &Databases,
    txn: &mut heed::RwTxn,
    key: &str,
) -> Result<u64, LmdbError> {
    let current = read_counter(dbs, &*txn, key, 1)?;
    dbs.meta
        .put(txn, key.as_bytes(), &(current + 1).to_be_bytes())?;
    Ok(current)
}
