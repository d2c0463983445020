//! LMDB storage backend for the Typhoon mirror.
//!
//! Implements all storage traits from `typhoon-store` using the `heed` LMDB
//! bindings. Each logical store maps to one or more named databases within a
//! single environment. LMDB's single-writer transactions are what make
//! [`typhoon_store::MirrorStore::apply_event`] atomic: the idempotency marker
//! and every mutation of one event commit in the same write transaction.

pub mod account;
pub mod audit;
pub mod cursor;
pub mod environment;
pub mod error;
pub mod integrity;
pub mod meta;
pub mod migration;
pub mod mirror;
pub mod purchase;

pub use environment::LmdbStore;
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
