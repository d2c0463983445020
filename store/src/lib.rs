//! Abstract storage traits for the Typhoon mirror.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The reconciler and the HTTP API depend only on the traits.

pub mod account;
pub mod audit;
pub mod cursor;
pub mod error;
pub mod meta;
pub mod mirror;
pub mod purchase;

pub use account::{check_account_update, Account, AccountStore};
pub use audit::{AuditEntry, AuditKind, AuditStore};
pub use cursor::CursorStore;
pub use error::StoreError;
pub use meta::MetaStore;
pub use mirror::{ApplyOutcome, MirrorStore, MirrorTxn};
pub use purchase::{PurchaseRecord, PurchaseStore};
