//! Atomic, idempotent projection of one chain event into the mirror.

use crate::{Account, AccountStore, AuditEntry, AuditStore, CursorStore, MetaStore};
use crate::{PurchaseRecord, PurchaseStore, StoreError};
use typhoon_types::{EventKey, EvmAddress, TxHash};

/// Result of [`MirrorStore::apply_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome<T> {
    /// The event was new; its mutations and marker were committed together.
    Applied(T),
    /// The `(tx_hash, log_index)` marker already existed. Nothing was written.
    Duplicate,
}

impl<T> ApplyOutcome<T> {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Duplicate)
    }
}

/// Mutation surface available while projecting a single event.
///
/// Every call made through one `MirrorTxn` lands in the same write unit as
/// the event's idempotency marker: either all of them commit or none do.
pub trait MirrorTxn {
    fn account_by_wallet(&self, wallet: &EvmAddress) -> Result<Option<Account>, StoreError>;

    fn account_by_referral_id(&self, referral_id: &str) -> Result<Option<Account>, StoreError>;

    /// Overwrite an existing account row (matched by wallet).
    ///
    /// The wallet, username and referral id of the stored row must not change.
    /// A sponsor that is already set must not change either.
    fn update_account(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Insert a purchase row. Returns `false` (and writes nothing) when a row
    /// with the same transaction hash already exists.
    fn insert_purchase(&mut self, record: &PurchaseRecord) -> Result<bool, StoreError>;

    fn purchase_by_tx(&self, tx_hash: &TxHash) -> Result<Option<PurchaseRecord>, StoreError>;

    /// Overwrite an existing purchase row. The row must exist and keep its
    /// wallet.
    fn replace_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError>;

    fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;
}

/// The complete mirror: every domain store plus the idempotent apply path.
pub trait MirrorStore: AccountStore + PurchaseStore + AuditStore + CursorStore + MetaStore {
    /// Run `project` against a fresh write unit guarded by `key`.
    ///
    /// If `key` was applied before, `project` is not called and
    /// [`ApplyOutcome::Duplicate`] is returned. If `project` fails, nothing it
    /// did is kept and the marker is not written.
    fn apply_event<T, F>(&self, key: &EventKey, project: F) -> Result<ApplyOutcome<T>, StoreError>
    where
        F: FnOnce(&mut dyn MirrorTxn) -> Result<T, StoreError>;

    fn is_applied(&self, key: &EventKey) -> Result<bool, StoreError>;

    fn applied_count(&self) -> Result<u64, StoreError>;
}
