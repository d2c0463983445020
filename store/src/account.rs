//! Account storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use typhoon_types::{EvmAddress, Timestamp, TokenAmount};

/// Maximum username length accepted at registration.
pub const MAX_USERNAME_LEN: usize = 32;

/// One mirrored wallet that has registered with the scheme.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned sequential id.
    pub id: u64,
    pub wallet: EvmAddress,
    pub username: String,
    /// This account's own referral code.
    pub referral_id: String,
    /// Referral code of the sponsor. Set at most once.
    pub sponsor_referral_id: Option<String>,
    /// Sum of `totalPaid` over all attributed purchases.
    pub total_purchased: TokenAmount,
    pub referral_earned: TokenAmount,
    pub referral_claimed: TokenAmount,
    /// Accounts whose sponsor is this account.
    pub direct_count: u32,
    /// Accounts whose sponsor chain reaches this account.
    pub team_size: u32,
    pub created_at: Timestamp,
}

impl Account {
    /// A freshly registered account with zeroed aggregates.
    pub fn new(
        id: u64,
        wallet: EvmAddress,
        username: impl Into<String>,
        referral_id: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            wallet,
            username: username.into(),
            referral_id: referral_id.into(),
            sponsor_referral_id: None,
            total_purchased: TokenAmount::ZERO,
            referral_earned: TokenAmount::ZERO,
            referral_claimed: TokenAmount::ZERO,
            direct_count: 0,
            team_size: 0,
            created_at,
        }
    }

    /// Referral rewards accrued on chain but not yet claimed, as mirrored.
    pub fn referral_pending(&self) -> TokenAmount {
        TokenAmount::new(
            self.referral_earned
                .raw()
                .saturating_sub(self.referral_claimed.raw()),
        )
    }
}

/// Read access to accounts plus the registration write path.
///
/// Aggregate fields are never written through this trait; they change only
/// inside [`crate::MirrorStore::apply_event`].
pub trait AccountStore {
    fn account_by_wallet(&self, wallet: &EvmAddress) -> Result<Option<Account>, StoreError>;

    fn account_by_referral_id(&self, referral_id: &str) -> Result<Option<Account>, StoreError>;

    /// Accounts whose sponsor is `referral_id`, ordered by id.
    fn direct_referrals(&self, referral_id: &str) -> Result<Vec<Account>, StoreError>;

    fn account_count(&self) -> Result<u64, StoreError>;

    /// Insert a new account row.
    ///
    /// Fails with [`StoreError::Duplicate`] if the wallet, username or
    /// referral id is already taken. The id is assigned by the store.
    fn register_account(
        &self,
        wallet: &EvmAddress,
        username: &str,
        referral_id: &str,
        created_at: Timestamp,
    ) -> Result<Account, StoreError>;
}

/// Validate an aggregate update against the stored row.
///
/// Identity columns are immutable and a sponsor, once set, cannot change.
/// Backends call this from [`crate::MirrorTxn::update_account`].
pub fn check_account_update(previous: &Account, next: &Account) -> Result<(), StoreError> {
    if previous.id != next.id
        || previous.wallet != next.wallet
        || previous.username != next.username
        || previous.referral_id != next.referral_id
    {
        return Err(StoreError::Invalid(format!(
            "identity columns of account {} cannot change",
            previous.wallet
        )));
    }
    if let Some(existing) = &previous.sponsor_referral_id {
        if next.sponsor_referral_id.as_ref() != Some(existing) {
            return Err(StoreError::Invalid(format!(
                "sponsor of account {} is already set",
                previous.wallet
            )));
        }
    }
    Ok(())
}
