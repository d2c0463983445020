//! Event projection: one handler per domain event, each running inside the
//! store's atomic, idempotent `apply_event`.

use std::collections::HashSet;

use serde_json::json;

use typhoon_events::{DomainEvent, ObservedEvent};
use typhoon_store::{
    Account, ApplyOutcome, AuditEntry, AuditKind, MirrorStore, MirrorTxn, PurchaseRecord,
    StoreError,
};
use typhoon_types::{EvmAddress, Timestamp, TokenAmount};

/// How many sponsor levels above an account count towards team size.
pub const MAX_REFERRAL_DEPTH: usize = 15;

/// What a handler did with a new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Account aggregates or purchase rows changed.
    Mutated,
    /// Only an audit entry was written.
    Recorded,
    /// Valid event with nothing to change (sponsor already set).
    Unchanged,
    /// Could not be attributed; written to the audit log with this reason.
    Anomaly(&'static str),
}

/// Result of projecting one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Applied(Effect),
    /// The event's marker was already present.
    Duplicate,
}

/// Stateless; every decision is made against the transaction's view.
#[derive(Debug, Default, Clone, Copy)]
pub struct Projector;

impl Projector {
    pub fn project<S: MirrorStore>(
        &self,
        store: &S,
        observed: &ObservedEvent,
    ) -> Result<Projection, StoreError> {
        let outcome = store.apply_event(&observed.meta.key, |txn| apply(txn, observed))?;
        Ok(match outcome {
            ApplyOutcome::Applied(effect) => Projection::Applied(effect),
            ApplyOutcome::Duplicate => Projection::Duplicate,
        })
    }
}

fn apply(txn: &mut dyn MirrorTxn, observed: &ObservedEvent) -> Result<Effect, StoreError> {
    let ctx = Ctx {
        observed,
        at: observed.meta.block_timestamp.unwrap_or_default(),
    };
    match &observed.event {
        DomainEvent::Purchase {
            investment_block_id,
            buyer,
            quantity,
            total_paid,
        } => ctx.purchase(txn, *investment_block_id, buyer, *quantity, *total_paid),
        DomainEvent::ReferrerLinked { user, referrer } => ctx.link_referrer(txn, user, referrer),
        DomainEvent::ReferralAccrued {
            referrer,
            level,
            amount,
        } => ctx.accrue_referral(txn, referrer, *level, *amount),
        DomainEvent::RewardPaid {
            investment_block_id,
            user,
            amount,
        } => ctx.record(
            txn,
            AuditKind::RewardPaid,
            json!({
                "block_id": investment_block_id.to_string(),
                "user": user.to_string(),
                "amount": amount.to_string(),
            }),
        ),
        DomainEvent::ReferralRewardsClaimed { user, amount } => ctx.claim(txn, user, *amount),
        DomainEvent::BlockOpened {
            investment_block_id,
            snowball_count,
        } => ctx.record(
            txn,
            AuditKind::BlockOpened,
            json!({
                "block_id": investment_block_id.to_string(),
                "snowball_count": snowball_count.to_string(),
            }),
        ),
        DomainEvent::BlockFilled {
            investment_block_id,
            filled_at,
        } => ctx.record(
            txn,
            AuditKind::BlockFilled,
            json!({
                "block_id": investment_block_id.to_string(),
                "filled_at": filled_at.as_secs(),
            }),
        ),
    }
}

struct Ctx<'a> {
    observed: &'a ObservedEvent,
    at: Timestamp,
}

impl Ctx<'_> {
    fn record(
        &self,
        txn: &mut dyn MirrorTxn,
        kind: AuditKind,
        detail: serde_json::Value,
    ) -> Result<Effect, StoreError> {
        txn.append_audit(&self.entry(kind, detail))?;
        Ok(Effect::Recorded)
    }

    fn anomaly(
        &self,
        txn: &mut dyn MirrorTxn,
        reason: &'static str,
        wallet: &EvmAddress,
        mut detail: serde_json::Value,
    ) -> Result<Effect, StoreError> {
        tracing::warn!(
            event = %self.observed.meta.key,
            kind = %self.observed.kind(),
            %wallet,
            reason,
            "event not attributable, recorded as anomaly"
        );
        if let Some(map) = detail.as_object_mut() {
            map.insert("reason".into(), json!(reason));
            map.insert("event".into(), json!(self.observed.kind().name()));
            map.insert("wallet".into(), json!(wallet.to_string()));
        }
        txn.append_audit(&self.entry(AuditKind::Anomaly, detail))?;
        Ok(Effect::Anomaly(reason))
    }

    /// An amount that does not fit in u128 is skipped rather than retried.
    fn overflow(
        &self,
        txn: &mut dyn MirrorTxn,
        field: &'static str,
        wallet: &EvmAddress,
    ) -> Result<Effect, StoreError> {
        self.anomaly(txn, "amount overflow", wallet, json!({ "field": field }))
    }

    fn entry(&self, kind: AuditKind, detail: serde_json::Value) -> AuditEntry {
        AuditEntry::new(
            self.observed.meta.key,
            kind,
            self.observed.meta.block_number,
            self.at,
            detail,
        )
    }

    fn purchase(
        &self,
        txn: &mut dyn MirrorTxn,
        investment_block_id: u128,
        buyer: &EvmAddress,
        quantity: u128,
        total_paid: TokenAmount,
    ) -> Result<Effect, StoreError> {
        let Some(mut account) = txn.account_by_wallet(buyer)? else {
            return self.anomaly(
                txn,
                "purchase by unregistered wallet",
                buyer,
                json!({
                    "block_id": investment_block_id.to_string(),
                    "quantity": quantity.to_string(),
                    "total_paid": total_paid.to_string(),
                }),
            );
        };

        let Some(total) = account.total_purchased.checked_add(total_paid) else {
            return self.overflow(txn, "total_purchased", buyer);
        };

        let record = PurchaseRecord {
            tx_hash: self.observed.meta.key.tx_hash,
            account_id: account.id,
            wallet: *buyer,
            investment_block_id,
            quantity,
            total_paid,
            chain_block_number: self.observed.meta.block_number,
            purchased_at: self.at,
        };
        if !txn.insert_purchase(&record)? {
            // Another purchase log from the same transaction: fold it into
            // the existing row.
            match txn.purchase_by_tx(&record.tx_hash)? {
                Some(mut row) if row.wallet == *buyer => {
                    let (Some(q), Some(paid)) = (
                        row.quantity.checked_add(quantity),
                        row.total_paid.checked_add(total_paid),
                    ) else {
                        return self.overflow(txn, "purchase row", buyer);
                    };
                    row.quantity = q;
                    row.total_paid = paid;
                    txn.replace_purchase(&row)?;
                }
                other => tracing::warn!(
                    tx = %record.tx_hash,
                    %buyer,
                    row_wallet = ?other.map(|r| r.wallet),
                    "purchase row belongs to another wallet, counting total only"
                ),
            }
        }
        account.total_purchased = total;
        txn.update_account(&account)?;
        Ok(Effect::Mutated)
    }

    fn link_referrer(
        &self,
        txn: &mut dyn MirrorTxn,
        user: &EvmAddress,
        referrer: &EvmAddress,
    ) -> Result<Effect, StoreError> {
        let detail = json!({ "referrer": referrer.to_string() });
        if user == referrer {
            return self.anomaly(txn, "self referral", user, detail);
        }
        let Some(mut account) = txn.account_by_wallet(user)? else {
            return self.anomaly(txn, "referred wallet not registered", user, detail);
        };
        let Some(mut sponsor) = txn.account_by_wallet(referrer)? else {
            return self.anomaly(txn, "referrer not registered", user, detail);
        };
        if let Some(existing) = &account.sponsor_referral_id {
            tracing::debug!(
                %user,
                existing = %existing,
                "sponsor already set, keeping first link"
            );
            return Ok(Effect::Unchanged);
        }
        if reaches(txn, &sponsor, &account.referral_id)? {
            return self.anomaly(txn, "referral cycle", user, detail);
        }

        account.sponsor_referral_id = Some(sponsor.referral_id.clone());
        txn.update_account(&account)?;

        sponsor.direct_count = sponsor.direct_count.saturating_add(1);
        let added = account.team_size.saturating_add(1);
        propagate_team_size(txn, sponsor, added)?;
        Ok(Effect::Mutated)
    }

    fn accrue_referral(
        &self,
        txn: &mut dyn MirrorTxn,
        referrer: &EvmAddress,
        level: u32,
        amount: TokenAmount,
    ) -> Result<Effect, StoreError> {
        let detail = json!({ "level": level, "amount": amount.to_string() });
        let Some(mut account) = txn.account_by_wallet(referrer)? else {
            return self.anomaly(txn, "accrual for unregistered referrer", referrer, detail);
        };
        let Some(earned) = account.referral_earned.checked_add(amount) else {
            return self.overflow(txn, "referral_earned", referrer);
        };
        account.referral_earned = earned;
        txn.update_account(&account)?;
        let mut detail = detail;
        if let Some(map) = detail.as_object_mut() {
            map.insert("referrer".into(), json!(referrer.to_string()));
        }
        txn.append_audit(&self.entry(AuditKind::ReferralAccrued, detail))?;
        Ok(Effect::Mutated)
    }

    fn claim(
        &self,
        txn: &mut dyn MirrorTxn,
        user: &EvmAddress,
        amount: TokenAmount,
    ) -> Result<Effect, StoreError> {
        let Some(mut account) = txn.account_by_wallet(user)? else {
            return self.anomaly(
                txn,
                "claim by unregistered wallet",
                user,
                json!({ "amount": amount.to_string() }),
            );
        };
        let Some(claimed) = account.referral_claimed.checked_add(amount) else {
            return self.overflow(txn, "referral_claimed", user);
        };
        account.referral_claimed = claimed;
        txn.update_account(&account)?;
        Ok(Effect::Mutated)
    }
}

/// Whether walking up from `start` reaches the account with `referral_id`.
fn reaches(
    txn: &mut dyn MirrorTxn,
    start: &Account,
    referral_id: &str,
) -> Result<bool, StoreError> {
    let mut seen = HashSet::new();
    let mut current = Some(start.clone());
    while let Some(account) = current {
        if account.referral_id == referral_id {
            return Ok(true);
        }
        if !seen.insert(account.wallet) {
            return Ok(false);
        }
        current = match &account.sponsor_referral_id {
            Some(parent) => txn.account_by_referral_id(parent)?,
            None => None,
        };
    }
    Ok(false)
}

/// Add `added` to the team size of `first` and of its ancestors, up to
/// [`MAX_REFERRAL_DEPTH`] levels. `first` is written even when `added` is 0
/// so callers can piggyback other field changes on it.
fn propagate_team_size(
    txn: &mut dyn MirrorTxn,
    first: Account,
    added: u32,
) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    let mut current = Some(first);
    let mut depth = 0;
    while let Some(mut account) = current {
        depth += 1;
        if depth > MAX_REFERRAL_DEPTH || !seen.insert(account.wallet) {
            break;
        }
        account.team_size = account.team_size.saturating_add(added);
        txn.update_account(&account)?;
        current = match &account.sponsor_referral_id {
            Some(parent) => txn.account_by_referral_id(parent)?,
            None => None,
        };
    }
    Ok(())
}
