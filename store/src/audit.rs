//! Audit log storage trait.
//!
//! Events that do not move account aggregates (reward payouts, investment
//! block lifecycle) and projection anomalies are kept here for display and
//! forensics.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use typhoon_types::{EventKey, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    RewardPaid,
    ReferralAccrued,
    BlockOpened,
    BlockFilled,
    /// An event that could not be attributed to a registered account.
    Anomaly,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::RewardPaid => "reward_paid",
            AuditKind::ReferralAccrued => "referral_accrued",
            AuditKind::BlockOpened => "block_opened",
            AuditKind::BlockFilled => "block_filled",
            AuditKind::Anomaly => "anomaly",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub key: EventKey,
    pub kind: AuditKind,
    pub block_number: u64,
    pub block_timestamp: Timestamp,
    /// JSON object describing the event, stored as text so the binary
    /// encoding stays self-describing-free.
    pub detail: String,
}

impl AuditEntry {
    pub fn new(
        key: EventKey,
        kind: AuditKind,
        block_number: u64,
        block_timestamp: Timestamp,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            key,
            kind,
            block_number,
            block_timestamp,
            detail: detail.to_string(),
        }
    }

    pub fn detail_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.detail).unwrap_or(serde_json::Value::Null)
    }
}

pub trait AuditStore {
    /// Most recent entries first, at most `limit`.
    fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;

    fn audit_count(&self) -> Result<u64, StoreError>;
}
