//! Event signatures and topic hashes.

use sha3::{Digest, Keccak256};
use std::fmt;
use std::sync::OnceLock;

/// One of the seven contract events the mirror consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Purchase,
    ReferrerLinked,
    ReferralAccrued,
    RewardPaid,
    ReferralRewardsClaimed,
    BlockOpened,
    BlockFilled,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Purchase,
        EventKind::ReferrerLinked,
        EventKind::ReferralAccrued,
        EventKind::RewardPaid,
        EventKind::ReferralRewardsClaimed,
        EventKind::BlockOpened,
        EventKind::BlockFilled,
    ];

    /// Solidity event name as emitted by the contract.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Purchase => "SnowballPurchased",
            EventKind::ReferrerLinked => "ReferrerSet",
            EventKind::ReferralAccrued => "ReferralBonusAccrued",
            EventKind::RewardPaid => "RewardPaid",
            EventKind::ReferralRewardsClaimed => "ReferralRewardsClaimed",
            EventKind::BlockOpened => "BlockCreated",
            EventKind::BlockFilled => "BlockFullyClaimed",
        }
    }

    /// Canonical signature, the preimage of topic0.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Purchase => "SnowballPurchased(uint256,address,uint256,uint256)",
            EventKind::ReferrerLinked => "ReferrerSet(address,address)",
            EventKind::ReferralAccrued => "ReferralBonusAccrued(address,uint256,uint256)",
            EventKind::RewardPaid => "RewardPaid(uint256,address,uint256)",
            EventKind::ReferralRewardsClaimed => "ReferralRewardsClaimed(address,uint256)",
            EventKind::BlockOpened => "BlockCreated(uint256,uint256)",
            EventKind::BlockFilled => "BlockFullyClaimed(uint256,uint256)",
        }
    }

    /// Number of topics including topic0.
    pub(crate) fn topic_count(&self) -> usize {
        match self {
            EventKind::Purchase => 3,
            EventKind::ReferrerLinked => 3,
            EventKind::ReferralAccrued => 2,
            EventKind::RewardPaid => 3,
            EventKind::ReferralRewardsClaimed => 2,
            EventKind::BlockOpened => 2,
            EventKind::BlockFilled => 2,
        }
    }

    /// Number of 32-byte words in the non-indexed data.
    pub(crate) fn data_words(&self) -> usize {
        match self {
            EventKind::Purchase => 2,
            EventKind::ReferrerLinked => 0,
            EventKind::ReferralAccrued => 2,
            EventKind::RewardPaid => 1,
            EventKind::ReferralRewardsClaimed => 1,
            EventKind::BlockOpened => 1,
            EventKind::BlockFilled => 1,
        }
    }

    pub fn topic0(&self) -> [u8; 32] {
        topic_table()[self.index()]
    }

    pub fn from_topic0(topic: &[u8; 32]) -> Option<Self> {
        topic_table()
            .iter()
            .position(|t| t == topic)
            .map(|i| Self::ALL[i])
    }

    /// `0x`-prefixed topic0, the form used in `eth_getLogs` filters.
    pub fn topic0_hex(&self) -> String {
        format!("0x{}", hex::encode(self.topic0()))
    }

    fn index(&self) -> usize {
        match self {
            EventKind::Purchase => 0,
            EventKind::ReferrerLinked => 1,
            EventKind::ReferralAccrued => 2,
            EventKind::RewardPaid => 3,
            EventKind::ReferralRewardsClaimed => 4,
            EventKind::BlockOpened => 5,
            EventKind::BlockFilled => 6,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn topic_table() -> &'static [[u8; 32]; 7] {
    static TABLE: OnceLock<[[u8; 32]; 7]> = OnceLock::new();
    TABLE.get_or_init(|| EventKind::ALL.map(|kind| keccak256(kind.signature().as_bytes())))
}
