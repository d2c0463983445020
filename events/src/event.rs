//! Typed domain events.

use serde::{Deserialize, Serialize};
use typhoon_types::{EventKey, EvmAddress, Timestamp, TokenAmount};

use crate::abi::EventKind;
use crate::log::RawLog;

/// A contract event with its payload decoded.
///
/// Investment block ids and snowball counts are contract-level integers and
/// are kept as `u128`; they never refer to chain blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    Purchase {
        investment_block_id: u128,
        buyer: EvmAddress,
        quantity: u128,
        total_paid: TokenAmount,
    },
    ReferrerLinked {
        user: EvmAddress,
        referrer: EvmAddress,
    },
    ReferralAccrued {
        referrer: EvmAddress,
        level: u32,
        amount: TokenAmount,
    },
    RewardPaid {
        investment_block_id: u128,
        user: EvmAddress,
        amount: TokenAmount,
    },
    ReferralRewardsClaimed {
        user: EvmAddress,
        amount: TokenAmount,
    },
    BlockOpened {
        investment_block_id: u128,
        snowball_count: u128,
    },
    BlockFilled {
        investment_block_id: u128,
        filled_at: Timestamp,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::Purchase { .. } => EventKind::Purchase,
            DomainEvent::ReferrerLinked { .. } => EventKind::ReferrerLinked,
            DomainEvent::ReferralAccrued { .. } => EventKind::ReferralAccrued,
            DomainEvent::RewardPaid { .. } => EventKind::RewardPaid,
            DomainEvent::ReferralRewardsClaimed { .. } => EventKind::ReferralRewardsClaimed,
            DomainEvent::BlockOpened { .. } => EventKind::BlockOpened,
            DomainEvent::BlockFilled { .. } => EventKind::BlockFilled,
        }
    }

    /// Encode into the log layout the contract would emit.
    ///
    /// Used by scripted chains in tests; the mirror itself only decodes.
    pub fn to_raw_log(&self, contract: EvmAddress, meta: &EventMeta) -> RawLog {
        let mut topics = vec![self.kind().topic0()];
        let mut data = Vec::new();
        match self {
            DomainEvent::Purchase {
                investment_block_id,
                buyer,
                quantity,
                total_paid,
            } => {
                topics.push(uint_word(*investment_block_id));
                topics.push(buyer.to_word());
                data.extend_from_slice(&uint_word(*quantity));
                data.extend_from_slice(&uint_word(total_paid.raw()));
            }
            DomainEvent::ReferrerLinked { user, referrer } => {
                topics.push(user.to_word());
                topics.push(referrer.to_word());
            }
            DomainEvent::ReferralAccrued {
                referrer,
                level,
                amount,
            } => {
                topics.push(referrer.to_word());
                data.extend_from_slice(&uint_word(*level as u128));
                data.extend_from_slice(&uint_word(amount.raw()));
            }
            DomainEvent::RewardPaid {
                investment_block_id,
                user,
                amount,
            } => {
                topics.push(uint_word(*investment_block_id));
                topics.push(user.to_word());
                data.extend_from_slice(&uint_word(amount.raw()));
            }
            DomainEvent::ReferralRewardsClaimed { user, amount } => {
                topics.push(user.to_word());
                data.extend_from_slice(&uint_word(amount.raw()));
            }
            DomainEvent::BlockOpened {
                investment_block_id,
                snowball_count,
            } => {
                topics.push(uint_word(*investment_block_id));
                data.extend_from_slice(&uint_word(*snowball_count));
            }
            DomainEvent::BlockFilled {
                investment_block_id,
                filled_at,
            } => {
                topics.push(uint_word(*investment_block_id));
                data.extend_from_slice(&uint_word(filled_at.as_secs() as u128));
            }
        }
        RawLog {
            address: contract,
            topics,
            data,
            block_number: meta.block_number,
            block_timestamp: meta.block_timestamp.map(|t| t.as_secs()),
            tx_hash: meta.key.tx_hash,
            log_index: meta.key.log_index,
            removed: false,
        }
    }
}

/// Where and when an event was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub key: EventKey,
    pub block_number: u64,
    pub block_timestamp: Option<Timestamp>,
}

impl EventMeta {
    pub fn of(log: &RawLog) -> Self {
        Self {
            key: log.key(),
            block_number: log.block_number,
            block_timestamp: log.block_timestamp.map(Timestamp::new),
        }
    }
}

/// A decoded event together with its position on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEvent {
    pub meta: EventMeta,
    pub event: DomainEvent,
}

impl ObservedEvent {
    pub fn key(&self) -> EventKey {
        self.meta.key
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

pub(crate) fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}
