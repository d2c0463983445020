//! Log → domain event decoding.

use typhoon_types::{EvmAddress, Timestamp, TokenAmount};

use crate::abi::EventKind;
use crate::error::DecodeError;
use crate::event::{DomainEvent, EventMeta, ObservedEvent};
use crate::log::RawLog;

/// Decode a raw log.
///
/// Logs whose topic0 is not one of the seven known events (or that carry no
/// topics at all) are filtered out with `Ok(None)`. A known event with the
/// wrong layout is a [`DecodeError`].
pub fn decode(log: &RawLog) -> Result<Option<ObservedEvent>, DecodeError> {
    let kind = match log.topics.first().and_then(EventKind::from_topic0) {
        Some(kind) => kind,
        None => return Ok(None),
    };
    let reader = LogReader::new(kind, log)?;

    let event = match kind {
        EventKind::Purchase => DomainEvent::Purchase {
            investment_block_id: reader.topic_uint(1, "blockId")?,
            buyer: reader.topic_address(2, "buyer")?,
            quantity: reader.data_uint(0, "quantity")?,
            total_paid: TokenAmount::new(reader.data_uint(1, "totalPaid")?),
        },
        EventKind::ReferrerLinked => DomainEvent::ReferrerLinked {
            user: reader.topic_address(1, "user")?,
            referrer: reader.topic_address(2, "referrer")?,
        },
        EventKind::ReferralAccrued => DomainEvent::ReferralAccrued {
            referrer: reader.topic_address(1, "referrer")?,
            level: narrow(kind, "level", reader.data_uint(0, "level")?)?,
            amount: TokenAmount::new(reader.data_uint(1, "amount")?),
        },
        EventKind::RewardPaid => DomainEvent::RewardPaid {
            investment_block_id: reader.topic_uint(1, "blockId")?,
            user: reader.topic_address(2, "user")?,
            amount: TokenAmount::new(reader.data_uint(0, "rewardAmount")?),
        },
        EventKind::ReferralRewardsClaimed => DomainEvent::ReferralRewardsClaimed {
            user: reader.topic_address(1, "user")?,
            amount: TokenAmount::new(reader.data_uint(0, "amount")?),
        },
        EventKind::BlockOpened => DomainEvent::BlockOpened {
            investment_block_id: reader.topic_uint(1, "blockId")?,
            snowball_count: reader.data_uint(0, "snowballCount")?,
        },
        EventKind::BlockFilled => DomainEvent::BlockFilled {
            investment_block_id: reader.topic_uint(1, "blockId")?,
            filled_at: Timestamp::new(narrow(kind, "timestamp", reader.data_uint(0, "timestamp")?)?),
        },
    };

    Ok(Some(ObservedEvent {
        meta: EventMeta::of(log),
        event,
    }))
}

fn narrow<T: TryFrom<u128>>(
    kind: EventKind,
    field: &'static str,
    value: u128,
) -> Result<T, DecodeError> {
    T::try_from(value).map_err(|_| DecodeError::ValueOverflow {
        event: kind.name(),
        field,
    })
}

/// Word accessors over a log whose shape has already been checked.
struct LogReader<'a> {
    kind: EventKind,
    log: &'a RawLog,
}

impl<'a> LogReader<'a> {
    fn new(kind: EventKind, log: &'a RawLog) -> Result<Self, DecodeError> {
        if log.topics.len() != kind.topic_count() {
            return Err(DecodeError::TopicCount {
                event: kind.name(),
                expected: kind.topic_count(),
                actual: log.topics.len(),
            });
        }
        let expected = kind.data_words() * 32;
        if log.data.len() != expected {
            return Err(DecodeError::DataLength {
                event: kind.name(),
                expected,
                actual: log.data.len(),
            });
        }
        Ok(Self { kind, log })
    }

    fn data_word(&self, index: usize) -> [u8; 32] {
        let mut word = [0u8; 32];
        word.copy_from_slice(&self.log.data[index * 32..(index + 1) * 32]);
        word
    }

    fn topic_address(&self, index: usize, field: &'static str) -> Result<EvmAddress, DecodeError> {
        EvmAddress::from_word(&self.log.topics[index]).ok_or(DecodeError::NonCanonicalAddress {
            event: self.kind.name(),
            field,
        })
    }

    fn topic_uint(&self, index: usize, field: &'static str) -> Result<u128, DecodeError> {
        self.uint(&self.log.topics[index], field)
    }

    fn data_uint(&self, index: usize, field: &'static str) -> Result<u128, DecodeError> {
        self.uint(&self.data_word(index), field)
    }

    fn uint(&self, word: &[u8; 32], field: &'static str) -> Result<u128, DecodeError> {
        if word[..16].iter().any(|b| *b != 0) {
            return Err(DecodeError::ValueOverflow {
                event: self.kind.name(),
                field,
            });
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::uint_word;
    use proptest::prelude::*;
    use typhoon_types::{EventKey, TxHash};

    fn contract() -> EvmAddress {
        EvmAddress::new([0xcc; 20])
    }

    fn meta(index: u64) -> EventMeta {
        EventMeta {
            key: EventKey::new(TxHash::new([0x11; 32]), index),
            block_number: 500,
            block_timestamp: Some(Timestamp::new(1_700_000_000)),
        }
    }

    #[test]
    fn decodes_purchase() {
        let buyer = EvmAddress::new([0xab; 20]);
        let mut data = uint_word(3).to_vec();
        data.extend_from_slice(&uint_word(300_000_000));
        let log = RawLog {
            address: contract(),
            topics: vec![
                EventKind::Purchase.topic0(),
                uint_word(7),
                buyer.to_word(),
            ],
            data,
            block_number: 500,
            block_timestamp: None,
            tx_hash: TxHash::new([1; 32]),
            log_index: 4,
            removed: false,
        };
        let observed = decode(&log).unwrap().unwrap();
        assert_eq!(observed.meta.block_number, 500);
        assert_eq!(observed.key().log_index, 4);
        assert_eq!(
            observed.event,
            DomainEvent::Purchase {
                investment_block_id: 7,
                buyer,
                quantity: 3,
                total_paid: TokenAmount::new(300_000_000),
            }
        );
    }

    #[test]
    fn every_kind_decodes_what_it_encodes() {
        let a = EvmAddress::new([1; 20]);
        let b = EvmAddress::new([2; 20]);
        let events = vec![
            DomainEvent::ReferrerLinked { user: a, referrer: b },
            DomainEvent::ReferralAccrued {
                referrer: b,
                level: 2,
                amount: TokenAmount::new(15),
            },
            DomainEvent::RewardPaid {
                investment_block_id: 9,
                user: a,
                amount: TokenAmount::new(1),
            },
            DomainEvent::ReferralRewardsClaimed {
                user: b,
                amount: TokenAmount::new(10),
            },
            DomainEvent::BlockOpened {
                investment_block_id: 10,
                snowball_count: 1000,
            },
            DomainEvent::BlockFilled {
                investment_block_id: 10,
                filled_at: Timestamp::new(1_700_000_123),
            },
        ];
        for (i, event) in events.into_iter().enumerate() {
            let m = meta(i as u64);
            let decoded = decode(&event.to_raw_log(contract(), &m)).unwrap().unwrap();
            assert_eq!(decoded.meta, m);
            assert_eq!(decoded.event, event);
        }
    }

    #[test]
    fn unknown_topic_is_filtered() {
        let log = RawLog {
            address: contract(),
            topics: vec![[0x42; 32]],
            data: vec![],
            block_number: 1,
            block_timestamp: None,
            tx_hash: TxHash::new([1; 32]),
            log_index: 0,
            removed: false,
        };
        assert_eq!(decode(&log).unwrap(), None);

        let anonymous = RawLog {
            topics: vec![],
            ..log
        };
        assert_eq!(decode(&anonymous).unwrap(), None);
    }

    #[test]
    fn wrong_shapes_are_errors() {
        let event = DomainEvent::ReferralRewardsClaimed {
            user: EvmAddress::new([3; 20]),
            amount: TokenAmount::new(1),
        };
        let good = event.to_raw_log(contract(), &meta(0));

        let mut short = good.clone();
        short.data.truncate(31);
        assert!(matches!(decode(&short), Err(DecodeError::DataLength { .. })));

        let mut extra_topic = good.clone();
        extra_topic.topics.push([0; 32]);
        assert!(matches!(decode(&extra_topic), Err(DecodeError::TopicCount { .. })));

        let mut dirty = good.clone();
        dirty.topics[1][0] = 0xff;
        assert!(matches!(
            decode(&dirty),
            Err(DecodeError::NonCanonicalAddress { field: "user", .. })
        ));

        let mut huge = good;
        huge.data[0] = 1;
        assert!(matches!(decode(&huge), Err(DecodeError::ValueOverflow { .. })));
    }

    #[test]
    fn accrual_level_must_be_small() {
        let mut log = DomainEvent::ReferralAccrued {
            referrer: EvmAddress::new([5; 20]),
            level: 1,
            amount: TokenAmount::new(1),
        }
        .to_raw_log(contract(), &meta(0));
        log.data[..32].copy_from_slice(&uint_word(u64::MAX as u128));
        assert!(matches!(
            decode(&log),
            Err(DecodeError::ValueOverflow { field: "level", .. })
        ));
    }

    proptest! {
        #[test]
        fn known_topics_never_panic(
            kind_index in 0usize..7,
            extra_topics in proptest::collection::vec(any::<[u8; 32]>(), 0..4),
            data in proptest::collection::vec(any::<u8>(), 0..160),
        ) {
            let mut topics = vec![EventKind::ALL[kind_index].topic0()];
            topics.extend(extra_topics);
            let log = RawLog {
                address: contract(),
                topics,
                data,
                block_number: 1,
                block_timestamp: None,
                tx_hash: TxHash::new([0; 32]),
                log_index: 0,
                removed: false,
            };
            let _ = decode(&log);
        }
    }
}
