//! Property tests for projection idempotency.

use proptest::prelude::*;

use typhoon_events::{DomainEvent, EventMeta, ObservedEvent};
use typhoon_nullables::NullMirrorStore;
use typhoon_reconciler::{registry, Projection, Projector};
use typhoon_store::{AccountStore, MirrorStore};
use typhoon_types::{EventKey, EvmAddress, Timestamp, TokenAmount, TxHash};

fn buyer() -> EvmAddress {
    EvmAddress::new([1; 20])
}

fn purchase(tx: u8, log_index: u64, paid: u64) -> ObservedEvent {
    ObservedEvent {
        meta: EventMeta {
            key: EventKey::new(TxHash::new([tx; 32]), log_index),
            block_number: tx as u64,
            block_timestamp: Some(Timestamp::new(tx as u64)),
        },
        event: DomainEvent::Purchase {
            investment_block_id: 1,
            buyer: buyer(),
            quantity: 1,
            total_paid: TokenAmount::new(paid as u128),
        },
    }
}

proptest! {
    /// However often events are re-delivered, each one counts exactly once.
    #[test]
    fn totals_ignore_redelivery(
        events in proptest::collection::vec((0u8..6, 0u64..3, 1u64..1_000_000), 1..24),
        replays in proptest::collection::vec(any::<prop::sample::Index>(), 0..24),
    ) {
        let store = NullMirrorStore::new();
        store
            .register_account(&buyer(), "buyer", "buyer001", Timestamp::EPOCH)
            .unwrap();

        let mut expected = std::collections::HashMap::new();
        for &(tx, index, paid) in &events {
            let observed = purchase(tx, index, paid);
            let first = !expected.contains_key(&observed.meta.key);
            let result = Projector.project(&store, &observed).unwrap();
            prop_assert_eq!(matches!(result, Projection::Duplicate), !first);
            expected.entry(observed.meta.key).or_insert(paid as u128);
        }
        for pick in &replays {
            let &(tx, index, paid) = pick.get(&events);
            let result = Projector.project(&store, &purchase(tx, index, paid)).unwrap();
            prop_assert_eq!(result, Projection::Duplicate);
        }

        let account = store.account_by_wallet(&buyer()).unwrap().unwrap();
        prop_assert_eq!(account.total_purchased.raw(), expected.values().sum::<u128>());
        prop_assert_eq!(store.applied_count().unwrap(), expected.len() as u64);
    }

    #[test]
    fn referral_ids_use_the_url_safe_alphabet(seed in any::<u64>()) {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let id = registry::generate_referral_id(&mut rng);
        prop_assert_eq!(id.len(), registry::REFERRAL_ID_LEN);
        prop_assert!(id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }
}
