//! End-to-end reconciliation against the nullable store and a scripted chain.

use std::sync::Arc;

use typhoon_chain::ChainReader;
use typhoon_events::{decode, DomainEvent, EventKind, EventMeta};
use typhoon_nullables::{NullMirrorStore, ScriptedChain};
use typhoon_reconciler::{
    Projection, Projector, ReconcilerMetrics, Scheduler, SchedulerSettings,
};
use typhoon_store::{
    Account, AccountStore, AuditKind, AuditStore, CursorStore, MirrorStore, PurchaseStore,
};
use typhoon_store_lmdb::LmdbStore;
use typhoon_types::{EventKey, EvmAddress, Timestamp, TokenAmount, TxHash};

const CONTRACT: EvmAddress = EvmAddress::ZERO;

fn wallet(n: u8) -> EvmAddress {
    EvmAddress::new([n; 20])
}

fn settings(max_block_range: u64) -> SchedulerSettings {
    SchedulerSettings {
        start_block: 1,
        max_block_range,
        ..SchedulerSettings::default()
    }
}

fn scheduler<S: MirrorStore + Send + Sync + 'static>(
    store: Arc<S>,
    chain: Arc<ScriptedChain>,
    max_block_range: u64,
) -> Scheduler<S> {
    let metrics = Arc::new(ReconcilerMetrics::new().unwrap());
    Scheduler::new(store, chain, settings(max_block_range), metrics)
}

fn setup() -> (Arc<NullMirrorStore>, Arc<ScriptedChain>) {
    (
        Arc::new(NullMirrorStore::new()),
        Arc::new(ScriptedChain::new(wallet(0xcc))),
    )
}

fn register<S: AccountStore>(store: &S, n: u8) -> Account {
    store
        .register_account(
            &wallet(n),
            &format!("user{n}"),
            &format!("ref{n:05}"),
            Timestamp::EPOCH,
        )
        .unwrap()
}

fn account<S: AccountStore>(store: &S, n: u8) -> Account {
    store.account_by_wallet(&wallet(n)).unwrap().unwrap()
}

fn purchase(buyer: u8, paid: u128) -> DomainEvent {
    DomainEvent::Purchase {
        investment_block_id: 1,
        buyer: wallet(buyer),
        quantity: 1,
        total_paid: TokenAmount::new(paid),
    }
}

fn linked(user: u8, referrer: u8) -> DomainEvent {
    DomainEvent::ReferrerLinked {
        user: wallet(user),
        referrer: wallet(referrer),
    }
}

#[tokio::test]
async fn aggregates_sum_every_purchase() {
    let (store, chain) = setup();
    register(store.as_ref(), 1);
    chain.push_event(purchase(1, 100), 2, 1, 0);
    chain.push_event(purchase(1, 250), 3, 2, 0);
    chain.push_event(purchase(1, 50), 4, 3, 0);
    chain.set_height(10);

    let report = scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(report.applied, 3);
    assert_eq!(account(store.as_ref(), 1).total_purchased, TokenAmount::new(400));

    let history = store.purchases_for_wallet(&wallet(1)).unwrap();
    assert_eq!(history.len(), 3);
    // Newest first.
    assert_eq!(history[0].total_paid, TokenAmount::new(50));
    assert_eq!(store.cursor().unwrap(), Some(10));
}

#[tokio::test]
async fn purchases_in_one_transaction_are_all_counted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LmdbStore::open(dir.path(), 32 * 1024 * 1024).unwrap());
    let chain = Arc::new(ScriptedChain::new(CONTRACT));
    register(store.as_ref(), 1);
    chain.push_event(purchase(1, 100), 2, 7, 0);
    chain.push_event(purchase(1, 50), 2, 7, 1);
    chain.set_height(5);

    let report = scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(account(store.as_ref(), 1).total_purchased, TokenAmount::new(150));

    let history = store.purchases_for_wallet(&wallet(1)).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].quantity, 2);
    assert_eq!(history[0].total_paid, TokenAmount::new(150));
}

#[tokio::test]
async fn replaying_applied_events_changes_nothing() {
    let (store, chain) = setup();
    register(store.as_ref(), 1);
    register(store.as_ref(), 2);
    chain.push_event(linked(2, 1), 2, 1, 0);
    chain.push_event(purchase(2, 100), 3, 2, 0);
    chain.push_event(
        DomainEvent::ReferralAccrued {
            referrer: wallet(1),
            level: 1,
            amount: TokenAmount::new(10),
        },
        3,
        2,
        1,
    );
    chain.set_height(5);
    scheduler(store.clone(), chain.clone(), 100)
        .run_cycle()
        .await
        .unwrap();

    let before = (account(store.as_ref(), 1), account(store.as_ref(), 2));
    let audit_before = store.audit_count().unwrap();

    let logs = chain.fetch_logs(1, 5, &EventKind::ALL).await.unwrap();
    for log in &logs {
        let event = decode(log).unwrap().unwrap();
        assert_eq!(
            Projector.project(store.as_ref(), &event).unwrap(),
            Projection::Duplicate
        );
    }

    assert_eq!(
        (account(store.as_ref(), 1), account(store.as_ref(), 2)),
        before
    );
    assert_eq!(store.audit_count().unwrap(), audit_before);
    assert_eq!(store.purchase_count().unwrap(), 1);
}

#[tokio::test]
async fn duplicate_delivery_in_one_batch_is_applied_once() {
    let (store, chain) = setup();
    register(store.as_ref(), 1);
    chain.push_event(purchase(1, 100), 2, 1, 0);
    chain.push_event(purchase(1, 100), 2, 1, 0);
    chain.set_height(2);

    let report = scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(report.logs_fetched, 1);
    assert_eq!(account(store.as_ref(), 1).total_purchased, TokenAmount::new(100));
}

#[tokio::test]
async fn events_apply_in_emission_order_not_delivery_order() {
    let (store, chain) = setup();
    for n in 1..=3 {
        register(store.as_ref(), n);
    }
    // Delivered newest first; the block-5 link to wallet 1 happened first.
    chain.push_event(linked(3, 2), 6, 2, 0);
    chain.push_event(linked(3, 1), 5, 1, 0);
    chain.set_height(6);

    scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(
        account(store.as_ref(), 3).sponsor_referral_id.as_deref(),
        Some("ref00001")
    );
    assert_eq!(account(store.as_ref(), 1).direct_count, 1);
    assert_eq!(account(store.as_ref(), 2).direct_count, 0);
}

#[tokio::test]
async fn first_sponsor_link_wins_across_cycles() {
    let (store, chain) = setup();
    for n in 1..=3 {
        register(store.as_ref(), n);
    }
    chain.push_event(linked(3, 1), 2, 1, 0);
    chain.set_height(2);
    let s = scheduler(store.clone(), chain.clone(), 100);
    s.run_cycle().await.unwrap();

    chain.push_event(linked(3, 2), 4, 2, 0);
    chain.set_height(4);
    s.run_cycle().await.unwrap();

    let user = account(store.as_ref(), 3);
    assert_eq!(user.sponsor_referral_id.as_deref(), Some("ref00001"));
    assert_eq!(account(store.as_ref(), 1).team_size, 1);
    assert_eq!(account(store.as_ref(), 2).team_size, 0);
    assert!(store.direct_referrals("ref00002").unwrap().is_empty());
}

#[tokio::test]
async fn failed_event_leaves_cursor_and_range_is_retried() {
    let (store, chain) = setup();
    register(store.as_ref(), 1);
    let keys: Vec<EventKey> = (1..=5u8)
        .map(|n| chain.push_event(purchase(1, 10 * n as u128), n as u64, n, 0))
        .collect();
    chain.set_height(5);
    store.fail_next_apply(keys[2]);

    let s = scheduler(store.clone(), chain.clone(), 100);
    assert!(s.run_cycle().await.is_err());
    assert_eq!(store.cursor().unwrap(), Some(0));
    assert!(!store.is_applied(&keys[2]).unwrap());
    assert!(!store.is_applied(&keys[3]).unwrap());

    // A restarted process has an empty in-memory guard; the store markers
    // alone keep the first two from counting twice.
    let restarted = scheduler(store.clone(), chain.clone(), 100);
    let report = restarted.run_cycle().await.unwrap();
    assert_eq!(report.range.map(|r| (r.from, r.to)), Some((1, 5)));
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.applied, 3);
    assert_eq!(store.cursor().unwrap(), Some(5));
    assert_eq!(account(store.as_ref(), 1).total_purchased, TokenAmount::new(150));
    assert_eq!(chain.fetch_calls(), vec![(1, 5), (1, 5)]);
}

#[tokio::test]
async fn unregistered_buyer_is_audited_without_fabricating_rows() {
    let (store, chain) = setup();
    let key = chain.push_event(purchase(7, 100), 3, 1, 0);
    chain.set_height(3);

    let report = scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(report.anomalies, 1);
    assert_eq!(store.account_count().unwrap(), 0);
    assert_eq!(store.purchase_count().unwrap(), 0);
    assert!(store.is_applied(&key).unwrap());
    assert_eq!(store.cursor().unwrap(), Some(3));

    let audit = store.recent_audit(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, AuditKind::Anomaly);
    assert_eq!(audit[0].key, key);
}

#[tokio::test]
async fn no_new_blocks_means_no_work() {
    let (store, chain) = setup();
    chain.set_height(8);
    let s = scheduler(store.clone(), chain.clone(), 100);
    s.run_cycle().await.unwrap();
    assert_eq!(chain.fetch_calls().len(), 1);

    let report = s.run_cycle().await.unwrap();
    assert_eq!(report.range, None);
    assert!(report.caught_up);
    assert_eq!(chain.fetch_calls().len(), 1);
    assert_eq!(store.cursor().unwrap(), Some(8));

    // A node that fell behind after failover does not move the cursor back.
    chain.set_height(4);
    let report = s.run_cycle().await.unwrap();
    assert_eq!(report.range, None);
    assert_eq!(store.cursor().unwrap(), Some(8));
}

#[tokio::test]
async fn oversized_ranges_are_bisected() {
    let (store, chain) = setup();
    register(store.as_ref(), 1);
    chain.push_event(purchase(1, 1), 2, 1, 0);
    chain.push_event(purchase(1, 2), 9, 2, 0);
    chain.set_height(10);
    chain.set_max_range(3);

    let s = scheduler(store.clone(), chain.clone(), 10);
    let report = s.run_cycle().await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(store.cursor().unwrap(), Some(10));
    assert!(s.metrics().range_splits_total.get() >= 3);

    // Every successful request stayed within the node's limit and together
    // they cover the range exactly once.
    let mut served: Vec<(u64, u64)> = chain
        .fetch_calls()
        .into_iter()
        .filter(|(from, to)| to - from < 3)
        .collect();
    served.sort();
    let covered: u64 = served.iter().map(|(from, to)| to - from + 1).sum();
    assert_eq!(covered, 10);
    assert_eq!(served.first().map(|r| r.0), Some(1));
    assert_eq!(served.last().map(|r| r.1), Some(10));
}

#[tokio::test]
async fn single_block_the_node_refuses_fails_the_cycle() {
    let (store, chain) = setup();
    chain.set_height(4);
    chain.set_max_range(0);

    let s = scheduler(store.clone(), chain, 10);
    assert!(s.run_cycle().await.is_err());
    assert_eq!(store.cursor().unwrap(), Some(0));
}

#[tokio::test]
async fn undecodable_log_is_skipped() {
    let (store, chain) = setup();
    register(store.as_ref(), 1);
    let meta = EventMeta {
        key: EventKey::new(TxHash::new([0xee; 32]), 0),
        block_number: 2,
        block_timestamp: Some(Timestamp::new(1)),
    };
    let mut broken = purchase(1, 5).to_raw_log(chain.contract(), &meta);
    broken.data.pop();
    chain.push_log(broken);
    chain.push_event(purchase(1, 7), 3, 1, 0);
    chain.set_height(3);

    let report = scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(report.decode_errors, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(account(store.as_ref(), 1).total_purchased, TokenAmount::new(7));
    assert_eq!(store.cursor().unwrap(), Some(3));
}

#[tokio::test]
async fn catch_up_proceeds_in_bounded_ranges() {
    let (store, chain) = setup();
    chain.set_height(25);
    let s = scheduler(store.clone(), chain.clone(), 10);

    let first = s.run_cycle().await.unwrap();
    assert!(!first.caught_up);
    assert_eq!(first.cursor, 10);
    s.run_cycle().await.unwrap();
    let last = s.run_cycle().await.unwrap();
    assert!(last.caught_up);
    assert_eq!(chain.fetch_calls(), vec![(1, 10), (11, 20), (21, 25)]);
}

#[tokio::test]
async fn lmdb_mirror_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(ScriptedChain::new(CONTRACT));
    {
        let store = Arc::new(LmdbStore::open(dir.path(), 32 * 1024 * 1024).unwrap());
        register(store.as_ref(), 1);
        register(store.as_ref(), 2);
        chain.push_event(linked(2, 1), 2, 1, 0);
        chain.push_event(purchase(2, 100), 3, 2, 0);
        chain.set_height(5);
        scheduler(store, chain.clone(), 100).run_cycle().await.unwrap();
    }

    let store = Arc::new(LmdbStore::open(dir.path(), 32 * 1024 * 1024).unwrap());
    assert_eq!(store.cursor().unwrap(), Some(5));
    assert_eq!(store.applied_count().unwrap(), 2);
    assert_eq!(account(store.as_ref(), 1).team_size, 1);
    assert_eq!(account(store.as_ref(), 2).total_purchased, TokenAmount::new(100));

    chain.push_event(purchase(2, 50), 7, 3, 0);
    chain.set_height(8);
    let report = scheduler(store.clone(), chain, 100).run_cycle().await.unwrap();
    assert_eq!(report.range.map(|r| r.from), Some(6));
    assert_eq!(account(store.as_ref(), 2).total_purchased, TokenAmount::new(150));
}
