//! Router tests over the nullable store and a scripted chain.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use typhoon_events::DomainEvent;
use typhoon_nullables::{NullMirrorStore, ScriptedChain};
use typhoon_reconciler::{ReconcilerHandle, ReconcilerMetrics, Scheduler, SchedulerSettings};
use typhoon_rpc::{router, ApiState};
use typhoon_types::{EvmAddress, TokenAmount};

const ALICE: &str = "0x00000000000000000000000000000000000000a1";
const BOB: &str = "0x00000000000000000000000000000000000000b2";

struct TestApi {
    app: Router,
    handle: Arc<ReconcilerHandle<NullMirrorStore>>,
    chain: Arc<ScriptedChain>,
}

fn api() -> TestApi {
    let store = Arc::new(NullMirrorStore::new());
    let chain = Arc::new(ScriptedChain::new(EvmAddress::new([0xcc; 20])));
    let settings = SchedulerSettings {
        start_block: 1,
        poll_interval: Duration::from_millis(10),
        ..SchedulerSettings::default()
    };
    let metrics = Arc::new(ReconcilerMetrics::new().unwrap());
    let scheduler = Scheduler::new(store, chain.clone(), settings, metrics);
    let handle = Arc::new(ReconcilerHandle::new(scheduler));
    let app = router(Arc::new(ApiState::new(handle.clone(), 6)));
    TestApi { app, handle, chain }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, wallet: &str, username: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/accounts",
        Some(json!({ "wallet": wallet, "username": username })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn registration_and_lookups() {
    let t = api();
    let alice = register(&t.app, ALICE, "alice").await;
    let referral_id = alice["referral_id"].as_str().unwrap().to_string();
    assert_eq!(referral_id.len(), 8);
    assert_eq!(alice["total_purchased"]["raw"], "0");

    let (status, by_wallet) = call(&t.app, Method::GET, &format!("/accounts/{ALICE}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_wallet["username"], "alice");

    let (status, by_referral) = call(
        &t.app,
        Method::GET,
        &format!("/accounts/by-referral/{referral_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_referral["wallet"], ALICE);

    let (status, _) = call(
        &t.app,
        Method::POST,
        "/accounts",
        Some(json!({ "wallet": BOB, "username": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&t.app, Method::GET, "/accounts/0x1234", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&t.app, Method::GET, &format!("/accounts/{BOB}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mirrored_state_is_served_with_formatted_amounts() {
    let t = api();
    register(&t.app, ALICE, "alice").await;
    register(&t.app, BOB, "bob").await;
    let alice = EvmAddress::parse(ALICE).unwrap();
    let bob = EvmAddress::parse(BOB).unwrap();

    t.chain.push_event(
        DomainEvent::ReferrerLinked {
            user: bob,
            referrer: alice,
        },
        2,
        1,
        0,
    );
    t.chain.push_event(
        DomainEvent::Purchase {
            investment_block_id: 4,
            buyer: bob,
            quantity: 3,
            total_paid: TokenAmount::new(1_500_000),
        },
        3,
        2,
        0,
    );
    t.chain.set_height(3);
    t.handle.scheduler().run_cycle().await.unwrap();

    let (_, referrals) = call(&t.app, Method::GET, &format!("/accounts/{ALICE}/referrals"), None).await;
    assert_eq!(referrals["total"], 1);
    assert_eq!(referrals["items"][0]["wallet"], BOB);

    let (_, purchases) = call(&t.app, Method::GET, &format!("/accounts/{BOB}/purchases?limit=10"), None).await;
    assert_eq!(purchases["items"][0]["total_paid"]["raw"], "1500000");
    assert_eq!(purchases["items"][0]["total_paid"]["formatted"], "1.5");
    assert_eq!(purchases["items"][0]["quantity"], "3");

    let (_, audit) = call(&t.app, Method::GET, "/audit?limit=5", None).await;
    assert_eq!(audit.as_array().unwrap().len(), 0);

    let (_, status) = call(&t.app, Method::GET, "/status", None).await;
    assert_eq!(status["last_processed_block"], 3);
    assert_eq!(status["last_cycle"]["applied"], 2);
}

#[tokio::test]
async fn control_endpoints_drive_health() {
    let t = api();
    let (code, _) = call(&t.app, Method::GET, "/health", None).await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

    let (_, started) = call(&t.app, Method::POST, "/reconciler/start", None).await;
    assert_eq!(started["changed"], true);
    let (_, again) = call(&t.app, Method::POST, "/reconciler/start", None).await;
    assert_eq!(again["changed"], false);

    let mut healthy = false;
    for _ in 0..100 {
        let (code, _) = call(&t.app, Method::GET, "/health", None).await;
        if code == StatusCode::OK {
            healthy = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(healthy);

    let (_, stopped) = call(&t.app, Method::POST, "/reconciler/stop", None).await;
    assert_eq!(stopped["changed"], true);
    assert_eq!(stopped["status"]["state"], "stopped");
    let (code, _) = call(&t.app, Method::GET, "/health", None).await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_are_prometheus_text() {
    let t = api();
    t.handle.scheduler().run_cycle().await.unwrap();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("typhoon_cycles_total 1"));
}
