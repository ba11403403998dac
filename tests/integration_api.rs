mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

use common::{wire_tx, FakeChain, ALICE, BOB};
use wallet_observer::api::{router, AppState};
use wallet_observer::blockchain::{ScannerConfig, StartBlock};
use wallet_observer::index::MemoryIndex;
use wallet_observer::models::Wei;
use wallet_observer::Observer;

fn setup(chain: Arc<FakeChain>) -> (Router, Arc<Observer>) {
    let observer = Arc::new(Observer::new(
        chain,
        Arc::new(MemoryIndex::new()),
        Duration::from_millis(500),
    ));
    let app = router(AppState {
        observer: Arc::clone(&observer),
    });
    (app, observer)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_current_block_endpoint() {
    let (app, _) = setup(Arc::new(FakeChain::new(6008149)));

    let (status, json) = send(app, get("/block/current")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["block_number"], 6008149);
}

#[tokio::test]
async fn test_current_block_reports_node_failure() {
    let chain = Arc::new(FakeChain::new(1));
    chain.set_unreachable(true);
    let (app, _) = setup(chain);

    let (status, json) = send(app, get("/block/current")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "transport_error");
}

#[tokio::test]
async fn test_balance_endpoint() {
    let chain = Arc::new(FakeChain::new(1));
    chain.set_balance(ALICE, Wei::from_hex("0x14d1120d7b160000").unwrap());
    let (app, _) = setup(chain.clone());

    let (status, json) = send(app.clone(), get(&format!("/balance/{}", ALICE.to_uppercase().replace("0X", "0x")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["address"], ALICE);
    assert_eq!(json["wei"], "0x14d1120d7b160000");
    assert_eq!(json["ether"], "1.500000000000000000");

    let (status, json) = send(app.clone(), get(&format!("/balance/{}", BOB))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ether"], "0.000000000000000000");

    let (status, _) = send(app.clone(), get("/balance/0x12")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    chain.set_unreachable(true);
    let (status, json) = send(app, get(&format!("/balance/{}", ALICE))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "transport_error");
}

#[tokio::test]
async fn test_subscribe_is_idempotent() {
    let (app, observer) = setup(Arc::new(FakeChain::new(1)));

    let (status, json) = send(app.clone(), post_json("/subscriptions", json!({ "address": ALICE }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["created"], true);
    assert_eq!(json["address"], ALICE);

    let upper = format!("0x{}", ALICE[2..].to_uppercase());
    let (status, json) = send(app.clone(), post_json("/subscriptions", json!({ "address": upper }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["created"], false);

    let (status, json) = send(app, get("/subscriptions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["addresses"], json!([ALICE]));
    assert!(observer.is_subscribed(ALICE));
}

#[tokio::test]
async fn test_invalid_address_is_rejected() {
    let (app, observer) = setup(Arc::new(FakeChain::new(1)));

    for bad in ["0x123", "", "0xzz11111111111111111111111111111111111111"] {
        let (status, json) = send(app.clone(), post_json("/subscriptions", json!({ "address": bad }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", bad);
        assert_eq!(json["error"], "invalid_address");
    }

    let (status, _) = send(app, get("/transactions/not-an-address")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(observer.subscriptions().is_empty());
}

#[tokio::test]
async fn test_unsubscribe() {
    let (app, observer) = setup(Arc::new(FakeChain::new(1)));
    observer.subscribe(BOB);

    let (status, _) = send(app.clone(), delete(&format!("/subscriptions/{}", BOB))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!observer.is_subscribed(BOB));

    let (status, json) = send(app, delete(&format!("/subscriptions/{}", BOB))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_transactions_and_hash_lookup() {
    let chain = Arc::new(FakeChain::new(3));
    chain.put_block(3, vec![wire_tx("0xabc3", ALICE, Some(BOB), "0x64")]);
    let (app, observer) = setup(chain);
    observer.subscribe(BOB);

    let scanner = observer.scanner(ScannerConfig {
        start_block: StartBlock::Height(2),
        ..ScannerConfig::default()
    });
    scanner.initialize().await.unwrap();
    scanner.scan_once().await.unwrap();

    let (status, json) = send(app.clone(), get(&format!("/transactions/{}", BOB))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["transactions"][0]["hash"], "0xabc3");
    assert_eq!(json["transactions"][0]["value"], "0x64");
    assert_eq!(json["transactions"][0]["block_number"], 3);

    // Unknown addresses read as empty, not as an error
    let (status, json) = send(app.clone(), get(&format!("/transactions/{}", ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);

    let (status, json) = send(app.clone(), get("/tx/0xabc3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([{ "address": BOB, "direction": "inbound" }]));

    let (status, _) = send(app, get("/tx/0xdead")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_tracks_scan_progress() {
    let chain = Arc::new(FakeChain::new(20));
    let (app, observer) = setup(chain.clone());
    observer.subscribe(ALICE);

    let (status, json) = send(app.clone(), get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "starting");
    assert_eq!(json["chain_head"], 20);
    assert_eq!(json["last_processed_block"], Value::Null);
    assert_eq!(json["subscriptions"], 1);

    let scanner = observer.scanner(ScannerConfig {
        start_block: StartBlock::Height(18),
        ..ScannerConfig::default()
    });
    scanner.initialize().await.unwrap();
    scanner.scan_once().await.unwrap();

    let (_, json) = send(app.clone(), get("/status")).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["last_processed_block"], 20);
    assert_eq!(json["blocks_behind"], 0);

    chain.set_head(100);
    let (_, json) = send(app, get("/status")).await;
    assert_eq!(json["status"], "lagging");
    assert_eq!(json["blocks_behind"], 80);
}
