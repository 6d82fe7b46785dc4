//! HTTP routes driven through the full middleware stack

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use pc28::api::{create_app, AppState};
use pc28::config::{ApiConfig, GameConfig, HubConfig};
use pc28::game_store::{MemoryStore, RoundStore};
use pc28::games::draw::ScriptedDraw;
use pc28::games::placement::WagerDesk;
use pc28::games::types::Amount;
use pc28::hub::{Hub, HubHandle};
use pc28::metrics::GameMetrics;
use pc28::scheduler::RoundScheduler;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    store: Arc<dyn RoundStore>,
    scheduler: RoundScheduler,
    hub_handle: HubHandle,
}

fn test_app() -> TestApp {
    let metrics = GameMetrics::new().unwrap();
    let store: Arc<dyn RoundStore> = Arc::new(MemoryStore::new());
    let (hub, hub_handle) = Hub::start(&HubConfig::default(), metrics.clone());
    let scheduler = RoundScheduler::new(
        store.clone(),
        Arc::new(ScriptedDraw::repeating((1..=20).collect())),
        hub.clone(),
        GameConfig::default(),
        metrics.clone(),
    );
    let state = Arc::new(AppState {
        store: store.clone(),
        desk: WagerDesk::new(store.clone(), metrics.clone()).with_opening_balance(Amount::units(1_000)),
        hub,
        metrics,
    });
    TestApp {
        app: create_app(state, &ApiConfig::default()),
        store,
        scheduler,
        hub_handle,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
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

#[tokio::test]
async fn test_health_and_odds() {
    let t = test_app();

    let (status, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&t.app, get("/api/v1/games/pc28/odds")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number"], 9.8);
    assert_eq!(body["odd"], 1.95);
    assert_eq!(body["small_even"], 3.7);
    assert_eq!(body.as_object().unwrap().len(), 9);
    t.hub_handle.shutdown().await;
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let t = test_app();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
    t.hub_handle.shutdown().await;
}

#[tokio::test]
async fn test_current_round() {
    let t = test_app();

    let (status, body) = send(&t.app, get("/api/v1/games/pc28/round/current")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["request_id"].is_string());

    let round_id = t.scheduler.lifecycle_tick(Utc::now()).await.created.unwrap();
    let (status, body) = send(&t.app, get("/api/v1/games/pc28/round/current")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["round_id"], round_id);
    assert_eq!(body["status"], "open");
    assert!(body["seconds_remaining"].as_u64().unwrap() <= 55);
    assert!(body.get("result").is_none());
    t.hub_handle.shutdown().await;
}

#[tokio::test]
async fn test_place_and_list_bets() {
    let t = test_app();
    let round_id = t.scheduler.lifecycle_tick(Utc::now()).await.created.unwrap();

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/v1/bets",
            json!({"user_id": 7, "round_id": round_id, "bet_type": "odd", "amount": 100.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["odds"], 1.95);
    assert_eq!(body["amount"], 100.0);
    assert_eq!(
        t.store.account(7).await.unwrap().unwrap().balance,
        Amount::units(900)
    );

    let (status, body) = send(&t.app, get("/api/v1/bets?user_id=7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["bet_type"], "odd");
    t.hub_handle.shutdown().await;
}

#[tokio::test]
async fn test_rejected_bets() {
    let t = test_app();
    let round_id = t.scheduler.lifecycle_tick(Utc::now()).await.created.unwrap();

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/v1/bets",
            json!({"user_id": 7, "round_id": round_id, "bet_type": "leopard", "amount": 5.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    // A refused bet opens no account
    assert!(t.store.account(7).await.unwrap().is_none());

    let (status, _) = send(
        &t.app,
        post_json(
            "/api/v1/bets",
            json!({"user_id": 7, "round_id": 999, "bet_type": "big", "amount": 5.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(t.store.account(7).await.unwrap().is_none());

    let (status, _) = send(
        &t.app,
        post_json(
            "/api/v1/bets",
            json!({"user_id": 7, "round_id": round_id, "bet_type": "big", "amount": 5000.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Stake above the opening balance: the account exists, nothing is debited
    assert_eq!(
        t.store.account(7).await.unwrap().unwrap().balance,
        Amount::units(1_000)
    );
    t.hub_handle.shutdown().await;
}

#[tokio::test]
async fn test_history_and_metrics() {
    let t = test_app();
    let now = Utc::now();
    let first = t.scheduler.lifecycle_tick(now).await.created.unwrap();
    t.scheduler.lifecycle_tick(now + chrono::Duration::seconds(60)).await;
    t.scheduler.lifecycle_tick(now + chrono::Duration::seconds(120)).await;

    let (status, body) = send(&t.app, get("/api/v1/games/pc28/history?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["round_id"], first);
    assert_eq!(body[0]["status"], "settled");
    assert_eq!(body[0]["result"]["sum"], 11);
    assert_eq!(body[0]["keno_data"].as_array().unwrap().len(), 20);

    let (status, body) = send(&t.app, get("/api/v1/games/pc28/history?limit=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let response = t.app.clone().oneshot(get("/metrics")).await.unwrap();
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("pc28_rounds_settled_total 1"));
    assert!(text.contains("pc28_rounds_created_total 3"));
    t.hub_handle.shutdown().await;
}
