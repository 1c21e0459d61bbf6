//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::seed::{self, DemoCatalog};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use common::{Clock, FixedClock};
use ledger::{InMemoryLedgerStore, LedgerKey, LedgerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{JobKind, SagaConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup_with_state() -> (axum::Router, Arc<AppState<InMemoryLedgerStore>>) {
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 16, 0, 0).unwrap();
    let ledger = InMemoryLedgerStore::new();
    DemoCatalog::around(now).seed_in_memory(&ledger).await;

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
    let state = api::create_default_state(ledger, SagaConfig::default(), clock);
    seed::seed_collaborators(&state.billing, &state.storefront);
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn setup() -> axum::Router {
    setup_with_state().await.0
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn create_primary(track: &str) -> Value {
    json!({
        "subscriptionType": "primary",
        "track": track,
        "customerId": "cus-demo",
        "storefrontCustomerId": "sf-demo",
        "planId": "monthly"
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_swap_window_is_open_for_demo_cycle() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/swap-window", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["state"], "OPEN");
    assert_eq!(json["window"]["cycleId"], "2024-05");
}

#[tokio::test]
async fn test_create_subscription_reserves_new_subscriber_unit() {
    let (app, state) = setup_with_state().await;

    let (status, json) = send(&app, "POST", "/subscriptions", Some(create_primary("fiction"))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["subscription"]["customer_id"], "cus-demo");
    assert_eq!(json["swapWindow"], "OPEN");

    let row = state
        .orchestrator
        .ledger()
        .get_row(&LedgerKey::new("2024-05", "prod-fiction"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.new_sub_qty, 19);
    assert_eq!(state.queue.jobs_of(JobKind::InventoryAdjustment).len(), 1);
    assert_eq!(state.queue.jobs_of(JobKind::AnalyticsSync).len(), 1);
}

#[tokio::test]
async fn test_create_with_unknown_track_is_unprocessable() {
    let (app, state) = setup_with_state().await;

    let (status, json) = send(&app, "POST", "/subscriptions", Some(create_primary("romance"))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("romance"));
    assert_eq!(state.billing.subscription_count(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = setup().await;

    let (status, json) = send(&app, "POST", "/subscriptions", Some(json!({ "track": 7 }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_track_change_while_window_open() {
    let app = setup().await;
    send(&app, "POST", "/subscriptions", Some(create_primary("fiction"))).await;

    let (status, json) = send(
        &app,
        "PUT",
        "/subscriptions/track",
        Some(json!({ "customerId": "cus-demo", "newTrack": "mystery" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ledgerMutations"], 2);
    assert_eq!(json["subscription"]["metadata"]["product"]["id"], "prod-mystery");
}

#[tokio::test]
async fn test_swap_subscription_record() {
    let app = setup().await;
    let (_, created) = send(&app, "POST", "/subscriptions", Some(create_primary("fiction"))).await;
    let id = created["subscription"]["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        "POST",
        &format!("/subscriptions/{id}/swap"),
        Some(json!({
            "fromProduct": "prod-fiction",
            "toProduct": "prod-mystery",
            "track": "mystery"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["creditSwap"], false);
    assert_eq!(json["subscription"]["metadata"]["product"]["swapped"], true);
}

#[tokio::test]
async fn test_cancel_all_then_overview() {
    let (app, state) = setup_with_state().await;
    send(&app, "POST", "/subscriptions", Some(create_primary("fiction"))).await;

    let (status, json) = send(
        &app,
        "POST",
        "/subscriptions/cancel-all",
        Some(json!({ "customerId": "cus-demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"].as_array().unwrap().len(), 1);
    assert_eq!(state.queue.jobs_of(JobKind::CancellationSurvey).len(), 1);
    assert_eq!(state.notifier.published().len(), 1);

    let (status, overview) = send(&app, "GET", "/customers/cus-demo/subscriptions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["subscriptions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_all_without_primary_is_not_found() {
    let app = setup().await;

    let (status, json) = send(
        &app,
        "POST",
        "/subscriptions/cancel-all",
        Some(json!({ "customerId": "cus-nobody" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_invoice_not_found() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/subscriptions/SUB-9999/invoice", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_find_customer_by_email() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/customers?email=reader@example.com", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["customer"]["id"], "cus-demo");

    let (status, _) = send(&app, "GET", "/customers?email=nobody@example.com", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/customers", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    send(&app, "GET", "/swap-window", None).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
