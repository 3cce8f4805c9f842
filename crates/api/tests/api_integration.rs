//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::ProductId;
use domain::Money;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryInventory, SagaConfig};
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

/// App over an in-memory inventory holding product 1 (stock 5, $10.00) and
/// product 2 (stock 1, $2.50).
fn setup() -> (axum::Router, InMemoryInventory) {
    let inventory = InMemoryInventory::with_products([
        (ProductId::new(1).unwrap(), Money::from_cents(1000), 5),
        (ProductId::new(2).unwrap(), Money::from_cents(250), 1),
    ]);
    let state = api::create_in_memory_state(inventory.clone(), SagaConfig::default());
    (api::create_app(state, get_metrics_handle()), inventory)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn post_order(user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch_status(id: &str, status: &str) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(format!("/orders/{id}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": status }).to_string()))
        .unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

async fn create_order(app: &axum::Router, user: &str, items: Value) -> Value {
    let (status, json) = send(app, post_order(user, json!({ "items": items }))).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order() {
    let (app, inventory) = setup();

    let json = create_order(
        &app,
        "7",
        json!([{"product_id": 1, "quantity": 2}, {"product_id": 1, "quantity": 2}]),
    )
    .await;

    assert_eq!(json["user_id"], 7);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(json["items"][0]["price"], 10.0);
    assert_eq!(json["total"], 40.0);
    assert!(json["created_at"].as_str().is_some());
    assert_eq!(
        inventory.stock_of(ProductId::new(1).unwrap()).await,
        Some(1)
    );
}

#[tokio::test]
async fn test_create_and_get_order() {
    let (app, _) = setup();
    let created = create_order(&app, "3", json!([{"product_id": 2, "quantity": 1}])).await;
    let id = created["id"].as_i64().unwrap();

    let (status, json) = send(&app, get(&format!("/orders/{id}"), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["items"][0]["product_id"], 2);
    assert_eq!(json["items"][0]["price"], 2.5);
}

#[tokio::test]
async fn test_insufficient_stock_is_conflict() {
    let (app, inventory) = setup();

    let (status, json) = send(
        &app,
        post_order("1", json!({"items": [{"product_id": 2, "quantity": 2}]})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "FailedPrecondition");
    assert!(json["error"].as_str().unwrap().contains("insufficient stock"));
    assert_eq!(
        inventory.stock_of(ProductId::new(2).unwrap()).await,
        Some(1)
    );
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let (app, _) = setup();

    let (status, json) = send(
        &app,
        post_order("1", json!({"items": [{"product_id": 404, "quantity": 1}]})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "NotFound");
}

#[tokio::test]
async fn test_create_order_validation() {
    let (app, _) = setup();

    let (status, json) = send(&app, post_order("1", json!({"items": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "InvalidArgument");

    let (status, _) = send(
        &app,
        post_order("1", json!({"items": [{"product_id": 1, "quantity": 0}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_order("0", json!({"items": [{"product_id": 1, "quantity": 1}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_user_header_is_bad_request() {
    let (app, _) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"items": [{"product_id": 1, "quantity": 1}]}).to_string(),
        ))
        .unwrap();

    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "missing X-User-ID header");

    let (status, _) = send(&app, get("/orders", Some("not-a-number"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/orders/999", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "NotFound");
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/orders/not-an-id", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "InvalidArgument");
}

#[tokio::test]
async fn test_cancel_order_restocks() {
    let (app, inventory) = setup();
    let created = create_order(&app, "1", json!([{"product_id": 1, "quantity": 3}])).await;
    let id = created["id"].to_string();

    let (status, json) = send(&app, patch_status(&id, "cancelled")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
    assert_eq!(
        inventory.stock_of(ProductId::new(1).unwrap()).await,
        Some(5)
    );

    // Cancelling again changes nothing.
    let (status, json) = send(&app, patch_status(&id, "cancelled")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
    assert_eq!(
        inventory.stock_of(ProductId::new(1).unwrap()).await,
        Some(5)
    );
}

#[tokio::test]
async fn test_completed_order_cannot_be_cancelled() {
    let (app, _) = setup();
    let created = create_order(&app, "1", json!([{"product_id": 1, "quantity": 1}])).await;
    let id = created["id"].to_string();

    let (status, _) = send(&app, patch_status(&id, "completed")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, patch_status(&id, "cancelled")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "FailedPrecondition");
}

#[tokio::test]
async fn test_unknown_status_is_bad_request() {
    let (app, _) = setup();
    let created = create_order(&app, "1", json!([{"product_id": 1, "quantity": 1}])).await;

    let (status, json) = send(&app, patch_status(&created["id"].to_string(), "shipped")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "InvalidArgument");
}

#[tokio::test]
async fn test_list_orders_for_caller() {
    let (app, _) = setup();
    let first = create_order(&app, "8", json!([{"product_id": 1, "quantity": 1}])).await;
    let second = create_order(&app, "8", json!([{"product_id": 1, "quantity": 1}])).await;
    create_order(&app, "9", json!([{"product_id": 1, "quantity": 1}])).await;

    let (status, json) = send(&app, get("/orders", Some("8"))).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![second["id"].as_i64().unwrap(), first["id"].as_i64().unwrap()]
    );

    let (_, json) = send(&app, get("/orders?limit=1&offset=1", Some("8"))).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], first["id"]);

    let (status, json) = send(&app, get("/orders", Some("12345"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    create_order(&app, "1", json!([{"product_id": 1, "quantity": 1}])).await;

    let response = app.clone().oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_executions_total"));
}
