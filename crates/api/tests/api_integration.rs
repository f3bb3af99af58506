//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use processor::ProcessorConfig;
use serde_json::{Value, json};
use store::InMemoryStore;
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

fn setup() -> axum::Router {
    let state = api::create_default_state(InMemoryStore::new(), ProcessorConfig::default());
    api::create_app(state, get_metrics_handle())
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_product(app: &axum::Router, name: &str) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/products",
        Some(json!({ "name": name, "standard_price_cents": 1200 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["on_hand_count"], 0);
    json["id"].as_str().unwrap().to_string()
}

fn order_body(items: Value) -> Value {
    json!({
        "counterparty_id": "00000000-0000-0000-0000-00000000000a",
        "actor_id": "00000000-0000-0000-0000-00000000000b",
        "payment_method": "cash",
        "items": items
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_purchase_then_sale_updates_stock() {
    let app = setup();
    let a = create_product(&app, "A").await;
    let b = create_product(&app, "B").await;

    let (status, json) = send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": a, "quantity": 5, "unit_price_cents": 1000 },
            { "product_id": b, "quantity": 0, "unit_price_cents": 9900 }
        ]))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["order"]["total_cents"], 5000);
    assert_eq!(json["order"]["kind"], "purchase");
    assert_eq!(json["order"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["stock"][0]["on_hand_count"], 5);
    assert_eq!(json["replayed"], false);

    let (status, json) = send(
        &app,
        "POST",
        "/sales",
        Some(json!({
            "client_id": "00000000-0000-0000-0000-00000000000c",
            "sold_by": "00000000-0000-0000-0000-00000000000b",
            "payment_method": "card",
            "items": [{ "product_id": a, "quantity": 3, "unit_price_cents": 1200 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["order"]["total_cents"], 3600);
    assert_eq!(json["stock"][0]["on_hand_count"], 2);

    let (status, json) = send(&app, "GET", &format!("/products/{a}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["on_hand_count"], 2);
}

#[tokio::test]
async fn test_sale_beyond_stock_is_conflict() {
    let app = setup();
    let a = create_product(&app, "A").await;

    let (status, json) = send(
        &app,
        "POST",
        "/sales",
        Some(order_body(json!([
            { "product_id": a, "quantity": 1, "unit_price_cents": 100 }
        ]))),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("line 1"));

    let (_, json) = send(&app, "GET", "/sales", None).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_orders_are_bad_requests() {
    let app = setup();
    let a = create_product(&app, "A").await;

    let (status, _) = send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": a, "quantity": 0, "unit_price_cents": 100 }
        ]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": "widget", "quantity": 1, "unit_price_cents": 100 }
        ]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("product_id"));

    let (status, _) = send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": a, "quantity": 1, "unit_price_cents": -5 }
        ]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = setup();

    let (status, _) = send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([{
            "product_id": "00000000-0000-0000-0000-0000000000ff",
            "quantity": 1,
            "unit_price_cents": 100
        }]))),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_update_delete_purchase() {
    let app = setup();
    let a = create_product(&app, "A").await;
    let (_, created) = send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": a, "quantity": 2, "unit_price_cents": 250 }
        ]))),
    )
    .await;
    let id = created["order"]["id"].as_str().unwrap().to_string();

    let (status, json) = send(&app, "GET", &format!("/purchases/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_cents"], 500);

    // A purchase is invisible through the sales surface.
    let (status, _) = send(&app, "GET", &format!("/sales/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/purchases/{id}"),
        Some(json!({ "description": "invoice 17", "payment_method": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["description"], "invoice 17");
    assert_eq!(json["payment_method"], "cash");
    assert_eq!(json["total_cents"], 500);

    let (status, json) = send(&app, "DELETE", &format!("/purchases/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 1);

    let (status, _) = send(&app, "DELETE", &format!("/purchases/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleting does not reverse stock.
    let (_, json) = send(&app, "GET", &format!("/products/{a}"), None).await;
    assert_eq!(json["on_hand_count"], 2);
}

#[tokio::test]
async fn test_list_with_filters() {
    let app = setup();
    let a = create_product(&app, "A").await;
    let b = create_product(&app, "B").await;

    for product in [&a, &b, &a] {
        let (status, _) = send(
            &app,
            "POST",
            "/purchases",
            Some(order_body(json!([
                { "product_id": product, "quantity": 1, "unit_price_cents": 100 }
            ]))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, json) = send(&app, "GET", "/purchases?product_id=&actor_id=", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 3);

    let (_, json) = send(&app, "GET", &format!("/purchases?product_id={a}"), None).await;
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (_, json) = send(
        &app,
        "GET",
        "/purchases?counterparty_id=00000000-0000-0000-0000-00000000000a&created_from=2000-01-01",
        None,
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 3);

    let (status, _) = send(&app, "GET", "/purchases?created_to=tomorrow", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resubmission_with_idempotency_key() {
    let app = setup();
    let a = create_product(&app, "A").await;
    let mut body = order_body(json!([
        { "product_id": a, "quantity": 4, "unit_price_cents": 100 }
    ]));
    body["idempotency_key"] = json!("po-2024-001");

    let (status, first) = send(&app, "POST", "/purchases", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, again) = send(&app, "POST", "/purchases", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["replayed"], true);
    assert_eq!(again["order"]["id"], first["order"]["id"]);

    let (_, json) = send(&app, "GET", &format!("/products/{a}"), None).await;
    assert_eq!(json["on_hand_count"], 4);
}

#[tokio::test]
async fn test_reused_key_with_different_body_is_conflict() {
    let app = setup();
    let a = create_product(&app, "A").await;
    let mut body = order_body(json!([
        { "product_id": a, "quantity": 2, "unit_price_cents": 100 }
    ]));
    body["idempotency_key"] = json!("po-2024-002");
    let (status, _) = send(&app, "POST", "/purchases", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    body["items"] = json!([{ "product_id": a, "quantity": 9, "unit_price_cents": 999 }]);
    let (status, json) = send(&app, "POST", "/purchases", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("po-2024-002"));

    let (_, json) = send(&app, "GET", &format!("/products/{a}"), None).await;
    assert_eq!(json["on_hand_count"], 2);
}

#[tokio::test]
async fn test_product_update_and_list() {
    let app = setup();
    let bolt = create_product(&app, "Steel bolt").await;
    create_product(&app, "Washer").await;
    send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": bolt, "quantity": 3, "unit_price_cents": 100 }
        ]))),
    )
    .await;

    let category = "00000000-0000-0000-0000-0000000000c1";
    let (status, json) = send(
        &app,
        "PUT",
        &format!("/products/{bolt}"),
        Some(json!({
            "category_id": category,
            "name": "",
            "standard_price_cents": 1500,
            "on_hand_count": 99
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Steel bolt");
    assert_eq!(json["category_id"], category);
    assert_eq!(json["standard_price_cents"], 1500);
    assert_eq!(json["on_hand_count"], 3);

    let (status, json) = send(&app, "GET", "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (_, json) = send(&app, "GET", &format!("/products?category_id={category}"), None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], bolt.as_str());

    let (_, json) = send(&app, "GET", "/products?name=wash&category_id=", None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["name"], "Washer");

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/products/{bolt}"),
        Some(json!({ "incoming_price_cents": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        "/products/00000000-0000-0000-0000-0000000000ff",
        Some(json!({ "name": "Ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/products?category_id=tools", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_ids_are_bad_requests() {
    let app = setup();

    let (status, _) = send(&app, "GET", "/purchases/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/products/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/products", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let a = create_product(&app, "A").await;
    send(
        &app,
        "POST",
        "/purchases",
        Some(order_body(json!([
            { "product_id": a, "quantity": 1, "unit_price_cents": 100 }
        ]))),
    )
    .await;

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
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}
