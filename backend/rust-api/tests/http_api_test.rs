// HTTP surface through the real router: auth, sales, cash boxes, payments, webhook

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use uuid::Uuid;
use verdustock_api::router;

use test_helpers::*;

fn server(app: &TestApp) -> TestServer {
    TestServer::new(router(app.state.clone())).unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let response = server(&app).get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_requests_without_valid_identity_are_rejected() {
    let app = TestApp::new();
    let server = server(&app);

    let response = server.get("/api/sales").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "AUTH_DECLINED");

    let response = server
        .get("/api/sales")
        .add_header(AUTHORIZATION, bearer("not-a-jwt"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    // Well-formed token for a merchant that does not exist.
    let response = server
        .get("/api/sales")
        .add_header(AUTHORIZATION, bearer(&mint_token(Uuid::new_v4())))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_legacy_identity_claim_is_accepted() {
    let app = TestApp::new();
    let merchant = unlinked_merchant();
    app.store.add_merchant(merchant.clone()).await;

    let token = mint_token_with_claim("userID", merchant.id);
    let response = server(&app)
        .get("/api/sales")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!([]));
}

#[tokio::test]
async fn test_sale_lifecycle_over_http() {
    let app = TestApp::new();
    let merchant = unlinked_merchant();
    app.store.add_merchant(merchant.clone()).await;
    let auth = bearer(&mint_token(merchant.id));
    let server = server(&app);

    let created = server
        .post("/api/sales")
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({"amount": 100, "type": "cash", "comments": "a"}))
        .await;
    created.assert_status(StatusCode::CREATED);
    let sale: Value = created.json();
    let id = sale["id"].as_str().unwrap().to_string();
    assert_eq!(sale["isClosed"], false);
    assert_eq!(sale["comment"], "a");

    let amended = server
        .put(&format!("/api/sales/{}", id))
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({"amount": 150}))
        .await;
    amended.assert_status_ok();
    let amended: Value = amended.json();
    assert_eq!(amended["modified"], true);
    assert_eq!(amended["history"].as_array().unwrap().len(), 1);
    assert_eq!(amended["history"][0]["field"], "amount");

    let open = server
        .get("/api/sales")
        .add_query_param("status", "open")
        .add_header(AUTHORIZATION, auth.clone())
        .await;
    assert_eq!(open.json::<Value>().as_array().unwrap().len(), 1);

    let closed = server
        .post("/api/sales/close")
        .add_header(AUTHORIZATION, auth.clone())
        .await;
    closed.assert_json(&json!({"closed": 1}));

    let rejected = server
        .put(&format!("/api/sales/{}", id))
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({"comment": "late"}))
        .await;
    rejected.assert_status(StatusCode::CONFLICT);
    assert_eq!(rejected.json::<Value>()["code"], "SALE_CLOSED");
}

#[tokio::test]
async fn test_bad_input_is_a_client_error() {
    let app = TestApp::new();
    let merchant = unlinked_merchant();
    app.store.add_merchant(merchant.clone()).await;
    let auth = bearer(&mint_token(merchant.id));
    let server = server(&app);

    let response = server
        .post("/api/sales")
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({"amount": 10, "type": "barter"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .put("/api/sales/not-a-uuid")
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({"amount": 10}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .put(&format!("/api/sales/{}", Uuid::new_v4()))
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({"amount": 10}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server
        .get("/api/sales")
        .add_query_param("date", "10/05/2024")
        .add_header(AUTHORIZATION, auth)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pending_boxes_endpoint_is_empty_when_nothing_pending() {
    let app = TestApp::new();
    let merchant = unlinked_merchant();
    app.store.add_merchant(merchant.clone()).await;

    let response = server(&app)
        .get("/api/cash/pending")
        .add_header(AUTHORIZATION, bearer(&mint_token(merchant.id)))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!([]));
}

#[tokio::test]
async fn test_sync_endpoint_reports_new_payments() {
    let app = TestApp::new();
    let merchant = linked_merchant(4242);
    app.store.add_merchant(merchant.clone()).await;
    app.gateway
        .add_payment(&access_token_for(4242), payment_json(1, 10.0, "approved"));
    app.gateway
        .add_payment(&access_token_for(4242), payment_json(2, 20.0, "approved"));
    let auth = bearer(&mint_token(merchant.id));
    let server = server(&app);

    let first = server
        .post("/api/payments/sync")
        .add_header(AUTHORIZATION, auth.clone())
        .await;
    first.assert_status_ok();
    assert_eq!(first.json::<Value>()["new"], 2);

    let second = server
        .post("/api/payments/sync")
        .add_header(AUTHORIZATION, auth.clone())
        .await;
    assert_eq!(second.json::<Value>()["new"], 0);

    let payments = server.get("/api/payments").add_header(AUTHORIZATION, auth).await;
    assert_eq!(payments.json::<Value>().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_endpoint_errors() {
    let app = TestApp::new();
    let unlinked = unlinked_merchant();
    let linked = linked_merchant(5151);
    app.store.add_merchant(unlinked.clone()).await;
    app.store.add_merchant(linked.clone()).await;
    let server = server(&app);

    let response = server
        .post("/api/payments/sync")
        .add_header(AUTHORIZATION, bearer(&mint_token(unlinked.id)))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    app.gateway.fail_with(Some(GatewayFailure::Timeout));
    let response = server
        .post("/api/payments/sync")
        .add_header(AUTHORIZATION, bearer(&mint_token(linked.id)))
        .await;
    response.assert_status(StatusCode::GATEWAY_TIMEOUT);

    app.gateway.fail_with(Some(GatewayFailure::Unreachable));
    let response = server
        .post("/api/payments/sync")
        .add_header(AUTHORIZATION, bearer(&mint_token(linked.id)))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_webhook_acknowledges_and_records() {
    let app = TestApp::new();
    let merchant = linked_merchant(6262);
    app.store.add_merchant(merchant.clone()).await;
    app.gateway
        .add_payment(&access_token_for(6262), payment_json(88, 500.0, "approved"));
    app.gateway
        .add_payment(&access_token_for(6262), payment_json(89, 500.0, "rejected"));
    let server = server(&app);

    let body = json!({"type": "payment", "data": {"id": "88"}, "user_id": 6262});
    let response = server.post("/api/webhooks/mercadopago").json(&body).await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "processed", "reason": "recorded"}));

    let again = server.post("/api/webhooks/mercadopago").json(&body).await;
    again.assert_json(&json!({"status": "processed", "reason": "already_processed"}));

    let rejected = server
        .post("/api/webhooks/mercadopago")
        .json(&json!({"type": "payment", "data": {"id": 89}, "user_id": "6262"}))
        .await;
    rejected.assert_status_ok();
    rejected.assert_json(&json!({"status": "ignored", "reason": "not_approved"}));

    assert_eq!(app.store.payment_count(merchant.id).await, 1);
    assert_eq!(app.store.sale_count(merchant.id).await, 1);
}

#[tokio::test]
async fn test_webhook_malformed_body_is_bad_request() {
    let app = TestApp::new();
    let server = server(&app);

    let response = server.post("/api/webhooks/mercadopago").text("{not json").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/webhooks/mercadopago")
        .json(&json!({"type": "payment", "data": {"id": "abc"}}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    // Not a payment event: acknowledged even with junk ids.
    let response = server
        .post("/api/webhooks/mercadopago")
        .json(&json!({"type": "plan", "data": {"id": "abc"}}))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "ignored", "reason": "not_payment_event"}));
}
