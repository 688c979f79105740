//! Integration tests for the redirect-side checkout flow: session creation,
//! the completion landing racing the webhook, and cancellation refunds.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use smartpay_gateway::entities::PaymentStatus;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn create_session_returns_checkout_url_and_stores_the_session_id() {
    let app = TestApp::new().await;
    app.seed_order(42, PaymentStatus::Enabled, None).await;

    Mock::given(method("POST"))
        .and(path("/checkout-sessions"))
        .and(body_partial_json(serde_json::json!({
            "reference": "42",
            "amount": 1000,
            "currency": "JPY",
            "successUrl": "https://shop.example.com/complete",
            "cancelUrl": "https://shop.example.com/cancel"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_1",
            "url": "https://checkout.smartpay.co/login?session-id=cs_1"
        })))
        .expect(1)
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/42/session")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["session_id"], "cs_1");
    assert_eq!(
        body["data"]["checkout_url"],
        "https://checkout.smartpay.co/login?session-id=cs_1"
    );

    let order = app.order(42).await;
    assert_eq!(order.checkout_session_id.as_deref(), Some("cs_1"));
    assert_eq!(order.payment_status, PaymentStatus::Enabled);

    // Re-entry re-uses the stored session: the mock expects exactly one POST.
    let response = app
        .request(Method::POST, "/api/v1/checkout/42/session")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_creation_failure_surfaces_a_generic_error() {
    let app = TestApp::new().await;
    app.seed_order(42, PaymentStatus::Enabled, None).await;

    Mock::given(method("POST"))
        .and(path("/checkout-sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal processor detail"))
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/42/session")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = response_json(response).await;
    let message = body["message"].as_str().unwrap_or_default();
    assert!(!message.contains("internal processor detail"));

    assert_eq!(app.order(42).await.payment_status, PaymentStatus::Enabled);
}

#[tokio::test]
async fn redirect_completion_settles_the_order_exactly_once() {
    let app = TestApp::new().await;
    app.seed_order(42, PaymentStatus::Enabled, Some("cs_1")).await;

    Mock::given(method("GET"))
        .and(path("/checkout-sessions/cs_1"))
        .and(query_param("expand", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_1",
            "order": {
                "id": "order_r1",
                "status": "succeeded",
                "amount": 1000,
                "currency": "JPY",
                "payments": [{"id": "pay_1"}]
            }
        })))
        .expect(1)
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/complete/42")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["already_settled"], false);

    assert_eq!(app.order(42).await.payment_status, PaymentStatus::ActualSales);
    assert_eq!(app.lifecycle.completed_count(), 1);

    // Second landing: no second verification fetch, no second mail.
    let response = app
        .request(Method::POST, "/api/v1/checkout/complete/42")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["already_settled"], true);
    assert_eq!(app.lifecycle.completed_count(), 1);
    assert_eq!(app.lifecycle.resumed_count(), 1);
}

#[tokio::test]
async fn redirect_after_webhook_settled_the_order_short_circuits() {
    let app = TestApp::new().await;
    // The webhook already drove the order to actual sales.
    app.seed_order(42, PaymentStatus::ActualSales, Some("cs_1")).await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/complete/42")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["already_settled"], true);

    assert_eq!(app.lifecycle.completed_count(), 0);
    assert_eq!(app.lifecycle.resumed_count(), 1);
}

#[tokio::test]
async fn redirect_for_a_cancelled_order_is_rejected_without_remote_calls() {
    let app = TestApp::new().await;
    app.seed_order(7, PaymentStatus::Cancel, Some("cs_7")).await;

    Mock::given(method("GET"))
        .and(path("/checkout-sessions/cs_7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cs_7"})))
        .expect(0)
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/complete/7")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.lifecycle.completed_count(), 0);
    assert_eq!(app.lifecycle.resumed_count(), 0);
}

#[tokio::test]
async fn redirect_for_an_unknown_order_is_a_generic_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/complete/999")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_eq!(body["message"], "Not found: order not found");
}

#[tokio::test]
async fn cancelling_a_settled_order_issues_the_exact_refund() {
    let app = TestApp::new().await;
    app.seed_order(42, PaymentStatus::ActualSales, Some("cs_1")).await;

    Mock::given(method("GET"))
        .and(path("/checkout-sessions/cs_1"))
        .and(query_param("expand", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_1",
            "order": {
                "id": "order_r1",
                "status": "succeeded",
                "amount": 1000,
                "currency": "JPY",
                "payments": [{"id": "pay_1"}]
            }
        })))
        .expect(1)
        .mount(&app.smartpay)
        .await;
    Mock::given(method("POST"))
        .and(path("/refunds"))
        .and(body_json(serde_json::json!({
            "amount": 1000,
            "currency": "JPY",
            "payment": "pay_1",
            "reason": "requested_by_customer",
            "reference": "42"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "refund_1"})),
        )
        .expect(1)
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/cancel/42")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.order(42).await;
    assert_eq!(order.payment_status, PaymentStatus::Cancel);
    assert_eq!(order.status, "processing");
}

#[tokio::test]
async fn cancelling_an_unsettled_order_never_calls_the_refund_endpoint() {
    let app = TestApp::new().await;
    app.seed_order(42, PaymentStatus::Enabled, Some("cs_1")).await;

    Mock::given(method("GET"))
        .and(path("/checkout-sessions/cs_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cs_1"})))
        .expect(0)
        .mount(&app.smartpay)
        .await;
    Mock::given(method("POST"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "r"})))
        .expect(0)
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/cancel/42")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.order(42).await;
    assert_eq!(order.payment_status, PaymentStatus::Enabled);
    assert_eq!(order.status, "processing");
}

#[tokio::test]
async fn refund_failure_does_not_block_the_cancellation() {
    let app = TestApp::new().await;
    app.seed_order(42, PaymentStatus::ActualSales, Some("cs_1")).await;

    Mock::given(method("GET"))
        .and(path("/checkout-sessions/cs_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_1",
            "order": {
                "id": "order_r1",
                "status": "succeeded",
                "amount": 1000,
                "currency": "JPY",
                "payments": [{"id": "pay_1"}]
            }
        })))
        .mount(&app.smartpay)
        .await;
    Mock::given(method("POST"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(500).set_body_string("refund backend down"))
        .mount(&app.smartpay)
        .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/cancel/42")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.order(42).await;
    assert_eq!(order.status, "processing");
    assert_eq!(order.payment_status, PaymentStatus::ActualSales);
}
