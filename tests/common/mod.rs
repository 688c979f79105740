// Each integration-test binary compiles this module independently and uses
// a different subset of it.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;
use wiremock::MockServer;

use smartpay_gateway::{
    app_router,
    config::{AppConfig, SmartpayConfig},
    db,
    entities::{order, order_item, PaymentStatus},
    events::{self, CheckoutLifecycle, EventSender},
    services::reconciliation::ReconciliationService,
    smartpay::{signature::base62_decode, SmartpayClient},
    AppState,
};

pub const TEST_WEBHOOK_ID: &str = "subscription1";
pub const TEST_SIGNING_SECRET: &str = "testSigningSecret01";

/// Records completion side effects instead of performing them, so tests can
/// assert the mail/cart collaborators fire exactly once.
#[derive(Default)]
pub struct RecordingLifecycle {
    completed: AtomicUsize,
    resumed: AtomicUsize,
}

impl RecordingLifecycle {
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn resumed_count(&self) -> usize {
        self.resumed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckoutLifecycle for RecordingLifecycle {
    async fn payment_completed(&self, _order: &order::Model) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    async fn resume_completed(&self, _order: &order::Model) {
        self.resumed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Helper harness: real router over an in-memory SQLite database, with the
/// processor played by a wiremock server.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub smartpay: MockServer,
    pub lifecycle: Arc<RecordingLifecycle>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application with webhook confirmation configured.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Construct a test application with no webhook id / signing secret.
    pub async fn without_webhook_config() -> Self {
        Self::build(false).await
    }

    async fn build(webhook_configured: bool) -> Self {
        let smartpay = MockServer::start().await;

        let mut smartpay_cfg = SmartpayConfig::new(
            smartpay.uri(),
            "pk_test_abc123",
            "sk_test_abc123",
            "https://shop.example.com/complete",
            "https://shop.example.com/cancel",
        );
        if webhook_configured {
            smartpay_cfg.webhook_id = Some(TEST_WEBHOOK_ID.to_string());
            smartpay_cfg.webhook_signing_secret = Some(TEST_SIGNING_SECRET.to_string());
        }

        let mut cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18_080, "test", smartpay_cfg);
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let lifecycle = Arc::new(RecordingLifecycle::default());
        let client = SmartpayClient::new(&cfg.smartpay).expect("smartpay client");
        let reconciliation = Arc::new(ReconciliationService::new(
            db_arc.clone(),
            client,
            cfg.smartpay.clone(),
            lifecycle.clone(),
            event_sender.clone(),
        ));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            reconciliation,
        };
        let router = app_router(state.clone());

        Self {
            router,
            state,
            smartpay,
            lifecycle,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str) -> Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response")
    }

    /// POSTs a webhook delivery with the given headers and raw body.
    pub async fn webhook_request(&self, headers: &[(&str, &str)], body: &[u8]) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/smartpay");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_vec())).expect("request"))
            .await
            .expect("response")
    }

    /// Seeds an order with a single product line item.
    pub async fn seed_order(
        &self,
        id: i64,
        status: PaymentStatus,
        checkout_session_id: Option<&str>,
    ) -> order::Model {
        let seeded = order::ActiveModel {
            id: Set(id),
            order_number: Set(format!("ORD-{id}")),
            status: Set("pending".into()),
            email: Set("taro@example.com".into()),
            last_name: Set("Yamada".into()),
            first_name: Set("Taro".into()),
            last_name_kana: Set(Some("ヤマダ".into())),
            first_name_kana: Set(Some("タロウ".into())),
            phone_number: Set("09012345678".into()),
            postal_code: Set("1500001".into()),
            addr_line1: Set("Jingumae 1-2-3".into()),
            addr_line2: Set(None),
            locality: Set("Shibuya-ku".into()),
            country: Set("JP".into()),
            currency: Set("JPY".into()),
            payment_total: Set(1000),
            delivery_fee_total: Set(0),
            checkout_session_id: Set(checkout_session_id.map(str::to_string)),
            payment_status: Set(status),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order");

        order_item::ActiveModel {
            order_id: Set(id),
            kind: Set(order_item::OrderItemKind::Product.ordinal()),
            product_name: Set("Tea".into()),
            class_category_name1: Set(None),
            class_category_name2: Set(None),
            price: Set(1000),
            quantity: Set(1),
            currency: Set("JPY".into()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order item");

        seeded
    }

    pub async fn order(&self, id: i64) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    /// Signs a webhook body the way the processor does.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let key = base62_decode(TEST_SIGNING_SECRET).expect("test secret decodes");
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&key).expect("hmac accepts any key length");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// The four required webhook headers with a valid signature.
    pub fn signed_webhook_headers<'a>(
        &self,
        timestamp: &'a str,
        signature: &'a str,
    ) -> Vec<(&'static str, &'a str)> {
        vec![
            ("Smartpay-Signature", signature),
            ("Smartpay-Signature-Timestamp", timestamp),
            ("Smartpay-Subscription-Id", TEST_WEBHOOK_ID),
            ("Smartpay-Event-Id", "evt_1"),
        ]
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
