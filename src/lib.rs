//! Smartpay Gateway Library
//!
//! Reconciles local order payment state with the Smartpay processor through
//! two racing confirmation paths: the browser redirect back from hosted
//! checkout and the processor's signed webhook.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod smartpay;
pub mod tracing;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;

use services::reconciliation::ReconciliationService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub reconciliation: Arc<ReconciliationService>,
}

/// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Routes under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout/:order_id/session",
            post(handlers::checkout::create_checkout_session),
        )
        .route(
            "/checkout/complete/:order_id",
            post(handlers::checkout::complete_checkout),
        )
        .route(
            "/checkout/cancel/:order_id",
            post(handlers::checkout::cancel_checkout),
        )
        .route(
            "/webhooks/smartpay",
            post(handlers::webhooks::smartpay_webhook),
        )
}

/// Assembles the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "smartpay-gateway up" }))
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .with_state(state)
}
