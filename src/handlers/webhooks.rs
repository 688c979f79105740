//! Inbound Smartpay webhook.
//!
//! The body is consumed raw because the signature covers the exact bytes on
//! the wire. The response is solely an HTTP status; no detail about a
//! rejection is disclosed to the caller.

use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use bytes::Bytes;

use crate::AppState;

// POST /api/v1/webhooks/smartpay
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/smartpay",
    request_body = String,
    responses(
        (status = 200, description = "Delivery processed (confirmed, no-op, or signature rejected)"),
        (status = 400, description = "Missing required headers or malformed payload"),
        (status = 404, description = "Not configured, subscription mismatch, or order not found"),
        (status = 500, description = "Unexpected internal error; nothing was mutated")
    ),
    tag = "Webhooks"
)]
pub async fn smartpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state
        .reconciliation
        .confirm_webhook(&headers, &body)
        .await
        .status()
}
