//! Checkout endpoints: session creation, the redirect-completion landing
//! and the cancellation hook.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::services::reconciliation::RedirectOutcome;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    /// Hosted checkout URL the caller redirects the customer to.
    pub checkout_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteResponse {
    pub order_id: i64,
    /// True when the webhook settled the order before the redirect landed.
    pub already_settled: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub order_id: i64,
    pub status: String,
}

// POST /api/v1/checkout/{order_id}/session
#[utoipa::path(
    post,
    path = "/api/v1/checkout/{order_id}/session",
    params(("order_id" = i64, Path, description = "Local order id")),
    responses(
        (status = 200, description = "Checkout session created or re-used"),
        (status = 400, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor request failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.reconciliation.create_session(order_id).await?;
    Ok(Json(ApiResponse::success(CheckoutSessionResponse {
        session_id: created.session_id,
        checkout_url: created.checkout_url,
    })))
}

// POST /api/v1/checkout/complete/{order_id}
#[utoipa::path(
    post,
    path = "/api/v1/checkout/complete/{order_id}",
    params(("order_id" = i64, Path, description = "Local order id")),
    responses(
        (status = 200, description = "Payment confirmed, or already settled by the webhook"),
        (status = 400, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn complete_checkout(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.reconciliation.confirm_redirect(order_id).await?;
    Ok(Json(ApiResponse::success(CompleteResponse {
        order_id,
        already_settled: outcome == RedirectOutcome::AlreadySettled,
    })))
}

// POST /api/v1/checkout/cancel/{order_id}
#[utoipa::path(
    post,
    path = "/api/v1/checkout/cancel/{order_id}",
    params(("order_id" = i64, Path, description = "Local order id")),
    responses(
        (status = 200, description = "Order returned to processing; refund attempted when settled"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn cancel_checkout(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    info!(order_id, "checkout cancellation requested");
    state.reconciliation.cancel(order_id).await?;
    Ok(Json(ApiResponse::success(CancelResponse {
        order_id,
        status: "processing".into(),
    })))
}
