//! Wire types for the Smartpay API.

use serde::{Deserialize, Serialize};

/// Refund reason sent on every cancellation-triggered refund.
pub const REFUND_REASON_REQUESTED_BY_CUSTOMER: &str = "requested_by_customer";

/// Remote order status that authorizes settlement or refund.
pub const REMOTE_STATUS_SUCCEEDED: &str = "succeeded";

/// Request body for `POST /checkout-sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    pub customer_info: CustomerInfo,
    /// Order payment total, minor units.
    pub amount: i64,
    pub currency: String,
    pub items: Vec<LineItem>,
    pub shipping_info: ShippingInfo,
    /// Local order id, stringified. The join key used to map the remote
    /// order back to the local one.
    pub reference: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub email_address: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name_kana: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name_kana: Option<String>,
    /// E.164, leading local `0` rewritten to `+81`.
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub locality: String,
    pub postal_code: String,
    pub country: String,
}

/// One entry of the checkout-session `items` array. Product and charge
/// lines carry no `kind`; discount and tax lines carry one and no quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
}

/// `POST /checkout-sessions` / `GET /checkout-sessions/{id}?expand=all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SessionOrder>,
}

/// Remote order embedded in an expanded checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOrder {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub payments: Vec<SessionPayment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayment {
    pub id: String,
}

/// `GET /orders/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Request body for `POST /refunds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub amount: i64,
    pub currency: String,
    pub payment: String,
    pub reason: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: String,
}

/// Inbound webhook body; only the remote order id is consumed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventBody {
    pub event_data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventData {
    pub data: WebhookEventRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventRef {
    pub id: String,
}
