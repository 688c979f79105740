//! Checkout-session request builder.
//!
//! Pure transformation from a local order and its line items into the
//! processor's checkout-session payload. No IO, no mutation.

use tracing::warn;

use crate::entities::{order, order_item, order_item::OrderItemKind};
use crate::smartpay::types::{
    Address, CheckoutSessionRequest, CustomerInfo, LineItem, ShippingInfo,
};

/// Builds the `POST /checkout-sessions` body for an order.
///
/// Line items are transformed by kind; delivery fees move into
/// `shippingInfo`, unknown kinds are logged and dropped, and the local order
/// id becomes the `reference` join key.
pub fn build_checkout_session_request(
    order: &order::Model,
    items: &[order_item::Model],
    success_url: &str,
    cancel_url: &str,
) -> CheckoutSessionRequest {
    let mut sorted: Vec<&order_item::Model> = items.iter().collect();
    // Stable, so products keep their relative order ahead of charges.
    sorted.sort_by_key(|item| item.kind);

    let line_items = sorted
        .iter()
        .filter_map(|item| transform_item(order.id, item))
        .collect();

    let fee = (order.delivery_fee_total > 0).then_some(order.delivery_fee_total);

    CheckoutSessionRequest {
        customer_info: CustomerInfo {
            email_address: order.email.clone(),
            first_name: order.first_name.clone(),
            last_name: order.last_name.clone(),
            first_name_kana: order.first_name_kana.clone(),
            last_name_kana: order.last_name_kana.clone(),
            phone_number: international_phone_number(&order.phone_number),
        },
        amount: order.payment_total,
        currency: order.currency.clone(),
        items: line_items,
        shipping_info: ShippingInfo {
            address: Address {
                line1: order.addr_line1.clone(),
                line2: order.addr_line2.clone(),
                locality: order.locality.clone(),
                postal_code: order.postal_code.clone(),
                country: order.country.clone(),
            },
            fee_amount: fee,
            fee_currency: fee.map(|_| order.currency.clone()),
        },
        reference: order.id.to_string(),
        success_url: success_url.to_string(),
        cancel_url: cancel_url.to_string(),
    }
}

fn transform_item(order_id: i64, item: &order_item::Model) -> Option<LineItem> {
    match OrderItemKind::from_ordinal(item.kind) {
        Some(OrderItemKind::Product) | Some(OrderItemKind::Charge) => Some(LineItem {
            kind: None,
            name: item.product_name.clone(),
            amount: item.price,
            currency: item.currency.clone(),
            quantity: Some(item.quantity),
            product_description: class_category_description(item),
        }),
        Some(OrderItemKind::Discount) | Some(OrderItemKind::Point) => Some(LineItem {
            kind: Some("discount".into()),
            name: item.product_name.clone(),
            amount: -item.price,
            currency: item.currency.clone(),
            quantity: None,
            product_description: None,
        }),
        Some(OrderItemKind::Tax) => Some(LineItem {
            kind: Some("tax".into()),
            name: "Tax".into(),
            amount: item.price,
            currency: item.currency.clone(),
            quantity: None,
            product_description: None,
        }),
        // The fee travels on shippingInfo instead of the item list.
        Some(OrderItemKind::DeliveryFee) => None,
        None => {
            warn!(
                order_id,
                item_id = item.id,
                kind = item.kind,
                "dropping order item of unhandled kind"
            );
            None
        }
    }
}

/// Concatenation of both classification categories, omitted when empty.
fn class_category_description(item: &order_item::Model) -> Option<String> {
    let description = format!(
        "{}{}",
        item.class_category_name1.as_deref().unwrap_or(""),
        item.class_category_name2.as_deref().unwrap_or("")
    );
    (!description.is_empty()).then_some(description)
}

/// Rewrites a leading local `0` to the `+81` country prefix.
fn international_phone_number(phone: &str) -> String {
    match phone.strip_prefix('0') {
        Some(rest) => format!("+81{rest}"),
        None => phone.to_string(),
    }
}
