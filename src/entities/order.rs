use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::payment_status::PaymentStatus;

/// Local commerce order, owned by the surrounding order-management
/// subsystem. The reconciliation engine only reads it and advances
/// `payment_status` / `checkout_session_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Stringified as the processor-side `reference` join key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub order_number: String,

    /// Surrounding workflow status (pending/processing/completed/cancelled),
    /// distinct from the payment lifecycle.
    pub status: String,

    pub email: String,
    pub last_name: String,
    pub first_name: String,
    pub last_name_kana: Option<String>,
    pub first_name_kana: Option<String>,
    pub phone_number: String,

    pub postal_code: String,
    pub addr_line1: String,
    pub addr_line2: Option<String>,
    pub locality: String,
    pub country: String,

    pub currency: String,
    /// Total to charge, in minor units.
    pub payment_total: i64,
    /// Delivery fee portion of the total, in minor units.
    pub delivery_fee_total: i64,

    /// Processor-assigned checkout session id, set once per order.
    pub checkout_session_id: Option<String>,
    pub payment_status: PaymentStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
