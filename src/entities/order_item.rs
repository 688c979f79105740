use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Line item kind ordinals as recorded by the commerce subsystem.
///
/// The ordinal drives the stable sort applied before building a
/// checkout-session payload (products before charges). Rows may carry
/// ordinals this crate does not know; the session builder drops those
/// tolerantly instead of failing the whole order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OrderItemKind {
    Product,
    DeliveryFee,
    Charge,
    Discount,
    Tax,
    Point,
}

impl OrderItemKind {
    pub fn ordinal(self) -> i16 {
        match self {
            Self::Product => 1,
            Self::DeliveryFee => 2,
            Self::Charge => 3,
            Self::Discount => 4,
            Self::Tax => 5,
            Self::Point => 6,
        }
    }

    pub fn from_ordinal(ordinal: i16) -> Option<Self> {
        match ordinal {
            1 => Some(Self::Product),
            2 => Some(Self::DeliveryFee),
            3 => Some(Self::Charge),
            4 => Some(Self::Discount),
            5 => Some(Self::Tax),
            6 => Some(Self::Point),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    /// `OrderItemKind` ordinal; kept raw because the owning subsystem may
    /// record kinds this crate does not handle.
    pub kind: i16,
    pub product_name: String,
    pub class_category_name1: Option<String>,
    pub class_category_name2: Option<String>,
    /// Line total in minor units.
    pub price: i64,
    pub quantity: i32,
    pub currency: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
