use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment lifecycle of an order against the processor.
///
/// The lifecycle is ordered but not strictly linear: an enabled order settles
/// into provisional or actual sales, and only a settled order can be
/// cancelled. `Outstanding` is the default/unset state and is never a
/// transition target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    /// No payment attempt recorded yet
    #[sea_orm(num_value = 1)]
    Outstanding,
    /// Credentials verified upstream; awaiting payment
    #[sea_orm(num_value = 2)]
    Enabled,
    /// Authorized but not captured
    #[sea_orm(num_value = 3)]
    ProvisionalSales,
    /// Captured
    #[sea_orm(num_value = 4)]
    ActualSales,
    /// Refunded after cancellation
    #[sea_orm(num_value = 5)]
    Cancel,
}

impl PaymentStatus {
    /// A settled order has had the payment applied to it.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::ProvisionalSales | Self::ActualSales)
    }
}
