//! Payment-status projection: which transitions are legal, and the atomic
//! conditional update every engine mutation goes through.
//!
//! The redirect and webhook confirmation paths race to settle the same
//! order. Rather than locking, each path transitions through
//! [`transition`], a single conditional UPDATE filtered on the expected
//! current status. Exactly one racer observes an affected row; the other
//! sees zero and short-circuits.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveEnum, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Value};
use tracing::{debug, instrument};

use crate::entities::{order, PaymentStatus};
use crate::errors::ServiceError;

/// Whether the lifecycle permits moving from `from` to `to`.
///
/// Sales states are only reachable from `Enabled`; `Cancel` only from a
/// sales state; `Outstanding` is never a target.
pub fn is_valid_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Enabled, ProvisionalSales)
            | (Enabled, ActualSales)
            | (ProvisionalSales, Cancel)
            | (ActualSales, Cancel)
    )
}

/// Atomically moves an order from `from` to `to`.
///
/// Returns `Ok(true)` when this call performed the transition and
/// `Ok(false)` when the order was no longer in `from` (some other path got
/// there first, or the order does not exist). Illegal transitions are an
/// error before any database work.
#[instrument(skip(db))]
pub async fn transition<C: ConnectionTrait>(
    db: &C,
    order_id: i64,
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<bool, ServiceError> {
    if !is_valid_transition(from, to) {
        return Err(ServiceError::InvalidStatus(format!(
            "payment status cannot move from {from} to {to}"
        )));
    }

    let result = order::Entity::update_many()
        .col_expr(order::Column::PaymentStatus, Expr::value(to.into_value()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Value::from(Utc::now())))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::PaymentStatus.eq(from))
        .exec(db)
        .await?;

    let applied = result.rows_affected == 1;
    debug!(order_id, %from, %to, applied, "conditional payment-status update");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::{ActiveModelTrait, Set};
    use test_case::test_case;

    use crate::db;

    #[test_case(PaymentStatus::Enabled, PaymentStatus::ActualSales, true)]
    #[test_case(PaymentStatus::Enabled, PaymentStatus::ProvisionalSales, true)]
    #[test_case(PaymentStatus::ActualSales, PaymentStatus::Cancel, true)]
    #[test_case(PaymentStatus::ProvisionalSales, PaymentStatus::Cancel, true)]
    #[test_case(PaymentStatus::Outstanding, PaymentStatus::ActualSales, false)]
    #[test_case(PaymentStatus::ActualSales, PaymentStatus::Enabled, false)]
    #[test_case(PaymentStatus::Cancel, PaymentStatus::ActualSales, false)]
    #[test_case(PaymentStatus::Enabled, PaymentStatus::Cancel, false)]
    #[test_case(PaymentStatus::Enabled, PaymentStatus::Outstanding, false)]
    #[test_case(PaymentStatus::ActualSales, PaymentStatus::ActualSales, false)]
    fn transition_table(from: PaymentStatus, to: PaymentStatus, allowed: bool) {
        assert_eq!(is_valid_transition(from, to), allowed);
    }

    async fn seeded_pool(status: PaymentStatus) -> db::DbPool {
        let pool = db::establish_connection_with_config(&db::DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations");

        order::ActiveModel {
            id: Set(7),
            order_number: Set("ORD-7".into()),
            status: Set("pending".into()),
            email: Set("test@example.com".into()),
            last_name: Set("Yamada".into()),
            first_name: Set("Taro".into()),
            last_name_kana: Set(None),
            first_name_kana: Set(None),
            phone_number: Set("09012345678".into()),
            postal_code: Set("1500001".into()),
            addr_line1: Set("Jingumae 1-2-3".into()),
            addr_line2: Set(None),
            locality: Set("Shibuya-ku".into()),
            country: Set("JP".into()),
            currency: Set("JPY".into()),
            payment_total: Set(1000),
            delivery_fee_total: Set(0),
            checkout_session_id: Set(None),
            payment_status: Set(status),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&pool)
        .await
        .expect("seed order");

        pool
    }

    #[tokio::test]
    async fn transition_applies_once_and_only_once() {
        let pool = seeded_pool(PaymentStatus::Enabled).await;

        let first = transition(&pool, 7, PaymentStatus::Enabled, PaymentStatus::ActualSales)
            .await
            .unwrap();
        assert!(first);

        // The losing racer observes zero affected rows.
        let second = transition(&pool, 7, PaymentStatus::Enabled, PaymentStatus::ActualSales)
            .await
            .unwrap();
        assert!(!second);

        let stored = order::Entity::find_by_id(7).one(&pool).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::ActualSales);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_before_touching_the_database() {
        let pool = seeded_pool(PaymentStatus::Enabled).await;

        let err = transition(&pool, 7, PaymentStatus::Enabled, PaymentStatus::Cancel)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidStatus(_));

        let stored = order::Entity::find_by_id(7).one(&pool).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Enabled);
    }

    #[tokio::test]
    async fn transition_for_missing_order_reports_not_applied() {
        let pool = seeded_pool(PaymentStatus::Enabled).await;

        let applied = transition(&pool, 999, PaymentStatus::Enabled, PaymentStatus::ActualSales)
            .await
            .unwrap();
        assert!(!applied);
    }
}
