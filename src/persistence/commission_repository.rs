//! Commission Repository
//!
//! Per-order commission rows, one per beneficiary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use super::models::*;
use super::{query_failed, DatabaseError};
use crate::domain::entities::commission::{Beneficiary, Commission};

pub async fn insert_commission(
    conn: &mut SqliteConnection,
    order_id: i64,
    exchange_house_id: i64,
    beneficiary: Beneficiary,
    rate_percent: Decimal,
    amount: Decimal,
    base_amount: Decimal,
) -> Result<Commission, DatabaseError> {
    let record = sqlx::query_as::<_, CommissionRecord>(
        r#"
        INSERT INTO commissions (
            order_id, exchange_house_id, beneficiary, rate_percent, amount, base_amount,
            status, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(exchange_house_id)
    .bind(beneficiary.as_str())
    .bind(rate_percent.to_string())
    .bind(amount.to_string())
    .bind(base_amount.to_string())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create commission"))?;

    record.try_into()
}

/// Rewrite a beneficiary's share after reconciliation
pub async fn update_commission(
    conn: &mut SqliteConnection,
    order_id: i64,
    beneficiary: Beneficiary,
    rate_percent: Decimal,
    amount: Decimal,
) -> Result<bool, DatabaseError> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE commissions SET rate_percent = ?1, amount = ?2
        WHERE order_id = ?3 AND beneficiary = ?4 AND status = 'pending'
        "#,
    )
    .bind(rate_percent.to_string())
    .bind(amount.to_string())
    .bind(order_id)
    .bind(beneficiary.as_str())
    .execute(&mut *conn)
    .await
    .map_err(query_failed("update commission"))?
    .rows_affected();

    Ok(rows_affected == 1)
}

pub async fn delete_for_order(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<u64, DatabaseError> {
    let rows_affected = sqlx::query("DELETE FROM commissions WHERE order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await
        .map_err(query_failed("delete commissions"))?
        .rows_affected();

    debug!("Deleted {} commission rows for order {}", rows_affected, order_id);
    Ok(rows_affected)
}

pub async fn list_for_order(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Vec<Commission>, DatabaseError> {
    let records = sqlx::query_as::<_, CommissionRecord>(
        "SELECT * FROM commissions WHERE order_id = ?1 ORDER BY beneficiary",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list commissions"))?;

    decode_all(records)
}

/// Unpaid platform commissions of completed orders for a house that no
/// payout request covers yet, optionally restricted to orders completed
/// inside `[start, end]`. Zero rows (orders taken under a promo) owe nothing
/// and are left out.
pub async fn unclaimed_platform_commissions(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    period: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<Vec<Commission>, DatabaseError> {
    let (start, end) = match period {
        Some((start, end)) => (Some(start), Some(end)),
        None => (None, None),
    };

    let records = sqlx::query_as::<_, CommissionRecord>(
        r#"
        SELECT c.* FROM commissions c
        JOIN orders o ON o.id = c.order_id
        WHERE c.exchange_house_id = ?1
          AND c.beneficiary = 'platform'
          AND c.status = 'pending'
          AND c.payment_request_id IS NULL
          AND o.status = 'completed'
          AND (?2 IS NULL OR julianday(o.completed_at) >= julianday(?2))
          AND (?3 IS NULL OR julianday(o.completed_at) <= julianday(?3))
        ORDER BY c.id
        "#,
    )
    .bind(exchange_house_id)
    .bind(start)
    .bind(end)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("load accrued commissions"))?;

    let commissions: Vec<Commission> = decode_all(records)?;
    Ok(commissions
        .into_iter()
        .filter(|commission| commission.amount > Decimal::ZERO)
        .collect())
}

pub async fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> Result<Vec<Commission>, DatabaseError> {
    let records = sqlx::query_as::<_, CommissionRecord>(
        "SELECT * FROM commissions WHERE payment_request_id = ?1 ORDER BY id",
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list request commissions"))?;

    decode_all(records)
}

/// Tag commission rows as covered by a payout request
pub async fn claim_for_request(
    conn: &mut SqliteConnection,
    request_id: i64,
    commission_ids: &[i64],
) -> Result<u64, DatabaseError> {
    let mut claimed = 0;
    for id in commission_ids {
        claimed += sqlx::query(
            r#"
            UPDATE commissions SET payment_request_id = ?1
            WHERE id = ?2 AND payment_request_id IS NULL AND status = 'pending'
            "#,
        )
        .bind(request_id)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(query_failed("claim commission"))?
        .rows_affected();
    }
    Ok(claimed)
}

/// Return a rejected request's rows to the accrued pool
pub async fn release_request(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> Result<u64, DatabaseError> {
    let rows_affected = sqlx::query(
        "UPDATE commissions SET payment_request_id = NULL WHERE payment_request_id = ?1 AND status = 'pending'",
    )
    .bind(request_id)
    .execute(&mut *conn)
    .await
    .map_err(query_failed("release commissions"))?
    .rows_affected();

    Ok(rows_affected)
}

pub async fn mark_request_paid(
    conn: &mut SqliteConnection,
    request_id: i64,
    paid_at: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE commissions SET status = 'paid', paid_at = ?1
        WHERE payment_request_id = ?2 AND status = 'pending'
        "#,
    )
    .bind(paid_at)
    .bind(request_id)
    .execute(&mut *conn)
    .await
    .map_err(query_failed("mark commissions paid"))?
    .rows_affected();

    Ok(rows_affected)
}
