//! Ledger Repository
//!
//! Raw access to operator cash balances and the movement log. Callers go
//! through `LedgerStore`, which pairs every balance write with a movement.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use super::models::*;
use super::{query_failed, DatabaseError};
use crate::domain::entities::ledger::{
    BalanceKey, CashMovement, NewCashMovement, OperatorCashBalance,
};

pub async fn find_balance(
    conn: &mut SqliteConnection,
    key: &BalanceKey,
) -> Result<Option<OperatorCashBalance>, DatabaseError> {
    sqlx::query_as::<_, CashBalanceRecord>(
        r#"
        SELECT * FROM operator_cash_balances
        WHERE operator_id = ?1 AND payment_method_id = ?2 AND currency = ?3
        "#,
    )
    .bind(key.operator_id)
    .bind(key.payment_method_id)
    .bind(&key.currency)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("get cash balance"))?
    .map(OperatorCashBalance::try_from)
    .transpose()
}

/// Fetch the balance row for `key`, creating it at zero if it does not exist
pub async fn ensure_balance(
    conn: &mut SqliteConnection,
    key: &BalanceKey,
) -> Result<OperatorCashBalance, DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO operator_cash_balances (operator_id, payment_method_id, currency, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (operator_id, payment_method_id, currency) DO NOTHING
        "#,
    )
    .bind(key.operator_id)
    .bind(key.payment_method_id)
    .bind(&key.currency)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(query_failed("open cash balance"))?;

    find_balance(conn, key).await?.ok_or_else(|| {
        DatabaseError::QueryError(format!("Cash balance {} vanished after insert", key))
    })
}

pub async fn list_balances(
    conn: &mut SqliteConnection,
) -> Result<Vec<OperatorCashBalance>, DatabaseError> {
    let records = sqlx::query_as::<_, CashBalanceRecord>(
        "SELECT * FROM operator_cash_balances ORDER BY operator_id, payment_method_id, currency",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list cash balances"))?;

    decode_all(records)
}

/// Compare-and-swap write of a balance row.
///
/// Returns `false` when the row's version no longer equals
/// `expected_version`, meaning another writer got there first.
pub async fn write_balance(
    conn: &mut SqliteConnection,
    id: i64,
    expected_version: i64,
    balance: Decimal,
    reserved: Decimal,
) -> Result<bool, DatabaseError> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE operator_cash_balances
        SET balance = ?1, reserved = ?2, version = version + 1, updated_at = ?3
        WHERE id = ?4 AND version = ?5
        "#,
    )
    .bind(balance.to_string())
    .bind(reserved.to_string())
    .bind(Utc::now())
    .bind(id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(query_failed("update cash balance"))?
    .rows_affected();

    Ok(rows_affected == 1)
}

pub async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &NewCashMovement,
) -> Result<CashMovement, DatabaseError> {
    let record = sqlx::query_as::<_, CashMovementRecord>(
        r#"
        INSERT INTO cash_movements (
            operator_id, payment_method_id, order_id, movement_type, currency,
            amount, balance_before, balance_after, description, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        RETURNING *
        "#,
    )
    .bind(movement.key.operator_id)
    .bind(movement.key.payment_method_id)
    .bind(movement.order_id)
    .bind(movement.movement_type.as_str())
    .bind(&movement.key.currency)
    .bind(movement.amount.to_string())
    .bind(movement.balance_before.to_string())
    .bind(movement.balance_after.to_string())
    .bind(&movement.description)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("record cash movement"))?;

    debug!(
        "Recorded {} movement {} of {} on {}",
        record.movement_type, record.id, record.amount, movement.key
    );
    record.try_into()
}

/// Full history of one balance, oldest first
pub async fn movements_for_key(
    conn: &mut SqliteConnection,
    key: &BalanceKey,
) -> Result<Vec<CashMovement>, DatabaseError> {
    let records = sqlx::query_as::<_, CashMovementRecord>(
        r#"
        SELECT * FROM cash_movements
        WHERE operator_id = ?1 AND payment_method_id = ?2 AND currency = ?3
        ORDER BY id ASC
        "#,
    )
    .bind(key.operator_id)
    .bind(key.payment_method_id)
    .bind(&key.currency)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list cash movements"))?;

    decode_all(records)
}

/// Movements tagged with an order, oldest first
pub async fn movements_for_order(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Vec<CashMovement>, DatabaseError> {
    let records = sqlx::query_as::<_, CashMovementRecord>(
        "SELECT * FROM cash_movements WHERE order_id = ?1 ORDER BY id ASC",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list order movements"))?;

    decode_all(records)
}
