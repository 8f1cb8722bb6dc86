//! Order Repository
//!
//! Order rows. Status changes are guarded in SQL by the statuses they may
//! leave from, so a stale caller can never overwrite a terminal order.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use super::models::*;
use super::{query_failed, DatabaseError};
use crate::domain::entities::order::{Order, OrderEconomics, OrderStatus};

pub async fn insert_order(
    conn: &mut SqliteConnection,
    order: &InsertOrder,
) -> Result<Order, DatabaseError> {
    let (model, percent, buy_rate, sell_rate) = policy_columns(&order.policy);
    let e = &order.economics;
    let now = Utc::now();

    let record = sqlx::query_as::<_, OrderRecord>(
        r#"
        INSERT INTO orders (
            exchange_house_id, currency_pair_id, operator_id, customer_id,
            inbound_payment_method_id, outbound_payment_method_id,
            base_currency, quote_currency, base_amount, quote_amount,
            market_rate, applied_rate, commission_model, commission_percent, buy_rate, sell_rate,
            house_commission_amount, spread_profit, spread_profit_base, total_profit,
            platform_commission_rate, platform_commission, exchange_commission,
            margin_percent, expected_margin_percent, reserved_amount,
            status, notes, created_at, updated_at
        )
        VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?24, ?25, 'pending', ?26, ?27, ?27
        )
        RETURNING *
        "#,
    )
    .bind(order.exchange_house_id)
    .bind(order.currency_pair_id)
    .bind(order.operator_id)
    .bind(order.customer_id)
    .bind(order.inbound_payment_method_id)
    .bind(order.outbound_payment_method_id)
    .bind(&order.base_currency)
    .bind(&order.quote_currency)
    .bind(order.base_amount.to_string())
    .bind(e.quote_amount.to_string())
    .bind(order.market_rate.to_string())
    .bind(e.applied_rate.to_string())
    .bind(model)
    .bind(percent)
    .bind(buy_rate)
    .bind(sell_rate)
    .bind(e.house_commission_amount.to_string())
    .bind(e.spread_profit.to_string())
    .bind(e.spread_profit_base.to_string())
    .bind(e.total_profit.to_string())
    .bind(e.platform_commission_rate.to_string())
    .bind(e.platform_commission.to_string())
    .bind(e.exchange_commission.to_string())
    .bind(e.margin_percent.to_string())
    .bind(order.reserved_amount.to_string())
    .bind(&order.notes)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create order"))?;

    debug!("Created order {} ({} {})", record.id, record.base_amount, record.base_currency);
    record.try_into()
}

pub async fn find_order(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Order>, DatabaseError> {
    sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("get order"))?
        .map(Order::try_from)
        .transpose()
}

pub async fn list_orders(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    status: Option<OrderStatus>,
) -> Result<Vec<Order>, DatabaseError> {
    let records = sqlx::query_as::<_, OrderRecord>(
        r#"
        SELECT * FROM orders
        WHERE exchange_house_id = ?1 AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(exchange_house_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list orders"))?;

    decode_all(records)
}

/// Write reconciled economics and move an open order to completed.
/// Returns `None` if the order was no longer pending or processing.
pub async fn complete_order(
    conn: &mut SqliteConnection,
    id: i64,
    economics: &OrderEconomics,
    actual_rate: Decimal,
    actual_margin_percent: Decimal,
    notes: Option<&str>,
) -> Result<Option<Order>, DatabaseError> {
    let now = Utc::now();
    sqlx::query_as::<_, OrderRecord>(
        r#"
        UPDATE orders
        SET quote_amount = ?1, applied_rate = ?2, actual_rate = ?2,
            house_commission_amount = ?3, spread_profit = ?4, spread_profit_base = ?5,
            total_profit = ?6, platform_commission_rate = ?7, platform_commission = ?8,
            exchange_commission = ?9, margin_percent = ?10, actual_margin_percent = ?11,
            notes = COALESCE(?12, notes), reserved_amount = '0',
            status = 'completed', completed_at = ?13, updated_at = ?13
        WHERE id = ?14 AND status IN ('pending', 'processing')
        RETURNING *
        "#,
    )
    .bind(economics.quote_amount.to_string())
    .bind(actual_rate.to_string())
    .bind(economics.house_commission_amount.to_string())
    .bind(economics.spread_profit.to_string())
    .bind(economics.spread_profit_base.to_string())
    .bind(economics.total_profit.to_string())
    .bind(economics.platform_commission_rate.to_string())
    .bind(economics.platform_commission.to_string())
    .bind(economics.exchange_commission.to_string())
    .bind(economics.margin_percent.to_string())
    .bind(actual_margin_percent.to_string())
    .bind(notes)
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("complete order"))?
    .map(Order::try_from)
    .transpose()
}

/// Move an open order to cancelled. Returns `None` if it was no longer open.
pub async fn cancel_order(
    conn: &mut SqliteConnection,
    id: i64,
    reason: &str,
    cancelled_by: i64,
) -> Result<Option<Order>, DatabaseError> {
    let now = Utc::now();
    sqlx::query_as::<_, OrderRecord>(
        r#"
        UPDATE orders
        SET status = 'cancelled', cancellation_reason = ?1, cancelled_by = ?2,
            reserved_amount = '0', cancelled_at = ?3, updated_at = ?3
        WHERE id = ?4 AND status IN ('pending', 'processing')
        RETURNING *
        "#,
    )
    .bind(reason)
    .bind(cancelled_by)
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("cancel order"))?
    .map(Order::try_from)
    .transpose()
}

/// Generic status update guarded by the current status. Moving to `failed`
/// clears the reservation amount.
pub async fn transition_status(
    conn: &mut SqliteConnection,
    id: i64,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<Option<Order>, DatabaseError> {
    sqlx::query_as::<_, OrderRecord>(
        r#"
        UPDATE orders
        SET status = ?1,
            reserved_amount = CASE WHEN ?1 = 'failed' THEN '0' ELSE reserved_amount END,
            updated_at = ?2
        WHERE id = ?3 AND status = ?4
        RETURNING *
        "#,
    )
    .bind(to.as_str())
    .bind(Utc::now())
    .bind(id)
    .bind(from.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("update order status"))?
    .map(Order::try_from)
    .transpose()
}

/// Base amounts and creation times of a customer's non-cancelled orders
pub async fn customer_order_history(
    conn: &mut SqliteConnection,
    customer_id: i64,
) -> Result<Vec<(String, chrono::DateTime<Utc>)>, DatabaseError> {
    sqlx::query_as::<_, (String, chrono::DateTime<Utc>)>(
        "SELECT base_amount, created_at FROM orders WHERE customer_id = ?1 AND status != 'cancelled'",
    )
    .bind(customer_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("load customer orders"))
}
