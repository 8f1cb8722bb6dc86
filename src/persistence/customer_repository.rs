//! Customer Repository
//!
//! Customer aggregates and their activity log. Metrics are recomputed from
//! the customer's non-cancelled orders rather than incremented, so creating
//! and cancelling an order always nets out.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::str::FromStr;

use super::models::*;
use super::order_repository::customer_order_history;
use super::{query_failed, DatabaseError};
use crate::domain::entities::customer::{ActivityType, Customer, CustomerActivity};

pub async fn insert_customer(
    conn: &mut SqliteConnection,
    customer: &CreateCustomer,
) -> Result<Customer, DatabaseError> {
    let record = sqlx::query_as::<_, CustomerRecord>(
        r#"
        INSERT INTO customers (exchange_house_id, name, created_at)
        VALUES (?1, ?2, ?3)
        RETURNING *
        "#,
    )
    .bind(customer.exchange_house_id)
    .bind(&customer.name)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create customer"))?;

    record.try_into()
}

pub async fn find_customer(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Customer>, DatabaseError> {
    sqlx::query_as::<_, CustomerRecord>("SELECT * FROM customers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("get customer"))?
        .map(Customer::try_from)
        .transpose()
}

/// Recompute order count, volume and last order time for a customer
pub async fn refresh_metrics(
    conn: &mut SqliteConnection,
    customer_id: i64,
) -> Result<Customer, DatabaseError> {
    let history = customer_order_history(conn, customer_id).await?;

    let mut total_volume = Decimal::ZERO;
    for (amount, _) in &history {
        total_volume += Decimal::from_str(amount).map_err(|e| DatabaseError::DecodeError {
            table: "orders",
            id: customer_id,
            reason: format!("base_amount '{}': {}", amount, e),
        })?;
    }
    let last_order_at = history.iter().map(|(_, at)| *at).max();

    let record = sqlx::query_as::<_, CustomerRecord>(
        r#"
        UPDATE customers SET total_orders = ?1, total_volume = ?2, last_order_at = ?3
        WHERE id = ?4
        RETURNING *
        "#,
    )
    .bind(history.len() as i64)
    .bind(total_volume.to_string())
    .bind(last_order_at)
    .bind(customer_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("update customer metrics"))?;

    record.try_into()
}

pub async fn insert_activity(
    conn: &mut SqliteConnection,
    customer_id: i64,
    order_id: Option<i64>,
    activity: ActivityType,
    details: &serde_json::Value,
) -> Result<CustomerActivity, DatabaseError> {
    let record = sqlx::query_as::<_, CustomerActivityRecord>(
        r#"
        INSERT INTO customer_activities (customer_id, order_id, activity_type, details, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING *
        "#,
    )
    .bind(customer_id)
    .bind(order_id)
    .bind(activity.as_str())
    .bind(details.to_string())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("log customer activity"))?;

    record.try_into()
}

pub async fn list_activities(
    conn: &mut SqliteConnection,
    customer_id: i64,
) -> Result<Vec<CustomerActivity>, DatabaseError> {
    let records = sqlx::query_as::<_, CustomerActivityRecord>(
        "SELECT * FROM customer_activities WHERE customer_id = ?1 ORDER BY id ASC",
    )
    .bind(customer_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list customer activities"))?;

    decode_all(records)
}
