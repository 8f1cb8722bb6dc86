//! Payout Repository
//!
//! Commission payment requests and the settled payment summaries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use super::models::*;
use super::{query_failed, DatabaseError};
use crate::domain::entities::commission::{
    BankDetails, CommissionPayment, CommissionPaymentRequest, PaymentRequestStatus,
};

pub async fn insert_request(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    amount: Decimal,
    period: (DateTime<Utc>, DateTime<Utc>),
    requested_by: i64,
    bank: &BankDetails,
) -> Result<CommissionPaymentRequest, DatabaseError> {
    let record = sqlx::query_as::<_, PaymentRequestRecord>(
        r#"
        INSERT INTO commission_payment_requests (
            exchange_house_id, amount, period_start, period_end, status, requested_by,
            bank_name, account_holder, account_number, requested_at
        )
        VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9)
        RETURNING *
        "#,
    )
    .bind(exchange_house_id)
    .bind(amount.to_string())
    .bind(period.0)
    .bind(period.1)
    .bind(requested_by)
    .bind(&bank.bank_name)
    .bind(&bank.account_holder)
    .bind(&bank.account_number)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create payment request"))?;

    debug!(
        "Created payment request {} for house {}: {}",
        record.id, record.exchange_house_id, record.amount
    );
    record.try_into()
}

pub async fn find_request(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<CommissionPaymentRequest>, DatabaseError> {
    sqlx::query_as::<_, PaymentRequestRecord>(
        "SELECT * FROM commission_payment_requests WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("get payment request"))?
    .map(CommissionPaymentRequest::try_from)
    .transpose()
}

pub async fn list_requests(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
) -> Result<Vec<CommissionPaymentRequest>, DatabaseError> {
    let records = sqlx::query_as::<_, PaymentRequestRecord>(
        "SELECT * FROM commission_payment_requests WHERE exchange_house_id = ?1 ORDER BY id DESC",
    )
    .bind(exchange_house_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list payment requests"))?;

    decode_all(records)
}

pub async fn approve_request(
    conn: &mut SqliteConnection,
    id: i64,
    approved_by: i64,
) -> Result<Option<CommissionPaymentRequest>, DatabaseError> {
    sqlx::query_as::<_, PaymentRequestRecord>(
        r#"
        UPDATE commission_payment_requests
        SET status = 'approved', approved_by = ?1, approved_at = ?2
        WHERE id = ?3 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(approved_by)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("approve payment request"))?
    .map(CommissionPaymentRequest::try_from)
    .transpose()
}

pub async fn reject_request(
    conn: &mut SqliteConnection,
    id: i64,
    rejected_by: i64,
    reason: &str,
) -> Result<Option<CommissionPaymentRequest>, DatabaseError> {
    sqlx::query_as::<_, PaymentRequestRecord>(
        r#"
        UPDATE commission_payment_requests
        SET status = 'rejected', approved_by = ?1, approved_at = ?2, rejection_reason = ?3
        WHERE id = ?4 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(rejected_by)
    .bind(Utc::now())
    .bind(reason)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("reject payment request"))?
    .map(CommissionPaymentRequest::try_from)
    .transpose()
}

pub async fn mark_request_paid(
    conn: &mut SqliteConnection,
    id: i64,
    paid_by: i64,
    reference: Option<&str>,
    paid_at: DateTime<Utc>,
) -> Result<Option<CommissionPaymentRequest>, DatabaseError> {
    sqlx::query_as::<_, PaymentRequestRecord>(
        r#"
        UPDATE commission_payment_requests
        SET status = 'paid', paid_by = ?1, payment_reference = ?2, paid_at = ?3
        WHERE id = ?4 AND status = ?5
        RETURNING *
        "#,
    )
    .bind(paid_by)
    .bind(reference)
    .bind(paid_at)
    .bind(id)
    .bind(PaymentRequestStatus::Approved.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("mark payment request paid"))?
    .map(CommissionPaymentRequest::try_from)
    .transpose()
}

pub async fn insert_payment(
    conn: &mut SqliteConnection,
    request: &CommissionPaymentRequest,
    total_amount: Decimal,
    commission_count: i64,
    paid_at: DateTime<Utc>,
) -> Result<CommissionPayment, DatabaseError> {
    let record = sqlx::query_as::<_, CommissionPaymentRecord>(
        r#"
        INSERT INTO commission_payments (
            request_id, exchange_house_id, period_start, period_end,
            total_amount, commission_count, paid_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING *
        "#,
    )
    .bind(request.id)
    .bind(request.exchange_house_id)
    .bind(request.period_start)
    .bind(request.period_end)
    .bind(total_amount.to_string())
    .bind(commission_count)
    .bind(paid_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("record commission payment"))?;

    record.try_into()
}

pub async fn find_payment_for_request(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> Result<Option<CommissionPayment>, DatabaseError> {
    sqlx::query_as::<_, CommissionPaymentRecord>(
        "SELECT * FROM commission_payments WHERE request_id = ?1",
    )
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("get commission payment"))?
    .map(CommissionPayment::try_from)
    .transpose()
}
