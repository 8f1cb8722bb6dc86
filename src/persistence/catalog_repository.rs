//! Catalog Repository
//!
//! Exchange houses, currency pairs, house pair configurations and payment
//! methods. Everything the order flow reads before it touches money.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use super::models::*;
use super::{query_failed, DatabaseError};
use crate::domain::entities::currency_pair::{CurrencyPair, ExchangeHouseCurrencyPairConfig};
use crate::domain::entities::exchange_house::ExchangeHouse;
use crate::domain::entities::payment_method::PaymentMethod;

pub async fn insert_exchange_house(
    conn: &mut SqliteConnection,
    house: &CreateExchangeHouse,
) -> Result<ExchangeHouse, DatabaseError> {
    let record = sqlx::query_as::<_, ExchangeHouseRecord>(
        r#"
        INSERT INTO exchange_houses (name, is_active, zero_commission_promo, promo_expires_at, created_at)
        VALUES (?1, 1, ?2, ?3, ?4)
        RETURNING *
        "#,
    )
    .bind(&house.name)
    .bind(house.zero_commission_promo)
    .bind(house.promo_expires_at)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create exchange house"))?;

    debug!("Created exchange house {} ({})", record.id, record.name);
    Ok(record.into())
}

pub async fn find_exchange_house(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<ExchangeHouse>, DatabaseError> {
    let record =
        sqlx::query_as::<_, ExchangeHouseRecord>("SELECT * FROM exchange_houses WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(query_failed("get exchange house"))?;

    Ok(record.map(ExchangeHouse::from))
}

pub async fn set_promo(
    conn: &mut SqliteConnection,
    id: i64,
    enabled: bool,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Option<ExchangeHouse>, DatabaseError> {
    let record = sqlx::query_as::<_, ExchangeHouseRecord>(
        r#"
        UPDATE exchange_houses
        SET zero_commission_promo = ?1, promo_expires_at = ?2
        WHERE id = ?3
        RETURNING *
        "#,
    )
    .bind(enabled)
    .bind(expires_at)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("update promotion"))?;

    Ok(record.map(ExchangeHouse::from))
}

pub async fn insert_currency_pair(
    conn: &mut SqliteConnection,
    pair: &CreateCurrencyPair,
) -> Result<CurrencyPair, DatabaseError> {
    let now = Utc::now();
    let record = sqlx::query_as::<_, CurrencyPairRecord>(
        r#"
        INSERT INTO currency_pairs (
            base_currency, quote_currency, base_rate, min_amount, max_amount,
            is_active, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
        RETURNING *
        "#,
    )
    .bind(&pair.base_currency)
    .bind(&pair.quote_currency)
    .bind(pair.base_rate.to_string())
    .bind(pair.min_amount.to_string())
    .bind(pair.max_amount.map(|v| v.to_string()))
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create currency pair"))?;

    debug!(
        "Created currency pair {} {}/{}",
        record.id, record.base_currency, record.quote_currency
    );
    record.try_into()
}

pub async fn find_currency_pair(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<CurrencyPair>, DatabaseError> {
    sqlx::query_as::<_, CurrencyPairRecord>("SELECT * FROM currency_pairs WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("get currency pair"))?
        .map(CurrencyPair::try_from)
        .transpose()
}

pub async fn update_pair_rate(
    conn: &mut SqliteConnection,
    id: i64,
    base_rate: Decimal,
) -> Result<Option<CurrencyPair>, DatabaseError> {
    sqlx::query_as::<_, CurrencyPairRecord>(
        "UPDATE currency_pairs SET base_rate = ?1, updated_at = ?2 WHERE id = ?3 RETURNING *",
    )
    .bind(base_rate.to_string())
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("update pair rate"))?
    .map(CurrencyPair::try_from)
    .transpose()
}

/// Live (not soft-deleted) configuration of a pair for a house, active or not
pub async fn find_live_config(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    currency_pair_id: i64,
) -> Result<Option<ExchangeHouseCurrencyPairConfig>, DatabaseError> {
    sqlx::query_as::<_, PairConfigRecord>(
        r#"
        SELECT * FROM exchange_house_currency_pairs
        WHERE exchange_house_id = ?1 AND currency_pair_id = ?2 AND deleted_at IS NULL
        "#,
    )
    .bind(exchange_house_id)
    .bind(currency_pair_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_failed("get pair configuration"))?
    .map(ExchangeHouseCurrencyPairConfig::try_from)
    .transpose()
}

pub async fn list_configs(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    include_deleted: bool,
) -> Result<Vec<ExchangeHouseCurrencyPairConfig>, DatabaseError> {
    let records = sqlx::query_as::<_, PairConfigRecord>(
        r#"
        SELECT * FROM exchange_house_currency_pairs
        WHERE exchange_house_id = ?1 AND (?2 OR deleted_at IS NULL)
        ORDER BY currency_pair_id, id
        "#,
    )
    .bind(exchange_house_id)
    .bind(include_deleted)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list pair configurations"))?;

    decode_all(records)
}

pub async fn insert_config(
    conn: &mut SqliteConnection,
    config: &ConfigurePair,
) -> Result<ExchangeHouseCurrencyPairConfig, DatabaseError> {
    let (model, percent, buy_rate, sell_rate) = policy_columns(&config.policy);
    let now = Utc::now();

    let record = sqlx::query_as::<_, PairConfigRecord>(
        r#"
        INSERT INTO exchange_house_currency_pairs (
            exchange_house_id, currency_pair_id, commission_model, commission_percent,
            buy_rate, sell_rate, min_amount, max_amount, is_active, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        RETURNING *
        "#,
    )
    .bind(config.exchange_house_id)
    .bind(config.currency_pair_id)
    .bind(model)
    .bind(percent)
    .bind(buy_rate)
    .bind(sell_rate)
    .bind(config.min_amount.to_string())
    .bind(config.max_amount.map(|v| v.to_string()))
    .bind(config.is_active)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create pair configuration"))?;

    record.try_into()
}

pub async fn update_config(
    conn: &mut SqliteConnection,
    id: i64,
    config: &ConfigurePair,
) -> Result<ExchangeHouseCurrencyPairConfig, DatabaseError> {
    let (model, percent, buy_rate, sell_rate) = policy_columns(&config.policy);

    let record = sqlx::query_as::<_, PairConfigRecord>(
        r#"
        UPDATE exchange_house_currency_pairs
        SET commission_model = ?1, commission_percent = ?2, buy_rate = ?3, sell_rate = ?4,
            min_amount = ?5, max_amount = ?6, is_active = ?7, updated_at = ?8
        WHERE id = ?9 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(model)
    .bind(percent)
    .bind(buy_rate)
    .bind(sell_rate)
    .bind(config.min_amount.to_string())
    .bind(config.max_amount.map(|v| v.to_string()))
    .bind(config.is_active)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("update pair configuration"))?;

    record.try_into()
}

/// Detach a configuration, keeping the row for history
pub async fn soft_delete_config(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    currency_pair_id: i64,
) -> Result<bool, DatabaseError> {
    let now = Utc::now();
    let rows_affected = sqlx::query(
        r#"
        UPDATE exchange_house_currency_pairs
        SET deleted_at = ?1, is_active = 0, updated_at = ?1
        WHERE exchange_house_id = ?2 AND currency_pair_id = ?3 AND deleted_at IS NULL
        "#,
    )
    .bind(now)
    .bind(exchange_house_id)
    .bind(currency_pair_id)
    .execute(&mut *conn)
    .await
    .map_err(query_failed("detach pair configuration"))?
    .rows_affected();

    Ok(rows_affected > 0)
}

pub async fn insert_payment_method(
    conn: &mut SqliteConnection,
    method: &CreatePaymentMethod,
) -> Result<PaymentMethod, DatabaseError> {
    let record = sqlx::query_as::<_, PaymentMethodRecord>(
        r#"
        INSERT INTO payment_methods (
            exchange_house_id, name, method_type, currency, is_active, is_default,
            min_amount, max_amount, daily_limit, created_at
        )
        VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, ?8, ?9)
        RETURNING *
        "#,
    )
    .bind(method.exchange_house_id)
    .bind(&method.name)
    .bind(method.method_type.as_str())
    .bind(&method.currency)
    .bind(method.is_default)
    .bind(method.min_amount.map(|v| v.to_string()))
    .bind(method.max_amount.map(|v| v.to_string()))
    .bind(method.daily_limit.map(|v| v.to_string()))
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(query_failed("create payment method"))?;

    debug!(
        "Created payment method {} ({}, {})",
        record.id, record.name, record.currency
    );
    record.try_into()
}

pub async fn find_payment_method(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<PaymentMethod>, DatabaseError> {
    sqlx::query_as::<_, PaymentMethodRecord>("SELECT * FROM payment_methods WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("get payment method"))?
        .map(PaymentMethod::try_from)
        .transpose()
}

pub async fn set_payment_method_active(
    conn: &mut SqliteConnection,
    id: i64,
    is_active: bool,
) -> Result<bool, DatabaseError> {
    let rows_affected = sqlx::query("UPDATE payment_methods SET is_active = ?1 WHERE id = ?2")
        .bind(is_active)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(query_failed("update payment method"))?
        .rows_affected();

    Ok(rows_affected > 0)
}

/// Active house methods in `currency`, default method first, then oldest first
pub async fn list_active_methods(
    conn: &mut SqliteConnection,
    exchange_house_id: i64,
    currency: &str,
) -> Result<Vec<PaymentMethod>, DatabaseError> {
    sqlx::query_as::<_, PaymentMethodRecord>(
        r#"
        SELECT * FROM payment_methods
        WHERE exchange_house_id = ?1 AND currency = ?2 AND is_active = 1
        ORDER BY is_default DESC, id ASC
        "#,
    )
    .bind(exchange_house_id)
    .bind(currency)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_failed("list payment methods"))?
    .into_iter()
    .map(PaymentMethod::try_from)
    .collect()
}
