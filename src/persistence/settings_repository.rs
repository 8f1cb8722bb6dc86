//! Settings Repository
//!
//! Key/value platform settings. `SqliteSettings` reads the platform commission
//! rate from the `settings` table and falls back to the configured default.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::str::FromStr;
use tracing::warn;

use super::{query_failed, DatabaseError, DbPool};
use crate::domain::errors::DomainResult;
use crate::domain::repositories::settings_provider::SettingsProvider;
use crate::domain::value_objects::rate::Percent;

pub const PLATFORM_COMMISSION_RATE: &str = "platform_commission_rate";

pub async fn get_setting(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<String>, DatabaseError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("read setting"))?;

    Ok(row.map(|(value,)| value))
}

pub async fn put_setting(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(query_failed("write setting"))?;

    Ok(())
}

/// Settings stored in the database, with a configured fallback rate
#[derive(Debug, Clone)]
pub struct SqliteSettings {
    pool: DbPool,
    default_rate: Decimal,
}

impl SqliteSettings {
    pub fn new(pool: DbPool, default_rate: Decimal) -> Self {
        Self { pool, default_rate }
    }

    pub async fn set_platform_commission_rate(&self, rate: Decimal) -> DomainResult<()> {
        let rate = Percent::new(rate)?;
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        put_setting(&mut conn, PLATFORM_COMMISSION_RATE, &rate.value().to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsProvider for SqliteSettings {
    async fn platform_commission_rate(&self) -> DomainResult<Decimal> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        let stored = get_setting(&mut conn, PLATFORM_COMMISSION_RATE).await?;

        match stored.as_deref().map(Decimal::from_str) {
            Some(Ok(rate)) => Ok(rate),
            Some(Err(e)) => {
                warn!(
                    "Invalid {} setting ({}), using default {}",
                    PLATFORM_COMMISSION_RATE, e, self.default_rate
                );
                Ok(self.default_rate)
            }
            None => Ok(self.default_rate),
        }
    }
}
