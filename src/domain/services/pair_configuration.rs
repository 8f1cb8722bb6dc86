//! Pair Configuration - admin operations on the catalog
//!
//! Exchange houses, platform currency pairs, the per-house commission
//! configuration attached to a pair, and payment methods. Detaching a pair
//! soft-deletes its configuration so past orders keep their history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::entities::currency_pair::{
    validate_house_limits, CommissionPolicy, CurrencyPair, ExchangeHouseCurrencyPairConfig,
};
use crate::domain::entities::customer::Customer;
use crate::domain::entities::exchange_house::ExchangeHouse;
use crate::domain::entities::payment_method::PaymentMethod;
use crate::domain::errors::{DomainError, DomainResult, ValidationError};
use crate::domain::value_objects::amount::Amount;
use crate::domain::value_objects::rate::Rate;
use crate::persistence::models::{
    ConfigurePair, CreateCurrencyPair, CreateCustomer, CreateExchangeHouse, CreatePaymentMethod,
};
use crate::persistence::{catalog_repository, customer_repository, DbPool};

/// House-level settings for one pair
#[derive(Debug, Clone)]
pub struct PairSettings {
    pub policy: CommissionPolicy,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
}

pub struct PairConfigurationService {
    pool: DbPool,
}

impl PairConfigurationService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_exchange_house(&self, name: &str) -> DomainResult<ExchangeHouse> {
        if name.trim().is_empty() {
            return Err(DomainError::InvalidInput("exchange house name is empty".to_string()));
        }
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let house = catalog_repository::insert_exchange_house(
            &mut conn,
            &CreateExchangeHouse {
                name: name.trim().to_string(),
                zero_commission_promo: false,
                promo_expires_at: None,
            },
        )
        .await?;
        info!("Exchange house {} created: {}", house.id, house.name);
        Ok(house)
    }

    /// Turn the zero-commission promotion on or off
    pub async fn set_promo(
        &self,
        exchange_house_id: i64,
        enabled: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<ExchangeHouse> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let house = catalog_repository::set_promo(&mut conn, exchange_house_id, enabled, expires_at)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "exchange house",
                id: exchange_house_id,
            })?;
        info!(
            "Zero-commission promotion for house {} {} (expires {:?})",
            house.id,
            if enabled { "enabled" } else { "disabled" },
            expires_at
        );
        Ok(house)
    }

    pub async fn create_currency_pair(
        &self,
        base_currency: &str,
        quote_currency: &str,
        base_rate: Decimal,
        min_amount: Decimal,
        max_amount: Option<Decimal>,
    ) -> DomainResult<CurrencyPair> {
        let base_currency = currency_code(base_currency)?;
        let quote_currency = currency_code(quote_currency)?;
        if base_currency == quote_currency {
            return Err(DomainError::InvalidInput(format!(
                "pair needs two different currencies, got {} twice",
                base_currency
            )));
        }
        let base_rate = Rate::new(base_rate)?;
        let min_amount = Amount::new(min_amount)?;
        if let Some(max) = max_amount {
            if max < min_amount.value() {
                return Err(ValidationError::InvalidAmount(format!(
                    "maximum {} is below minimum {}",
                    max, min_amount
                ))
                .into());
            }
        }

        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let pair = catalog_repository::insert_currency_pair(
            &mut conn,
            &CreateCurrencyPair {
                base_currency,
                quote_currency,
                base_rate: base_rate.value(),
                min_amount: min_amount.value(),
                max_amount,
            },
        )
        .await?;
        info!("Currency pair {} created: {} at {}", pair.id, pair.symbol(), pair.base_rate);
        Ok(pair)
    }

    /// Move the platform reference rate; the only routine change to a pair
    pub async fn update_rate(
        &self,
        currency_pair_id: i64,
        base_rate: Decimal,
    ) -> DomainResult<CurrencyPair> {
        let rate = Rate::new(base_rate)?;
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let pair = catalog_repository::update_pair_rate(&mut conn, currency_pair_id, rate.value())
            .await?
            .ok_or(DomainError::NotFound {
                entity: "currency pair",
                id: currency_pair_id,
            })?;
        info!("Rate of {} set to {}", pair.symbol(), pair.base_rate);
        Ok(pair)
    }

    /// Attach a pair to a house, or update the live configuration if one exists
    pub async fn configure_pair(
        &self,
        exchange_house_id: i64,
        currency_pair_id: i64,
        settings: PairSettings,
    ) -> DomainResult<ExchangeHouseCurrencyPairConfig> {
        settings.policy.validate()?;

        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;

        catalog_repository::find_exchange_house(&mut tx, exchange_house_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "exchange house",
                id: exchange_house_id,
            })?;
        let pair = catalog_repository::find_currency_pair(&mut tx, currency_pair_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "currency pair",
                id: currency_pair_id,
            })?;
        validate_house_limits(&pair, settings.min_amount, settings.max_amount)?;

        let request = ConfigurePair {
            exchange_house_id,
            currency_pair_id,
            policy: settings.policy,
            min_amount: settings.min_amount,
            max_amount: settings.max_amount,
            is_active: settings.is_active,
        };
        let live =
            catalog_repository::find_live_config(&mut tx, exchange_house_id, currency_pair_id)
                .await?;
        let config = match live {
            Some(existing) => {
                catalog_repository::update_config(&mut tx, existing.id, &request).await?
            }
            None => catalog_repository::insert_config(&mut tx, &request).await?,
        };

        tx.commit().await.map_err(DomainError::from)?;
        info!(
            "House {} configured {} with {} model",
            exchange_house_id,
            pair.symbol(),
            config.policy.model()
        );
        Ok(config)
    }

    /// Soft-delete the live configuration of a pair
    pub async fn detach_pair(
        &self,
        exchange_house_id: i64,
        currency_pair_id: i64,
    ) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let detached =
            catalog_repository::soft_delete_config(&mut conn, exchange_house_id, currency_pair_id)
                .await?;
        if !detached {
            return Err(DomainError::PairNotConfigured {
                exchange_house_id,
                currency_pair_id,
            });
        }
        info!("House {} detached pair {}", exchange_house_id, currency_pair_id);
        Ok(())
    }

    pub async fn configurations(
        &self,
        exchange_house_id: i64,
        include_detached: bool,
    ) -> DomainResult<Vec<ExchangeHouseCurrencyPairConfig>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(catalog_repository::list_configs(&mut conn, exchange_house_id, include_detached).await?)
    }

    pub async fn create_payment_method(
        &self,
        method: CreatePaymentMethod,
    ) -> DomainResult<PaymentMethod> {
        if method.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("payment method name is empty".to_string()));
        }
        let method = CreatePaymentMethod {
            currency: currency_code(&method.currency)?,
            ..method
        };
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(catalog_repository::insert_payment_method(&mut conn, &method).await?)
    }

    pub async fn set_payment_method_active(
        &self,
        method_id: i64,
        is_active: bool,
    ) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        if !catalog_repository::set_payment_method_active(&mut conn, method_id, is_active).await? {
            return Err(DomainError::NotFound {
                entity: "payment method",
                id: method_id,
            });
        }
        Ok(())
    }

    /// Register a customer of a house
    pub async fn create_customer(
        &self,
        exchange_house_id: i64,
        name: &str,
    ) -> DomainResult<Customer> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(customer_repository::insert_customer(
            &mut conn,
            &CreateCustomer {
                exchange_house_id,
                name: name.trim().to_string(),
            },
        )
        .await?)
    }
}

/// Three-letter ISO style code, upper-cased
fn currency_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidCurrency(raw.to_string()));
    }
    Ok(code)
}
