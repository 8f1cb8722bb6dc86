//! Settings Provider Trait
//!
//! Platform-wide settings the engine depends on but does not own. The order
//! service reads the platform commission rate through this seam on every
//! request and hands it to the calculator as an explicit input, so the rate
//! never lives in global state.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Platform commission, in percent of the order's base amount
    async fn platform_commission_rate(&self) -> DomainResult<Decimal>;
}

/// Fixed rate, typically loaded from configuration at start-up
#[derive(Debug, Clone)]
pub struct StaticSettings {
    platform_commission_rate: Decimal,
}

impl StaticSettings {
    pub fn new(platform_commission_rate: Decimal) -> Self {
        Self {
            platform_commission_rate,
        }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn platform_commission_rate(&self) -> DomainResult<Decimal> {
        Ok(self.platform_commission_rate)
    }
}
