use rust_decimal::Decimal;

use crate::domain::services::commission_calculator::CommissionCalculator;
use crate::domain::value_objects::rate::Percent;
use crate::persistence::DatabaseConfig;

const DEFAULT_PLATFORM_COMMISSION_RATE: Decimal = Decimal::ONE;
const DEFAULT_MONEY_SCALE: u32 = 8;

/// Engine configuration, loaded from the environment at start-up
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Platform commission in percent of the base amount; the settings table takes precedence
    pub platform_commission_rate: Decimal,
    /// Decimal places kept on derived money
    pub money_scale: u32,
    pub database: DatabaseConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            platform_commission_rate: DEFAULT_PLATFORM_COMMISSION_RATE,
            money_scale: DEFAULT_MONEY_SCALE,
            database: DatabaseConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> EngineConfig {
        let mut config = Self::from_vars(|key| std::env::var(key).ok());
        config.database = DatabaseConfig::from_env();
        config
    }

    /// Calculator rounding derived money to `money_scale` places
    pub fn calculator(&self) -> CommissionCalculator {
        CommissionCalculator::new(self.money_scale)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> EngineConfig {
        let mut config = EngineConfig::default();

        if let Some(rate) = var("PLATFORM_COMMISSION_RATE") {
            match rate.trim().parse::<Decimal>() {
                Ok(value) => match Percent::new(value) {
                    Ok(percent) => config.platform_commission_rate = percent.value(),
                    Err(e) => {
                        tracing::warn!(
                            "Invalid PLATFORM_COMMISSION_RATE value: {} ({}), using default: {}",
                            value,
                            e,
                            config.platform_commission_rate
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse PLATFORM_COMMISSION_RATE '{}': {}, using default: {}",
                        rate,
                        e,
                        config.platform_commission_rate
                    );
                }
            }
        }

        if let Some(scale) = var("MONEY_SCALE") {
            match scale.trim().parse::<u32>() {
                Ok(value) if (2..=12).contains(&value) => {
                    config.money_scale = value;
                }
                _ => {
                    tracing::warn!(
                        "Invalid MONEY_SCALE '{}' (must be between 2 and 12), using default: {}",
                        scale,
                        config.money_scale
                    );
                }
            }
        }

        config
    }
}
