//! Currency pairs and the per-exchange-house configuration attached to them

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::amount::Amount;
use crate::domain::value_objects::rate::{Percent, Rate};

/// Platform-wide currency pair. Identity (base, quote) never changes once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub id: i64,
    pub base_currency: String,
    pub quote_currency: String,
    /// Platform-wide reference rate, quote units per base unit
    pub base_rate: Decimal,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CurrencyPair {
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base_currency, self.quote_currency)
    }
}

/// Commission model chosen by an exchange house for one pair.
///
/// Each variant only carries the parameters its model uses, so a spread
/// configuration without a buy rate cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CommissionPolicy {
    Percentage {
        percent: Decimal,
    },
    Spread {
        buy_rate: Decimal,
        sell_rate: Decimal,
    },
    Mixed {
        percent: Decimal,
        buy_rate: Decimal,
        sell_rate: Decimal,
    },
}

impl CommissionPolicy {
    pub fn model(&self) -> CommissionModel {
        match self {
            CommissionPolicy::Percentage { .. } => CommissionModel::Percentage,
            CommissionPolicy::Spread { .. } => CommissionModel::Spread,
            CommissionPolicy::Mixed { .. } => CommissionModel::Mixed,
        }
    }

    pub fn percent(&self) -> Option<Decimal> {
        match self {
            CommissionPolicy::Percentage { percent } | CommissionPolicy::Mixed { percent, .. } => {
                Some(*percent)
            }
            CommissionPolicy::Spread { .. } => None,
        }
    }

    pub fn buy_rate(&self) -> Option<Decimal> {
        match self {
            CommissionPolicy::Spread { buy_rate, .. }
            | CommissionPolicy::Mixed { buy_rate, .. } => Some(*buy_rate),
            CommissionPolicy::Percentage { .. } => None,
        }
    }

    pub fn sell_rate(&self) -> Option<Decimal> {
        match self {
            CommissionPolicy::Spread { sell_rate, .. }
            | CommissionPolicy::Mixed { sell_rate, .. } => Some(*sell_rate),
            CommissionPolicy::Percentage { .. } => None,
        }
    }

    /// Rebuild a policy from its flat persisted form
    pub fn from_parts(
        model: CommissionModel,
        percent: Option<Decimal>,
        buy_rate: Option<Decimal>,
        sell_rate: Option<Decimal>,
    ) -> Result<Self, ValidationError> {
        let missing = |field: &str| {
            ValidationError::InvalidRate(format!("{} model requires {}", model, field))
        };

        let policy = match model {
            CommissionModel::Percentage => CommissionPolicy::Percentage {
                percent: percent.ok_or_else(|| missing("commission_percent"))?,
            },
            CommissionModel::Spread => CommissionPolicy::Spread {
                buy_rate: buy_rate.ok_or_else(|| missing("buy_rate"))?,
                sell_rate: sell_rate.ok_or_else(|| missing("sell_rate"))?,
            },
            CommissionModel::Mixed => CommissionPolicy::Mixed {
                percent: percent.ok_or_else(|| missing("commission_percent"))?,
                buy_rate: buy_rate.ok_or_else(|| missing("buy_rate"))?,
                sell_rate: sell_rate.ok_or_else(|| missing("sell_rate"))?,
            },
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(percent) = self.percent() {
            Percent::new(percent)?;
        }
        if let (Some(buy), Some(sell)) = (self.buy_rate(), self.sell_rate()) {
            Rate::new(buy)?;
            Rate::new(sell)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionModel {
    Percentage,
    Spread,
    Mixed,
}

impl CommissionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionModel::Percentage => "percentage",
            CommissionModel::Spread => "spread",
            CommissionModel::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for CommissionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommissionModel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(CommissionModel::Percentage),
            "spread" => Ok(CommissionModel::Spread),
            "mixed" => Ok(CommissionModel::Mixed),
            other => Err(ValidationError::UnknownValue(format!("commission model '{}'", other))),
        }
    }
}

/// Exchange-house override of a platform currency pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeHouseCurrencyPairConfig {
    pub id: i64,
    pub exchange_house_id: i64,
    pub currency_pair_id: i64,
    pub policy: CommissionPolicy,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeHouseCurrencyPairConfig {
    pub fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// Inclusive trade limits for one house/pair combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountLimits {
    pub min: Decimal,
    pub max: Option<Decimal>,
}

impl AmountLimits {
    /// Tightest limits satisfying both the pair's global range and the house override
    pub fn effective(pair: &CurrencyPair, config: &ExchangeHouseCurrencyPairConfig) -> Self {
        let min = pair.min_amount.max(config.min_amount);
        let max = match (pair.max_amount, config.max_amount) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        AmountLimits { min, max }
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && self.max.map_or(true, |max| amount <= max)
    }
}

/// Check that house limits lie inside the pair's global limits
pub fn validate_house_limits(
    pair: &CurrencyPair,
    min_amount: Decimal,
    max_amount: Option<Decimal>,
) -> Result<(), ValidationError> {
    Amount::new(min_amount)?;
    if min_amount < pair.min_amount {
        return Err(ValidationError::InvalidAmount(format!(
            "house minimum {} is below pair minimum {}",
            min_amount, pair.min_amount
        )));
    }
    if let Some(max) = max_amount {
        if max < min_amount {
            return Err(ValidationError::InvalidAmount(format!(
                "house maximum {} is below house minimum {}",
                max, min_amount
            )));
        }
        if let Some(pair_max) = pair.max_amount {
            if max > pair_max {
                return Err(ValidationError::InvalidAmount(format!(
                    "house maximum {} exceeds pair maximum {}",
                    max, pair_max
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(min: Decimal, max: Option<Decimal>) -> CurrencyPair {
        let now = Utc::now();
        CurrencyPair {
            id: 1,
            base_currency: "USD".to_string(),
            quote_currency: "HTG".to_string(),
            base_rate: dec!(132.5),
            min_amount: min,
            max_amount: max,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn config(min: Decimal, max: Option<Decimal>) -> ExchangeHouseCurrencyPairConfig {
        let now = Utc::now();
        ExchangeHouseCurrencyPairConfig {
            id: 1,
            exchange_house_id: 1,
            currency_pair_id: 1,
            policy: CommissionPolicy::Percentage { percent: dec!(2) },
            min_amount: min,
            max_amount: max,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_policy_from_parts_spread_requires_rates() {
        let result =
            CommissionPolicy::from_parts(CommissionModel::Spread, None, Some(dec!(290)), None);
        assert!(result.is_err());

        let policy = CommissionPolicy::from_parts(
            CommissionModel::Spread,
            None,
            Some(dec!(290)),
            Some(dec!(298)),
        )
        .unwrap();
        assert_eq!(policy.model(), CommissionModel::Spread);
        assert_eq!(policy.percent(), None);
    }

    #[test]
    fn test_policy_from_parts_ignores_unused_columns() {
        let policy = CommissionPolicy::from_parts(
            CommissionModel::Percentage,
            Some(dec!(5)),
            Some(dec!(290)),
            Some(dec!(298)),
        )
        .unwrap();
        assert_eq!(policy, CommissionPolicy::Percentage { percent: dec!(5) });
    }

    #[test]
    fn test_policy_rejects_non_positive_rates() {
        let policy = CommissionPolicy::Mixed {
            percent: dec!(1),
            buy_rate: dec!(0),
            sell_rate: dec!(10),
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_percent_must_be_a_percentage() {
        let over = CommissionPolicy::Percentage { percent: dec!(100.5) };
        assert!(matches!(over.validate(), Err(ValidationError::InvalidRate(_))));

        let negative = CommissionPolicy::Mixed {
            percent: dec!(-1),
            buy_rate: dec!(290),
            sell_rate: dec!(298),
        };
        assert_eq!(negative.validate(), Err(ValidationError::MustBeNonNegative));

        for percent in [Decimal::ZERO, dec!(100)] {
            assert!(CommissionPolicy::Percentage { percent }.validate().is_ok());
        }
    }

    #[test]
    fn test_commission_model_round_trips_through_str() {
        for model in [
            CommissionModel::Percentage,
            CommissionModel::Spread,
            CommissionModel::Mixed,
        ] {
            assert_eq!(model.as_str().parse::<CommissionModel>().unwrap(), model);
        }
        assert!("flat".parse::<CommissionModel>().is_err());
    }

    #[test]
    fn test_house_limits_inside_pair_limits() {
        let p = pair(dec!(10), Some(dec!(10000)));
        assert!(validate_house_limits(&p, dec!(10), Some(dec!(10000))).is_ok());
        assert!(validate_house_limits(&p, dec!(50), None).is_ok());
        assert!(validate_house_limits(&p, dec!(5), None).is_err());
        assert!(validate_house_limits(&p, dec!(10), Some(dec!(20000))).is_err());
        assert!(validate_house_limits(&p, dec!(100), Some(dec!(50))).is_err());
    }

    #[test]
    fn test_effective_limits_take_tightest_bounds() {
        let p = pair(dec!(10), Some(dec!(10000)));
        let c = config(dec!(50), Some(dec!(5000)));
        let limits = AmountLimits::effective(&p, &c);
        assert_eq!(limits.min, dec!(50));
        assert_eq!(limits.max, Some(dec!(5000)));

        let unbounded = AmountLimits::effective(&pair(dec!(1), None), &config(dec!(1), None));
        assert_eq!(unbounded.max, None);
        assert!(unbounded.contains(dec!(1000000)));
    }

    #[test]
    fn test_limits_are_inclusive() {
        let limits = AmountLimits {
            min: dec!(100),
            max: Some(dec!(1000)),
        };
        assert!(limits.contains(dec!(100)));
        assert!(limits.contains(dec!(1000)));
        assert!(!limits.contains(dec!(99)));
        assert!(!limits.contains(dec!(1001)));
    }

    #[test]
    fn test_soft_deleted_config_is_not_usable() {
        let mut c = config(dec!(1), None);
        assert!(c.is_usable());
        c.deleted_at = Some(Utc::now());
        assert!(!c.is_usable());
    }
}
