use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Exchange rate: units of quote currency per unit of base currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::InvalidRate(format!(
                "{} must be greater than zero",
                value
            )));
        }
        Ok(Rate(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// Percentage in the 0..=100 range (commission rates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::MustBeNonNegative);
        }
        if value > Decimal::ONE_HUNDRED {
            return Err(ValidationError::InvalidRate(format!(
                "{}% exceeds 100%",
                value
            )));
        }
        Ok(Percent(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}
