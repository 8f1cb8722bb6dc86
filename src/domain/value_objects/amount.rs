use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Non-negative monetary amount in a single currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::MustBeNonNegative);
        }
        Ok(Amount(value))
    }

    /// Amount that must be strictly greater than zero (order sizes, movements)
    pub fn positive(value: Decimal) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(format!(
                "{} must be greater than zero",
                value
            )));
        }
        Ok(Amount(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_new_valid() {
        let amount = Amount::new(dec!(100.25));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), dec!(100.25));
    }

    #[test]
    fn test_amount_new_negative() {
        let amount = Amount::new(dec!(-5));
        assert_eq!(amount.unwrap_err(), ValidationError::MustBeNonNegative);
    }

    #[test]
    fn test_amount_new_zero() {
        let amount = Amount::new(Decimal::ZERO).unwrap();
        assert_eq!(amount.value(), Decimal::ZERO);
    }

    #[test]
    fn test_amount_positive_rejects_zero() {
        assert!(Amount::positive(Decimal::ZERO).is_err());
        assert!(Amount::positive(dec!(0.01)).is_ok());
    }
}
