use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    BankTransfer,
    MobilePayment,
    Cash,
    Crypto,
    Card,
    Other,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodType::BankTransfer => "bank_transfer",
            PaymentMethodType::MobilePayment => "mobile_payment",
            PaymentMethodType::Cash => "cash",
            PaymentMethodType::Crypto => "crypto",
            PaymentMethodType::Card => "card",
            PaymentMethodType::Other => "other",
        }
    }
}

impl std::str::FromStr for PaymentMethodType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PaymentMethodType::BankTransfer),
            "mobile_payment" => Ok(PaymentMethodType::MobilePayment),
            "cash" => Ok(PaymentMethodType::Cash),
            "crypto" => Ok(PaymentMethodType::Crypto),
            "card" => Ok(PaymentMethodType::Card),
            "other" => Ok(PaymentMethodType::Other),
            other => Err(ValidationError::UnknownValue(format!("payment method type '{}'", other))),
        }
    }
}

/// Cash instrument owned by an exchange house (a bank account, a wallet, a till)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    pub exchange_house_id: i64,
    pub name: String,
    pub method_type: PaymentMethodType,
    pub currency: String,
    pub is_active: bool,
    pub is_default: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}
