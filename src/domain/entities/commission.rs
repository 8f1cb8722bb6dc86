//! Per-order commission rows and the payout records built from them

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Beneficiary {
    Platform,
    ExchangeHouse,
}

impl Beneficiary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Beneficiary::Platform => "platform",
            Beneficiary::ExchangeHouse => "exchange_house",
        }
    }
}

impl std::str::FromStr for Beneficiary {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform" => Ok(Beneficiary::Platform),
            "exchange_house" => Ok(Beneficiary::ExchangeHouse),
            other => Err(ValidationError::UnknownValue(format!("beneficiary '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for CommissionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "paid" => Ok(CommissionStatus::Paid),
            other => Err(ValidationError::UnknownValue(format!("commission status '{}'", other))),
        }
    }
}

/// One beneficiary's share of one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: i64,
    pub order_id: i64,
    pub exchange_house_id: i64,
    pub beneficiary: Beneficiary,
    pub rate_percent: Decimal,
    pub amount: Decimal,
    pub base_amount: Decimal,
    pub status: CommissionStatus,
    /// Open or paid payout request covering this row
    pub payment_request_id: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl PaymentRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRequestStatus::Pending => "pending",
            PaymentRequestStatus::Approved => "approved",
            PaymentRequestStatus::Rejected => "rejected",
            PaymentRequestStatus::Paid => "paid",
        }
    }

    /// pending -> approved | rejected, approved -> paid
    pub fn can_transition_to(&self, next: PaymentRequestStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentRequestStatus::Pending,
                PaymentRequestStatus::Approved | PaymentRequestStatus::Rejected
            ) | (PaymentRequestStatus::Approved, PaymentRequestStatus::Paid)
        )
    }

    /// Requests still holding part of the accrued balance
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentRequestStatus::Pending | PaymentRequestStatus::Approved
        )
    }
}

impl std::fmt::Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentRequestStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRequestStatus::Pending),
            "approved" => Ok(PaymentRequestStatus::Approved),
            "rejected" => Ok(PaymentRequestStatus::Rejected),
            "paid" => Ok(PaymentRequestStatus::Paid),
            other => Err(ValidationError::UnknownValue(format!("request status '{}'", other))),
        }
    }
}

/// Bank details the platform should use to settle a payout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub account_number: Option<String>,
}

/// Request to settle a period's platform-owed commissions for one house
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionPaymentRequest {
    pub id: i64,
    pub exchange_house_id: i64,
    pub amount: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: PaymentRequestStatus,
    pub requested_by: i64,
    pub approved_by: Option<i64>,
    pub paid_by: Option<i64>,
    pub rejection_reason: Option<String>,
    pub bank_details: BankDetails,
    pub payment_reference: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Settled payout summary written when a request is paid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionPayment {
    pub id: i64,
    pub request_id: i64,
    pub exchange_house_id: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_amount: Decimal,
    pub commission_count: i64,
    pub paid_at: DateTime<Utc>,
}
