use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::currency_pair::CommissionPolicy;
use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Pending, OrderStatus::Processing) => true,
            (
                OrderStatus::Pending | OrderStatus::Processing,
                OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed,
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(ValidationError::UnknownValue(format!("order status '{}'", other))),
        }
    }
}

/// Trade economics of one order under one commission model.
///
/// `spread_profit` is in quote currency; every other profit figure is in
/// base currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderEconomics {
    pub quote_amount: Decimal,
    pub applied_rate: Decimal,
    pub house_commission_percent: Option<Decimal>,
    pub house_commission_amount: Decimal,
    pub spread_profit: Decimal,
    pub spread_profit_base: Decimal,
    pub total_profit: Decimal,
    pub platform_commission_rate: Decimal,
    pub platform_commission: Decimal,
    /// House net profit after the platform's share
    pub exchange_commission: Decimal,
    pub margin_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub exchange_house_id: i64,
    pub currency_pair_id: i64,
    pub operator_id: i64,
    pub customer_id: Option<i64>,
    pub inbound_payment_method_id: i64,
    pub outbound_payment_method_id: i64,
    pub base_currency: String,
    pub quote_currency: String,
    pub base_amount: Decimal,
    /// Pair's platform rate at creation time
    pub market_rate: Decimal,
    /// Executed rate reported at completion
    pub actual_rate: Option<Decimal>,
    /// Snapshot of the house policy when the order was created
    pub policy: CommissionPolicy,
    pub economics: OrderEconomics,
    pub expected_margin_percent: Decimal,
    pub actual_margin_percent: Option<Decimal>,
    /// Quote amount held on the outbound balance while the order is open
    pub reserved_amount: Decimal,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn quote_amount(&self) -> Decimal {
        self.economics.quote_amount
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_transitions() {
        let pending = OrderStatus::Pending;
        assert!(pending.can_transition_to(OrderStatus::Processing));
        assert!(pending.can_transition_to(OrderStatus::Completed));
        assert!(pending.can_transition_to(OrderStatus::Cancelled));
        assert!(pending.can_transition_to(OrderStatus::Failed));
        assert!(!pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_terminal_states_never_move() {
        for from in [
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            for to in [
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Completed,
                OrderStatus::Cancelled,
                OrderStatus::Failed,
            ] {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_processing_cannot_go_back_to_pending() {
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("completed".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert!("done".parse::<OrderStatus>().is_err());
    }
}
