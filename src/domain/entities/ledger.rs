//! Ledger entities - operator cash balances and the append-only movement log

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Unique key of an operator cash balance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub operator_id: i64,
    pub payment_method_id: i64,
    pub currency: String,
}

impl BalanceKey {
    pub fn new(operator_id: i64, payment_method_id: i64, currency: impl Into<String>) -> Self {
        Self {
            operator_id,
            payment_method_id,
            currency: currency.into(),
        }
    }
}

impl std::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operator {} / method {} / {}",
            self.operator_id, self.payment_method_id, self.currency
        )
    }
}

/// Cash an operator holds on one payment method in one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorCashBalance {
    pub id: i64,
    pub operator_id: i64,
    pub payment_method_id: i64,
    pub currency: String,
    /// Recorded cash; only changed together with a `CashMovement`
    pub balance: Decimal,
    /// Portion of `balance` promised to pending orders
    pub reserved: Decimal,
    /// Optimistic concurrency token, bumped on every write
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl OperatorCashBalance {
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.operator_id, self.payment_method_id, self.currency.clone())
    }

    /// Balance not yet promised to a pending order
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Deposit,
    Withdrawal,
    OrderIn,
    OrderOut,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Deposit => "deposit",
            MovementType::Withdrawal => "withdrawal",
            MovementType::OrderIn => "order_in",
            MovementType::OrderOut => "order_out",
            MovementType::Adjustment => "adjustment",
        }
    }

    /// Whether this type may increase a balance
    pub fn is_inflow(&self) -> bool {
        matches!(
            self,
            MovementType::Deposit | MovementType::OrderIn | MovementType::Adjustment
        )
    }

    /// Whether this type may decrease a balance
    pub fn is_outflow(&self) -> bool {
        matches!(
            self,
            MovementType::Withdrawal | MovementType::OrderOut | MovementType::Adjustment
        )
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(MovementType::Deposit),
            "withdrawal" => Ok(MovementType::Withdrawal),
            "order_in" => Ok(MovementType::OrderIn),
            "order_out" => Ok(MovementType::OrderOut),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(ValidationError::UnknownValue(format!("movement type '{}'", other))),
        }
    }
}

/// Immutable ledger entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashMovement {
    pub id: i64,
    pub operator_id: i64,
    pub payment_method_id: i64,
    pub order_id: Option<i64>,
    pub movement_type: MovementType,
    pub currency: String,
    /// Signed: positive credits the balance, negative debits it
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.operator_id, self.payment_method_id, self.currency.clone())
    }

    pub fn is_consistent(&self) -> bool {
        self.balance_before + self.amount == self.balance_after
    }
}

/// Movement about to be appended; ids and balances are filled in by the ledger
#[derive(Debug, Clone)]
pub struct NewCashMovement {
    pub key: BalanceKey,
    pub order_id: Option<i64>,
    pub movement_type: MovementType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
}

/// Result of auditing one balance against its movement history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerAudit {
    pub key: BalanceKey,
    pub stored_balance: Decimal,
    pub last_balance_after: Option<Decimal>,
    pub movement_count: usize,
    /// Ids of movements whose before + amount != after
    pub broken_movements: Vec<i64>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        let tail_matches = match self.last_balance_after {
            Some(after) => after == self.stored_balance,
            None => self.stored_balance.is_zero(),
        };
        tail_matches && self.broken_movements.is_empty()
    }
}
