use rust_decimal::Decimal;
use thiserror::Error;

use crate::persistence::DatabaseError;

/// Business errors raised by the order, ledger and payout services.
///
/// Every variant except `ConcurrentModification` and `Persistence` describes
/// invalid business input and is surfaced verbatim to the caller.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Currency pair {currency_pair_id} is not configured for exchange house {exchange_house_id}")]
    PairNotConfigured {
        exchange_house_id: i64,
        currency_pair_id: i64,
    },

    #[error("Amount {amount} is out of range: minimum {min}, maximum {}", format_max(.max))]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Option<Decimal>,
    },

    #[error("Payment method mismatch: {reason}")]
    PaymentMethodMismatch { reason: String },

    #[error("No active payment method available for currency {currency}")]
    PaymentMethodUnavailable { currency: String },

    #[error(
        "Insufficient {currency} balance: required {required}, available {available}, missing {deficit}"
    )]
    InsufficientBalance {
        currency: String,
        required: Decimal,
        available: Decimal,
        deficit: Decimal,
    },

    #[error("Cannot move {entity} {id} from {from} to {to}")]
    InvalidStateTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    #[error("Insufficient accrued commission: requested {requested}, available {available}")]
    InsufficientAccruedCommission {
        requested: Decimal,
        available: Decimal,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Balance {balance_id} was modified concurrently, retry the operation")]
    ConcurrentModification { balance_id: i64 },

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

fn format_max(max: &Option<Decimal>) -> String {
    match max {
        Some(max) => max.to_string(),
        None => "unbounded".to_string(),
    }
}

impl DomainError {
    pub fn insufficient_balance(currency: &str, required: Decimal, available: Decimal) -> Self {
        DomainError::InsufficientBalance {
            currency: currency.to_string(),
            required,
            available,
            deficit: required - available,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DomainError::InvalidInput(_) | DomainError::NotFound { .. } => ErrorSeverity::Minor,
            DomainError::PairNotConfigured { .. }
            | DomainError::AmountOutOfRange { .. }
            | DomainError::PaymentMethodMismatch { .. }
            | DomainError::PaymentMethodUnavailable { .. }
            | DomainError::InsufficientBalance { .. }
            | DomainError::InvalidStateTransition { .. }
            | DomainError::InsufficientAccruedCommission { .. }
            | DomainError::ConcurrentModification { .. } => ErrorSeverity::Moderate,
            DomainError::Persistence(_) => ErrorSeverity::Critical,
        }
    }

    /// Transient failures the caller may retry a bounded number of times.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::ConcurrentModification { .. } | DomainError::Persistence(_)
        )
    }

    /// Short error code for logging/monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            DomainError::PairNotConfigured { .. } => "ERR_PAIR_NOT_CONFIGURED",
            DomainError::AmountOutOfRange { .. } => "ERR_AMOUNT_OUT_OF_RANGE",
            DomainError::PaymentMethodMismatch { .. } => "ERR_PAYMENT_METHOD_MISMATCH",
            DomainError::PaymentMethodUnavailable { .. } => "ERR_PAYMENT_METHOD_UNAVAILABLE",
            DomainError::InsufficientBalance { .. } => "ERR_INSUFFICIENT_BALANCE",
            DomainError::InvalidStateTransition { .. } => "ERR_INVALID_STATE_TRANSITION",
            DomainError::InsufficientAccruedCommission { .. } => "ERR_INSUFFICIENT_ACCRUED",
            DomainError::NotFound { .. } => "ERR_NOT_FOUND",
            DomainError::InvalidInput(_) => "ERR_INVALID_INPUT",
            DomainError::ConcurrentModification { .. } => "ERR_CONCURRENT_MODIFICATION",
            DomainError::Persistence(_) => "ERR_PERSISTENCE",
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(e: sqlx::Error) -> Self {
        DomainError::Persistence(DatabaseError::from(e))
    }
}

impl From<ValidationError> for DomainError {
    fn from(e: ValidationError) -> Self {
        DomainError::InvalidInput(e.to_string())
    }
}

/// Severity levels used when logging domain errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Bad input, nothing to investigate
    Minor,
    /// Business rule rejected the operation
    Moderate,
    /// Storage failure
    Critical,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be strictly positive")]
    MustBePositive,

    #[error("Unknown value: {0}")]
    UnknownValue(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
