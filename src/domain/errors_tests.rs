//! Tests for the domain error taxonomy: messages, codes and retry policy

#[cfg(test)]
mod error_handling_tests {
    use crate::domain::errors::{DomainError, ErrorSeverity, ValidationError};
    use crate::persistence::DatabaseError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_balance_message_carries_all_amounts() {
        let err = DomainError::insufficient_balance("USD", dec!(29800), dec!(20000));
        let message = err.to_string();

        assert!(message.contains("USD"));
        assert!(message.contains("required 29800"));
        assert!(message.contains("available 20000"));
        assert!(message.contains("missing 9800"));
    }

    #[test]
    fn test_insufficient_balance_deficit_is_computed() {
        match DomainError::insufficient_balance("EUR", dec!(150.5), dec!(100)) {
            DomainError::InsufficientBalance { deficit, .. } => assert_eq!(deficit, dec!(50.5)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_amount_out_of_range_unbounded_max() {
        let err = DomainError::AmountOutOfRange {
            amount: dec!(5),
            min: dec!(10),
            max: None,
        };
        assert_eq!(
            err.to_string(),
            "Amount 5 is out of range: minimum 10, maximum unbounded"
        );
    }

    #[test]
    fn test_amount_out_of_range_bounded_max() {
        let err = DomainError::AmountOutOfRange {
            amount: dec!(5000),
            min: dec!(10),
            max: Some(dec!(1000)),
        };
        assert!(err.to_string().ends_with("maximum 1000"));
    }

    #[test]
    fn test_invalid_state_transition_message() {
        let err = DomainError::InvalidStateTransition {
            entity: "order",
            id: 42,
            from: "completed".to_string(),
            to: "cancelled".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot move order 42 from completed to cancelled");
        assert_eq!(err.error_code(), "ERR_INVALID_STATE_TRANSITION");
    }

    #[test]
    fn test_business_errors_are_not_retryable() {
        let errors = vec![
            DomainError::PairNotConfigured {
                exchange_house_id: 1,
                currency_pair_id: 2,
            },
            DomainError::PaymentMethodUnavailable {
                currency: "GBP".to_string(),
            },
            DomainError::PaymentMethodMismatch {
                reason: "wrong house".to_string(),
            },
            DomainError::insufficient_balance("USD", dec!(10), dec!(1)),
        ];

        for err in errors {
            assert!(!err.is_retryable(), "{} should not be retryable", err);
            assert_eq!(err.severity(), ErrorSeverity::Moderate);
        }
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        let conflict = DomainError::ConcurrentModification { balance_id: 7 };
        assert!(conflict.is_retryable());

        let db = DomainError::Persistence(DatabaseError::QueryError("locked".to_string()));
        assert!(db.is_retryable());
        assert_eq!(db.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_validation_error_becomes_invalid_input() {
        let err: DomainError = ValidationError::MustBePositive.into();
        assert_eq!(err.error_code(), "ERR_INVALID_INPUT");
        assert_eq!(err.severity(), ErrorSeverity::Minor);
        assert!(err.to_string().contains("strictly positive"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Minor < ErrorSeverity::Moderate);
        assert!(ErrorSeverity::Moderate < ErrorSeverity::Critical);
    }
}
