//! Database Models
//!
//! Row structs as stored in SQLite and their conversion into domain entities.
//! Enums and money are stored as TEXT; decoding fails with
//! `DatabaseError::DecodeError` naming the table and row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt::Display;
use std::str::FromStr;

use super::DatabaseError;
use crate::domain::entities::commission::{
    BankDetails, Commission, CommissionPayment, CommissionPaymentRequest,
};
use crate::domain::entities::currency_pair::{
    CommissionPolicy, CurrencyPair, ExchangeHouseCurrencyPairConfig,
};
use crate::domain::entities::customer::{Customer, CustomerActivity};
use crate::domain::entities::exchange_house::ExchangeHouse;
use crate::domain::entities::ledger::{CashMovement, OperatorCashBalance};
use crate::domain::entities::order::{Order, OrderEconomics};
use crate::domain::entities::payment_method::PaymentMethod;

/// Decoding context for one row
struct RowDecoder {
    table: &'static str,
    id: i64,
}

impl RowDecoder {
    fn new(table: &'static str, id: i64) -> Self {
        Self { table, id }
    }

    fn error(&self, reason: String) -> DatabaseError {
        DatabaseError::DecodeError {
            table: self.table,
            id: self.id,
            reason,
        }
    }

    fn decimal(&self, field: &str, raw: &str) -> Result<Decimal, DatabaseError> {
        Decimal::from_str(raw).map_err(|e| self.error(format!("{} '{}': {}", field, raw, e)))
    }

    fn opt_decimal(
        &self,
        field: &str,
        raw: Option<&str>,
    ) -> Result<Option<Decimal>, DatabaseError> {
        raw.map(|value| self.decimal(field, value)).transpose()
    }

    fn parse<T>(&self, field: &str, raw: &str) -> Result<T, DatabaseError>
    where
        T: FromStr,
        T::Err: Display,
    {
        raw.parse::<T>()
            .map_err(|e| self.error(format!("{}: {}", field, e)))
    }
}

/// Exchange house record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExchangeHouseRecord {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub zero_commission_promo: bool,
    pub promo_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ExchangeHouseRecord> for ExchangeHouse {
    fn from(r: ExchangeHouseRecord) -> Self {
        ExchangeHouse {
            id: r.id,
            name: r.name,
            is_active: r.is_active,
            zero_commission_promo: r.zero_commission_promo,
            promo_expires_at: r.promo_expires_at,
            created_at: r.created_at,
        }
    }
}

/// Currency pair record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CurrencyPairRecord {
    pub id: i64,
    pub base_currency: String,
    pub quote_currency: String,
    pub base_rate: String,
    pub min_amount: String,
    pub max_amount: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CurrencyPairRecord> for CurrencyPair {
    type Error = DatabaseError;

    fn try_from(r: CurrencyPairRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("currency_pairs", r.id);
        Ok(CurrencyPair {
            id: r.id,
            base_rate: d.decimal("base_rate", &r.base_rate)?,
            min_amount: d.decimal("min_amount", &r.min_amount)?,
            max_amount: d.opt_decimal("max_amount", r.max_amount.as_deref())?,
            base_currency: r.base_currency,
            quote_currency: r.quote_currency,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// House/pair configuration record; the policy is stored flat
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PairConfigRecord {
    pub id: i64,
    pub exchange_house_id: i64,
    pub currency_pair_id: i64,
    pub commission_model: String,
    pub commission_percent: Option<String>,
    pub buy_rate: Option<String>,
    pub sell_rate: Option<String>,
    pub min_amount: String,
    pub max_amount: Option<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn decode_policy(
    d: &RowDecoder,
    model: &str,
    percent: Option<&str>,
    buy_rate: Option<&str>,
    sell_rate: Option<&str>,
) -> Result<CommissionPolicy, DatabaseError> {
    CommissionPolicy::from_parts(
        d.parse("commission_model", model)?,
        d.opt_decimal("commission_percent", percent)?,
        d.opt_decimal("buy_rate", buy_rate)?,
        d.opt_decimal("sell_rate", sell_rate)?,
    )
    .map_err(|e| d.error(e.to_string()))
}

impl TryFrom<PairConfigRecord> for ExchangeHouseCurrencyPairConfig {
    type Error = DatabaseError;

    fn try_from(r: PairConfigRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("exchange_house_currency_pairs", r.id);
        Ok(ExchangeHouseCurrencyPairConfig {
            id: r.id,
            exchange_house_id: r.exchange_house_id,
            currency_pair_id: r.currency_pair_id,
            policy: decode_policy(
                &d,
                &r.commission_model,
                r.commission_percent.as_deref(),
                r.buy_rate.as_deref(),
                r.sell_rate.as_deref(),
            )?,
            min_amount: d.decimal("min_amount", &r.min_amount)?,
            max_amount: d.opt_decimal("max_amount", r.max_amount.as_deref())?,
            is_active: r.is_active,
            deleted_at: r.deleted_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Payment method record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentMethodRecord {
    pub id: i64,
    pub exchange_house_id: i64,
    pub name: String,
    pub method_type: String,
    pub currency: String,
    pub is_active: bool,
    pub is_default: bool,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub daily_limit: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentMethodRecord> for PaymentMethod {
    type Error = DatabaseError;

    fn try_from(r: PaymentMethodRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("payment_methods", r.id);
        Ok(PaymentMethod {
            id: r.id,
            exchange_house_id: r.exchange_house_id,
            method_type: d.parse("method_type", &r.method_type)?,
            min_amount: d.opt_decimal("min_amount", r.min_amount.as_deref())?,
            max_amount: d.opt_decimal("max_amount", r.max_amount.as_deref())?,
            daily_limit: d.opt_decimal("daily_limit", r.daily_limit.as_deref())?,
            name: r.name,
            currency: r.currency,
            is_active: r.is_active,
            is_default: r.is_default,
            created_at: r.created_at,
        })
    }
}

/// Operator cash balance record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashBalanceRecord {
    pub id: i64,
    pub operator_id: i64,
    pub payment_method_id: i64,
    pub currency: String,
    pub balance: String,
    pub reserved: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CashBalanceRecord> for OperatorCashBalance {
    type Error = DatabaseError;

    fn try_from(r: CashBalanceRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("operator_cash_balances", r.id);
        Ok(OperatorCashBalance {
            id: r.id,
            operator_id: r.operator_id,
            payment_method_id: r.payment_method_id,
            balance: d.decimal("balance", &r.balance)?,
            reserved: d.decimal("reserved", &r.reserved)?,
            currency: r.currency,
            version: r.version,
            updated_at: r.updated_at,
        })
    }
}

/// Cash movement record in database (append-only)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashMovementRecord {
    pub id: i64,
    pub operator_id: i64,
    pub payment_method_id: i64,
    pub order_id: Option<i64>,
    pub movement_type: String,
    pub currency: String,
    pub amount: String,
    pub balance_before: String,
    pub balance_after: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CashMovementRecord> for CashMovement {
    type Error = DatabaseError;

    fn try_from(r: CashMovementRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("cash_movements", r.id);
        Ok(CashMovement {
            id: r.id,
            operator_id: r.operator_id,
            payment_method_id: r.payment_method_id,
            order_id: r.order_id,
            movement_type: d.parse("movement_type", &r.movement_type)?,
            amount: d.decimal("amount", &r.amount)?,
            balance_before: d.decimal("balance_before", &r.balance_before)?,
            balance_after: d.decimal("balance_after", &r.balance_after)?,
            currency: r.currency,
            description: r.description,
            created_at: r.created_at,
        })
    }
}

/// Order record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRecord {
    pub id: i64,
    pub exchange_house_id: i64,
    pub currency_pair_id: i64,
    pub operator_id: i64,
    pub customer_id: Option<i64>,
    pub inbound_payment_method_id: i64,
    pub outbound_payment_method_id: i64,
    pub base_currency: String,
    pub quote_currency: String,
    pub base_amount: String,
    pub quote_amount: String,
    pub market_rate: String,
    pub applied_rate: String,
    pub actual_rate: Option<String>,
    pub commission_model: String,
    pub commission_percent: Option<String>,
    pub buy_rate: Option<String>,
    pub sell_rate: Option<String>,
    pub house_commission_amount: String,
    pub spread_profit: String,
    pub spread_profit_base: String,
    pub total_profit: String,
    pub platform_commission_rate: String,
    pub platform_commission: String,
    pub exchange_commission: String,
    pub margin_percent: String,
    pub expected_margin_percent: String,
    pub actual_margin_percent: Option<String>,
    pub reserved_amount: String,
    pub status: String, // pending | processing | completed | cancelled | failed
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRecord> for Order {
    type Error = DatabaseError;

    fn try_from(r: OrderRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("orders", r.id);
        let policy = decode_policy(
            &d,
            &r.commission_model,
            r.commission_percent.as_deref(),
            r.buy_rate.as_deref(),
            r.sell_rate.as_deref(),
        )?;

        let economics = OrderEconomics {
            quote_amount: d.decimal("quote_amount", &r.quote_amount)?,
            applied_rate: d.decimal("applied_rate", &r.applied_rate)?,
            house_commission_percent: policy.percent(),
            house_commission_amount: d
                .decimal("house_commission_amount", &r.house_commission_amount)?,
            spread_profit: d.decimal("spread_profit", &r.spread_profit)?,
            spread_profit_base: d.decimal("spread_profit_base", &r.spread_profit_base)?,
            total_profit: d.decimal("total_profit", &r.total_profit)?,
            platform_commission_rate: d
                .decimal("platform_commission_rate", &r.platform_commission_rate)?,
            platform_commission: d.decimal("platform_commission", &r.platform_commission)?,
            exchange_commission: d.decimal("exchange_commission", &r.exchange_commission)?,
            margin_percent: d.decimal("margin_percent", &r.margin_percent)?,
        };

        Ok(Order {
            id: r.id,
            exchange_house_id: r.exchange_house_id,
            currency_pair_id: r.currency_pair_id,
            operator_id: r.operator_id,
            customer_id: r.customer_id,
            inbound_payment_method_id: r.inbound_payment_method_id,
            outbound_payment_method_id: r.outbound_payment_method_id,
            base_amount: d.decimal("base_amount", &r.base_amount)?,
            market_rate: d.decimal("market_rate", &r.market_rate)?,
            actual_rate: d.opt_decimal("actual_rate", r.actual_rate.as_deref())?,
            expected_margin_percent: d
                .decimal("expected_margin_percent", &r.expected_margin_percent)?,
            actual_margin_percent: d
                .opt_decimal("actual_margin_percent", r.actual_margin_percent.as_deref())?,
            reserved_amount: d.decimal("reserved_amount", &r.reserved_amount)?,
            status: d.parse("status", &r.status)?,
            base_currency: r.base_currency,
            quote_currency: r.quote_currency,
            policy,
            economics,
            notes: r.notes,
            cancellation_reason: r.cancellation_reason,
            cancelled_by: r.cancelled_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
            completed_at: r.completed_at,
            cancelled_at: r.cancelled_at,
        })
    }
}

/// Commission record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionRecord {
    pub id: i64,
    pub order_id: i64,
    pub exchange_house_id: i64,
    pub beneficiary: String, // "platform" or "exchange_house"
    pub rate_percent: String,
    pub amount: String,
    pub base_amount: String,
    pub status: String,
    pub payment_request_id: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CommissionRecord> for Commission {
    type Error = DatabaseError;

    fn try_from(r: CommissionRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("commissions", r.id);
        Ok(Commission {
            id: r.id,
            order_id: r.order_id,
            exchange_house_id: r.exchange_house_id,
            beneficiary: d.parse("beneficiary", &r.beneficiary)?,
            rate_percent: d.decimal("rate_percent", &r.rate_percent)?,
            amount: d.decimal("amount", &r.amount)?,
            base_amount: d.decimal("base_amount", &r.base_amount)?,
            status: d.parse("status", &r.status)?,
            payment_request_id: r.payment_request_id,
            paid_at: r.paid_at,
            created_at: r.created_at,
        })
    }
}

/// Commission payment request record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRequestRecord {
    pub id: i64,
    pub exchange_house_id: i64,
    pub amount: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: String,
    pub requested_by: i64,
    pub approved_by: Option<i64>,
    pub paid_by: Option<i64>,
    pub rejection_reason: Option<String>,
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub account_number: Option<String>,
    pub payment_reference: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRequestRecord> for CommissionPaymentRequest {
    type Error = DatabaseError;

    fn try_from(r: PaymentRequestRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("commission_payment_requests", r.id);
        Ok(CommissionPaymentRequest {
            id: r.id,
            exchange_house_id: r.exchange_house_id,
            amount: d.decimal("amount", &r.amount)?,
            period_start: r.period_start,
            period_end: r.period_end,
            status: d.parse("status", &r.status)?,
            requested_by: r.requested_by,
            approved_by: r.approved_by,
            paid_by: r.paid_by,
            rejection_reason: r.rejection_reason,
            bank_details: BankDetails {
                bank_name: r.bank_name,
                account_holder: r.account_holder,
                account_number: r.account_number,
            },
            payment_reference: r.payment_reference,
            requested_at: r.requested_at,
            approved_at: r.approved_at,
            paid_at: r.paid_at,
        })
    }
}

/// Settled payout record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionPaymentRecord {
    pub id: i64,
    pub request_id: i64,
    pub exchange_house_id: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_amount: String,
    pub commission_count: i64,
    pub paid_at: DateTime<Utc>,
}

impl TryFrom<CommissionPaymentRecord> for CommissionPayment {
    type Error = DatabaseError;

    fn try_from(r: CommissionPaymentRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("commission_payments", r.id);
        Ok(CommissionPayment {
            id: r.id,
            request_id: r.request_id,
            exchange_house_id: r.exchange_house_id,
            period_start: r.period_start,
            period_end: r.period_end,
            total_amount: d.decimal("total_amount", &r.total_amount)?,
            commission_count: r.commission_count,
            paid_at: r.paid_at,
        })
    }
}

/// Customer record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerRecord {
    pub id: i64,
    pub exchange_house_id: i64,
    pub name: String,
    pub total_orders: i64,
    pub total_volume: String,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRecord> for Customer {
    type Error = DatabaseError;

    fn try_from(r: CustomerRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("customers", r.id);
        Ok(Customer {
            id: r.id,
            exchange_house_id: r.exchange_house_id,
            total_volume: d.decimal("total_volume", &r.total_volume)?,
            name: r.name,
            total_orders: r.total_orders,
            last_order_at: r.last_order_at,
            created_at: r.created_at,
        })
    }
}

/// Customer activity record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerActivityRecord {
    pub id: i64,
    pub customer_id: i64,
    pub order_id: Option<i64>,
    pub activity_type: String,
    pub details: String, // JSON string
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CustomerActivityRecord> for CustomerActivity {
    type Error = DatabaseError;

    fn try_from(r: CustomerActivityRecord) -> Result<Self, Self::Error> {
        let d = RowDecoder::new("customer_activities", r.id);
        let details = serde_json::from_str(&r.details)
            .map_err(|e| d.error(format!("details: {}", e)))?;
        Ok(CustomerActivity {
            id: r.id,
            customer_id: r.customer_id,
            order_id: r.order_id,
            activity_type: r.activity_type,
            details,
            created_at: r.created_at,
        })
    }
}

/// Create exchange house input
#[derive(Debug, Clone)]
pub struct CreateExchangeHouse {
    pub name: String,
    pub zero_commission_promo: bool,
    pub promo_expires_at: Option<DateTime<Utc>>,
}

/// Create currency pair input
#[derive(Debug, Clone)]
pub struct CreateCurrencyPair {
    pub base_currency: String,
    pub quote_currency: String,
    pub base_rate: Decimal,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
}

/// Attach or update a house configuration
#[derive(Debug, Clone)]
pub struct ConfigurePair {
    pub exchange_house_id: i64,
    pub currency_pair_id: i64,
    pub policy: CommissionPolicy,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
}

/// Create payment method input
#[derive(Debug, Clone)]
pub struct CreatePaymentMethod {
    pub exchange_house_id: i64,
    pub name: String,
    pub method_type: crate::domain::entities::payment_method::PaymentMethodType,
    pub currency: String,
    pub is_default: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
}

/// Create customer input
#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub exchange_house_id: i64,
    pub name: String,
}

/// Order row as written at creation; every economic field comes from the quote
#[derive(Debug, Clone)]
pub struct InsertOrder {
    pub exchange_house_id: i64,
    pub currency_pair_id: i64,
    pub operator_id: i64,
    pub customer_id: Option<i64>,
    pub inbound_payment_method_id: i64,
    pub outbound_payment_method_id: i64,
    pub base_currency: String,
    pub quote_currency: String,
    pub base_amount: Decimal,
    pub market_rate: Decimal,
    pub policy: CommissionPolicy,
    pub economics: OrderEconomics,
    pub reserved_amount: Decimal,
    pub notes: Option<String>,
}

/// Flat column values of a commission policy: (model, percent, buy_rate, sell_rate)
pub fn policy_columns(
    policy: &CommissionPolicy,
) -> (&'static str, Option<String>, Option<String>, Option<String>) {
    (
        policy.model().as_str(),
        policy.percent().map(|v| v.to_string()),
        policy.buy_rate().map(|v| v.to_string()),
        policy.sell_rate().map(|v| v.to_string()),
    )
}

/// Decode a list of records, failing on the first corrupt row
pub fn decode_all<R, T>(records: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    records.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ledger::MovementType;
    use rust_decimal_macros::dec;

    fn movement_record(movement_type: &str, amount: &str) -> CashMovementRecord {
        CashMovementRecord {
            id: 42,
            operator_id: 1,
            payment_method_id: 2,
            order_id: Some(9),
            movement_type: movement_type.to_string(),
            currency: "HTG".to_string(),
            amount: amount.to_string(),
            balance_before: "1000".to_string(),
            balance_after: "970.5".to_string(),
            description: "order out".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_movement_decodes_text_money() {
        let movement = CashMovement::try_from(movement_record("order_out", "-29.5")).unwrap();
        assert_eq!(movement.amount, dec!(-29.5));
        assert_eq!(movement.movement_type, MovementType::OrderOut);
        assert!(movement.is_consistent());
    }

    #[test]
    fn test_corrupt_amount_names_row() {
        let err = CashMovement::try_from(movement_record("order_out", "abc")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cash_movements"));
        assert!(message.contains("42"));
    }

    #[test]
    fn test_unknown_movement_type_rejected() {
        assert!(CashMovement::try_from(movement_record("transfer", "1")).is_err());
    }

    #[test]
    fn test_spread_config_without_buy_rate_rejected() {
        let now = Utc::now();
        let record = PairConfigRecord {
            id: 3,
            exchange_house_id: 1,
            currency_pair_id: 1,
            commission_model: "spread".to_string(),
            commission_percent: None,
            buy_rate: None,
            sell_rate: Some("298".to_string()),
            min_amount: "10".to_string(),
            max_amount: None,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(ExchangeHouseCurrencyPairConfig::try_from(record).is_err());
    }
}
