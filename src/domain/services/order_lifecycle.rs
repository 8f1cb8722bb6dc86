//! Order Lifecycle Service
//!
//! Entry point for creating, completing and cancelling exchange orders.
//! Each operation runs in a single transaction: either every row it touches
//! is written or none is.
//!
//! State machine:
//! - pending -> processing | completed | cancelled | failed
//! - processing -> completed | cancelled | failed
//! - completed, cancelled, failed are terminal
//!
//! Creation reserves the quote amount on the operator's outbound balance.
//! Completion, cancellation and failure give the reservation back.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::commission::{Beneficiary, Commission};
use crate::domain::entities::currency_pair::AmountLimits;
use crate::domain::entities::customer::ActivityType;
use crate::domain::entities::exchange_house::OperatorContext;
use crate::domain::entities::ledger::BalanceKey;
use crate::domain::entities::order::{Order, OrderEconomics, OrderStatus};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::repositories::settings_provider::SettingsProvider;
use crate::domain::services::commission_calculator::{CommissionCalculator, PlatformTerms};
use crate::domain::services::ledger_store::LedgerStore;
use crate::domain::services::payment_method_selector::{PaymentMethodSelector, PaymentSelection};
use crate::domain::value_objects::amount::Amount;
use crate::domain::value_objects::rate::Rate;
use crate::persistence::models::InsertOrder;
use crate::persistence::{
    catalog_repository, commission_repository, customer_repository, order_repository, DbPool,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub currency_pair_id: i64,
    pub base_amount: Decimal,
    pub customer_id: Option<i64>,
    pub payment_selection: PaymentSelection,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: i64,
    pub actual_rate: Decimal,
    pub actual_quote_amount: Decimal,
    /// Margin reported by the operator; computed from the reconciled economics when absent
    pub actual_margin_percent: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: i64,
    pub reason: String,
    pub actor_id: i64,
}

pub struct OrderLifecycleService {
    pool: DbPool,
    calculator: CommissionCalculator,
    settings: Arc<dyn SettingsProvider>,
}

impl OrderLifecycleService {
    pub fn new(
        pool: DbPool,
        calculator: CommissionCalculator,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            pool,
            calculator,
            settings,
        }
    }

    /// Quote, fund and persist a new order
    pub async fn create(&self, ctx: &OperatorContext, input: CreateOrder) -> DomainResult<Order> {
        Amount::positive(input.base_amount)?;

        // Resolved before the transaction opens; the provider may need a connection
        let platform_rate = self.settings.platform_commission_rate().await?;

        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;

        let house = catalog_repository::find_exchange_house(&mut tx, ctx.exchange_house_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "exchange house",
                id: ctx.exchange_house_id,
            })?;
        if !house.is_active {
            return Err(DomainError::InvalidInput(format!(
                "exchange house {} is inactive",
                house.id
            )));
        }

        let not_configured = || DomainError::PairNotConfigured {
            exchange_house_id: ctx.exchange_house_id,
            currency_pair_id: input.currency_pair_id,
        };
        let pair = catalog_repository::find_currency_pair(&mut tx, input.currency_pair_id)
            .await?
            .filter(|pair| pair.is_active)
            .ok_or_else(not_configured)?;
        let config = catalog_repository::find_live_config(&mut tx, house.id, pair.id)
            .await?
            .filter(|config| config.is_usable())
            .ok_or_else(not_configured)?;

        let limits = AmountLimits::effective(&pair, &config);
        if !limits.contains(input.base_amount) {
            return Err(DomainError::AmountOutOfRange {
                amount: input.base_amount,
                min: limits.min,
                max: limits.max,
            });
        }

        if let Some(customer_id) = input.customer_id {
            let customer = customer_repository::find_customer(&mut tx, customer_id)
                .await?
                .filter(|customer| customer.exchange_house_id == house.id)
                .ok_or(DomainError::NotFound {
                    entity: "customer",
                    id: customer_id,
                })?;
            tracing::debug!("Order for customer {} ({})", customer.id, customer.name);
        }

        let terms = PlatformTerms::new(platform_rate, house.has_active_promo(Utc::now()));
        let economics =
            self.calculator
                .quote(pair.base_rate, input.base_amount, &config.policy, terms)?;

        let methods =
            PaymentMethodSelector::select(&mut tx, ctx, &pair, input.payment_selection).await?;

        let outbound_key = BalanceKey::new(
            ctx.operator_id,
            methods.outbound.id,
            pair.quote_currency.clone(),
        );
        LedgerStore::reserve(&mut tx, &outbound_key, economics.quote_amount).await?;

        let order = order_repository::insert_order(
            &mut tx,
            &InsertOrder {
                exchange_house_id: house.id,
                currency_pair_id: pair.id,
                operator_id: ctx.operator_id,
                customer_id: input.customer_id,
                inbound_payment_method_id: methods.inbound.id,
                outbound_payment_method_id: methods.outbound.id,
                base_currency: pair.base_currency.clone(),
                quote_currency: pair.quote_currency.clone(),
                base_amount: input.base_amount,
                market_rate: pair.base_rate,
                policy: config.policy,
                economics,
                reserved_amount: economics.quote_amount,
                notes: input.notes,
            },
        )
        .await?;

        insert_commissions(&mut tx, &order, self.calculator.scale()).await?;

        if let Some(customer_id) = order.customer_id {
            record_customer_activity(&mut tx, customer_id, &order, ActivityType::OrderCreated)
                .await?;
        }

        tx.commit().await.map_err(DomainError::from)?;

        info!(
            "Order {} created: {} {} -> {} {} ({} model, profit {}, platform {})",
            order.id,
            order.base_amount,
            order.base_currency,
            order.quote_amount(),
            order.quote_currency,
            order.policy.model(),
            order.economics.total_profit,
            order.economics.platform_commission
        );
        Ok(order)
    }

    /// Settle an open order at its executed rate
    pub async fn complete(&self, input: CompleteOrder) -> DomainResult<Order> {
        Rate::new(input.actual_rate)?;
        Amount::positive(input.actual_quote_amount)?;

        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let order = load_order(&mut tx, input.order_id).await?;
        ensure_transition(&order, OrderStatus::Completed)?;

        // The platform share stays at the rate agreed when the order was quoted
        let terms = PlatformTerms::new(order.economics.platform_commission_rate, false);
        let actual = self.calculator.reconcile(
            order.base_amount,
            &order.policy,
            order.economics.quote_amount,
            input.actual_rate,
            input.actual_quote_amount,
            terms,
        )?;
        let actual_margin = input.actual_margin_percent.unwrap_or(actual.margin_percent);

        let completed = order_repository::complete_order(
            &mut tx,
            order.id,
            &actual,
            input.actual_rate,
            actual_margin,
            input.notes.as_deref(),
        )
        .await?
        .ok_or_else(|| transition_error(&order, OrderStatus::Completed))?;

        update_commissions(&mut tx, &completed, &actual, self.calculator.scale()).await?;
        release_reservation(&mut tx, &order).await?;

        if let Some(customer_id) = completed.customer_id {
            record_customer_activity(&mut tx, customer_id, &completed, ActivityType::OrderCompleted)
                .await?;
        }

        tx.commit().await.map_err(DomainError::from)?;

        let slippage = order.economics.quote_amount - completed.quote_amount();
        if !slippage.is_zero() {
            info!(
                "Order {} settled with slippage {} {} (profit {} -> {})",
                completed.id,
                slippage,
                completed.quote_currency,
                order.economics.total_profit,
                completed.economics.total_profit
            );
        } else {
            info!("Order {} completed", completed.id);
        }
        Ok(completed)
    }

    /// Cancel an open order and undo its ledger effects
    pub async fn cancel(&self, input: CancelOrder) -> DomainResult<Order> {
        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let order = load_order(&mut tx, input.order_id).await?;
        // Checked before any reversal so a second cancel can never double-reverse
        ensure_transition(&order, OrderStatus::Cancelled)?;

        let reversals =
            LedgerStore::reverse_order_movements(&mut tx, order.id, &input.reason).await?;
        release_reservation(&mut tx, &order).await?;
        commission_repository::delete_for_order(&mut tx, order.id).await?;

        let cancelled =
            order_repository::cancel_order(&mut tx, order.id, &input.reason, input.actor_id)
                .await?
                .ok_or_else(|| transition_error(&order, OrderStatus::Cancelled))?;

        if let Some(customer_id) = cancelled.customer_id {
            record_customer_activity(&mut tx, customer_id, &cancelled, ActivityType::OrderCancelled)
                .await?;
        }

        tx.commit().await.map_err(DomainError::from)?;

        info!(
            "Order {} cancelled by {} ({} movements reversed): {}",
            cancelled.id,
            input.actor_id,
            reversals.len(),
            input.reason
        );
        Ok(cancelled)
    }

    /// Generic status update: pending -> processing, open -> failed.
    /// Completion and cancellation have their own operations.
    pub async fn update_status(&self, order_id: i64, status: OrderStatus) -> DomainResult<Order> {
        if matches!(status, OrderStatus::Completed | OrderStatus::Cancelled) {
            return Err(DomainError::InvalidInput(format!(
                "orders move to {} through their dedicated operation",
                status
            )));
        }

        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let order = load_order(&mut tx, order_id).await?;
        ensure_transition(&order, status)?;

        let updated = order_repository::transition_status(&mut tx, order.id, order.status, status)
            .await?
            .ok_or_else(|| transition_error(&order, status))?;

        if status == OrderStatus::Failed {
            release_reservation(&mut tx, &order).await?;
            warn!("Order {} marked failed", order.id);
        }

        tx.commit().await.map_err(DomainError::from)?;
        Ok(updated)
    }

    pub async fn get(&self, order_id: i64) -> DomainResult<Order> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        load_order(&mut conn, order_id).await
    }

    pub async fn commissions(&self, order_id: i64) -> DomainResult<Vec<Commission>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(commission_repository::list_for_order(&mut conn, order_id).await?)
    }

    pub async fn list(
        &self,
        exchange_house_id: i64,
        status: Option<OrderStatus>,
    ) -> DomainResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(order_repository::list_orders(&mut conn, exchange_house_id, status).await?)
    }
}

async fn load_order(conn: &mut SqliteConnection, order_id: i64) -> DomainResult<Order> {
    order_repository::find_order(conn, order_id)
        .await?
        .ok_or(DomainError::NotFound {
            entity: "order",
            id: order_id,
        })
}

fn transition_error(order: &Order, to: OrderStatus) -> DomainError {
    DomainError::InvalidStateTransition {
        entity: "order",
        id: order.id,
        from: order.status.to_string(),
        to: to.to_string(),
    }
}

fn ensure_transition(order: &Order, to: OrderStatus) -> DomainResult<()> {
    if order.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(transition_error(order, to))
    }
}

/// `amount` as a percentage of `base` at `scale` places, zero for an empty base
fn rate_of(amount: Decimal, base: Decimal, scale: u32) -> Decimal {
    if base <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (amount / base * Decimal::ONE_HUNDRED).round_dp(scale)
}

async fn insert_commissions(
    conn: &mut SqliteConnection,
    order: &Order,
    scale: u32,
) -> DomainResult<()> {
    let e = &order.economics;
    commission_repository::insert_commission(
        conn,
        order.id,
        order.exchange_house_id,
        Beneficiary::Platform,
        e.platform_commission_rate,
        e.platform_commission,
        order.base_amount,
    )
    .await?;
    commission_repository::insert_commission(
        conn,
        order.id,
        order.exchange_house_id,
        Beneficiary::ExchangeHouse,
        rate_of(e.exchange_commission, order.base_amount, scale),
        e.exchange_commission,
        order.base_amount,
    )
    .await?;
    Ok(())
}

async fn update_commissions(
    conn: &mut SqliteConnection,
    order: &Order,
    economics: &OrderEconomics,
    scale: u32,
) -> DomainResult<()> {
    commission_repository::update_commission(
        conn,
        order.id,
        Beneficiary::Platform,
        economics.platform_commission_rate,
        economics.platform_commission,
    )
    .await?;
    commission_repository::update_commission(
        conn,
        order.id,
        Beneficiary::ExchangeHouse,
        rate_of(economics.exchange_commission, order.base_amount, scale),
        economics.exchange_commission,
    )
    .await?;
    Ok(())
}

async fn release_reservation(conn: &mut SqliteConnection, order: &Order) -> DomainResult<()> {
    let key = BalanceKey::new(
        order.operator_id,
        order.outbound_payment_method_id,
        order.quote_currency.clone(),
    );
    LedgerStore::release(conn, &key, order.reserved_amount).await
}

async fn record_customer_activity(
    conn: &mut SqliteConnection,
    customer_id: i64,
    order: &Order,
    activity: ActivityType,
) -> DomainResult<()> {
    customer_repository::refresh_metrics(conn, customer_id).await?;
    let details = json!({
        "order_id": order.id,
        "pair": format!("{}/{}", order.base_currency, order.quote_currency),
        "base_amount": order.base_amount,
        "quote_amount": order.quote_amount(),
        "status": order.status,
    });
    customer_repository::insert_activity(conn, customer_id, Some(order.id), activity, &details)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_of() {
        assert_eq!(rate_of(dec!(4), dec!(100), 8), dec!(4));
        assert_eq!(rate_of(dec!(1), dec!(3), 8), dec!(33.33333333));
        assert_eq!(rate_of(dec!(5), Decimal::ZERO, 8), Decimal::ZERO);
    }

    #[test]
    fn test_rate_of_follows_money_scale() {
        assert_eq!(rate_of(dec!(1), dec!(3), 2), dec!(33.33));
        assert_eq!(rate_of(dec!(2), dec!(3), 4), dec!(66.6667));
    }
}
