//! Order lifecycle end-to-end tests
//!
//! Each test builds a fresh in-memory desk and drives orders through the
//! public services, checking the order row, its commissions and the ledger.

mod common;

use std::sync::Arc;

use common::{Desk, OPERATOR_ID, PLATFORM_RATE};
use fxdesk::config::EngineConfig;
use fxdesk::domain::entities::commission::Beneficiary;
use fxdesk::domain::entities::currency_pair::CommissionPolicy;
use fxdesk::domain::entities::ledger::MovementType;
use fxdesk::domain::entities::order::OrderStatus;
use fxdesk::domain::errors::DomainError;
use fxdesk::domain::services::ledger_store::LedgerEntry;
use fxdesk::domain::repositories::settings_provider::StaticSettings;
use fxdesk::domain::services::order_lifecycle::{
    CancelOrder, CompleteOrder, OrderLifecycleService,
};
use fxdesk::domain::services::pair_configuration::PairSettings;
use fxdesk::domain::services::payment_method_selector::PaymentSelection;
use fxdesk::persistence::customer_repository;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn cancel(order_id: i64, reason: &str) -> CancelOrder {
    CancelOrder {
        order_id,
        reason: reason.to_string(),
        actor_id: OPERATOR_ID,
    }
}

fn complete(order_id: i64, actual_rate: Decimal, actual_quote_amount: Decimal) -> CompleteOrder {
    CompleteOrder {
        order_id,
        actual_rate,
        actual_quote_amount,
        actual_margin_percent: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_create_quotes_reserves_and_writes_commissions() {
    let desk = Desk::new(dec!(1000000)).await;

    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.quote_amount(), dec!(13200));
    assert_eq!(order.market_rate, dec!(132));
    assert_eq!(order.economics.house_commission_amount, dec!(2));
    assert_eq!(order.economics.platform_commission, dec!(1));
    assert_eq!(order.economics.exchange_commission, dec!(1));
    assert_eq!(order.reserved_amount, dec!(13200));

    let balance = desk.htg_balance().await;
    assert_eq!(balance.balance, dec!(1000000));
    assert_eq!(balance.reserved, dec!(13200));
    assert_eq!(balance.available(), dec!(986800));

    let commissions = desk.orders.commissions(order.id).await.unwrap();
    assert_eq!(commissions.len(), 2);
    let platform = commissions
        .iter()
        .find(|c| c.beneficiary == Beneficiary::Platform)
        .unwrap();
    assert_eq!(platform.amount, dec!(1));
    assert_eq!(platform.rate_percent, dec!(1));
    let house = commissions
        .iter()
        .find(|c| c.beneficiary == Beneficiary::ExchangeHouse)
        .unwrap();
    assert_eq!(house.amount, dec!(1));

    // Reservations never write movements
    assert_eq!(desk.ledger.movements(&desk.htg_key()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mixed_policy_order_economics() {
    let desk = Desk::new(dec!(1000000)).await;
    desk.catalog
        .configure_pair(
            desk.house.id,
            desk.pair.id,
            PairSettings {
                policy: CommissionPolicy::Mixed {
                    percent: dec!(5),
                    buy_rate: dec!(290),
                    sell_rate: dec!(298),
                },
                min_amount: dec!(10),
                max_amount: Some(dec!(5000)),
                is_active: true,
            },
        )
        .await
        .unwrap();

    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();

    assert_eq!(order.quote_amount(), dec!(29800));
    assert_eq!(order.economics.applied_rate, dec!(298));
    assert_eq!(order.economics.spread_profit, dec!(800));
    assert_eq!(order.economics.house_commission_amount, dec!(5));
    assert_eq!(order.economics.total_profit.round_dp(3), dec!(7.759));
    assert_eq!(order.expected_margin_percent.round_dp(2), dec!(7.76));
    assert_eq!(order.policy.buy_rate(), Some(dec!(290)));
}

#[tokio::test]
async fn test_ledger_stays_consistent_through_activity() {
    let desk = Desk::new(dec!(500000)).await;

    let first = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();
    let second = desk.orders.create(&desk.ctx, desk.order(dec!(50))).await.unwrap();

    desk.ledger
        .increment(
            LedgerEntry::new(desk.usd_key(), MovementType::OrderIn, dec!(100), "cash in")
                .for_order(first.id),
        )
        .await
        .unwrap();
    desk.ledger
        .decrement(
            LedgerEntry::new(desk.htg_key(), MovementType::OrderOut, dec!(13200), "cash out")
                .for_order(first.id),
        )
        .await
        .unwrap();
    desk.orders
        .complete(complete(first.id, dec!(132), dec!(13200)))
        .await
        .unwrap();

    desk.ledger
        .increment(
            LedgerEntry::new(desk.usd_key(), MovementType::OrderIn, dec!(50), "cash in")
                .for_order(second.id),
        )
        .await
        .unwrap();
    desk.orders.cancel(cancel(second.id, "customer left")).await.unwrap();

    let audits = desk.ledger.audit_all().await.unwrap();
    assert_eq!(audits.len(), 2);
    for audit in &audits {
        assert!(audit.is_consistent(), "{:?}", audit);
    }

    let htg = desk.htg_balance().await;
    assert_eq!(htg.balance, dec!(486800));
    assert_eq!(htg.reserved, Decimal::ZERO);
}

#[tokio::test]
async fn test_cancel_reversal_is_relative_to_current_balance() {
    let desk = Desk::new(dec!(1000000)).await;
    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();

    desk.ledger
        .increment(
            LedgerEntry::new(desk.usd_key(), MovementType::OrderIn, dec!(100), "cash in")
                .for_order(order.id),
        )
        .await
        .unwrap();
    desk.ledger
        .decrement(
            LedgerEntry::new(desk.htg_key(), MovementType::OrderOut, dec!(13200), "cash out")
                .for_order(order.id),
        )
        .await
        .unwrap();
    // Unrelated activity between creation and cancellation
    desk.deposit_htg(dec!(500)).await;

    let cancelled = desk.orders.cancel(cancel(order.id, "rate refused")).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("rate refused"));
    assert_eq!(cancelled.cancelled_by, Some(OPERATOR_ID));
    assert!(cancelled.cancelled_at.is_some());

    let htg = desk.htg_balance().await;
    assert_eq!(htg.balance, dec!(1000500));
    assert_eq!(htg.reserved, Decimal::ZERO);

    let usd = desk.ledger.balance(&desk.usd_key()).await.unwrap().unwrap();
    assert_eq!(usd.balance, Decimal::ZERO);

    let movements = desk.ledger.movements(&desk.htg_key()).await.unwrap();
    let reversal = movements.last().unwrap();
    assert_eq!(reversal.movement_type, MovementType::Adjustment);
    assert_eq!(reversal.order_id, Some(order.id));
    assert_eq!(reversal.amount, dec!(13200));
    assert_eq!(reversal.balance_before, dec!(987300));
    assert_eq!(reversal.balance_after, dec!(1000500));

    assert!(desk.orders.commissions(order.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_terminal_states_reject_further_changes() {
    let desk = Desk::new(dec!(1000000)).await;
    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();
    desk.ledger
        .decrement(
            LedgerEntry::new(desk.htg_key(), MovementType::OrderOut, dec!(13200), "cash out")
                .for_order(order.id),
        )
        .await
        .unwrap();

    desk.orders.cancel(cancel(order.id, "first")).await.unwrap();
    let movements_after_cancel = desk.ledger.movements(&desk.htg_key()).await.unwrap().len();

    let again = desk.orders.cancel(cancel(order.id, "second")).await;
    assert!(matches!(
        again,
        Err(DomainError::InvalidStateTransition { entity: "order", .. })
    ));
    let completed = desk
        .orders
        .complete(complete(order.id, dec!(132), dec!(13200)))
        .await;
    assert!(matches!(completed, Err(DomainError::InvalidStateTransition { .. })));

    // No double reversal
    assert_eq!(
        desk.ledger.movements(&desk.htg_key()).await.unwrap().len(),
        movements_after_cancel
    );
    assert_eq!(desk.htg_balance().await.balance, dec!(1000000));

    let done = desk.orders.create(&desk.ctx, desk.order(dec!(10))).await.unwrap();
    desk.orders
        .complete(complete(done.id, dec!(132), dec!(1320)))
        .await
        .unwrap();
    assert!(matches!(
        desk.orders.cancel(cancel(done.id, "too late")).await,
        Err(DomainError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn test_insufficient_balance_leaves_no_rows() {
    let desk = Desk::new(dec!(1000)).await;

    match desk.orders.create(&desk.ctx, desk.order(dec!(100))).await {
        Err(DomainError::InsufficientBalance {
            currency,
            required,
            available,
            deficit,
        }) => {
            assert_eq!(currency, "HTG");
            assert_eq!(required, dec!(13200));
            assert_eq!(available, dec!(1000));
            assert_eq!(deficit, dec!(12200));
        }
        other => panic!("expected InsufficientBalance, got {:?}", other),
    }

    assert!(desk.orders.list(desk.house.id, None).await.unwrap().is_empty());
    let htg = desk.htg_balance().await;
    assert_eq!(htg.reserved, Decimal::ZERO);
    assert_eq!(htg.version, 1);
}

#[tokio::test]
async fn test_amount_limits_are_inclusive() {
    let desk = Desk::new(dec!(10000000)).await;

    assert!(desk.orders.create(&desk.ctx, desk.order(dec!(10))).await.is_ok());
    assert!(desk.orders.create(&desk.ctx, desk.order(dec!(5000))).await.is_ok());

    for amount in [dec!(9.99), dec!(5000.01)] {
        match desk.orders.create(&desk.ctx, desk.order(amount)).await {
            Err(DomainError::AmountOutOfRange { amount: a, min, max }) => {
                assert_eq!(a, amount);
                assert_eq!(min, dec!(10));
                assert_eq!(max, Some(dec!(5000)));
            }
            other => panic!("{} should be out of range, got {:?}", amount, other),
        }
    }

    assert!(matches!(
        desk.orders.create(&desk.ctx, desk.order(Decimal::ZERO)).await,
        Err(DomainError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_zero_commission_promo_waives_platform_share() {
    let desk = Desk::new(dec!(1000000)).await;
    desk.catalog.set_promo(desk.house.id, true, None).await.unwrap();

    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();
    assert_eq!(order.economics.platform_commission, Decimal::ZERO);
    assert_eq!(order.economics.platform_commission_rate, Decimal::ZERO);
    assert_eq!(order.economics.exchange_commission, order.economics.total_profit);

    // Turning the promo off later does not touch the agreed terms
    desk.catalog.set_promo(desk.house.id, false, None).await.unwrap();
    let completed = desk
        .orders
        .complete(complete(order.id, dec!(132), dec!(13200)))
        .await
        .unwrap();
    assert_eq!(completed.economics.platform_commission, Decimal::ZERO);

    let commissions = desk.orders.commissions(order.id).await.unwrap();
    let platform = commissions
        .iter()
        .find(|c| c.beneficiary == Beneficiary::Platform)
        .unwrap();
    assert_eq!(platform.amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_reservation_blocks_overdraw() {
    let desk = Desk::new(dec!(20000)).await;

    let first = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();
    assert!(matches!(
        desk.orders.create(&desk.ctx, desk.order(dec!(100))).await,
        Err(DomainError::InsufficientBalance { .. })
    ));

    desk.orders.cancel(cancel(first.id, "make room")).await.unwrap();
    assert!(desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.is_ok());
}

#[tokio::test]
async fn test_detached_pair_cannot_be_traded() {
    let desk = Desk::new(dec!(1000000)).await;
    desk.catalog.detach_pair(desk.house.id, desk.pair.id).await.unwrap();

    assert!(matches!(
        desk.orders.create(&desk.ctx, desk.order(dec!(100))).await,
        Err(DomainError::PairNotConfigured { .. })
    ));
    assert_eq!(desk.htg_balance().await.reserved, Decimal::ZERO);
}

#[tokio::test]
async fn test_completion_absorbs_slippage_into_house_margin() {
    let desk = Desk::new(dec!(1000000)).await;
    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();

    let completed = desk
        .orders
        .complete(complete(order.id, dec!(130), dec!(13000)))
        .await
        .unwrap();

    assert_eq!(completed.status, OrderStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(completed.quote_amount(), dec!(13000));
    assert_eq!(completed.actual_rate, Some(dec!(130)));
    assert_eq!(completed.reserved_amount, Decimal::ZERO);

    let slippage_base = (dec!(200) / dec!(130)).round_dp(8);
    assert_eq!(
        completed.economics.house_commission_amount,
        dec!(2) + slippage_base
    );
    // Platform share is insulated from slippage
    assert_eq!(completed.economics.platform_commission, dec!(1));
    assert_eq!(
        completed.actual_margin_percent,
        Some(completed.economics.margin_percent)
    );

    let house = desk
        .orders
        .commissions(order.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.beneficiary == Beneficiary::ExchangeHouse)
        .unwrap();
    assert_eq!(house.amount, completed.economics.exchange_commission);

    assert_eq!(desk.htg_balance().await.reserved, Decimal::ZERO);
}

#[tokio::test]
async fn test_failed_order_releases_reservation() {
    let desk = Desk::new(dec!(1000000)).await;
    let order = desk.orders.create(&desk.ctx, desk.order(dec!(100))).await.unwrap();

    let processing = desk
        .orders
        .update_status(order.id, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(processing.status, OrderStatus::Processing);
    assert_eq!(desk.htg_balance().await.reserved, dec!(13200));

    let failed = desk
        .orders
        .update_status(order.id, OrderStatus::Failed)
        .await
        .unwrap();
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(desk.htg_balance().await.reserved, Decimal::ZERO);

    assert!(matches!(
        desk.orders.cancel(cancel(order.id, "after failure")).await,
        Err(DomainError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        desk.orders.update_status(order.id, OrderStatus::Completed).await,
        Err(DomainError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_manual_selection_mismatch_reserves_nothing() {
    let desk = Desk::new(dec!(1000000)).await;
    let mut input = desk.order(dec!(100));
    input.payment_selection = PaymentSelection::Manual {
        inbound_id: desk.htg.id,
        outbound_id: desk.usd.id,
    };

    assert!(matches!(
        desk.orders.create(&desk.ctx, input).await,
        Err(DomainError::PaymentMethodMismatch { .. })
    ));
    assert_eq!(desk.htg_balance().await.reserved, Decimal::ZERO);

    // Automatic selection finds the funded till
    let mut input = desk.order(dec!(100));
    input.payment_selection = PaymentSelection::Automatic;
    let order = desk.orders.create(&desk.ctx, input).await.unwrap();
    assert_eq!(order.outbound_payment_method_id, desk.htg.id);
    assert_eq!(order.inbound_payment_method_id, desk.usd.id);
}

#[tokio::test]
async fn test_customer_metrics_follow_orders() {
    let desk = Desk::new(dec!(1000000)).await;
    let customer = desk
        .catalog
        .create_customer(desk.house.id, "Jean Baptiste")
        .await
        .unwrap();

    let mut input = desk.order(dec!(100));
    input.customer_id = Some(customer.id);
    let kept = desk.orders.create(&desk.ctx, input).await.unwrap();

    let mut input = desk.order(dec!(40));
    input.customer_id = Some(customer.id);
    let dropped = desk.orders.create(&desk.ctx, input).await.unwrap();
    desk.orders.cancel(cancel(dropped.id, "changed mind")).await.unwrap();
    desk.orders
        .complete(complete(kept.id, dec!(132), dec!(13200)))
        .await
        .unwrap();

    let mut conn = desk.pool.acquire().await.unwrap();
    let customer = customer_repository::find_customer(&mut conn, customer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(customer.total_orders, 1);
    assert_eq!(customer.total_volume, dec!(100));
    assert!(customer.last_order_at.is_some());

    let activities = customer_repository::list_activities(&mut conn, customer.id)
        .await
        .unwrap();
    assert_eq!(activities.len(), 4);
    assert_eq!(activities[3].order_id, Some(kept.id));
}

#[tokio::test]
async fn test_foreign_customer_is_rejected() {
    let desk = Desk::new(dec!(1000000)).await;
    let rival = desk.catalog.create_exchange_house("Rival").await.unwrap();
    let stranger = desk.catalog.create_customer(rival.id, "Stranger").await.unwrap();

    let mut input = desk.order(dec!(100));
    input.customer_id = Some(stranger.id);
    assert!(matches!(
        desk.orders.create(&desk.ctx, input).await,
        Err(DomainError::NotFound { entity: "customer", .. })
    ));
}

#[tokio::test]
async fn test_unbounded_pair_rejects_amount_beyond_decimal_range() {
    let desk = Desk::new(dec!(1000000)).await;
    let pair = desk
        .catalog
        .create_currency_pair("EUR", "HTG", dec!(10000), dec!(1), None)
        .await
        .unwrap();
    desk.catalog
        .configure_pair(
            desk.house.id,
            pair.id,
            PairSettings {
                policy: CommissionPolicy::Percentage { percent: dec!(2) },
                min_amount: dec!(1),
                max_amount: None,
                is_active: true,
            },
        )
        .await
        .unwrap();

    let mut input = desk.order(dec!(10000000000000000000000000));
    input.currency_pair_id = pair.id;

    assert!(matches!(
        desk.orders.create(&desk.ctx, input).await,
        Err(DomainError::InvalidInput(_))
    ));
    assert_eq!(desk.htg_balance().await.reserved, Decimal::ZERO);
}

#[tokio::test]
async fn test_money_scale_applies_to_economics_and_commission_rates() {
    let desk = Desk::new(dec!(1000000)).await;
    desk.catalog
        .configure_pair(
            desk.house.id,
            desk.pair.id,
            PairSettings {
                policy: CommissionPolicy::Spread {
                    buy_rate: dec!(290),
                    sell_rate: dec!(298),
                },
                min_amount: dec!(10),
                max_amount: Some(dec!(5000)),
                is_active: true,
            },
        )
        .await
        .unwrap();

    let config = EngineConfig {
        money_scale: 2,
        ..EngineConfig::default()
    };
    let orders = OrderLifecycleService::new(
        desk.pool.clone(),
        config.calculator(),
        Arc::new(StaticSettings::new(PLATFORM_RATE)),
    );

    // 30 USD at a 8 HTG spread: 240 HTG, 0.827586... USD at the buy rate
    let order = orders.create(&desk.ctx, desk.order(dec!(30))).await.unwrap();
    assert_eq!(order.economics.spread_profit_base, dec!(0.83));
    assert_eq!(order.economics.platform_commission, dec!(0.3));
    assert_eq!(order.economics.exchange_commission, dec!(0.53));

    let house = orders
        .commissions(order.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.beneficiary == Beneficiary::ExchangeHouse)
        .unwrap();
    assert_eq!(house.rate_percent, dec!(1.77));
}
