//! Shared desk fixture: one exchange house trading USD/HTG with a funded
//! HTG float, backed by an in-memory database.

#![allow(dead_code)]

use std::sync::Arc;

use fxdesk::config::EngineConfig;
use fxdesk::domain::entities::currency_pair::{CommissionPolicy, CurrencyPair};
use fxdesk::domain::entities::exchange_house::{ExchangeHouse, OperatorContext};
use fxdesk::domain::entities::ledger::{BalanceKey, MovementType, OperatorCashBalance};
use fxdesk::domain::entities::payment_method::{PaymentMethod, PaymentMethodType};
use fxdesk::domain::repositories::settings_provider::StaticSettings;
use fxdesk::domain::services::ledger_store::{LedgerEntry, LedgerStore};
use fxdesk::domain::services::order_lifecycle::{CreateOrder, OrderLifecycleService};
use fxdesk::domain::services::pair_configuration::{PairConfigurationService, PairSettings};
use fxdesk::domain::services::payment_method_selector::PaymentSelection;
use fxdesk::persistence::models::CreatePaymentMethod;
use fxdesk::persistence::{init_database, DatabaseConfig, DbPool};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const OPERATOR_ID: i64 = 7;
pub const PLATFORM_RATE: Decimal = Decimal::ONE;

pub struct Desk {
    pub pool: DbPool,
    pub catalog: PairConfigurationService,
    pub orders: OrderLifecycleService,
    pub ledger: LedgerStore,
    pub house: ExchangeHouse,
    pub pair: CurrencyPair,
    pub usd: PaymentMethod,
    pub htg: PaymentMethod,
    pub ctx: OperatorContext,
}

impl Desk {
    /// USD/HTG at 132, pair limits 10..=5000, house takes 2% and the HTG till holds `float`
    pub async fn new(float: Decimal) -> Desk {
        let pool = init_database(&DatabaseConfig::in_memory())
            .await
            .expect("database");
        let catalog = PairConfigurationService::new(pool.clone());

        let house = catalog.create_exchange_house("Maison Change").await.unwrap();
        let pair = catalog
            .create_currency_pair("USD", "HTG", dec!(132), dec!(10), Some(dec!(5000)))
            .await
            .unwrap();
        catalog
            .configure_pair(
                house.id,
                pair.id,
                PairSettings {
                    policy: CommissionPolicy::Percentage { percent: dec!(2) },
                    min_amount: dec!(10),
                    max_amount: Some(dec!(5000)),
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let usd = catalog
            .create_payment_method(method(house.id, "USD counter", "USD"))
            .await
            .unwrap();
        let htg = catalog
            .create_payment_method(method(house.id, "HTG till", "HTG"))
            .await
            .unwrap();

        let orders = OrderLifecycleService::new(
            pool.clone(),
            EngineConfig::default().calculator(),
            Arc::new(StaticSettings::new(PLATFORM_RATE)),
        );
        let ledger = LedgerStore::new(pool.clone());

        let desk = Desk {
            pool,
            catalog,
            orders,
            ledger,
            ctx: OperatorContext {
                operator_id: OPERATOR_ID,
                exchange_house_id: house.id,
            },
            house,
            pair,
            usd,
            htg,
        };
        if float > Decimal::ZERO {
            desk.deposit_htg(float).await;
        }
        desk
    }

    pub fn usd_key(&self) -> BalanceKey {
        BalanceKey::new(OPERATOR_ID, self.usd.id, "USD")
    }

    pub fn htg_key(&self) -> BalanceKey {
        BalanceKey::new(OPERATOR_ID, self.htg.id, "HTG")
    }

    pub async fn deposit_htg(&self, amount: Decimal) {
        self.ledger
            .increment(LedgerEntry::new(
                self.htg_key(),
                MovementType::Deposit,
                amount,
                "float top-up",
            ))
            .await
            .unwrap();
    }

    pub async fn htg_balance(&self) -> OperatorCashBalance {
        self.ledger
            .balance(&self.htg_key())
            .await
            .unwrap()
            .expect("HTG balance row")
    }

    pub fn order(&self, base_amount: Decimal) -> CreateOrder {
        CreateOrder {
            currency_pair_id: self.pair.id,
            base_amount,
            customer_id: None,
            payment_selection: PaymentSelection::Manual {
                inbound_id: self.usd.id,
                outbound_id: self.htg.id,
            },
            notes: None,
        }
    }
}

fn method(exchange_house_id: i64, name: &str, currency: &str) -> CreatePaymentMethod {
    CreatePaymentMethod {
        exchange_house_id,
        name: name.to_string(),
        method_type: PaymentMethodType::Cash,
        currency: currency.to_string(),
        is_default: true,
        min_amount: None,
        max_amount: None,
        daily_limit: None,
    }
}
