//! Payment Method Selector
//!
//! Resolves the two instruments funding an order: the inbound method receives
//! the base currency from the customer, the outbound method pays the quote
//! currency out. Read-only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::domain::entities::currency_pair::CurrencyPair;
use crate::domain::entities::exchange_house::OperatorContext;
use crate::domain::entities::ledger::BalanceKey;
use crate::domain::entities::payment_method::PaymentMethod;
use crate::domain::errors::{DomainError, DomainResult};
use crate::persistence::{catalog_repository, ledger_repository};

/// How the caller wants the payment methods chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaymentSelection {
    /// Pick the best-funded active method per currency
    Automatic,
    /// Use exactly these methods
    Manual { inbound_id: i64, outbound_id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPaymentMethods {
    pub inbound: PaymentMethod,
    pub outbound: PaymentMethod,
}

pub struct PaymentMethodSelector;

impl PaymentMethodSelector {
    pub async fn select(
        conn: &mut SqliteConnection,
        ctx: &OperatorContext,
        pair: &CurrencyPair,
        selection: PaymentSelection,
    ) -> DomainResult<SelectedPaymentMethods> {
        let selected = match selection {
            PaymentSelection::Manual {
                inbound_id,
                outbound_id,
            } => SelectedPaymentMethods {
                inbound: manual(conn, ctx, inbound_id, &pair.base_currency, "inbound").await?,
                outbound: manual(conn, ctx, outbound_id, &pair.quote_currency, "outbound").await?,
            },
            PaymentSelection::Automatic => SelectedPaymentMethods {
                inbound: automatic(conn, ctx, &pair.base_currency).await?,
                outbound: automatic(conn, ctx, &pair.quote_currency).await?,
            },
        };

        debug!(
            "Selected payment methods for {}: in={} out={}",
            pair.symbol(),
            selected.inbound.id,
            selected.outbound.id
        );
        Ok(selected)
    }
}

async fn manual(
    conn: &mut SqliteConnection,
    ctx: &OperatorContext,
    method_id: i64,
    currency: &str,
    side: &str,
) -> DomainResult<PaymentMethod> {
    let mismatch = |reason: String| DomainError::PaymentMethodMismatch { reason };

    let method = catalog_repository::find_payment_method(conn, method_id)
        .await?
        .ok_or_else(|| mismatch(format!("{} method {} does not exist", side, method_id)))?;

    if method.exchange_house_id != ctx.exchange_house_id {
        return Err(mismatch(format!(
            "{} method {} belongs to another exchange house",
            side, method_id
        )));
    }
    if !method.is_active {
        return Err(mismatch(format!("{} method {} is inactive", side, method_id)));
    }
    if method.currency != currency {
        return Err(mismatch(format!(
            "{} method {} holds {}, expected {}",
            side, method_id, method.currency, currency
        )));
    }
    Ok(method)
}

async fn automatic(
    conn: &mut SqliteConnection,
    ctx: &OperatorContext,
    currency: &str,
) -> DomainResult<PaymentMethod> {
    let candidates =
        catalog_repository::list_active_methods(conn, ctx.exchange_house_id, currency).await?;

    // Ranked on exact decimals; ties keep the listing order (default, then oldest)
    let mut best: Option<(Decimal, PaymentMethod)> = None;
    for method in candidates {
        let key = BalanceKey::new(ctx.operator_id, method.id, currency);
        let available = ledger_repository::find_balance(conn, &key)
            .await?
            .map_or(Decimal::ZERO, |balance| balance.available());
        if best.as_ref().map_or(true, |(top, _)| available > *top) {
            best = Some((available, method));
        }
    }

    best.map(|(_, method)| method)
        .ok_or_else(|| DomainError::PaymentMethodUnavailable {
            currency: currency.to_string(),
        })
}
