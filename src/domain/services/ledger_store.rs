//! Ledger Store - the only writer of operator cash balances
//!
//! Every balance change is paired, in the same transaction, with exactly one
//! appended `CashMovement` recording the balance before and after. Rows are
//! guarded by an optimistic version column: a write that lost a race fails
//! with `ConcurrentModification` and the caller may retry.
//!
//! Reservations move the `reserved` column only. They never change the
//! recorded cash, so they write no movement.
//!
//! Methods on `LedgerStore` run in their own transaction. The associated
//! functions taking a `SqliteConnection` are for callers that already hold a
//! transaction, such as the order lifecycle.

use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::domain::entities::ledger::{
    BalanceKey, CashMovement, LedgerAudit, MovementType, NewCashMovement, OperatorCashBalance,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::amount::Amount;
use crate::persistence::{ledger_repository, DbPool};

/// Whether a mutation may take the balance below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    NonNegative,
    Unguarded,
}

/// One requested balance change
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub key: BalanceKey,
    pub movement_type: MovementType,
    /// Magnitude of the change, always positive
    pub amount: Decimal,
    pub description: String,
    pub order_id: Option<i64>,
}

impl LedgerEntry {
    pub fn new(
        key: BalanceKey,
        movement_type: MovementType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key,
            movement_type,
            amount,
            description: description.into(),
            order_id: None,
        }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

#[derive(Clone)]
pub struct LedgerStore {
    pool: DbPool,
}

impl LedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Add cash to a balance. Unguarded.
    pub async fn increment(&self, entry: LedgerEntry) -> DomainResult<CashMovement> {
        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let movement = Self::increment_in(&mut tx, &entry).await?;
        tx.commit().await.map_err(DomainError::from)?;
        Ok(movement)
    }

    /// Remove cash from a balance, refusing to go below zero
    pub async fn decrement(&self, entry: LedgerEntry) -> DomainResult<CashMovement> {
        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let movement = Self::decrement_in(&mut tx, &entry).await?;
        tx.commit().await.map_err(DomainError::from)?;
        Ok(movement)
    }

    pub async fn balance(&self, key: &BalanceKey) -> DomainResult<Option<OperatorCashBalance>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(ledger_repository::find_balance(&mut conn, key).await?)
    }

    /// Movement history of one balance, oldest first
    pub async fn movements(&self, key: &BalanceKey) -> DomainResult<Vec<CashMovement>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(ledger_repository::movements_for_key(&mut conn, key).await?)
    }

    pub async fn movements_for_order(&self, order_id: i64) -> DomainResult<Vec<CashMovement>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(ledger_repository::movements_for_order(&mut conn, order_id).await?)
    }

    /// Check one balance against its movement history
    pub async fn verify(&self, key: &BalanceKey) -> DomainResult<LedgerAudit> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let stored = ledger_repository::find_balance(&mut conn, key)
            .await?
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO);
        let movements = ledger_repository::movements_for_key(&mut conn, key).await?;
        Ok(audit(key.clone(), stored, &movements))
    }

    /// Audit every balance row
    pub async fn audit_all(&self) -> DomainResult<Vec<LedgerAudit>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        let balances = ledger_repository::list_balances(&mut conn).await?;

        let mut audits = Vec::with_capacity(balances.len());
        for balance in balances {
            let key = balance.key();
            let movements = ledger_repository::movements_for_key(&mut conn, &key).await?;
            let result = audit(key, balance.balance, &movements);
            if !result.is_consistent() {
                warn!(
                    "Ledger inconsistency on {}: stored {}, last movement {:?}, {} broken movements",
                    result.key,
                    result.stored_balance,
                    result.last_balance_after,
                    result.broken_movements.len()
                );
            }
            audits.push(result);
        }

        info!("Audited {} cash balances", audits.len());
        Ok(audits)
    }

    /// Increment inside the caller's transaction
    pub async fn increment_in(
        conn: &mut SqliteConnection,
        entry: &LedgerEntry,
    ) -> DomainResult<CashMovement> {
        Amount::positive(entry.amount)?;
        if !entry.movement_type.is_inflow() {
            return Err(DomainError::InvalidInput(format!(
                "{} movements cannot credit a balance",
                entry.movement_type
            )));
        }
        apply(conn, entry, entry.amount, Guard::Unguarded).await
    }

    /// Decrement inside the caller's transaction
    pub async fn decrement_in(
        conn: &mut SqliteConnection,
        entry: &LedgerEntry,
    ) -> DomainResult<CashMovement> {
        Amount::positive(entry.amount)?;
        if !entry.movement_type.is_outflow() {
            return Err(DomainError::InvalidInput(format!(
                "{} movements cannot debit a balance",
                entry.movement_type
            )));
        }
        apply(conn, entry, -entry.amount, Guard::NonNegative).await
    }

    /// Hold `amount` of a balance for a pending order.
    ///
    /// Fails with `InsufficientBalance` when the available balance
    /// (balance minus existing reservations) is smaller than `amount`.
    pub async fn reserve(
        conn: &mut SqliteConnection,
        key: &BalanceKey,
        amount: Decimal,
    ) -> DomainResult<OperatorCashBalance> {
        let current = ledger_repository::find_balance(conn, key).await?;
        let available = current.as_ref().map_or(Decimal::ZERO, |b| b.available());
        if available < amount {
            return Err(DomainError::insufficient_balance(&key.currency, amount, available));
        }

        // Only a zero reservation gets here without a row
        let current = match current {
            Some(balance) => balance,
            None => ledger_repository::ensure_balance(conn, key).await?,
        };

        let reserved = current.reserved + amount;
        cas_write(conn, &current, current.balance, reserved).await?;
        debug!("Reserved {} on {} (now {} reserved)", amount, key, reserved);

        Ok(OperatorCashBalance {
            reserved,
            version: current.version + 1,
            ..current
        })
    }

    /// Give back a reservation. Releasing more than is held clamps to zero.
    pub async fn release(
        conn: &mut SqliteConnection,
        key: &BalanceKey,
        amount: Decimal,
    ) -> DomainResult<()> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let Some(current) = ledger_repository::find_balance(conn, key).await? else {
            warn!("Release of {} on {} without a balance row", amount, key);
            return Ok(());
        };

        let reserved = (current.reserved - amount).max(Decimal::ZERO);
        cas_write(conn, &current, current.balance, reserved).await?;
        debug!("Released {} on {} (now {} reserved)", amount, key, reserved);
        Ok(())
    }

    /// Append an offsetting adjustment for every movement tagged with `order_id`.
    ///
    /// Each offset is applied at the balance current at reversal time, so
    /// activity recorded since the order was created is preserved.
    pub async fn reverse_order_movements(
        conn: &mut SqliteConnection,
        order_id: i64,
        reason: &str,
    ) -> DomainResult<Vec<CashMovement>> {
        let originals = ledger_repository::movements_for_order(conn, order_id).await?;

        let mut reversals = Vec::with_capacity(originals.len());
        for original in &originals {
            let entry = LedgerEntry {
                key: original.key(),
                movement_type: MovementType::Adjustment,
                amount: original.amount.abs(),
                description: format!("Reversal of movement #{}: {}", original.id, reason),
                order_id: Some(order_id),
            };
            let reversal = apply(conn, &entry, -original.amount, Guard::Unguarded).await?;
            reversals.push(reversal);
        }

        if !reversals.is_empty() {
            info!("Reversed {} movements of order {}", reversals.len(), order_id);
        }
        Ok(reversals)
    }
}

/// Change a balance by `delta` and record the movement
async fn apply(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
    delta: Decimal,
    guard: Guard,
) -> DomainResult<CashMovement> {
    let current = ledger_repository::ensure_balance(conn, &entry.key).await?;
    let balance_after = current.balance + delta;

    if guard == Guard::NonNegative && balance_after < Decimal::ZERO {
        return Err(DomainError::insufficient_balance(
            &entry.key.currency,
            -delta,
            current.balance,
        ));
    }

    cas_write(conn, &current, balance_after, current.reserved).await?;

    let movement = ledger_repository::insert_movement(
        conn,
        &NewCashMovement {
            key: entry.key.clone(),
            order_id: entry.order_id,
            movement_type: entry.movement_type,
            amount: delta,
            balance_before: current.balance,
            balance_after,
            description: entry.description.clone(),
        },
    )
    .await?;

    Ok(movement)
}

async fn cas_write(
    conn: &mut SqliteConnection,
    current: &OperatorCashBalance,
    balance: Decimal,
    reserved: Decimal,
) -> DomainResult<()> {
    let written =
        ledger_repository::write_balance(conn, current.id, current.version, balance, reserved)
            .await?;
    if !written {
        warn!("Lost update on cash balance {} (version {})", current.id, current.version);
        return Err(DomainError::ConcurrentModification {
            balance_id: current.id,
        });
    }
    Ok(())
}

/// Compare a stored balance with its movement history
pub fn audit(key: BalanceKey, stored_balance: Decimal, movements: &[CashMovement]) -> LedgerAudit {
    LedgerAudit {
        key,
        stored_balance,
        last_balance_after: movements.last().map(|m| m.balance_after),
        movement_count: movements.len(),
        broken_movements: movements
            .iter()
            .filter(|m| !m.is_consistent())
            .map(|m| m.id)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::payment_method::PaymentMethodType;
    use crate::persistence::models::{CreateExchangeHouse, CreatePaymentMethod};
    use crate::persistence::{catalog_repository, init_database, DatabaseConfig};
    use rust_decimal_macros::dec;

    async fn setup() -> (LedgerStore, DbPool, BalanceKey) {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let house = catalog_repository::insert_exchange_house(
            &mut conn,
            &CreateExchangeHouse {
                name: "Maison Change".to_string(),
                zero_commission_promo: false,
                promo_expires_at: None,
            },
        )
        .await
        .unwrap();
        let method = catalog_repository::insert_payment_method(
            &mut conn,
            &CreatePaymentMethod {
                exchange_house_id: house.id,
                name: "Till".to_string(),
                method_type: PaymentMethodType::Cash,
                currency: "HTG".to_string(),
                is_default: true,
                min_amount: None,
                max_amount: None,
                daily_limit: None,
            },
        )
        .await
        .unwrap();
        drop(conn);

        let key = BalanceKey::new(7, method.id, "HTG");
        (LedgerStore::new(pool.clone()), pool, key)
    }

    fn deposit(key: &BalanceKey, amount: Decimal) -> LedgerEntry {
        LedgerEntry::new(key.clone(), MovementType::Deposit, amount, "cash in")
    }

    #[tokio::test]
    async fn test_increment_records_before_and_after() {
        let (ledger, _pool, key) = setup().await;

        let first = ledger.increment(deposit(&key, dec!(1000))).await.unwrap();
        assert_eq!(first.balance_before, dec!(0));
        assert_eq!(first.balance_after, dec!(1000));

        let second = ledger.increment(deposit(&key, dec!(250.5))).await.unwrap();
        assert_eq!(second.balance_before, dec!(1000));
        assert_eq!(second.balance_after, dec!(1250.5));

        let balance = ledger.balance(&key).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(1250.5));
        assert!(ledger.verify(&key).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_decrement_refuses_to_go_negative() {
        let (ledger, _pool, key) = setup().await;
        ledger.increment(deposit(&key, dec!(100))).await.unwrap();

        let withdrawal =
            LedgerEntry::new(key.clone(), MovementType::Withdrawal, dec!(150), "payout");
        match ledger.decrement(withdrawal).await {
            Err(DomainError::InsufficientBalance {
                required,
                available,
                deficit,
                ..
            }) => {
                assert_eq!(required, dec!(150));
                assert_eq!(available, dec!(100));
                assert_eq!(deficit, dec!(50));
            }
            other => panic!("expected InsufficientBalance, got {:?}", other),
        }

        // Nothing written
        assert_eq!(ledger.movements(&key).await.unwrap().len(), 1);
        assert_eq!(ledger.balance(&key).await.unwrap().unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn test_decrement_to_exactly_zero() {
        let (ledger, _pool, key) = setup().await;
        ledger.increment(deposit(&key, dec!(100))).await.unwrap();

        let out = LedgerEntry::new(key.clone(), MovementType::Withdrawal, dec!(100), "all");
        let movement = ledger.decrement(out).await.unwrap();
        assert_eq!(movement.amount, dec!(-100));
        assert_eq!(movement.balance_after, dec!(0));
    }

    #[tokio::test]
    async fn test_rejects_wrong_direction_and_non_positive_amounts() {
        let (ledger, _pool, key) = setup().await;

        let wrong = LedgerEntry::new(key.clone(), MovementType::Withdrawal, dec!(5), "x");
        assert!(matches!(
            ledger.increment(wrong).await,
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.increment(deposit(&key, dec!(0))).await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_reservation_limits_available_balance() {
        let (ledger, pool, key) = setup().await;
        ledger.increment(deposit(&key, dec!(500))).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        LedgerStore::reserve(&mut tx, &key, dec!(300)).await.unwrap();
        let second = LedgerStore::reserve(&mut tx, &key, dec!(300)).await;
        assert!(matches!(second, Err(DomainError::InsufficientBalance { .. })));
        LedgerStore::release(&mut tx, &key, dec!(300)).await.unwrap();
        LedgerStore::reserve(&mut tx, &key, dec!(500)).await.unwrap();
        tx.commit().await.unwrap();

        let balance = ledger.balance(&key).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(500));
        assert_eq!(balance.reserved, dec!(500));
        assert_eq!(balance.available(), dec!(0));
        // Reservations write no movements
        assert_eq!(ledger.movements(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reserve_on_missing_balance_fails() {
        let (_ledger, pool, key) = setup().await;
        let mut tx = pool.begin().await.unwrap();
        let result = LedgerStore::reserve(&mut tx, &key, dec!(1)).await;
        assert!(matches!(result, Err(DomainError::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_reversal_is_relative_to_current_balance() {
        let (ledger, pool, key) = setup().await;
        ledger.increment(deposit(&key, dec!(1000))).await.unwrap();

        // Order 1 pays out 300, then unrelated cash comes in
        let payout = LedgerEntry::new(key.clone(), MovementType::OrderOut, dec!(300), "order 1")
            .for_order(1);
        ledger.decrement(payout).await.unwrap();
        ledger.increment(deposit(&key, dec!(50))).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let reversals = LedgerStore::reverse_order_movements(&mut tx, 1, "customer left")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(reversals.len(), 1);
        assert_eq!(reversals[0].amount, dec!(300));
        assert_eq!(reversals[0].balance_before, dec!(750));
        assert_eq!(reversals[0].balance_after, dec!(1050));
        assert_eq!(reversals[0].movement_type, MovementType::Adjustment);

        let balance = ledger.balance(&key).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(1050));
        assert!(ledger.verify(&key).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_stale_version_is_a_concurrent_modification() {
        let (ledger, pool, key) = setup().await;
        ledger.increment(deposit(&key, dec!(10))).await.unwrap();
        let stale = ledger.balance(&key).await.unwrap().unwrap();
        ledger.increment(deposit(&key, dec!(10))).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let result = cas_write(&mut conn, &stale, dec!(0), dec!(0)).await;
        match result {
            Err(e @ DomainError::ConcurrentModification { .. }) => assert!(e.is_retryable()),
            other => panic!("expected ConcurrentModification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audit_flags_tampered_balance() {
        let (ledger, pool, key) = setup().await;
        ledger.increment(deposit(&key, dec!(10))).await.unwrap();

        sqlx::query("UPDATE operator_cash_balances SET balance = '999'")
            .execute(&pool)
            .await
            .unwrap();

        let audits = ledger.audit_all().await.unwrap();
        assert_eq!(audits.len(), 1);
        assert!(!audits[0].is_consistent());
        assert_eq!(audits[0].last_balance_after, Some(dec!(10)));
    }
}
