//! Commission Accrual & Payout Workflow
//!
//! Platform commissions of completed orders accrue per exchange house. A
//! payout request claims every unclaimed row completed inside its period, so
//! the same commission can never sit in two open requests. Rejection returns
//! the rows to the pool; payment marks them paid and writes a summary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::domain::entities::commission::{
    BankDetails, CommissionPayment, CommissionPaymentRequest, PaymentRequestStatus,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::persistence::{commission_repository, payout_repository, DbPool};

/// Requestable commission for one house
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccruedSummary {
    pub exchange_house_id: i64,
    /// Unclaimed platform commission, available for a new request
    pub requestable: Decimal,
    pub commission_count: usize,
    /// Amount held by pending or approved requests
    pub in_open_requests: Decimal,
}

pub struct CommissionPayoutService {
    pool: DbPool,
}

impl CommissionPayoutService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Accrued platform commission, optionally limited to orders completed in `period`
    pub async fn accrued_summary(
        &self,
        exchange_house_id: i64,
        period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> DomainResult<AccruedSummary> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;

        let unclaimed = commission_repository::unclaimed_platform_commissions(
            &mut conn,
            exchange_house_id,
            period,
        )
        .await?;
        let requests = payout_repository::list_requests(&mut conn, exchange_house_id).await?;
        let in_open_requests: Decimal = requests
            .iter()
            .filter(|request| request.status.is_open())
            .map(|request| request.amount)
            .sum();

        Ok(AccruedSummary {
            exchange_house_id,
            requestable: unclaimed.iter().map(|c| c.amount).sum(),
            commission_count: unclaimed.len(),
            in_open_requests,
        })
    }

    /// Open a payout request for everything accrued in `period` and not yet claimed
    pub async fn request_payment(
        &self,
        exchange_house_id: i64,
        period: (DateTime<Utc>, DateTime<Utc>),
        requested_by: i64,
        bank_details: BankDetails,
    ) -> DomainResult<CommissionPaymentRequest> {
        if period.0 > period.1 {
            return Err(DomainError::InvalidInput(format!(
                "period start {} is after period end {}",
                period.0, period.1
            )));
        }

        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;

        let unclaimed = commission_repository::unclaimed_platform_commissions(
            &mut tx,
            exchange_house_id,
            Some(period),
        )
        .await?;
        let amount: Decimal = unclaimed.iter().map(|c| c.amount).sum();
        if amount <= Decimal::ZERO {
            return Err(DomainError::InsufficientAccruedCommission {
                requested: amount,
                available: Decimal::ZERO,
            });
        }

        let request = payout_repository::insert_request(
            &mut tx,
            exchange_house_id,
            amount,
            period,
            requested_by,
            &bank_details,
        )
        .await?;

        let ids: Vec<i64> = unclaimed.iter().map(|c| c.id).collect();
        let claimed = commission_repository::claim_for_request(&mut tx, request.id, &ids).await?;
        if claimed != ids.len() as u64 {
            warn!(
                "Payment request {} claimed {} of {} commissions",
                request.id,
                claimed,
                ids.len()
            );
            return Err(DomainError::InvalidInput(
                "commissions were claimed by another request, retry".to_string(),
            ));
        }

        tx.commit().await.map_err(DomainError::from)?;

        info!(
            "Payment request {} opened for house {}: {} over {} commissions",
            request.id, exchange_house_id, amount, claimed
        );
        Ok(request)
    }

    pub async fn approve(
        &self,
        request_id: i64,
        actor_id: i64,
    ) -> DomainResult<CommissionPaymentRequest> {
        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let request = load_request(&mut tx, request_id).await?;
        ensure_transition(&request, PaymentRequestStatus::Approved)?;

        let approved = payout_repository::approve_request(&mut tx, request_id, actor_id)
            .await?
            .ok_or_else(|| transition_error(&request, PaymentRequestStatus::Approved))?;

        tx.commit().await.map_err(DomainError::from)?;
        info!("Payment request {} approved by {}", request_id, actor_id);
        Ok(approved)
    }

    pub async fn reject(
        &self,
        request_id: i64,
        actor_id: i64,
        reason: &str,
    ) -> DomainResult<CommissionPaymentRequest> {
        if reason.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "a rejection reason is required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let request = load_request(&mut tx, request_id).await?;
        ensure_transition(&request, PaymentRequestStatus::Rejected)?;

        let rejected = payout_repository::reject_request(&mut tx, request_id, actor_id, reason)
            .await?
            .ok_or_else(|| transition_error(&request, PaymentRequestStatus::Rejected))?;
        let released = commission_repository::release_request(&mut tx, request_id).await?;

        tx.commit().await.map_err(DomainError::from)?;
        info!(
            "Payment request {} rejected by {} ({} commissions released): {}",
            request_id, actor_id, released, reason
        );
        Ok(rejected)
    }

    /// Settle an approved request
    pub async fn mark_paid(
        &self,
        request_id: i64,
        actor_id: i64,
        reference: Option<&str>,
    ) -> DomainResult<(CommissionPaymentRequest, CommissionPayment)> {
        let mut tx = self.pool.begin().await.map_err(DomainError::from)?;
        let request = load_request(&mut tx, request_id).await?;
        ensure_transition(&request, PaymentRequestStatus::Paid)?;

        let paid_at = Utc::now();
        let paid =
            payout_repository::mark_request_paid(&mut tx, request_id, actor_id, reference, paid_at)
                .await?
                .ok_or_else(|| transition_error(&request, PaymentRequestStatus::Paid))?;

        let covered = commission_repository::list_for_request(&mut tx, request_id).await?;
        let total: Decimal = covered.iter().map(|c| c.amount).sum();
        if total != paid.amount {
            warn!(
                "Payment request {} amount {} differs from covered commissions {}",
                request_id, paid.amount, total
            );
        }
        commission_repository::mark_request_paid(&mut tx, request_id, paid_at).await?;

        let payment = payout_repository::insert_payment(
            &mut tx,
            &paid,
            total,
            covered.len() as i64,
            paid_at,
        )
        .await?;

        tx.commit().await.map_err(DomainError::from)?;
        info!(
            "Payment request {} paid by {}: {} over {} commissions",
            request_id,
            actor_id,
            total,
            covered.len()
        );
        Ok((paid, payment))
    }

    pub async fn get(&self, request_id: i64) -> DomainResult<CommissionPaymentRequest> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        load_request(&mut conn, request_id).await
    }

    pub async fn list(
        &self,
        exchange_house_id: i64,
    ) -> DomainResult<Vec<CommissionPaymentRequest>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(payout_repository::list_requests(&mut conn, exchange_house_id).await?)
    }

    pub async fn payment_for(&self, request_id: i64) -> DomainResult<Option<CommissionPayment>> {
        let mut conn = self.pool.acquire().await.map_err(DomainError::from)?;
        Ok(payout_repository::find_payment_for_request(&mut conn, request_id).await?)
    }
}

async fn load_request(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> DomainResult<CommissionPaymentRequest> {
    payout_repository::find_request(conn, request_id)
        .await?
        .ok_or(DomainError::NotFound {
            entity: "payment request",
            id: request_id,
        })
}

fn transition_error(request: &CommissionPaymentRequest, to: PaymentRequestStatus) -> DomainError {
    DomainError::InvalidStateTransition {
        entity: "payment request",
        id: request.id,
        from: request.status.to_string(),
        to: to.to_string(),
    }
}

fn ensure_transition(
    request: &CommissionPaymentRequest,
    to: PaymentRequestStatus,
) -> DomainResult<()> {
    if request.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(transition_error(request, to))
    }
}
