//! Disbursement engine - loan creation, schedule expansion, voucher issue

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use super::model::{check_schedule, status_after_repayment, Loan, LoanDetails, LoanStatus};
use crate::error::{CreditError, CreditResult};
use crate::events::{CreditEvent, EventDispatcher};
use crate::identifier::IdentifierGenerator;
use crate::ledger::{LedgerService, WalletOwnerRef, WalletType};
use crate::offer::{CreditOffer, Installment};
use crate::repayment::{RepaymentSchedule, ScheduleStatus};

/// Loan service for managing loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
    identifiers: Arc<dyn IdentifierGenerator>,
    events: EventDispatcher,
}

impl LoanService {
    pub fn new(
        db_pool: PgPool,
        identifiers: Arc<dyn IdentifierGenerator>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            db_pool,
            identifiers,
            events,
        }
    }

    /// Create the loan and its schedule for an accepted offer.
    ///
    /// Runs inside the acceptance transaction. Any error leaves the caller
    /// holding a transaction that must be dropped, so a loan is never
    /// committed without its schedule.
    pub async fn create_from_offer_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        offer: &CreditOffer,
        installments: &[Installment],
    ) -> CreditResult<Loan> {
        let (start_date, end_date) = match (installments.first(), installments.last()) {
            (Some(first), Some(last)) => (first.due_date, last.due_date),
            _ => {
                return Err(CreditError::IntegrityViolation(format!(
                    "Offer {} has no repayment breakdown",
                    offer.reference
                )))
            }
        };
        let now = Utc::now();

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, business_id, customer_id, application_id, offer_id,
                capital_amount, interest_amount, total_amount,
                start_date, end_date, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(offer.business_id)
        .bind(offer.customer_id)
        .bind(offer.application_id)
        .bind(offer.id)
        .bind(offer.offer_amount)
        .bind(offer.interest_amount)
        .bind(offer.total_amount)
        .bind(start_date)
        .bind(end_date)
        .bind(LoanStatus::Pending)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if CreditError::is_unique_violation(&e) {
                CreditError::conflict(format!("Offer {} already has a loan", offer.reference))
            } else {
                e.into()
            }
        })?;

        if let Err(e) = check_schedule(loan.total_amount, installments) {
            tracing::error!(
                loan_id = %loan.id,
                offer = %offer.reference,
                total_amount = loan.total_amount,
                installments = installments.len(),
                error = %e,
                "Refusing to disburse loan with inconsistent schedule"
            );
            return Err(e);
        }

        for installment in installments {
            sqlx::query(
                r#"
                INSERT INTO repayment_schedules (
                    id, loan_id, sequence, due_date, principal, interest,
                    amount_paid, status, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(loan.id)
            .bind(installment.sequence)
            .bind(installment.due_date)
            .bind(installment.principal)
            .bind(installment.interest)
            .bind(ScheduleStatus::Pending)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }

        tracing::info!(
            loan_id = %loan.id,
            offer = %offer.reference,
            capital = loan.capital_amount,
            total = loan.total_amount,
            installments = installments.len(),
            "Loan created with repayment schedule"
        );

        Ok(loan)
    }

    pub async fn find_by_offer_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        offer_id: Uuid,
    ) -> CreditResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE offer_id = $1")
            .bind(offer_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(loan)
    }

    /// Lock a loan row. Serializes all schedule work on one loan.
    pub async fn lock_in_tx(tx: &mut Transaction<'_, Postgres>, loan_id: Uuid) -> CreditResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CreditError::not_found(format!("Loan {}", loan_id)))
    }

    pub async fn get_loan(&self, loan_id: &Uuid) -> CreditResult<LoanDetails> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(loan_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| CreditError::not_found(format!("Loan {}", loan_id)))?;

        let schedule = sqlx::query_as::<_, RepaymentSchedule>(
            "SELECT * FROM repayment_schedules WHERE loan_id = $1 ORDER BY due_date, sequence",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(LoanDetails { loan, schedule })
    }

    /// Issue the voucher and release the capital to the vendor's voucher wallet.
    ///
    /// The voucher is assigned exactly once; calling again returns the loan
    /// unchanged.
    pub async fn mark_disbursed(&self, loan_id: Uuid) -> CreditResult<Loan> {
        let mut tx = self.db_pool.begin().await?;
        let loan = Self::lock_in_tx(&mut tx, loan_id).await?;

        if loan.voucher_number.is_some() {
            tracing::info!(loan_id = %loan_id, "Loan already disbursed");
            return Ok(loan);
        }
        if loan.status != LoanStatus::Pending {
            return Err(CreditError::conflict(format!(
                "Loan {} is {:?} and cannot be disbursed",
                loan_id, loan.status
            )));
        }

        let voucher = self.identifiers.voucher_number();
        let now = Utc::now();

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = $1, voucher_number = $2, disbursed_at = $3, updated_at = $3
            WHERE id = $4 AND voucher_number IS NULL
            RETURNING *
            "#,
        )
        .bind(LoanStatus::Disbursed)
        .bind(&voucher)
        .bind(now)
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        let wallet = LedgerService::ensure_wallet_in_tx(
            &mut tx,
            WalletOwnerRef::business(loan.business_id),
            WalletType::CreditVoucher,
        )
        .await?;
        let narration = format!("Disbursement of loan {}", loan.id);
        LedgerService::post_entry_in_tx(
            &mut tx,
            wallet.id,
            loan.capital_amount,
            &format!("DSB-{}", voucher),
            Some(&narration),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %loan.id, voucher = %voucher, capital = loan.capital_amount, "Loan disbursed");

        self.events.publish(CreditEvent::LoanDisbursed {
            business_id: loan.business_id,
            loan_id: loan.id,
            voucher_number: voucher,
        });

        Ok(loan)
    }

    /// Move a loan along after an installment was paid or cancelled.
    /// Returns the new status.
    pub async fn refresh_status_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        loan: &Loan,
    ) -> CreditResult<LoanStatus> {
        let (open_rows,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM repayment_schedules WHERE loan_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(loan.id)
        .fetch_one(&mut **tx)
        .await?;

        let next = status_after_repayment(loan.status, open_rows);
        if next != loan.status {
            sqlx::query("UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(next)
                .bind(Utc::now())
                .bind(loan.id)
                .execute(&mut **tx)
                .await?;
            tracing::info!(loan_id = %loan.id, from = ?loan.status, to = ?next, "Loan status changed");
        }

        Ok(next)
    }
}
