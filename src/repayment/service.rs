//! Repayment processor - FIFO collection, settlement and manual payments

use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    allocate_payment, next_collectable, CollectionOutcome, ManualPaymentOutcome, ManualPaymentRequest,
    ReconcileReport, RepaymentChannel, RepaymentLogStatus, RepaymentSchedule, ScheduleStatus,
    SettleOutcome, SweepReport,
};
use crate::error::{CreditError, CreditResult};
use crate::events::{CreditEvent, EventDispatcher};
use crate::identifier::IdentifierGenerator;
use crate::ledger::{LedgerService, WalletOwnerRef, WalletType};
use crate::loan::{Loan, LoanService, LoanStatus};
use crate::mandate::MandateService;
use crate::providers::{DebitRequest, DebitResult, DebitStatus, MandateProvider};

/// Log row fields for one attempt
struct LogEntry<'a> {
    loan_id: Uuid,
    schedule_id: Option<Uuid>,
    amount_paid: i64,
    capital_paid: i64,
    interest_paid: i64,
    channel: RepaymentChannel,
    status: RepaymentLogStatus,
    provider_reference: Option<&'a str>,
    provider_response: Option<Value>,
}

#[derive(Clone)]
pub struct RepaymentService {
    db_pool: PgPool,
    provider: Arc<dyn MandateProvider>,
    identifiers: Arc<dyn IdentifierGenerator>,
    events: EventDispatcher,
}

impl RepaymentService {
    pub fn new(
        db_pool: PgPool,
        provider: Arc<dyn MandateProvider>,
        identifiers: Arc<dyn IdentifierGenerator>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            db_pool,
            provider,
            identifiers,
            events,
        }
    }

    /// PENDING rows due on `date`
    pub async fn get_repayments_due_on_date(
        &self,
        date: NaiveDate,
    ) -> CreditResult<Vec<RepaymentSchedule>> {
        let rows = sqlx::query_as::<_, RepaymentSchedule>(
            r#"
            SELECT * FROM repayment_schedules
            WHERE status = 'pending' AND due_date = $1
            ORDER BY loan_id, sequence
            "#,
        )
        .bind(date)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(rows)
    }

    async fn open_rows_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        loan_id: Uuid,
    ) -> CreditResult<Vec<RepaymentSchedule>> {
        let rows = sqlx::query_as::<_, RepaymentSchedule>(
            r#"
            SELECT * FROM repayment_schedules
            WHERE loan_id = $1 AND status IN ('pending', 'processing')
            ORDER BY due_date, sequence
            FOR UPDATE
            "#,
        )
        .bind(loan_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows)
    }

    /// Collect the oldest pending installment through the customer's mandate.
    ///
    /// The loan row lock serializes attempts per loan. The provider is
    /// called outside any transaction; an unknown outcome leaves the row
    /// PROCESSING for webhook reconciliation.
    pub async fn process_repayment_for_loan(&self, loan_id: Uuid) -> CreditResult<CollectionOutcome> {
        let mut tx = self.db_pool.begin().await?;
        let loan = LoanService::lock_in_tx(&mut tx, loan_id).await?;

        if !loan.status.is_collectable() {
            return Err(CreditError::conflict(format!(
                "Loan {} is {:?} and cannot be collected",
                loan_id, loan.status
            )));
        }

        let rows = Self::open_rows_in_tx(&mut tx, loan_id).await?;
        if let Some(in_flight) = rows.iter().find(|r| r.status == ScheduleStatus::Processing) {
            return Err(CreditError::conflict(format!(
                "Loan {} has a collection in flight ({})",
                loan_id,
                in_flight.collection_reference.as_deref().unwrap_or("unreferenced")
            )));
        }
        let Some(row) = next_collectable(&rows).cloned() else {
            return Ok(CollectionOutcome::NothingDue);
        };

        let mandate = MandateService::find_chargeable_in_tx(&mut tx, loan.customer_id, loan.business_id)
            .await?
            .ok_or(CreditError::MandateNotReady {
                customer_id: loan.customer_id,
                business_id: loan.business_id,
            })?;
        let authorization_code = mandate.authorization_code.clone().ok_or_else(|| {
            CreditError::conflict(format!("Mandate {} has no authorization code", mandate.reference))
        })?;

        let collection_reference = self.identifiers.collection_reference();
        let row = sqlx::query_as::<_, RepaymentSchedule>(
            r#"
            UPDATE repayment_schedules
            SET status = 'processing', collection_reference = $1, updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(&collection_reference)
        .bind(Utc::now())
        .bind(row.id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            schedule_id = %row.id,
            due_date = %row.due_date,
            reference = %collection_reference,
            amount = row.outstanding(),
            "Collecting installment"
        );

        let debit = self
            .provider
            .debit(&DebitRequest {
                authorization_code,
                amount: row.outstanding(),
                reference: collection_reference.clone(),
            })
            .await;

        match debit {
            Ok(result) => self.apply_debit_result(&collection_reference, row, result).await,
            Err(e) if e.is_outcome_unknown() => {
                tracing::warn!(
                    reference = %collection_reference,
                    error = %e,
                    "Debit outcome unknown, leaving installment for reconciliation"
                );
                Ok(CollectionOutcome::Pending(row))
            }
            Err(e) => {
                // Rejected or never sent: nothing was taken, the row can be retried
                let row = self.fail_collection(&collection_reference, &e.to_string()).await?;
                Ok(CollectionOutcome::Failed(row))
            }
        }
    }

    async fn apply_debit_result(
        &self,
        collection_reference: &str,
        row: RepaymentSchedule,
        result: DebitResult,
    ) -> CreditResult<CollectionOutcome> {
        match result.status {
            DebitStatus::Successful => {
                match self
                    .settle_collection(
                        collection_reference,
                        result.provider_reference.as_deref(),
                        RepaymentChannel::Mandate,
                    )
                    .await?
                {
                    SettleOutcome::Settled(row) | SettleOutcome::AlreadySettled(row) => {
                        Ok(CollectionOutcome::Paid(row))
                    }
                }
            }
            DebitStatus::Failed => {
                let reason = result
                    .message
                    .unwrap_or_else(|| "Debit declined by provider".to_string());
                let row = self.fail_collection(collection_reference, &reason).await?;
                Ok(CollectionOutcome::Failed(row))
            }
            DebitStatus::Pending => {
                tracing::info!(reference = %collection_reference, "Debit accepted, awaiting provider confirmation");
                Ok(CollectionOutcome::Pending(row))
            }
        }
    }

    /// Ask the provider how an in-flight collection ended and apply the answer.
    ///
    /// A debit the provider has no record of never happened, so the row goes
    /// back to PENDING. A provider that still reports it pending leaves the
    /// row PROCESSING.
    pub async fn reconcile_collection(
        &self,
        collection_reference: &str,
    ) -> CreditResult<CollectionOutcome> {
        let row = sqlx::query_as::<_, RepaymentSchedule>(
            "SELECT * FROM repayment_schedules WHERE collection_reference = $1",
        )
        .bind(collection_reference)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Collection {}", collection_reference)))?;

        match row.status {
            ScheduleStatus::Processing => {}
            ScheduleStatus::Paid => return Ok(CollectionOutcome::Paid(row)),
            status => {
                return Err(CreditError::conflict(format!(
                    "Collection {} is not in flight ({:?})",
                    collection_reference, status
                )))
            }
        }

        match self.provider.fetch_debit(collection_reference).await {
            Ok(result) => self.apply_debit_result(collection_reference, row, result).await,
            Err(CreditError::ProviderRejected { status: 404, .. }) => {
                tracing::warn!(reference = %collection_reference, "Provider has no record of the debit");
                let row = self
                    .fail_collection(collection_reference, "Debit unknown to provider")
                    .await?;
                Ok(CollectionOutcome::Failed(row))
            }
            Err(e) => Err(e),
        }
    }

    /// Reconcile every collection left PROCESSING for longer than `older_than`.
    /// One collection failing does not stop the pass.
    pub async fn reconcile_stale_collections(
        &self,
        older_than: Duration,
    ) -> CreditResult<ReconcileReport> {
        let references: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT collection_reference FROM repayment_schedules
            WHERE status = 'processing' AND collection_reference IS NOT NULL
              AND updated_at <= $1
            ORDER BY updated_at
            "#,
        )
        .bind(Utc::now() - older_than)
        .fetch_all(&self.db_pool)
        .await?;

        let mut report = ReconcileReport {
            collections: references.len(),
            ..Default::default()
        };

        for (reference,) in references {
            match self.reconcile_collection(&reference).await {
                Ok(CollectionOutcome::Paid(_)) => report.paid += 1,
                Ok(CollectionOutcome::Failed(_)) => report.failed += 1,
                Ok(CollectionOutcome::Pending(_)) => report.pending += 1,
                Ok(CollectionOutcome::NothingDue) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(reference = %reference, error = %e, "Stale collection not reconciled");
                }
            }
        }

        Ok(report)
    }

    /// Mark the installment behind a collection reference as paid
    pub async fn settle_collection(
        &self,
        collection_reference: &str,
        provider_reference: Option<&str>,
        channel: RepaymentChannel,
    ) -> CreditResult<SettleOutcome> {
        let mut tx = self.db_pool.begin().await?;
        let mut outbox = Vec::new();
        let outcome = Self::settle_collection_in_tx(
            &mut tx,
            collection_reference,
            provider_reference,
            channel,
            &mut outbox,
        )
        .await?;
        tx.commit().await?;

        for event in outbox {
            self.events.publish(event);
        }
        Ok(outcome)
    }

    /// Settle inside a caller transaction. Events to publish after commit
    /// are pushed onto `outbox`.
    pub async fn settle_collection_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        collection_reference: &str,
        provider_reference: Option<&str>,
        channel: RepaymentChannel,
        outbox: &mut Vec<CreditEvent>,
    ) -> CreditResult<SettleOutcome> {
        let (row, loan) = Self::lock_by_collection_in_tx(tx, collection_reference).await?;

        match row.status {
            ScheduleStatus::Paid => {
                let applied: Option<(Uuid,)> = sqlx::query_as(
                    "SELECT id FROM wallet_ledgers WHERE transaction_reference = $1",
                )
                .bind(collection_reference)
                .fetch_optional(&mut **tx)
                .await?;
                if applied.is_some() {
                    tracing::info!(reference = %collection_reference, "Collection already settled");
                } else {
                    // Money arrived for an installment another payment already retired
                    tracing::error!(
                        reference = %collection_reference,
                        loan_id = %loan.id,
                        schedule_id = %row.id,
                        current_reference = ?row.collection_reference,
                        "Collection confirmed for a paid installment, needs manual refund or reallocation"
                    );
                }
                return Ok(SettleOutcome::AlreadySettled(row));
            }
            ScheduleStatus::Cancelled => {
                tracing::error!(
                    reference = %collection_reference,
                    loan_id = %loan.id,
                    schedule_id = %row.id,
                    "Provider confirmed a debit against a cancelled installment"
                );
                return Err(CreditError::conflict(format!(
                    "Installment {} was cancelled",
                    row.id
                )));
            }
            ScheduleStatus::Pending | ScheduleStatus::Processing => {}
        }

        let amount = row.outstanding();
        let interest = (row.interest - row.amount_paid).max(0).min(amount);
        let now = Utc::now();

        let paid = sqlx::query_as::<_, RepaymentSchedule>(
            r#"
            UPDATE repayment_schedules
            SET status = 'paid', amount_paid = principal + interest, paid_at = $1, updated_at = $1
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(row.id)
        .fetch_one(&mut **tx)
        .await?;

        Self::append_log_in_tx(
            tx,
            LogEntry {
                loan_id: loan.id,
                schedule_id: Some(row.id),
                amount_paid: amount,
                capital_paid: amount - interest,
                interest_paid: interest,
                channel,
                status: RepaymentLogStatus::Successful,
                provider_reference: provider_reference.or(Some(collection_reference)),
                provider_response: None,
            },
        )
        .await?;

        let wallet = LedgerService::ensure_wallet_in_tx(
            tx,
            WalletOwnerRef::business(loan.business_id),
            WalletType::Deposit,
        )
        .await?;
        let narration = format!("Repayment of installment {} on loan {}", row.sequence, loan.id);
        LedgerService::post_entry_in_tx(tx, wallet.id, amount, collection_reference, Some(&narration))
            .await?;

        let status = LoanService::refresh_status_in_tx(tx, &loan).await?;

        tracing::info!(
            loan_id = %loan.id,
            schedule_id = %row.id,
            reference = %collection_reference,
            amount = amount,
            "Installment paid"
        );

        outbox.push(CreditEvent::RepaymentPaid {
            business_id: loan.business_id,
            loan_id: loan.id,
            schedule_id: row.id,
            amount,
        });
        if status == LoanStatus::Completed && loan.status != LoanStatus::Completed {
            outbox.push(CreditEvent::LoanCompleted {
                business_id: loan.business_id,
                loan_id: loan.id,
            });
        }

        Ok(SettleOutcome::Settled(paid))
    }

    /// Return a failed attempt's installment to PENDING so it can be retried
    pub async fn fail_collection(
        &self,
        collection_reference: &str,
        reason: &str,
    ) -> CreditResult<RepaymentSchedule> {
        let mut tx = self.db_pool.begin().await?;
        let mut outbox = Vec::new();
        let row =
            Self::fail_collection_in_tx(&mut tx, collection_reference, reason, &mut outbox).await?;
        tx.commit().await?;

        for event in outbox {
            self.events.publish(event);
        }
        Ok(row)
    }

    pub async fn fail_collection_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        collection_reference: &str,
        reason: &str,
        outbox: &mut Vec<CreditEvent>,
    ) -> CreditResult<RepaymentSchedule> {
        let (row, loan) = Self::lock_by_collection_in_tx(tx, collection_reference).await?;

        let current = row.collection_reference.as_deref() == Some(collection_reference);
        if row.status != ScheduleStatus::Processing || !current {
            // Late or repeated failure notice; a paid row stays paid and a
            // newer attempt is not disturbed
            tracing::warn!(
                reference = %collection_reference,
                status = ?row.status,
                current_reference = ?row.collection_reference,
                "Ignoring failure for installment not in flight under this reference"
            );
            return Ok(row);
        }

        let row = sqlx::query_as::<_, RepaymentSchedule>(
            "UPDATE repayment_schedules SET status = 'pending', updated_at = $1 WHERE id = $2 RETURNING *",
        )
        .bind(Utc::now())
        .bind(row.id)
        .fetch_one(&mut **tx)
        .await?;

        Self::append_log_in_tx(
            tx,
            LogEntry {
                loan_id: loan.id,
                schedule_id: Some(row.id),
                amount_paid: 0,
                capital_paid: 0,
                interest_paid: 0,
                channel: RepaymentChannel::Mandate,
                status: RepaymentLogStatus::Failed,
                provider_reference: Some(collection_reference),
                provider_response: Some(serde_json::json!({ "reason": reason })),
            },
        )
        .await?;

        tracing::warn!(
            loan_id = %loan.id,
            schedule_id = %row.id,
            reference = %collection_reference,
            reason = %reason,
            "Installment collection failed"
        );

        outbox.push(CreditEvent::RepaymentFailed {
            business_id: loan.business_id,
            loan_id: loan.id,
            schedule_id: row.id,
            reason: reason.to_string(),
        });

        Ok(row)
    }

    /// Whether a reference belongs to a collection attempt, current or
    /// replaced by a retry
    pub async fn is_collection_reference_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
    ) -> CreditResult<bool> {
        Ok(Self::resolve_collection_in_tx(tx, reference).await?.is_some())
    }

    /// `(schedule_id, loan_id)` a collection reference was issued for. A
    /// retry replaces the row's reference; the earlier one stays on the
    /// failed attempt's log row.
    async fn resolve_collection_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
    ) -> CreditResult<Option<(Uuid, Uuid)>> {
        let current: Option<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, loan_id FROM repayment_schedules WHERE collection_reference = $1",
        )
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await?;
        if current.is_some() {
            return Ok(current);
        }

        let replaced: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT schedule_id, loan_id FROM repayment_logs
            WHERE provider_reference = $1 AND channel = 'mandate' AND status = 'failed'
              AND schedule_id IS NOT NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(replaced)
    }

    /// Lock the loan, then the installment `collection_reference` was issued for
    async fn lock_by_collection_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        collection_reference: &str,
    ) -> CreditResult<(RepaymentSchedule, Loan)> {
        let (schedule_id, loan_id) = Self::resolve_collection_in_tx(tx, collection_reference)
            .await?
            .ok_or_else(|| CreditError::not_found(format!("Collection {}", collection_reference)))?;

        let loan = LoanService::lock_in_tx(tx, loan_id).await?;
        let row = sqlx::query_as::<_, RepaymentSchedule>(
            "SELECT * FROM repayment_schedules WHERE id = $1 FOR UPDATE",
        )
        .bind(schedule_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok((row, loan))
    }

    /// Apply a payment made outside the mandate rail.
    ///
    /// The amount is allocated oldest installment first. The payment
    /// reference doubles as the ledger reference, so replaying the same
    /// payment is a no-op.
    pub async fn apply_manual_payment(
        &self,
        loan_id: Uuid,
        request: ManualPaymentRequest,
    ) -> CreditResult<ManualPaymentOutcome> {
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;
        let loan = LoanService::lock_in_tx(&mut tx, loan_id).await?;

        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM wallet_ledgers WHERE transaction_reference = $1")
                .bind(&request.reference)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            tracing::info!(loan_id = %loan_id, reference = %request.reference, "Manual payment already applied");
            return Ok(ManualPaymentOutcome {
                already_applied: true,
                allocations: Vec::new(),
                ledger_reference: request.reference,
            });
        }

        if !loan.status.is_collectable() {
            return Err(CreditError::conflict(format!(
                "Loan {} is {:?} and cannot take payments",
                loan_id, loan.status
            )));
        }

        let rows = Self::open_rows_in_tx(&mut tx, loan_id).await?;
        let allocations = allocate_payment(&rows, request.amount)?;
        let now = Utc::now();

        for allocation in &allocations {
            sqlx::query(
                r#"
                UPDATE repayment_schedules
                SET amount_paid = amount_paid + $1,
                    status = CASE WHEN $2 THEN 'paid'::schedule_status ELSE status END,
                    paid_at = CASE WHEN $2 THEN $3 ELSE paid_at END,
                    updated_at = $3
                WHERE id = $4
                "#,
            )
            .bind(allocation.applied)
            .bind(allocation.retires)
            .bind(now)
            .bind(allocation.schedule_id)
            .execute(&mut *tx)
            .await?;

            Self::append_log_in_tx(
                &mut tx,
                LogEntry {
                    loan_id,
                    schedule_id: Some(allocation.schedule_id),
                    amount_paid: allocation.applied,
                    capital_paid: allocation.capital,
                    interest_paid: allocation.interest,
                    channel: RepaymentChannel::Manual,
                    status: RepaymentLogStatus::Successful,
                    provider_reference: Some(&request.reference),
                    provider_response: None,
                },
            )
            .await?;
        }

        let wallet = LedgerService::ensure_wallet_in_tx(
            &mut tx,
            WalletOwnerRef::business(loan.business_id),
            WalletType::Deposit,
        )
        .await?;
        let narration = format!("Manual repayment on loan {}", loan.id);
        LedgerService::post_entry_in_tx(
            &mut tx,
            wallet.id,
            request.amount,
            &request.reference,
            Some(&narration),
        )
        .await?;

        let status = LoanService::refresh_status_in_tx(&mut tx, &loan).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            reference = %request.reference,
            amount = request.amount,
            rows = allocations.len(),
            "Manual payment applied"
        );

        for allocation in allocations.iter().filter(|a| a.retires) {
            self.events.publish(CreditEvent::RepaymentPaid {
                business_id: loan.business_id,
                loan_id,
                schedule_id: allocation.schedule_id,
                amount: allocation.applied,
            });
        }
        if status == LoanStatus::Completed {
            self.events.publish(CreditEvent::LoanCompleted {
                business_id: loan.business_id,
                loan_id,
            });
        }

        Ok(ManualPaymentOutcome {
            already_applied: false,
            allocations,
            ledger_reference: request.reference,
        })
    }

    /// Cancel every open installment of a loan. Paid rows are never touched.
    pub async fn mark_repayments_as_cancelled(&self, loan_id: Uuid) -> CreditResult<u64> {
        let mut tx = self.db_pool.begin().await?;
        LoanService::lock_in_tx(&mut tx, loan_id).await?;
        let cancelled = Self::cancel_open_rows_in_tx(&mut tx, loan_id).await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    async fn cancel_open_rows_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        loan_id: Uuid,
    ) -> CreditResult<u64> {
        let cancelled = sqlx::query(
            r#"
            UPDATE repayment_schedules SET status = 'cancelled', updated_at = $1
            WHERE loan_id = $2 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(Utc::now())
        .bind(loan_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        tracing::info!(loan_id = %loan_id, cancelled = cancelled, "Open installments cancelled");
        Ok(cancelled)
    }

    /// Close a loan early: cancel what is still open and complete it
    pub async fn close_loan(&self, loan_id: Uuid) -> CreditResult<Loan> {
        let mut tx = self.db_pool.begin().await?;
        let loan = LoanService::lock_in_tx(&mut tx, loan_id).await?;

        if loan.status == LoanStatus::Completed {
            return Ok(loan);
        }
        if loan.status == LoanStatus::Pending {
            return Err(CreditError::conflict(format!(
                "Loan {} has not been disbursed",
                loan_id
            )));
        }

        Self::cancel_open_rows_in_tx(&mut tx, loan_id).await?;
        let loan = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(LoanStatus::Completed)
        .bind(Utc::now())
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(loan_id = %loan_id, "Loan closed early");
        self.events.publish(CreditEvent::LoanCompleted {
            business_id: loan.business_id,
            loan_id,
        });
        Ok(loan)
    }

    /// Attempt collection on every loan with an installment due on `date`.
    /// One loan failing does not stop the sweep.
    pub async fn process_due_repayments(&self, date: NaiveDate) -> CreditResult<SweepReport> {
        let due = self.get_repayments_due_on_date(date).await?;
        let mut loan_ids: Vec<Uuid> = due.iter().map(|r| r.loan_id).collect();
        loan_ids.dedup();

        let mut report = SweepReport {
            loans: loan_ids.len(),
            ..Default::default()
        };

        for loan_id in loan_ids {
            match self.process_repayment_for_loan(loan_id).await {
                Ok(CollectionOutcome::Paid(_)) => report.paid += 1,
                Ok(CollectionOutcome::Failed(_)) => report.failed += 1,
                Ok(CollectionOutcome::Pending(_)) => report.pending += 1,
                Ok(CollectionOutcome::NothingDue) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(loan_id = %loan_id, error = %e, "Due repayment not collected");
                }
            }
        }

        tracing::info!(
            date = %date,
            loans = report.loans,
            paid = report.paid,
            failed = report.failed,
            pending = report.pending,
            errors = report.errors,
            "Due repayment sweep finished"
        );
        Ok(report)
    }

    async fn append_log_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        entry: LogEntry<'_>,
    ) -> CreditResult<()> {
        sqlx::query(
            r#"
            INSERT INTO repayment_logs (
                id, loan_id, schedule_id, amount_paid, capital_paid, interest_paid,
                penalty_fee, channel, status, provider_reference, provider_response, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.loan_id)
        .bind(entry.schedule_id)
        .bind(entry.amount_paid)
        .bind(entry.capital_paid)
        .bind(entry.interest_paid)
        .bind(entry.channel)
        .bind(entry.status)
        .bind(entry.provider_reference)
        .bind(entry.provider_response.map(Json))
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
