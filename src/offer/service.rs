//! Offer negotiation service

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::model::{build_breakdown, reanchor, CreateOfferRequest, CreditOffer, OfferDecision};
use crate::application::{
    interest_on, total_with_interest, ApplicationService, ApplicationStatus, LoanApplication,
};
use crate::error::{CreditError, CreditResult};
use crate::events::{CreditEvent, EventDispatcher};
use crate::identifier::IdentifierGenerator;
use crate::loan::{Loan, LoanService};
use crate::mandate::MandateService;
use crate::providers::CreditScorer;

/// Offer after a decision, with the loan an acceptance produced
#[derive(Debug, Serialize)]
pub struct AcceptanceOutcome {
    pub offer: CreditOffer,
    pub loan: Option<Loan>,
    /// The same decision had already been recorded
    pub already_applied: bool,
}

#[derive(Clone)]
pub struct OfferService {
    db_pool: PgPool,
    identifiers: Arc<dyn IdentifierGenerator>,
    scorer: Arc<dyn CreditScorer>,
    events: EventDispatcher,
    min_credit_score_percent: i32,
    validity: Duration,
}

impl OfferService {
    pub fn new(
        db_pool: PgPool,
        identifiers: Arc<dyn IdentifierGenerator>,
        scorer: Arc<dyn CreditScorer>,
        events: EventDispatcher,
        min_credit_score_percent: i32,
        offer_validity_days: i64,
    ) -> Self {
        Self {
            db_pool,
            identifiers,
            scorer,
            events,
            min_credit_score_percent,
            validity: Duration::days(offer_validity_days),
        }
    }

    /// Make a new offer against an application.
    ///
    /// Requires an eligible credit evaluation. Any earlier open offer on the
    /// application is invalidated in the same transaction.
    pub async fn create_offer(
        &self,
        application_reference: &str,
        request: CreateOfferRequest,
    ) -> CreditResult<CreditOffer> {
        request.validate()?;

        let application = sqlx::query_as::<_, LoanApplication>(
            "SELECT * FROM loan_applications WHERE reference = $1",
        )
        .bind(application_reference)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Application {}", application_reference)))?;

        // Scoring happens before any lock is taken
        let evaluation = self.scorer.evaluate(application.customer_id).await?;
        if !evaluation.is_eligible(self.min_credit_score_percent) {
            tracing::info!(
                application = %application_reference,
                score = evaluation.score_percent,
                category = ?evaluation.category,
                "Credit evaluation below offer threshold"
            );
            return Err(CreditError::conflict(format!(
                "Customer credit evaluation ({}%, {:?}) does not qualify for an offer",
                evaluation.score_percent, evaluation.category
            )));
        }

        let mut tx = self.db_pool.begin().await?;
        let application = ApplicationService::lock_in_tx(&mut tx, application.id).await?;

        if !application.status.accepts_offers() {
            return Err(CreditError::conflict(format!(
                "Application {} is {:?}",
                application_reference, application.status
            )));
        }

        let (accepted,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM credit_offers WHERE application_id = $1 AND accepted_at IS NOT NULL",
        )
        .bind(application.id)
        .fetch_one(&mut *tx)
        .await?;
        if accepted > 0 {
            return Err(CreditError::conflict(format!(
                "Application {} already has an accepted offer",
                application_reference
            )));
        }

        let interest_amount = interest_on(request.offer_amount, application.interest_rate_bps)?;
        let total_amount = total_with_interest(request.offer_amount, interest_amount)?;
        let now = Utc::now();
        let breakdown = build_breakdown(
            request.offer_amount,
            interest_amount,
            application.duration_in_months,
            now.date_naive(),
        )?;

        let superseded = sqlx::query(
            r#"
            UPDATE credit_offers SET is_valid = false, updated_at = $2
            WHERE application_id = $1 AND is_valid = true AND accepted_at IS NULL
            "#,
        )
        .bind(application.id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let reference = self.identifiers.offer_reference();
        let offer = sqlx::query_as::<_, CreditOffer>(
            r#"
            INSERT INTO credit_offers (
                id, reference, application_id, business_id, customer_id,
                offer_amount, interest_rate_bps, interest_amount, total_amount, tenor_months,
                breakdown, has_mandate, has_active_debit_card, is_valid,
                score_percent, score_category, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, true, $14, $15, $16, $17, $17)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&reference)
        .bind(application.id)
        .bind(application.business_id)
        .bind(application.customer_id)
        .bind(request.offer_amount)
        .bind(application.interest_rate_bps)
        .bind(interest_amount)
        .bind(total_amount)
        .bind(application.duration_in_months)
        .bind(Json(&breakdown))
        .bind(request.has_mandate)
        .bind(request.has_active_debit_card)
        .bind(evaluation.score_percent.clamp(0, 100) as i16)
        .bind(evaluation.category)
        .bind(now + self.validity)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            offer = %offer.reference,
            application = %application_reference,
            amount = offer.offer_amount,
            total = offer.total_amount,
            superseded = superseded,
            "Credit offer created"
        );

        self.events.publish(CreditEvent::OfferCreated {
            business_id: offer.business_id,
            reference: offer.reference.clone(),
            amount: offer.offer_amount,
        });

        Ok(offer)
    }

    pub async fn get_offer(&self, reference: &str) -> CreditResult<CreditOffer> {
        sqlx::query_as::<_, CreditOffer>("SELECT * FROM credit_offers WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| CreditError::not_found(format!("Offer {}", reference)))
    }

    /// Offers of an application, newest first
    pub async fn list_offers(&self, application_id: Uuid) -> CreditResult<Vec<CreditOffer>> {
        let offers = sqlx::query_as::<_, CreditOffer>(
            "SELECT * FROM credit_offers WHERE application_id = $1 ORDER BY created_at DESC",
        )
        .bind(application_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(offers)
    }

    async fn lock_offer_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
    ) -> CreditResult<CreditOffer> {
        sqlx::query_as::<_, CreditOffer>(
            "SELECT * FROM credit_offers WHERE reference = $1 FOR UPDATE",
        )
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Offer {}", reference)))
    }

    pub async fn accept_or_reject_offer(
        &self,
        reference: &str,
        decision: OfferDecision,
    ) -> CreditResult<AcceptanceOutcome> {
        match decision {
            OfferDecision::Accept => self.accept_offer(reference).await,
            OfferDecision::Reject { reason } => self.reject_offer(reference, &reason).await,
        }
    }

    /// Accept an offer and disburse it into a loan, atomically.
    ///
    /// A repeated accept returns the original outcome.
    pub async fn accept_offer(&self, reference: &str) -> CreditResult<AcceptanceOutcome> {
        let application_id = self.get_offer(reference).await?.application_id;

        // Application before offer, the order create_offer locks them in
        let mut tx = self.db_pool.begin().await?;
        let application = ApplicationService::lock_in_tx(&mut tx, application_id).await?;
        let offer = Self::lock_offer_in_tx(&mut tx, reference).await?;

        if offer.accepted_at.is_some() {
            let loan = LoanService::find_by_offer_in_tx(&mut tx, offer.id).await?;
            tracing::info!(offer = %reference, "Offer already accepted");
            return Ok(AcceptanceOutcome {
                offer,
                loan,
                already_applied: true,
            });
        }
        if offer.rejected_at.is_some() {
            return Err(CreditError::conflict(format!("Offer {} was rejected", reference)));
        }
        if !offer.is_valid {
            return Err(CreditError::conflict(format!(
                "Offer {} has been superseded or expired",
                reference
            )));
        }
        let now = Utc::now();
        if offer.expires_at < now {
            return Err(CreditError::conflict(format!(
                "Offer {} expired at {}",
                reference, offer.expires_at
            )));
        }

        if !application.status.accepts_offers() {
            return Err(CreditError::conflict(format!(
                "Application {} is {:?}",
                application.reference, application.status
            )));
        }

        if offer.has_mandate
            && MandateService::find_chargeable_in_tx(&mut tx, offer.customer_id, offer.business_id)
                .await?
                .is_none()
        {
            return Err(CreditError::MandateNotReady {
                customer_id: offer.customer_id,
                business_id: offer.business_id,
            });
        }

        let installments = reanchor(offer.installments(), now.date_naive())?;

        let offer = sqlx::query_as::<_, CreditOffer>(
            r#"
            UPDATE credit_offers SET accepted_at = $1, breakdown = $2, updated_at = $1
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(Json(&installments))
        .bind(offer.id)
        .fetch_one(&mut *tx)
        .await?;

        ApplicationService::set_status_in_tx(&mut tx, application.id, ApplicationStatus::Approved, None)
            .await?;

        let loan = LoanService::create_from_offer_in_tx(&mut tx, &offer, &installments).await?;

        tx.commit().await?;

        tracing::info!(offer = %reference, loan_id = %loan.id, "Offer accepted");

        self.events.publish(CreditEvent::OfferAccepted {
            business_id: offer.business_id,
            reference: offer.reference.clone(),
            loan_id: loan.id,
        });

        Ok(AcceptanceOutcome {
            offer,
            loan: Some(loan),
            already_applied: false,
        })
    }

    /// Reject an offer. Terminal; a repeated reject is a no-op.
    pub async fn reject_offer(&self, reference: &str, reason: &str) -> CreditResult<AcceptanceOutcome> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CreditError::validation("A rejection reason is required"));
        }

        let mut tx = self.db_pool.begin().await?;
        let offer = Self::lock_offer_in_tx(&mut tx, reference).await?;

        if offer.rejected_at.is_some() {
            return Ok(AcceptanceOutcome {
                offer,
                loan: None,
                already_applied: true,
            });
        }
        if offer.accepted_at.is_some() {
            return Err(CreditError::conflict(format!(
                "Offer {} was already accepted",
                reference
            )));
        }

        let offer = sqlx::query_as::<_, CreditOffer>(
            r#"
            UPDATE credit_offers
            SET rejected_at = $1, rejection_reason = $2, is_valid = false, updated_at = $1
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(reason)
        .bind(offer.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(offer = %reference, reason = %reason, "Offer rejected");

        self.events.publish(CreditEvent::OfferRejected {
            business_id: offer.business_id,
            reference: offer.reference.clone(),
            reason: reason.to_string(),
        });

        Ok(AcceptanceOutcome {
            offer,
            loan: None,
            already_applied: false,
        })
    }

    /// Invalidate open offers whose validity lapsed before `now`
    pub async fn expire_offers(&self, now: DateTime<Utc>) -> CreditResult<u64> {
        let expired = sqlx::query(
            r#"
            UPDATE credit_offers SET is_valid = false, updated_at = $1
            WHERE is_valid = true AND accepted_at IS NULL AND rejected_at IS NULL
              AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        if expired > 0 {
            tracing::info!(count = expired, "Expired undecided offers");
        }
        Ok(expired)
    }
}
