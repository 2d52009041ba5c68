//! Application intake service

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    ApplicationPatch, ApplicationStatus, ApplicationTerms, CreateApplicationRequest,
    LoanApplication, ReviewDecision,
};
use super::rates::RateTable;
use crate::error::{CreditError, CreditResult};
use crate::events::{CreditEvent, EventDispatcher};
use crate::identifier::IdentifierGenerator;
use crate::providers::IdentityVerifier;

#[derive(Clone)]
pub struct ApplicationService {
    db_pool: PgPool,
    rate_table: RateTable,
    identifiers: Arc<dyn IdentifierGenerator>,
    identity: Arc<dyn IdentityVerifier>,
    events: EventDispatcher,
}

impl ApplicationService {
    pub fn new(
        db_pool: PgPool,
        rate_table: RateTable,
        identifiers: Arc<dyn IdentifierGenerator>,
        identity: Arc<dyn IdentityVerifier>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            db_pool,
            rate_table,
            identifiers,
            identity,
            events,
        }
    }

    pub fn rate_table(&self) -> &RateTable {
        &self.rate_table
    }

    /// Validate, price and persist a new application
    pub async fn create_application(
        &self,
        request: CreateApplicationRequest,
    ) -> CreditResult<LoanApplication> {
        request.validate()?;

        let terms = ApplicationTerms::price(
            &self.rate_table,
            request.requested_amount,
            request.duration_in_months,
            request.source,
        )?;

        // Identity check happens before anything is written
        let identity_profile_id = match &request.identity {
            Some(identity) => {
                let result = self
                    .identity
                    .verify(&identity.identity_type, &identity.identity_number)
                    .await?;
                if !result.verified {
                    return Err(CreditError::validation(format!(
                        "Identity {} could not be verified",
                        identity.identity_type
                    )));
                }
                result.profile_id
            }
            None => None,
        };

        let reference = self.identifiers.application_reference();
        let now = Utc::now();

        let application = sqlx::query_as::<_, LoanApplication>(
            r#"
            INSERT INTO loan_applications (
                id, reference, business_id, customer_id, requested_amount,
                interest_rate_bps, interest_amount, total_amount, duration_in_months,
                rate_table_version, source, status, identity_profile_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&reference)
        .bind(request.business_id)
        .bind(request.customer_id)
        .bind(terms.requested_amount)
        .bind(terms.interest_rate_bps)
        .bind(terms.interest_amount)
        .bind(terms.total_amount)
        .bind(terms.duration_in_months)
        .bind(terms.rate_table_version)
        .bind(terms.source)
        .bind(ApplicationStatus::Pending)
        .bind(identity_profile_id)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            reference = %application.reference,
            business_id = %application.business_id,
            amount = application.requested_amount,
            tenor = application.duration_in_months,
            rate_table_version = application.rate_table_version,
            "Loan application created"
        );

        self.events.publish(CreditEvent::ApplicationCreated {
            business_id: application.business_id,
            reference: application.reference.clone(),
        });

        Ok(application)
    }

    pub async fn get_application(&self, reference: &str) -> CreditResult<LoanApplication> {
        sqlx::query_as::<_, LoanApplication>(
            "SELECT * FROM loan_applications WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Application {}", reference)))
    }

    /// Lock an application row for the rest of the caller's transaction
    pub async fn lock_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        application_id: Uuid,
    ) -> CreditResult<LoanApplication> {
        sqlx::query_as::<_, LoanApplication>(
            "SELECT * FROM loan_applications WHERE id = $1 FOR UPDATE",
        )
        .bind(application_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Application {}", application_id)))
    }

    pub async fn set_status_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        application_id: Uuid,
        status: ApplicationStatus,
        note: Option<&str>,
    ) -> CreditResult<()> {
        sqlx::query(
            r#"
            UPDATE loan_applications
            SET status = $1, review_note = COALESCE($2, review_note), updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(status)
        .bind(note)
        .bind(Utc::now())
        .bind(application_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Apply a partial update to a pending application
    pub async fn update_application(
        &self,
        reference: &str,
        patch: ApplicationPatch,
    ) -> CreditResult<LoanApplication> {
        if patch.is_empty() {
            return self.get_application(reference).await;
        }

        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, LoanApplication>(
            "SELECT * FROM loan_applications WHERE reference = $1 FOR UPDATE",
        )
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Application {}", reference)))?;

        if current.status != ApplicationStatus::Pending {
            return Err(CreditError::conflict(format!(
                "Application {} is {:?} and can no longer be changed",
                reference, current.status
            )));
        }

        let terms = ApplicationTerms::of(&current).patched(&patch, &self.rate_table)?;

        let updated = sqlx::query_as::<_, LoanApplication>(
            r#"
            UPDATE loan_applications
            SET requested_amount = $1, duration_in_months = $2, interest_rate_bps = $3,
                interest_amount = $4, total_amount = $5, rate_table_version = $6,
                source = $7, updated_at = $8
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(terms.requested_amount)
        .bind(terms.duration_in_months)
        .bind(terms.interest_rate_bps)
        .bind(terms.interest_amount)
        .bind(terms.total_amount)
        .bind(terms.rate_table_version)
        .bind(terms.source)
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(reference = %reference, "Loan application updated");
        Ok(updated)
    }

    /// Approve or reject a pending application
    pub async fn review_application(
        &self,
        reference: &str,
        decision: ReviewDecision,
    ) -> CreditResult<LoanApplication> {
        let note = match &decision {
            ReviewDecision::Reject { reason } if reason.trim().is_empty() => {
                return Err(CreditError::validation("A rejection reason is required"));
            }
            ReviewDecision::Reject { reason } => Some(reason.clone()),
            ReviewDecision::Approve => None,
        };

        let mut tx = self.db_pool.begin().await?;
        let application = self.get_application(reference).await?;
        let current = Self::lock_in_tx(&mut tx, application.id).await?;
        let next = current.status.review(&decision)?;

        Self::set_status_in_tx(&mut tx, current.id, next, note.as_deref()).await?;
        tx.commit().await?;

        tracing::info!(reference = %reference, status = ?next, "Loan application reviewed");

        self.events.publish(CreditEvent::ApplicationReviewed {
            business_id: current.business_id,
            reference: current.reference.clone(),
            approved: next == ApplicationStatus::Approved,
        });

        self.get_application(reference).await
    }

    /// Hard delete. Refused once any offer references the application.
    pub async fn delete_application(&self, reference: &str) -> CreditResult<()> {
        let mut tx = self.db_pool.begin().await?;
        let application = self.get_application(reference).await?;
        Self::lock_in_tx(&mut tx, application.id).await?;

        let (offers,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM credit_offers WHERE application_id = $1")
                .bind(application.id)
                .fetch_one(&mut *tx)
                .await?;

        if offers > 0 {
            return Err(CreditError::conflict(format!(
                "Application {} has {} offer(s) and cannot be deleted",
                reference, offers
            )));
        }

        sqlx::query("DELETE FROM lender_matches WHERE application_id = $1")
            .bind(application.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM loan_applications WHERE id = $1")
            .bind(application.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(reference = %reference, "Loan application deleted");
        Ok(())
    }
}
