//! Lender matching service

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use super::model::{LenderMatch, LenderMatchRequest, LenderMatchStatus};
use crate::application::{ApplicationService, ApplicationStatus, LoanApplication, ReviewDecision};
use crate::error::{CreditError, CreditResult};
use crate::events::CreditEvent;
use crate::identifier::IdentifierGenerator;

#[derive(Clone)]
pub struct LenderService {
    db_pool: PgPool,
    identifiers: Arc<dyn IdentifierGenerator>,
}

impl LenderService {
    pub fn new(db_pool: PgPool, identifiers: Arc<dyn IdentifierGenerator>) -> Self {
        Self {
            db_pool,
            identifiers,
        }
    }

    /// Open a lender match for a pending application. An application with an
    /// open match gets that match back.
    pub async fn request_lender_match(
        &self,
        application_reference: &str,
        request: LenderMatchRequest,
    ) -> CreditResult<LenderMatch> {
        let mut tx = self.db_pool.begin().await?;

        let application = sqlx::query_as::<_, LoanApplication>(
            "SELECT * FROM loan_applications WHERE reference = $1 FOR UPDATE",
        )
        .bind(application_reference)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Application {}", application_reference)))?;

        if application.status != ApplicationStatus::Pending {
            return Err(CreditError::conflict(format!(
                "Application {} is {:?}",
                application_reference, application.status
            )));
        }

        let open = sqlx::query_as::<_, LenderMatch>(
            r#"
            SELECT * FROM lender_matches
            WHERE application_id = $1 AND status IN ('pending', 'matched')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(application.id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(open) = open {
            return Ok(open);
        }

        let status = if request.lender_id.is_some() {
            LenderMatchStatus::Matched
        } else {
            LenderMatchStatus::Pending
        };
        let now = Utc::now();

        let lender_match = sqlx::query_as::<_, LenderMatch>(
            r#"
            INSERT INTO lender_matches (
                id, reference, application_id, lender_id, status, provider_reference,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.identifiers.lender_match_reference())
        .bind(application.id)
        .bind(request.lender_id)
        .bind(status)
        .bind(&request.provider_reference)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            application = %application_reference,
            lender_match = %lender_match.reference,
            status = ?lender_match.status,
            "Lender match requested"
        );

        Ok(lender_match)
    }

    pub async fn list_matches(&self, application_id: Uuid) -> CreditResult<Vec<LenderMatch>> {
        let matches = sqlx::query_as::<_, LenderMatch>(
            "SELECT * FROM lender_matches WHERE application_id = $1 ORDER BY created_at DESC",
        )
        .bind(application_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(matches)
    }

    /// Record a lender's decision and carry it to the application.
    ///
    /// `reference` may be the match reference, the provider's reference or
    /// the application reference. Returns `None` when the decision was
    /// already recorded.
    pub async fn reconcile_decision_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
        approved: bool,
        outbox: &mut Vec<CreditEvent>,
    ) -> CreditResult<Option<LenderMatch>> {
        let (match_id, application_id): (Uuid, Uuid) = sqlx::query_as(
            r#"
            SELECT id, application_id FROM lender_matches
            WHERE reference = $1
               OR provider_reference = $1
               OR application_id = (SELECT id FROM loan_applications WHERE reference = $1)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Lender match {}", reference)))?;

        // Application before match, as everywhere else
        let application = ApplicationService::lock_in_tx(tx, application_id).await?;
        let current = sqlx::query_as::<_, LenderMatch>(
            "SELECT * FROM lender_matches WHERE id = $1 FOR UPDATE",
        )
        .bind(match_id)
        .fetch_one(&mut **tx)
        .await?;

        let Some(next) = current.status.decide(approved) else {
            tracing::info!(lender_match = %current.reference, status = ?current.status, "Lender decision already recorded");
            return Ok(None);
        };

        let updated = sqlx::query_as::<_, LenderMatch>(
            "UPDATE lender_matches SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(next)
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&mut **tx)
        .await?;

        if application.status == ApplicationStatus::Pending {
            let decision = if approved {
                ReviewDecision::Approve
            } else {
                ReviewDecision::Reject {
                    reason: "Declined by lender".to_string(),
                }
            };
            let status = application.status.review(&decision)?;
            let note = (!approved).then_some("Declined by lender");
            ApplicationService::set_status_in_tx(tx, application.id, status, note).await?;

            outbox.push(CreditEvent::ApplicationReviewed {
                business_id: application.business_id,
                reference: application.reference.clone(),
                approved,
            });
        }

        tracing::info!(
            lender_match = %updated.reference,
            application = %application.reference,
            status = ?updated.status,
            "Lender decision reconciled"
        );

        Ok(Some(updated))
    }
}
