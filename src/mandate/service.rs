//! Mandate authority - provider mandates and their activation

use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use super::model::{DebitMandate, MandateVerification};
use crate::error::{CreditError, CreditResult};
use crate::events::{CreditEvent, EventDispatcher};
use crate::identifier::IdentifierGenerator;
use crate::offer::CreditOffer;
use crate::providers::{MandateProvider, MandateRequest, ProviderMandateStatus};

#[derive(Clone)]
pub struct MandateService {
    db_pool: PgPool,
    provider: Arc<dyn MandateProvider>,
    identifiers: Arc<dyn IdentifierGenerator>,
    events: EventDispatcher,
    activation_window: Duration,
}

impl MandateService {
    pub fn new(
        db_pool: PgPool,
        provider: Arc<dyn MandateProvider>,
        identifiers: Arc<dyn IdentifierGenerator>,
        events: EventDispatcher,
        activation_window_hours: i64,
    ) -> Self {
        Self {
            db_pool,
            provider,
            identifiers,
            events,
            activation_window: Duration::hours(activation_window_hours),
        }
    }

    /// Request a mandate from the provider for an offer.
    ///
    /// Nothing is persisted when the provider call fails. An offer that
    /// already has a live mandate gets that mandate back.
    pub async fn generate_mandate(&self, offer_reference: &str) -> CreditResult<DebitMandate> {
        let offer = sqlx::query_as::<_, CreditOffer>(
            "SELECT * FROM credit_offers WHERE reference = $1",
        )
        .bind(offer_reference)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Offer {}", offer_reference)))?;

        if offer.rejected_at.is_some() || (!offer.is_valid && offer.accepted_at.is_none()) {
            return Err(CreditError::conflict(format!(
                "Offer {} is no longer open",
                offer_reference
            )));
        }

        let existing = sqlx::query_as::<_, DebitMandate>(
            r#"
            SELECT * FROM debit_mandates
            WHERE offer_id = $1 AND revoked_at IS NULL
              AND provider_status NOT IN ('cancelled', 'expired')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(offer.id)
        .fetch_optional(&self.db_pool)
        .await?;

        if let Some(mandate) = existing {
            tracing::info!(offer = %offer_reference, mandate = %mandate.reference, "Offer already has a live mandate");
            return Ok(mandate);
        }

        let reference = self.identifiers.mandate_reference();
        let today = Utc::now().date_naive();
        let end_date = offer
            .installments()
            .last()
            .map(|i| i.due_date)
            .unwrap_or(today);

        let provider_mandate = self
            .provider
            .create_mandate(&MandateRequest {
                reference: reference.clone(),
                customer_id: offer.customer_id,
                business_id: offer.business_id,
                amount: offer.total_amount,
                start_date: today,
                end_date,
            })
            .await
            .map_err(|e| {
                tracing::warn!(offer = %offer_reference, error = %e, "Mandate provider refused mandate creation");
                e
            })?;

        let now = Utc::now();
        let mandate = sqlx::query_as::<_, DebitMandate>(
            r#"
            INSERT INTO debit_mandates (
                id, reference, offer_id, business_id, customer_id, amount,
                provider_reference, provider_status, authorization_code, chargeable,
                channel, bank, activation_deadline, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, $10, $11, $12, $13, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&reference)
        .bind(offer.id)
        .bind(offer.business_id)
        .bind(offer.customer_id)
        .bind(offer.total_amount)
        .bind(&provider_mandate.provider_reference)
        .bind(provider_mandate.status)
        .bind(&provider_mandate.authorization_code)
        .bind(&provider_mandate.channel)
        .bind(&provider_mandate.bank)
        .bind(now + self.activation_window)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            mandate = %mandate.reference,
            provider_reference = %mandate.provider_reference,
            offer = %offer_reference,
            "Debit mandate requested"
        );

        Ok(mandate)
    }

    pub async fn get_mandate(&self, reference: &str) -> CreditResult<DebitMandate> {
        sqlx::query_as::<_, DebitMandate>(
            "SELECT * FROM debit_mandates WHERE reference = $1 OR provider_reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| CreditError::not_found(format!("Mandate {}", reference)))
    }

    /// Poll the provider and activate the mandate once it is ready.
    ///
    /// Safe to repeat: an active mandate is returned untouched. A mandate
    /// still inactive past its activation window is marked expired and the
    /// call fails so the caller can decide whether to generate a new one.
    pub async fn verify_mandate(&self, reference: &str) -> CreditResult<MandateVerification> {
        let mandate = self.get_mandate(reference).await?;

        if mandate.chargeable {
            return Ok(MandateVerification::AlreadyActive(mandate));
        }
        if mandate.revoked_at.is_some() || mandate.provider_status.is_terminal() {
            return Err(CreditError::conflict(format!(
                "Mandate {} is {:?}",
                mandate.reference, mandate.provider_status
            )));
        }

        let remote = self.provider.fetch_mandate(&mandate.provider_reference).await?;

        let mut tx = self.db_pool.begin().await?;
        let result = if remote.status.is_chargeable() {
            match Self::activate_in_tx(&mut tx, &mandate.reference, remote.authorization_code.as_deref())
                .await?
            {
                Some(active) => MandateVerification::Activated(active),
                None => MandateVerification::AlreadyActive(self.get_mandate(reference).await?),
            }
        } else if mandate.activation_window_elapsed(Utc::now()) {
            Self::set_provider_status_in_tx(&mut tx, mandate.id, ProviderMandateStatus::Expired).await?;
            tx.commit().await?;
            tracing::warn!(
                mandate = %mandate.reference,
                deadline = %mandate.activation_deadline,
                "Mandate not activated within its window"
            );
            return Err(CreditError::conflict(format!(
                "Mandate {} was not activated before {}",
                mandate.reference, mandate.activation_deadline
            )));
        } else {
            let updated =
                Self::set_provider_status_in_tx(&mut tx, mandate.id, remote.status).await?;
            MandateVerification::StillPending(updated)
        };
        tx.commit().await?;

        if let MandateVerification::Activated(active) = &result {
            self.events.publish(CreditEvent::MandateActivated {
                business_id: active.business_id,
                reference: active.reference.clone(),
            });
        }

        Ok(result)
    }

    /// Flip `chargeable` exactly once. `None` means it was already active.
    pub async fn activate_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
        authorization_code: Option<&str>,
    ) -> CreditResult<Option<DebitMandate>> {
        let activated = sqlx::query_as::<_, DebitMandate>(
            r#"
            UPDATE debit_mandates
            SET chargeable = true,
                provider_status = 'ready',
                authorization_code = COALESCE($2, authorization_code),
                activated_at = $3,
                updated_at = $3
            WHERE (reference = $1 OR provider_reference = $1)
              AND chargeable = false
              AND revoked_at IS NULL
              AND provider_status NOT IN ('cancelled', 'expired')
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(authorization_code)
        .bind(Utc::now())
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(mandate) = &activated {
            if mandate.authorization_code.is_none() {
                tracing::warn!(mandate = %mandate.reference, "Mandate activated without an authorization code");
            }
            tracing::info!(mandate = %mandate.reference, "Debit mandate activated");
            return Ok(activated);
        }

        let known: Option<(bool,)> = sqlx::query_as(
            "SELECT chargeable FROM debit_mandates WHERE reference = $1 OR provider_reference = $1",
        )
        .bind(reference)
        .fetch_optional(&mut **tx)
        .await?;

        match known {
            Some((true,)) => Ok(None),
            Some((false,)) => Err(CreditError::conflict(format!(
                "Mandate {} was revoked or expired",
                reference
            ))),
            None => Err(CreditError::not_found(format!("Mandate {}", reference))),
        }
    }

    async fn set_provider_status_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        mandate_id: Uuid,
        status: ProviderMandateStatus,
    ) -> CreditResult<DebitMandate> {
        let mandate = sqlx::query_as::<_, DebitMandate>(
            "UPDATE debit_mandates SET provider_status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(mandate_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(mandate)
    }

    /// Mandates still waiting on provider activation, oldest first
    pub async fn find_pending_mandates(&self) -> CreditResult<Vec<DebitMandate>> {
        let mandates = sqlx::query_as::<_, DebitMandate>(
            r#"
            SELECT * FROM debit_mandates
            WHERE chargeable = false AND revoked_at IS NULL
              AND provider_status NOT IN ('cancelled', 'expired')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;
        Ok(mandates)
    }

    /// Chargeable mandate for a customer/business pair, if any
    pub async fn find_chargeable_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        customer_id: Uuid,
        business_id: Uuid,
    ) -> CreditResult<Option<DebitMandate>> {
        let mandate = sqlx::query_as::<_, DebitMandate>(
            r#"
            SELECT * FROM debit_mandates
            WHERE customer_id = $1 AND business_id = $2
              AND chargeable = true AND revoked_at IS NULL
            ORDER BY activated_at DESC
            LIMIT 1
            "#,
        )
        .bind(customer_id)
        .bind(business_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(mandate)
    }

    /// Stop future debits. Cancels at the provider first; a provider failure
    /// leaves the mandate untouched.
    pub async fn revoke_mandate(&self, reference: &str) -> CreditResult<DebitMandate> {
        let mandate = self.get_mandate(reference).await?;
        if mandate.revoked_at.is_some() {
            return Ok(mandate);
        }

        self.provider
            .cancel_mandate(&mandate.provider_reference)
            .await?;

        let mut tx = self.db_pool.begin().await?;
        let revoked = Self::revoke_in_tx(&mut tx, &mandate.reference)
            .await?
            .unwrap_or(mandate);
        tx.commit().await?;
        Ok(revoked)
    }

    /// Local half of a revocation. `None` when already revoked.
    pub async fn revoke_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        reference: &str,
    ) -> CreditResult<Option<DebitMandate>> {
        let revoked = sqlx::query_as::<_, DebitMandate>(
            r#"
            UPDATE debit_mandates
            SET chargeable = false, provider_status = 'cancelled', revoked_at = $2, updated_at = $2
            WHERE (reference = $1 OR provider_reference = $1) AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(Utc::now())
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(mandate) = &revoked {
            tracing::info!(mandate = %mandate.reference, "Debit mandate revoked");
        }
        Ok(revoked)
    }
}
