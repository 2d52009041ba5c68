//! Webhook reconciler
//!
//! Every delivery is verified against its integration's secret, recorded in
//! `webhook_events` and routed to a state transition inside one transaction.
//! The `(provider, event_key)` uniqueness turns redeliveries into no-ops.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::model::{WebhookOutcome, WebhookPayload, WebhookReceipt, WebhookRoute};
use super::signature::WebhookIntegration;
use crate::error::{CreditError, CreditResult};
use crate::events::{CreditEvent, EventDispatcher};
use crate::ledger::{LedgerService, WalletOwnerRef, WalletType};
use crate::lender::LenderService;
use crate::mandate::MandateService;
use crate::repayment::{RepaymentChannel, RepaymentService, SettleOutcome};

#[derive(Clone)]
pub struct WebhookService {
    db_pool: PgPool,
    integrations: Arc<HashMap<String, WebhookIntegration>>,
    events: EventDispatcher,
}

impl WebhookService {
    pub fn new(
        db_pool: PgPool,
        integrations: HashMap<String, WebhookIntegration>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            db_pool,
            integrations: Arc::new(integrations),
            events,
        }
    }

    pub fn is_configured(&self, provider: &str) -> bool {
        self.integrations.contains_key(&provider.to_lowercase())
    }

    /// Verify, record and apply one delivery
    pub async fn handle(
        &self,
        provider: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> CreditResult<WebhookReceipt> {
        let provider = provider.to_lowercase();
        let integration = self.integrations.get(&provider).ok_or_else(|| {
            tracing::warn!(provider = %provider, "Webhook from unconfigured provider");
            CreditError::InvalidSignature
        })?;

        let signature = signature.ok_or(CreditError::InvalidSignature)?;
        integration.verify(body, signature).map_err(|e| {
            tracing::warn!(provider = %provider, "Webhook signature mismatch");
            e
        })?;

        let payload = WebhookPayload::parse(body)?;
        let receipt = |outcome| WebhookReceipt {
            provider: provider.clone(),
            event: payload.event.clone(),
            reference: payload.data.reference.clone(),
            outcome,
        };

        let mut tx = self.db_pool.begin().await?;

        let Some(event_id) = Self::record_in_tx(&mut tx, &provider, &payload).await? else {
            tx.rollback().await?;
            tracing::info!(
                provider = %provider,
                event = %payload.event,
                reference = %payload.data.reference,
                "Duplicate webhook delivery"
            );
            return Ok(receipt(WebhookOutcome::Duplicate));
        };

        let mut outbox = Vec::new();
        let outcome = match Self::apply_in_tx(&mut tx, &payload, &mut outbox).await {
            Ok(outcome) => outcome,
            Err(CreditError::DuplicateTransaction(reference)) => {
                // The ledger already holds this money movement
                tx.rollback().await?;
                tracing::info!(reference = %reference, "Webhook payment already applied");
                return Ok(receipt(WebhookOutcome::AlreadyApplied));
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    event = %payload.event,
                    reference = %payload.data.reference,
                    error = %e,
                    "Webhook not applied"
                );
                return Err(e);
            }
        };

        sqlx::query("UPDATE webhook_events SET outcome = $1 WHERE id = $2")
            .bind(outcome.as_str())
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            provider = %provider,
            event = %payload.event,
            reference = %payload.data.reference,
            outcome = outcome.as_str(),
            "Webhook processed"
        );

        for event in outbox {
            self.events.publish(event);
        }

        Ok(receipt(outcome))
    }

    /// Insert the processed-event row. `None` when the event was seen before.
    async fn record_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        provider: &str,
        payload: &WebhookPayload,
    ) -> CreditResult<Option<Uuid>> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (id, provider, event_key, event_type, reference, payload, outcome, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'received', $7)
            ON CONFLICT (provider, event_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider)
        .bind(payload.event_key())
        .bind(&payload.event)
        .bind(&payload.data.reference)
        .bind(Json(payload))
        .bind(Utc::now())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(inserted.map(|(id,)| id))
    }

    async fn apply_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        payload: &WebhookPayload,
        outbox: &mut Vec<CreditEvent>,
    ) -> CreditResult<WebhookOutcome> {
        let reference = payload.data.reference.as_str();

        match payload.route() {
            WebhookRoute::MandateActivated => {
                let activated = MandateService::activate_in_tx(
                    tx,
                    reference,
                    payload.data.authorization_code.as_deref(),
                )
                .await?;
                Ok(match activated {
                    Some(mandate) => {
                        outbox.push(CreditEvent::MandateActivated {
                            business_id: mandate.business_id,
                            reference: mandate.reference,
                        });
                        WebhookOutcome::Applied
                    }
                    None => WebhookOutcome::AlreadyApplied,
                })
            }
            WebhookRoute::MandateRevoked => {
                Ok(match MandateService::revoke_in_tx(tx, reference).await? {
                    Some(_) => WebhookOutcome::Applied,
                    None => WebhookOutcome::AlreadyApplied,
                })
            }
            WebhookRoute::PaymentSucceeded => {
                if RepaymentService::is_collection_reference_in_tx(tx, reference).await? {
                    let settled = RepaymentService::settle_collection_in_tx(
                        tx,
                        reference,
                        None,
                        RepaymentChannel::Webhook,
                        outbox,
                    )
                    .await?;
                    return Ok(match settled {
                        SettleOutcome::Settled(_) => WebhookOutcome::Applied,
                        SettleOutcome::AlreadySettled(_) => WebhookOutcome::AlreadyApplied,
                    });
                }

                match (payload.business_id(), payload.data.amount) {
                    (Some(business_id), Some(amount)) if amount > 0 => {
                        let wallet = LedgerService::ensure_wallet_in_tx(
                            tx,
                            WalletOwnerRef::business(business_id),
                            WalletType::Deposit,
                        )
                        .await?;
                        let narration = format!("Payment {}", reference);
                        LedgerService::post_entry_in_tx(
                            tx,
                            wallet.id,
                            amount,
                            reference,
                            Some(&narration),
                        )
                        .await?;
                        Ok(WebhookOutcome::Applied)
                    }
                    _ => {
                        // Confirmed money that nothing claims; reconcile by hand
                        tracing::error!(
                            reference = %reference,
                            amount = ?payload.data.amount,
                            "Payment webhook matches no collection or wallet"
                        );
                        Ok(WebhookOutcome::Ignored)
                    }
                }
            }
            WebhookRoute::PaymentFailed => {
                if RepaymentService::is_collection_reference_in_tx(tx, reference).await? {
                    RepaymentService::fail_collection_in_tx(
                        tx,
                        reference,
                        &payload.failure_reason(),
                        outbox,
                    )
                    .await?;
                    Ok(WebhookOutcome::Applied)
                } else {
                    tracing::warn!(reference = %reference, "Payment failure matches no collection");
                    Ok(WebhookOutcome::Ignored)
                }
            }
            WebhookRoute::LenderDecision { approved } => {
                Ok(
                    match LenderService::reconcile_decision_in_tx(tx, reference, approved, outbox)
                        .await?
                    {
                        Some(_) => WebhookOutcome::Applied,
                        None => WebhookOutcome::AlreadyApplied,
                    },
                )
            }
            WebhookRoute::Identity => {
                tracing::info!(
                    event = %payload.event,
                    reference = %reference,
                    status = ?payload.data.status,
                    "Identity provider notification recorded"
                );
                Ok(WebhookOutcome::Ignored)
            }
            WebhookRoute::Unroutable => {
                tracing::warn!(event = %payload.event, reference = %reference, "Unroutable webhook event acknowledged");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}
