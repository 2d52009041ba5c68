//! Webhook reconciliation: signature gate, deduplication and routing

mod common;

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::common::{Harness, WEBHOOK_PROVIDER};

    use vendcredit_server::error::CreditError;
    use vendcredit_server::ledger::{WalletOwnerRef, WalletType};
    use vendcredit_server::middleware::RateLimiter;
    use vendcredit_server::providers::{DebitStatus, ProviderMandateStatus};
    use vendcredit_server::repayment::{CollectionOutcome, ScheduleStatus};
    use vendcredit_server::webhook::{WebhookOutcome, SIGNATURE_HEADER};

    /// Harness over a pool that never connects, for paths rejected before any query
    fn offline_harness() -> Harness {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/vendcredit_offline")
            .expect("lazy pool");
        Harness::with_pool(pool)
    }

    #[tokio::test]
    async fn test_router_rejects_bad_signature() {
        let h = offline_harness();
        let app = vendcredit_server::build_router(h.state.clone(), RateLimiter::new(100));

        let body = json!({"event": "charge.success", "data": {"reference": "COL-1"}}).to_string();
        let response = app
            .oneshot(
                Request::post(format!("/api/webhooks/{}", WEBHOOK_PROVIDER))
                    .header("content-type", "application/json")
                    .header(SIGNATURE_HEADER, "deadbeef")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_router_rejects_missing_signature() {
        let h = offline_harness();
        let app = vendcredit_server::build_router(h.state.clone(), RateLimiter::new(100));

        let response = app
            .oneshot(
                Request::post(format!("/api/webhooks/{}", WEBHOOK_PROVIDER))
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_router_fails_closed_for_unconfigured_provider() {
        let h = offline_harness();
        let app = vendcredit_server::build_router(h.state.clone(), RateLimiter::new(100));

        let body = b"{}".to_vec();
        let response = app
            .oneshot(
                Request::post("/api/webhooks/unknown")
                    .header(SIGNATURE_HEADER, h.sign(&body))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_signed_malformed_body_is_bad_request() {
        let h = offline_harness();
        let app = vendcredit_server::build_router(h.state.clone(), RateLimiter::new(100));

        let body = b"not json".to_vec();
        let response = app
            .oneshot(
                Request::post(format!("/api/webhooks/{}", WEBHOOK_PROVIDER))
                    .header(SIGNATURE_HEADER, h.sign(&body))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_duplicate_payment_webhook_credits_once() {
        let h = Harness::new().await;
        let business_id = Uuid::new_v4();
        let reference = format!("PAY-{}", Uuid::new_v4());
        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": reference,
                "amount": 2_500,
                "metadata": {"business_id": business_id.to_string()}
            }
        })
        .to_string();
        let signature = h.sign(body.as_bytes());

        let first = h
            .state
            .webhook_service
            .handle(WEBHOOK_PROVIDER, body.as_bytes(), Some(&signature))
            .await
            .unwrap();
        let second = h
            .state
            .webhook_service
            .handle(WEBHOOK_PROVIDER, body.as_bytes(), Some(&signature))
            .await
            .unwrap();

        assert_eq!(first.outcome, WebhookOutcome::Applied);
        assert_eq!(second.outcome, WebhookOutcome::Duplicate);

        let wallet = h
            .state
            .ledger_service
            .ensure_wallet(WalletOwnerRef::business(business_id), WalletType::Deposit)
            .await
            .unwrap();
        assert_eq!(wallet.balance, 2_500);

        let (rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallet_ledgers WHERE transaction_reference = $1")
                .bind(&reference)
                .fetch_one(&h.pool)
                .await
                .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_pending_collection_settled_by_webhook() {
        let h = Harness::new().await;
        *h.provider.fetch_status.lock().unwrap() = ProviderMandateStatus::Initiated;

        let application = h.application(3_000, 1).await;
        let offer = h.offer(&application, 3_000, true).await;
        let mandate = h
            .state
            .mandate_service
            .generate_mandate(&offer.reference)
            .await
            .unwrap();

        // Activation arrives by webhook, carrying the authorization code
        let activation = json!({
            "event": "mandate.ready",
            "data": {"reference": mandate.provider_reference, "authorization_code": "AUTH_hook"}
        })
        .to_string();
        let receipt = h
            .state
            .webhook_service
            .handle(
                WEBHOOK_PROVIDER,
                activation.as_bytes(),
                Some(&h.sign(activation.as_bytes())),
            )
            .await
            .unwrap();
        assert_eq!(receipt.outcome, WebhookOutcome::Applied);

        let loan = h
            .state
            .offer_service
            .accept_offer(&offer.reference)
            .await
            .unwrap()
            .loan
            .unwrap();
        h.state.loan_service.mark_disbursed(loan.id).await.unwrap();

        h.provider.answer_debits_with(DebitStatus::Pending);
        let row = match h
            .state
            .repayment_service
            .process_repayment_for_loan(loan.id)
            .await
            .unwrap()
        {
            CollectionOutcome::Pending(row) => row,
            other => panic!("expected pending collection, got {:?}", other),
        };
        assert_eq!(row.status, ScheduleStatus::Processing);
        let collection_reference = row.collection_reference.clone().unwrap();

        // A second attempt while the first is in flight is refused
        let busy = h
            .state
            .repayment_service
            .process_repayment_for_loan(loan.id)
            .await;
        assert!(matches!(busy, Err(CreditError::StateConflict(_))));

        let success = json!({
            "event": "debit.successful",
            "data": {"reference": collection_reference, "amount": row.outstanding()}
        })
        .to_string();
        let signature = h.sign(success.as_bytes());
        let applied = h
            .state
            .webhook_service
            .handle(WEBHOOK_PROVIDER, success.as_bytes(), Some(&signature))
            .await
            .unwrap();
        let replay = h
            .state
            .webhook_service
            .handle(WEBHOOK_PROVIDER, success.as_bytes(), Some(&signature))
            .await
            .unwrap();

        assert_eq!(applied.outcome, WebhookOutcome::Applied);
        assert_eq!(replay.outcome, WebhookOutcome::Duplicate);

        let details = h.state.loan_service.get_loan(&loan.id).await.unwrap();
        assert_eq!(details.schedule[0].status, ScheduleStatus::Paid);

        let deposit = h
            .state
            .ledger_service
            .ensure_wallet(WalletOwnerRef::business(loan.business_id), WalletType::Deposit)
            .await
            .unwrap();
        assert_eq!(deposit.balance, loan.total_amount);
        h.state.ledger_service.verify_wallet(&deposit.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unroutable_event_is_acknowledged() {
        let h = Harness::new().await;
        let body = json!({
            "event": "subscription.renewed",
            "data": {"reference": format!("SUB-{}", Uuid::new_v4())}
        })
        .to_string();

        let receipt = h
            .state
            .webhook_service
            .handle(WEBHOOK_PROVIDER, body.as_bytes(), Some(&h.sign(body.as_bytes())))
            .await
            .unwrap();

        assert_eq!(receipt.outcome, WebhookOutcome::Ignored);
    }
}
