//! Shared fixtures for database-backed tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use vendcredit_server::application::{
    ApplicationService, ApplicationSource, CreateApplicationRequest, LoanApplication, RateTable,
};
use vendcredit_server::error::{CreditError, CreditResult};
use vendcredit_server::events::EventDispatcher;
use vendcredit_server::identifier::{IdentifierGenerator, SequentialIdentifierGenerator};
use vendcredit_server::ledger::LedgerService;
use vendcredit_server::lender::LenderService;
use vendcredit_server::loan::{Loan, LoanService};
use vendcredit_server::mandate::MandateService;
use vendcredit_server::offer::{CreateOfferRequest, CreditOffer, OfferService};
use vendcredit_server::providers::{
    CreditEvaluation, CreditScorer, DebitRequest, DebitResult, DebitStatus, IdentityVerification,
    IdentityVerifier, MandateProvider, MandateRequest, ProviderMandate, ProviderMandateStatus,
    ScoreCategory,
};
use vendcredit_server::repayment::RepaymentService;
use vendcredit_server::state::AppState;
use vendcredit_server::webhook::{SignatureAlgorithm, WebhookIntegration, WebhookService};

pub const WEBHOOK_PROVIDER: &str = "paystack";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Connect to the test database and bring the schema up to date
pub async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/vendcredit_test".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    vendcredit_server::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub struct StubScorer {
    pub score_percent: i32,
}

#[async_trait]
impl CreditScorer for StubScorer {
    async fn evaluate(&self, _customer_id: Uuid) -> CreditResult<CreditEvaluation> {
        Ok(CreditEvaluation {
            score_percent: self.score_percent,
            category: ScoreCategory::from_percent(self.score_percent),
        })
    }
}

pub struct StubIdentity;

#[async_trait]
impl IdentityVerifier for StubIdentity {
    async fn verify(
        &self,
        _identity_type: &str,
        identity_number: &str,
    ) -> CreditResult<IdentityVerification> {
        Ok(IdentityVerification {
            verified: !identity_number.starts_with('0'),
            profile_id: Some(format!("profile-{}", identity_number)),
        })
    }
}

/// Mandate provider whose answers are set by the test
pub struct StubMandateProvider {
    pub fetch_status: Mutex<ProviderMandateStatus>,
    pub debit_status: Mutex<DebitStatus>,
    /// Debits fail to connect, nothing reaches the provider
    pub unreachable: Mutex<bool>,
    /// Answer for debit lookups; `None` is a 404
    pub settled_debit: Mutex<Option<DebitStatus>>,
    pub debits: Mutex<Vec<DebitRequest>>,
}

impl Default for StubMandateProvider {
    fn default() -> Self {
        Self {
            fetch_status: Mutex::new(ProviderMandateStatus::Ready),
            debit_status: Mutex::new(DebitStatus::Successful),
            unreachable: Mutex::new(false),
            settled_debit: Mutex::new(None),
            debits: Mutex::new(Vec::new()),
        }
    }
}

impl StubMandateProvider {
    pub fn answer_debits_with(&self, status: DebitStatus) {
        *self.debit_status.lock().unwrap() = status;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub fn answer_lookups_with(&self, status: Option<DebitStatus>) {
        *self.settled_debit.lock().unwrap() = status;
    }
}

#[async_trait]
impl MandateProvider for StubMandateProvider {
    async fn create_mandate(&self, request: &MandateRequest) -> CreditResult<ProviderMandate> {
        Ok(ProviderMandate {
            provider_reference: format!("PRV-{}", request.reference),
            status: ProviderMandateStatus::Initiated,
            authorization_code: None,
            channel: Some("direct_debit".to_string()),
            bank: Some("Test Bank".to_string()),
        })
    }

    async fn fetch_mandate(&self, provider_reference: &str) -> CreditResult<ProviderMandate> {
        Ok(ProviderMandate {
            provider_reference: provider_reference.to_string(),
            status: *self.fetch_status.lock().unwrap(),
            authorization_code: Some("AUTH_stub".to_string()),
            channel: Some("direct_debit".to_string()),
            bank: Some("Test Bank".to_string()),
        })
    }

    async fn debit(&self, request: &DebitRequest) -> CreditResult<DebitResult> {
        if *self.unreachable.lock().unwrap() {
            return Err(CreditError::ProviderUnreachable(
                "connection refused".to_string(),
            ));
        }
        self.debits.lock().unwrap().push(request.clone());
        let status = *self.debit_status.lock().unwrap();
        Ok(DebitResult {
            status,
            provider_reference: Some(format!("TRX-{}", request.reference)),
            message: (status == DebitStatus::Failed).then(|| "Insufficient funds".to_string()),
        })
    }

    async fn fetch_debit(&self, reference: &str) -> CreditResult<DebitResult> {
        match *self.settled_debit.lock().unwrap() {
            Some(status) => Ok(DebitResult {
                status,
                provider_reference: Some(format!("TRX-{}", reference)),
                message: (status == DebitStatus::Failed).then(|| "Insufficient funds".to_string()),
            }),
            None => Err(CreditError::ProviderRejected {
                status: 404,
                message: format!("Debit {} not found", reference),
            }),
        }
    }

    async fn cancel_mandate(&self, _provider_reference: &str) -> CreditResult<()> {
        Ok(())
    }
}

/// Every service wired to one pool, stub providers and deterministic ids
pub struct Harness {
    pub pool: PgPool,
    pub provider: Arc<StubMandateProvider>,
    pub state: AppState,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_pool(setup_test_db().await)
    }

    pub fn with_pool(pool: PgPool) -> Self {
        // Unique per run so references never collide with earlier runs
        let namespace = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        let identifiers: Arc<dyn IdentifierGenerator> =
            Arc::new(SequentialIdentifierGenerator::new(namespace));
        let provider = Arc::new(StubMandateProvider::default());
        let events = EventDispatcher::disabled();

        let mut integrations = HashMap::new();
        integrations.insert(
            WEBHOOK_PROVIDER.to_string(),
            WebhookIntegration {
                secret: WEBHOOK_SECRET.to_string(),
                algorithm: SignatureAlgorithm::Sha512,
            },
        );

        let state = AppState {
            db_pool: pool.clone(),
            application_service: Arc::new(ApplicationService::new(
                pool.clone(),
                RateTable::standard(),
                identifiers.clone(),
                Arc::new(StubIdentity),
                events.clone(),
            )),
            lender_service: Arc::new(LenderService::new(pool.clone(), identifiers.clone())),
            offer_service: Arc::new(OfferService::new(
                pool.clone(),
                identifiers.clone(),
                Arc::new(StubScorer { score_percent: 80 }),
                events.clone(),
                50,
                7,
            )),
            mandate_service: Arc::new(MandateService::new(
                pool.clone(),
                provider.clone(),
                identifiers.clone(),
                events.clone(),
                72,
            )),
            loan_service: Arc::new(LoanService::new(
                pool.clone(),
                identifiers.clone(),
                events.clone(),
            )),
            repayment_service: Arc::new(RepaymentService::new(
                pool.clone(),
                provider.clone(),
                identifiers.clone(),
                events.clone(),
            )),
            ledger_service: Arc::new(LedgerService::new(pool.clone())),
            webhook_service: Arc::new(WebhookService::new(pool.clone(), integrations, events)),
        };

        Self {
            pool,
            provider,
            state,
        }
    }

    pub async fn application(&self, amount: i64, months: i16) -> LoanApplication {
        self.state
            .application_service
            .create_application(CreateApplicationRequest {
                business_id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                requested_amount: amount,
                duration_in_months: months,
                source: ApplicationSource::Dashboard,
                identity: None,
            })
            .await
            .expect("create application")
    }

    pub async fn offer(
        &self,
        application: &LoanApplication,
        amount: i64,
        has_mandate: bool,
    ) -> CreditOffer {
        self.state
            .offer_service
            .create_offer(
                &application.reference,
                CreateOfferRequest {
                    offer_amount: amount,
                    has_mandate,
                    has_active_debit_card: false,
                },
            )
            .await
            .expect("create offer")
    }

    /// Disbursed loan with an active mandate behind it, ready for collection
    pub async fn collectable_loan(&self, amount: i64, months: i16) -> Loan {
        let application = self.application(amount, months).await;
        let offer = self.offer(&application, amount, true).await;
        let mandate = self
            .state
            .mandate_service
            .generate_mandate(&offer.reference)
            .await
            .expect("generate mandate");
        self.state
            .mandate_service
            .verify_mandate(&mandate.reference)
            .await
            .expect("verify mandate");
        let loan = self
            .state
            .offer_service
            .accept_offer(&offer.reference)
            .await
            .expect("accept offer")
            .loan
            .expect("loan created on acceptance");
        self.state
            .loan_service
            .mark_disbursed(loan.id)
            .await
            .expect("disburse loan")
    }

    /// Push an offer's expiry into the past
    pub async fn backdate_offer(&self, offer: &CreditOffer) {
        sqlx::query("UPDATE credit_offers SET expires_at = $1 WHERE id = $2")
            .bind(Utc::now() - Duration::days(1))
            .bind(offer.id)
            .execute(&self.pool)
            .await
            .expect("backdate offer");
    }

    pub fn sign(&self, body: &[u8]) -> String {
        WebhookIntegration {
            secret: WEBHOOK_SECRET.to_string(),
            algorithm: SignatureAlgorithm::Sha512,
        }
        .sign(body)
    }
}
