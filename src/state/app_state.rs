//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::application::ApplicationService;
use crate::ledger::LedgerService;
use crate::lender::LenderService;
use crate::loan::LoanService;
use crate::mandate::MandateService;
use crate::offer::OfferService;
use crate::repayment::RepaymentService;
use crate::webhook::WebhookService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub application_service: Arc<ApplicationService>,
    pub lender_service: Arc<LenderService>,
    pub offer_service: Arc<OfferService>,
    pub mandate_service: Arc<MandateService>,
    pub loan_service: Arc<LoanService>,
    pub repayment_service: Arc<RepaymentService>,
    pub ledger_service: Arc<LedgerService>,
    pub webhook_service: Arc<WebhookService>,
}

impl FromRef<AppState> for Arc<ApplicationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.application_service.clone()
    }
}

impl FromRef<AppState> for Arc<OfferService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.offer_service.clone()
    }
}

impl FromRef<AppState> for Arc<MandateService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.mandate_service.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<RepaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.repayment_service.clone()
    }
}

impl FromRef<AppState> for Arc<LedgerService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ledger_service.clone()
    }
}

impl FromRef<AppState> for Arc<WebhookService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.webhook_service.clone()
    }
}
