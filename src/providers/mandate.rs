//! Debit mandate provider collaborator

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProviderClient;
use crate::error::CreditResult;

/// Provider-side mandate lifecycle
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "provider_mandate_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderMandateStatus {
    Initiated,
    Approved,
    Ready,
    Cancelled,
    Expired,
}

impl ProviderMandateStatus {
    /// Only a ready mandate may be debited
    pub fn is_chargeable(&self) -> bool {
        matches!(self, ProviderMandateStatus::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderMandateStatus::Cancelled | ProviderMandateStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MandateRequest {
    pub reference: String,
    pub customer_id: Uuid,
    pub business_id: Uuid,
    pub amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMandate {
    pub provider_reference: String,
    pub status: ProviderMandateStatus,
    pub authorization_code: Option<String>,
    pub channel: Option<String>,
    pub bank: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebitRequest {
    pub authorization_code: String,
    pub amount: i64,
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DebitStatus {
    Successful,
    Failed,
    /// Accepted by the provider; the outcome arrives by webhook
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitResult {
    pub status: DebitStatus,
    pub provider_reference: Option<String>,
    pub message: Option<String>,
}

#[async_trait]
pub trait MandateProvider: Send + Sync {
    async fn create_mandate(&self, request: &MandateRequest) -> CreditResult<ProviderMandate>;

    async fn fetch_mandate(&self, provider_reference: &str) -> CreditResult<ProviderMandate>;

    async fn debit(&self, request: &DebitRequest) -> CreditResult<DebitResult>;

    /// Current state of an earlier debit, looked up by our reference
    async fn fetch_debit(&self, reference: &str) -> CreditResult<DebitResult>;

    async fn cancel_mandate(&self, provider_reference: &str) -> CreditResult<()>;
}

pub struct HttpMandateProvider {
    client: ProviderClient,
    base_url: String,
}

impl HttpMandateProvider {
    pub fn new(client: ProviderClient, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Ack {}

#[async_trait]
impl MandateProvider for HttpMandateProvider {
    async fn create_mandate(&self, request: &MandateRequest) -> CreditResult<ProviderMandate> {
        self.client.post_json(&self.base_url, request).await
    }

    async fn fetch_mandate(&self, provider_reference: &str) -> CreditResult<ProviderMandate> {
        let url = format!("{}/{}", self.base_url, provider_reference);
        self.client.get_json(&url).await
    }

    async fn debit(&self, request: &DebitRequest) -> CreditResult<DebitResult> {
        let url = format!("{}/debit", self.base_url);
        self.client.post_json(&url, request).await
    }

    async fn fetch_debit(&self, reference: &str) -> CreditResult<DebitResult> {
        let url = format!("{}/debit/{}", self.base_url, reference);
        self.client.get_json(&url).await
    }

    async fn cancel_mandate(&self, provider_reference: &str) -> CreditResult<()> {
        let url = format!("{}/{}/cancel", self.base_url, provider_reference);
        let _: Ack = self.client.post_json(&url, &serde_json::json!({})).await?;
        Ok(())
    }
}
