//! Webhook payloads and event routing

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CreditError, CreditResult};

/// Inbound provider callback body
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookPayload {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookData {
    /// Local or provider reference of the entity the event concerns
    pub reference: String,
    pub status: Option<String>,
    pub amount: Option<i64>,
    pub authorization_code: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> CreditResult<Self> {
        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| CreditError::validation(format!("Malformed webhook body: {}", e)))?;
        if payload.event.trim().is_empty() || payload.data.reference.trim().is_empty() {
            return Err(CreditError::validation(
                "Webhook event and data.reference are required",
            ));
        }
        Ok(payload)
    }

    /// Key a redelivery of the same event shares
    pub fn event_key(&self) -> String {
        format!("{}:{}", self.event.to_lowercase(), self.data.reference)
    }

    pub fn route(&self) -> WebhookRoute {
        WebhookRoute::from_event(&self.event)
    }

    /// Vendor named in the metadata, for payments with no local collection
    pub fn business_id(&self) -> Option<Uuid> {
        self.data
            .metadata
            .get("business_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn failure_reason(&self) -> String {
        self.data
            .metadata
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.data.status.clone())
            .unwrap_or_else(|| "Payment failed".to_string())
    }
}

/// Local state transition an event maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRoute {
    MandateActivated,
    MandateRevoked,
    PaymentSucceeded,
    PaymentFailed,
    LenderDecision { approved: bool },
    Identity,
    Unroutable,
}

impl WebhookRoute {
    pub fn from_event(event: &str) -> Self {
        match event.trim().to_lowercase().as_str() {
            "mandate.activated" | "mandate.approved" | "mandate.ready" => {
                WebhookRoute::MandateActivated
            }
            "mandate.cancelled" | "mandate.revoked" => WebhookRoute::MandateRevoked,
            "payment.successful" | "charge.success" | "debit.successful" => {
                WebhookRoute::PaymentSucceeded
            }
            "payment.failed" | "charge.failed" | "debit.failed" => WebhookRoute::PaymentFailed,
            "application.approved" => WebhookRoute::LenderDecision { approved: true },
            "application.declined" | "application.rejected" => {
                WebhookRoute::LenderDecision { approved: false }
            }
            other if other.starts_with("kyc.") => WebhookRoute::Identity,
            _ => WebhookRoute::Unroutable,
        }
    }
}

/// What happened to a delivery
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    /// Event was new but the state it carries was already in place
    AlreadyApplied,
    /// Same event seen before
    Duplicate,
    /// Recorded and acknowledged without a state change
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::AlreadyApplied => "already_applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Acknowledgement returned to the provider
#[derive(Debug, Serialize)]
pub struct WebhookReceipt {
    pub provider: String,
    pub event: String,
    pub reference: String,
    pub outcome: WebhookOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> WebhookPayload {
        WebhookPayload::parse(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_routing() {
        assert_eq!(WebhookRoute::from_event("mandate.activated"), WebhookRoute::MandateActivated);
        assert_eq!(WebhookRoute::from_event("Charge.Success"), WebhookRoute::PaymentSucceeded);
        assert_eq!(WebhookRoute::from_event("payment.failed"), WebhookRoute::PaymentFailed);
        assert_eq!(
            WebhookRoute::from_event("application.declined"),
            WebhookRoute::LenderDecision { approved: false }
        );
        assert_eq!(WebhookRoute::from_event("kyc.completed"), WebhookRoute::Identity);
        assert_eq!(WebhookRoute::from_event("invoice.created"), WebhookRoute::Unroutable);
    }

    #[test]
    fn test_event_key_is_stable() {
        let a = payload(r#"{"event":"payment.successful","data":{"reference":"COL-000001","amount":500}}"#);
        let b = payload(r#"{"event":"PAYMENT.SUCCESSFUL","data":{"reference":"COL-000001","amount":500,"status":"ok"}}"#);
        assert_eq!(a.event_key(), b.event_key());
        assert_eq!(a.event_key(), "payment.successful:COL-000001");
    }

    #[test]
    fn test_metadata_helpers() {
        let id = Uuid::new_v4();
        let p = payload(&format!(
            r#"{{"event":"payment.failed","data":{{"reference":"R1","metadata":{{"business_id":"{}","reason":"insufficient balance"}}}}}}"#,
            id
        ));
        assert_eq!(p.business_id(), Some(id));
        assert_eq!(p.failure_reason(), "insufficient balance");

        let bare = payload(r#"{"event":"payment.failed","data":{"reference":"R2","status":"declined"}}"#);
        assert_eq!(bare.business_id(), None);
        assert_eq!(bare.failure_reason(), "declined");
    }

    #[test]
    fn test_parse_rejects_incomplete_bodies() {
        assert!(WebhookPayload::parse(b"not json").is_err());
        assert!(WebhookPayload::parse(br#"{"event":"payment.successful","data":{"reference":""}}"#).is_err());
        assert!(WebhookPayload::parse(br#"{"event":"","data":{"reference":"R"}}"#).is_err());
    }
}
