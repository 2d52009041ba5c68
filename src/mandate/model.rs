//! Debit mandate model

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::providers::ProviderMandateStatus;

/// Standing debit authorization for one customer/business pair
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct DebitMandate {
    pub id: Uuid,
    pub reference: String,
    pub offer_id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub amount: i64,
    pub provider_reference: String,
    pub provider_status: ProviderMandateStatus,
    #[serde(skip_serializing)]
    pub authorization_code: Option<String>,
    /// Only true once the provider confirmed activation
    pub chargeable: bool,
    pub channel: Option<String>,
    pub bank: Option<String>,
    /// Deadline for the provider to confirm activation
    pub activation_deadline: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DebitMandate {
    /// Still waiting on provider activation
    pub fn is_pending(&self) -> bool {
        !self.chargeable && !self.provider_status.is_terminal() && self.revoked_at.is_none()
    }

    pub fn activation_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        !self.chargeable && now > self.activation_deadline
    }
}

/// What a verification attempt found
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "mandate", rename_all = "snake_case")]
pub enum MandateVerification {
    Activated(DebitMandate),
    AlreadyActive(DebitMandate),
    StillPending(DebitMandate),
}

impl MandateVerification {
    pub fn mandate(&self) -> &DebitMandate {
        match self {
            MandateVerification::Activated(m)
            | MandateVerification::AlreadyActive(m)
            | MandateVerification::StillPending(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mandate() -> DebitMandate {
        let now = Utc::now();
        DebitMandate {
            id: Uuid::new_v4(),
            reference: "MDT-000001".into(),
            offer_id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            amount: 10_000,
            provider_reference: "mono_abc".into(),
            provider_status: ProviderMandateStatus::Initiated,
            authorization_code: None,
            chargeable: false,
            channel: None,
            bank: None,
            activation_deadline: now + Duration::hours(72),
            activated_at: None,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_pending_mandate() {
        let mut m = mandate();
        assert!(m.is_pending());

        m.chargeable = true;
        assert!(!m.is_pending());

        let mut cancelled = mandate();
        cancelled.provider_status = ProviderMandateStatus::Cancelled;
        assert!(!cancelled.is_pending());
    }

    #[test]
    fn test_activation_window() {
        let m = mandate();
        assert!(!m.activation_window_elapsed(Utc::now()));
        assert!(m.activation_window_elapsed(Utc::now() + Duration::hours(73)));

        let mut active = mandate();
        active.chargeable = true;
        assert!(!active.activation_window_elapsed(Utc::now() + Duration::days(30)));
    }

    #[test]
    fn test_authorization_code_not_serialized() {
        let mut m = mandate();
        m.authorization_code = Some("AUTH_secret".into());
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("AUTH_secret"));
    }
}
