//! Loan application models and data structures

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::rates::{validate_amount, validate_tenor, RateTable};
use crate::error::{CreditError, CreditResult};

/// Channel the application came in through
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "application_source", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationSource {
    #[default]
    Dashboard,
    Ecommerce,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// Offers may only be made against a live application
    pub fn accepts_offers(&self) -> bool {
        matches!(self, ApplicationStatus::Pending | ApplicationStatus::Approved)
    }

    /// Apply a review decision. Only pending applications can be reviewed.
    pub fn review(self, decision: &ReviewDecision) -> CreditResult<ApplicationStatus> {
        if self != ApplicationStatus::Pending {
            return Err(CreditError::conflict(format!(
                "Application is {:?}, only PENDING applications can be reviewed",
                self
            )));
        }
        Ok(match decision {
            ReviewDecision::Approve => ApplicationStatus::Approved,
            ReviewDecision::Reject { .. } => ApplicationStatus::Rejected,
        })
    }
}

/// Loan application model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanApplication {
    pub id: Uuid,
    pub reference: String,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub requested_amount: i64,
    /// Snapshot of the rate used at creation (or last amount/tenor change)
    pub interest_rate_bps: i32,
    pub interest_amount: i64,
    pub total_amount: i64,
    pub duration_in_months: i16,
    pub rate_table_version: i32,
    pub source: ApplicationSource,
    pub status: ApplicationStatus,
    pub review_note: Option<String>,
    pub identity_profile_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity document presented with an application
#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct IdentityRef {
    #[validate(length(min = 2, max = 16))]
    pub identity_type: String,
    #[validate(length(min = 6, max = 32))]
    pub identity_number: String,
}

/// Request DTO for creating an application
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApplicationRequest {
    pub business_id: Uuid,
    pub customer_id: Uuid,
    #[validate(range(min = 1))]
    pub requested_amount: i64,
    #[validate(range(min = 1, max = 12))]
    pub duration_in_months: i16,
    #[serde(default)]
    pub source: ApplicationSource,
    #[validate]
    pub identity: Option<IdentityRef>,
}

/// Partial update. `None` means "not provided"; provided values are applied
/// as given, including zero, and then validated.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ApplicationPatch {
    pub requested_amount: Option<i64>,
    pub duration_in_months: Option<i16>,
    pub source: Option<ApplicationSource>,
}

impl ApplicationPatch {
    pub fn is_empty(&self) -> bool {
        self.requested_amount.is_none()
            && self.duration_in_months.is_none()
            && self.source.is_none()
    }
}

/// Terms the application row is written with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationTerms {
    pub requested_amount: i64,
    pub duration_in_months: i16,
    pub interest_rate_bps: i32,
    pub interest_amount: i64,
    pub total_amount: i64,
    pub rate_table_version: i32,
    pub source: ApplicationSource,
}

impl ApplicationTerms {
    /// Fresh terms priced from `table`
    pub fn price(
        table: &RateTable,
        requested_amount: i64,
        duration_in_months: i16,
        source: ApplicationSource,
    ) -> CreditResult<Self> {
        let quote = table.quote(requested_amount, duration_in_months)?;
        Ok(Self {
            requested_amount,
            duration_in_months,
            interest_rate_bps: quote.interest_rate_bps,
            interest_amount: quote.interest_amount,
            total_amount: quote.total_amount,
            rate_table_version: quote.rate_table_version,
            source,
        })
    }

    pub fn of(application: &LoanApplication) -> Self {
        Self {
            requested_amount: application.requested_amount,
            duration_in_months: application.duration_in_months,
            interest_rate_bps: application.interest_rate_bps,
            interest_amount: application.interest_amount,
            total_amount: application.total_amount,
            rate_table_version: application.rate_table_version,
            source: application.source,
        }
    }

    /// Apply a patch. The rate snapshot is only re-derived when the amount or
    /// tenor actually changes.
    pub fn patched(&self, patch: &ApplicationPatch, table: &RateTable) -> CreditResult<Self> {
        let amount = patch.requested_amount.unwrap_or(self.requested_amount);
        let tenor = patch.duration_in_months.unwrap_or(self.duration_in_months);
        let source = patch.source.unwrap_or(self.source);

        validate_amount(amount)?;
        validate_tenor(tenor)?;

        if amount == self.requested_amount && tenor == self.duration_in_months {
            return Ok(Self {
                source,
                ..self.clone()
            });
        }

        Self::price(table, amount, tenor, source)
    }
}

/// Review action on a pending application
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> ApplicationTerms {
        ApplicationTerms::price(&RateTable::standard(), 50_000, 3, ApplicationSource::Dashboard)
            .unwrap()
    }

    #[test]
    fn test_price_snapshot() {
        let t = terms();
        assert_eq!(t.interest_rate_bps, 800);
        assert_eq!(t.interest_amount, 4_000);
        assert_eq!(t.total_amount, 54_000);
    }

    #[test]
    fn test_patch_source_keeps_rate_snapshot() {
        let original = terms();
        // A newer table must not reprice an application whose terms did not change
        let newer = RateTable::parse(2, "3:9999,12:9999").unwrap();
        let patch = ApplicationPatch {
            source: Some(ApplicationSource::Ecommerce),
            ..Default::default()
        };

        let patched = original.patched(&patch, &newer).unwrap();
        assert_eq!(patched.source, ApplicationSource::Ecommerce);
        assert_eq!(patched.interest_amount, original.interest_amount);
        assert_eq!(patched.rate_table_version, 1);
    }

    #[test]
    fn test_patch_amount_reprices() {
        let patch = ApplicationPatch {
            requested_amount: Some(100_000),
            ..Default::default()
        };
        let patched = terms().patched(&patch, &RateTable::standard()).unwrap();
        assert_eq!(patched.total_amount, 108_000);
        assert_eq!(patched.duration_in_months, 3);
    }

    #[test]
    fn test_patch_zero_is_applied_not_dropped() {
        // Zero is a provided value and must be validated, not silently ignored
        let patch = ApplicationPatch {
            requested_amount: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            terms().patched(&patch, &RateTable::standard()),
            Err(CreditError::Validation(_))
        ));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(ApplicationPatch::default().is_empty());
        let json: ApplicationPatch = serde_json::from_str(r#"{"duration_in_months": 6}"#).unwrap();
        assert!(!json.is_empty());
        assert_eq!(json.requested_amount, None);
    }

    #[test]
    fn test_review_transitions() {
        let approved = ApplicationStatus::Pending
            .review(&ReviewDecision::Approve)
            .unwrap();
        assert_eq!(approved, ApplicationStatus::Approved);

        let reject = ReviewDecision::Reject {
            reason: "thin file".into(),
        };
        assert_eq!(
            ApplicationStatus::Pending.review(&reject).unwrap(),
            ApplicationStatus::Rejected
        );
        assert!(ApplicationStatus::Rejected.review(&ReviewDecision::Approve).is_err());
        assert!(ApplicationStatus::Approved.review(&reject).is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ApplicationStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        let source: ApplicationSource = serde_json::from_str("\"ECOMMERCE\"").unwrap();
        assert_eq!(source, ApplicationSource::Ecommerce);
    }

    #[test]
    fn test_create_request_validation() {
        let mut request = CreateApplicationRequest {
            business_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            requested_amount: 10_000,
            duration_in_months: 6,
            source: ApplicationSource::Dashboard,
            identity: None,
        };
        assert!(request.validate().is_ok());

        request.duration_in_months = 13;
        assert!(request.validate().is_err());

        request.duration_in_months = 12;
        request.requested_amount = 0;
        assert!(request.validate().is_err());
    }
}
