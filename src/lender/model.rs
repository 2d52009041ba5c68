//! Lender match models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "lender_match_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LenderMatchStatus {
    Pending,
    Matched,
    Approved,
    Declined,
}

impl LenderMatchStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, LenderMatchStatus::Pending | LenderMatchStatus::Matched)
    }

    /// Status after a lender decision. Decided matches keep their decision.
    pub fn decide(self, approved: bool) -> Option<LenderMatchStatus> {
        if !self.is_open() {
            return None;
        }
        Some(if approved {
            LenderMatchStatus::Approved
        } else {
            LenderMatchStatus::Declined
        })
    }
}

/// Lender matching record for an application
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LenderMatch {
    pub id: Uuid,
    pub reference: String,
    pub application_id: Uuid,
    pub lender_id: Option<Uuid>,
    pub status: LenderMatchStatus,
    pub provider_reference: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LenderMatchRequest {
    pub lender_id: Option<Uuid>,
    pub provider_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decisions_only_apply_to_open_matches() {
        assert_eq!(
            LenderMatchStatus::Pending.decide(true),
            Some(LenderMatchStatus::Approved)
        );
        assert_eq!(
            LenderMatchStatus::Matched.decide(false),
            Some(LenderMatchStatus::Declined)
        );
        assert_eq!(LenderMatchStatus::Approved.decide(false), None);
        assert_eq!(LenderMatchStatus::Declined.decide(true), None);
    }
}
