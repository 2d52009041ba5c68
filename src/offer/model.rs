//! Credit offer models and repayment breakdown

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::error::{CreditError, CreditResult};
use crate::providers::ScoreCategory;

/// One installment of an offer's repayment breakdown
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Installment {
    pub sequence: i16,
    pub due_date: NaiveDate,
    pub principal: i64,
    pub interest: i64,
}

impl Installment {
    pub fn amount(&self) -> i64 {
        self.principal + self.interest
    }
}

/// Credit offer model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CreditOffer {
    pub id: Uuid,
    pub reference: String,
    pub application_id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub offer_amount: i64,
    pub interest_rate_bps: i32,
    pub interest_amount: i64,
    pub total_amount: i64,
    pub tenor_months: i16,
    pub breakdown: Json<Vec<Installment>>,
    pub has_mandate: bool,
    pub has_active_debit_card: bool,
    /// At most one valid offer exists per application
    pub is_valid: bool,
    pub score_percent: i16,
    pub score_category: ScoreCategory,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived lifecycle state of an offer
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OfferState {
    Active,
    Accepted,
    Rejected,
    /// Replaced by a newer offer or lapsed unanswered
    Invalid,
}

impl CreditOffer {
    pub fn state(&self) -> OfferState {
        if self.accepted_at.is_some() {
            OfferState::Accepted
        } else if self.rejected_at.is_some() {
            OfferState::Rejected
        } else if !self.is_valid {
            OfferState::Invalid
        } else {
            OfferState::Active
        }
    }

    pub fn installments(&self) -> &[Installment] {
        &self.breakdown.0
    }
}

/// Request DTO for creating an offer
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOfferRequest {
    #[validate(range(min = 1))]
    pub offer_amount: i64,
    #[serde(default)]
    pub has_mandate: bool,
    #[serde(default)]
    pub has_active_debit_card: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OfferDecision {
    Accept,
    Reject { reason: String },
}

/// Equal-installment breakdown of `principal + interest` over `tenor` months.
///
/// Each part is split evenly; the division remainder lands on the last
/// installment so the rows always sum to the totals. The first installment
/// falls one month after `anchor`.
pub fn build_breakdown(
    principal: i64,
    interest: i64,
    tenor: i16,
    anchor: NaiveDate,
) -> CreditResult<Vec<Installment>> {
    if tenor < 1 {
        return Err(CreditError::validation("Tenor must be at least one month"));
    }
    if principal <= 0 || interest < 0 {
        return Err(CreditError::validation(
            "Breakdown needs a positive principal and non-negative interest",
        ));
    }

    let n = tenor as i64;
    let (principal_each, interest_each) = (principal / n, interest / n);

    (1..=tenor)
        .map(|sequence| {
            let last = sequence == tenor;
            let carried = n - 1;
            Ok(Installment {
                sequence,
                due_date: due_date(anchor, sequence)?,
                principal: if last {
                    principal - principal_each * carried
                } else {
                    principal_each
                },
                interest: if last {
                    interest - interest_each * carried
                } else {
                    interest_each
                },
            })
        })
        .collect()
}

/// Shift due dates so the first installment falls one month after `accepted_on`
pub fn reanchor(breakdown: &[Installment], accepted_on: NaiveDate) -> CreditResult<Vec<Installment>> {
    breakdown
        .iter()
        .map(|installment| {
            Ok(Installment {
                due_date: due_date(accepted_on, installment.sequence)?,
                ..installment.clone()
            })
        })
        .collect()
}

fn due_date(anchor: NaiveDate, months_after: i16) -> CreditResult<NaiveDate> {
    anchor
        .checked_add_months(Months::new(months_after as u32))
        .ok_or_else(|| CreditError::validation(format!("Due date out of range from {}", anchor)))
}
