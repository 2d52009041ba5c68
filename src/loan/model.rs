//! Loan models and data structures

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CreditError, CreditResult};
use crate::offer::Installment;
use crate::repayment::RepaymentSchedule;

/// Loan status enumeration
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    /// Created at offer acceptance, voucher not yet issued
    Pending,
    Disbursed,
    /// At least one installment collected
    Ongoing,
    Completed,
}

impl LoanStatus {
    /// Whether installments may be collected
    pub fn is_collectable(&self) -> bool {
        matches!(self, LoanStatus::Disbursed | LoanStatus::Ongoing)
    }
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub application_id: Uuid,
    pub offer_id: Uuid,
    pub capital_amount: i64,
    pub interest_amount: i64,
    pub total_amount: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: LoanStatus,
    /// Assigned once, on the transition to DISBURSED
    pub voucher_number: Option<String>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loan with its repayment schedule, due date order
#[derive(Debug, Serialize)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub schedule: Vec<RepaymentSchedule>,
}

/// Status after a repayment given how many rows are still open
pub fn status_after_repayment(current: LoanStatus, open_rows: i64) -> LoanStatus {
    match (current, open_rows) {
        (LoanStatus::Completed, _) => LoanStatus::Completed,
        (_, 0) => LoanStatus::Completed,
        (LoanStatus::Disbursed, _) => LoanStatus::Ongoing,
        (other, _) => other,
    }
}

/// Schedule rows must sum exactly to the loan total and be in due date order
pub fn check_schedule(total_amount: i64, installments: &[Installment]) -> CreditResult<()> {
    if installments.is_empty() {
        return Err(CreditError::IntegrityViolation(
            "Repayment breakdown is empty".to_string(),
        ));
    }

    let sum: i64 = installments.iter().map(Installment::amount).sum();
    if sum != total_amount {
        return Err(CreditError::IntegrityViolation(format!(
            "Repayment breakdown sums to {} but loan total is {}",
            sum, total_amount
        )));
    }

    if installments
        .windows(2)
        .any(|w| w[0].due_date >= w[1].due_date || w[0].sequence >= w[1].sequence)
    {
        return Err(CreditError::IntegrityViolation(
            "Repayment breakdown is not in due date order".to_string(),
        ));
    }

    if installments.iter().any(|i| i.principal < 0 || i.interest < 0) {
        return Err(CreditError::IntegrityViolation(
            "Repayment breakdown has a negative installment".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::build_breakdown;

    fn breakdown() -> Vec<Installment> {
        build_breakdown(7_000, 560, 3, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap()
    }

    #[test]
    fn test_schedule_conservation() {
        assert!(check_schedule(7_560, &breakdown()).is_ok());
        assert!(matches!(
            check_schedule(7_561, &breakdown()),
            Err(CreditError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_schedule_order() {
        let mut rows = breakdown();
        rows.swap(0, 1);
        assert!(check_schedule(7_560, &rows).is_err());
        assert!(check_schedule(0, &[]).is_err());
    }

    #[test]
    fn test_status_after_repayment() {
        assert_eq!(status_after_repayment(LoanStatus::Disbursed, 2), LoanStatus::Ongoing);
        assert_eq!(status_after_repayment(LoanStatus::Ongoing, 1), LoanStatus::Ongoing);
        assert_eq!(status_after_repayment(LoanStatus::Ongoing, 0), LoanStatus::Completed);
        assert_eq!(status_after_repayment(LoanStatus::Disbursed, 0), LoanStatus::Completed);
    }

    #[test]
    fn test_collectable_statuses() {
        assert!(!LoanStatus::Pending.is_collectable());
        assert!(LoanStatus::Disbursed.is_collectable());
        assert!(LoanStatus::Ongoing.is_collectable());
        assert!(!LoanStatus::Completed.is_collectable());
    }
}
