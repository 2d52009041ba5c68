//! Repayment schedule and log models, FIFO allocation

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

use crate::error::{CreditError, CreditResult};

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "schedule_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    Pending,
    /// A collection attempt is in flight
    Processing,
    Paid,
    Cancelled,
}

impl ScheduleStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ScheduleStatus::Pending | ScheduleStatus::Processing)
    }
}

/// One installment row of a loan
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct RepaymentSchedule {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub sequence: i16,
    pub due_date: NaiveDate,
    pub principal: i64,
    pub interest: i64,
    pub amount_paid: i64,
    pub status: ScheduleStatus,
    pub collection_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepaymentSchedule {
    pub fn amount(&self) -> i64 {
        self.principal + self.interest
    }

    pub fn outstanding(&self) -> i64 {
        self.amount() - self.amount_paid
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_channel", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentChannel {
    Mandate,
    Manual,
    Webhook,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_log_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentLogStatus {
    Successful,
    Failed,
}

/// Append-only audit row for one repayment attempt
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct RepaymentLog {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub amount_paid: i64,
    pub capital_paid: i64,
    pub interest_paid: i64,
    pub penalty_fee: i64,
    pub channel: RepaymentChannel,
    pub status: RepaymentLogStatus,
    pub provider_reference: Option<String>,
    pub provider_response: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for a manual payment
#[derive(Debug, Deserialize, Validate)]
pub struct ManualPaymentRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 128))]
    pub reference: String,
}

/// Share of a payment applied to one schedule row
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub schedule_id: Uuid,
    pub applied: i64,
    pub capital: i64,
    pub interest: i64,
    /// The row is fully paid after this allocation
    pub retires: bool,
}

/// Spread `amount` over `rows` oldest first.
///
/// Rows are taken in due date order whatever order they are passed in. Within
/// a row interest is settled before capital. Paying more than is outstanding
/// is rejected, and so is paying while a collection is in flight: that row
/// may fall back to PENDING after a later one was retired.
pub fn allocate_payment(rows: &[RepaymentSchedule], amount: i64) -> CreditResult<Vec<Allocation>> {
    if amount <= 0 {
        return Err(CreditError::validation("Payment amount must be positive"));
    }
    if let Some(in_flight) = rows.iter().find(|r| r.status == ScheduleStatus::Processing) {
        return Err(CreditError::conflict(format!(
            "Installment {} has a collection in flight ({})",
            in_flight.sequence,
            in_flight.collection_reference.as_deref().unwrap_or("unreferenced")
        )));
    }

    let mut open: Vec<&RepaymentSchedule> = rows
        .iter()
        .filter(|r| r.status == ScheduleStatus::Pending && r.outstanding() > 0)
        .collect();
    open.sort_by_key(|r| (r.due_date, r.sequence));

    let outstanding: i64 = open.iter().map(|r| r.outstanding()).sum();
    if amount > outstanding {
        return Err(CreditError::validation(format!(
            "Payment {} exceeds outstanding balance {}",
            amount, outstanding
        )));
    }

    let mut remaining = amount;
    let mut allocations = Vec::new();

    for row in open {
        if remaining == 0 {
            break;
        }
        let applied = remaining.min(row.outstanding());
        let interest_open = (row.interest - row.amount_paid).max(0);
        let interest = applied.min(interest_open);

        allocations.push(Allocation {
            schedule_id: row.id,
            applied,
            capital: applied - interest,
            interest,
            retires: applied == row.outstanding(),
        });
        remaining -= applied;
    }

    Ok(allocations)
}

/// Oldest row that can be collected next
pub fn next_collectable(rows: &[RepaymentSchedule]) -> Option<&RepaymentSchedule> {
    rows.iter()
        .filter(|r| r.status == ScheduleStatus::Pending)
        .min_by_key(|r| (r.due_date, r.sequence))
}

/// Result of a collection attempt against a loan
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "schedule", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Paid(RepaymentSchedule),
    Failed(RepaymentSchedule),
    /// Outcome unknown; left PROCESSING for reconciliation
    Pending(RepaymentSchedule),
    NothingDue,
}

/// Result of settling a collection reference
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "schedule", rename_all = "snake_case")]
pub enum SettleOutcome {
    Settled(RepaymentSchedule),
    AlreadySettled(RepaymentSchedule),
}

#[derive(Debug, Serialize)]
pub struct ManualPaymentOutcome {
    pub already_applied: bool,
    pub allocations: Vec<Allocation>,
    pub ledger_reference: String,
}

/// Counters for one due-date sweep
#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub loans: usize,
    pub paid: usize,
    pub failed: usize,
    pub pending: usize,
    pub errors: usize,
}

/// Counters for one pass over collections stuck in flight
#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub collections: usize,
    pub paid: usize,
    pub failed: usize,
    pub pending: usize,
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(month: u32, principal: i64, interest: i64, amount_paid: i64) -> RepaymentSchedule {
        RepaymentSchedule {
            id: Uuid::new_v4(),
            loan_id: Uuid::nil(),
            sequence: month as i16,
            due_date: NaiveDate::from_ymd_opt(2024, month, 10).unwrap(),
            principal,
            interest,
            amount_paid,
            status: ScheduleStatus::Pending,
            collection_reference: None,
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fifo_regardless_of_input_order() {
        let m1 = row(1, 1_000, 100, 0);
        let m2 = row(2, 1_000, 100, 0);
        let m3 = row(3, 1_000, 100, 0);
        let shuffled = vec![m3.clone(), m1.clone(), m2.clone()];

        let allocations = allocate_payment(&shuffled, 1_100).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].schedule_id, m1.id);
        assert!(allocations[0].retires);

        assert_eq!(next_collectable(&shuffled).unwrap().id, m1.id);
    }

    #[test]
    fn test_partial_payment_spans_rows() {
        let m1 = row(1, 1_000, 100, 0);
        let m2 = row(2, 1_000, 100, 0);

        let allocations = allocate_payment(&[m1.clone(), m2.clone()], 1_500).unwrap();
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].applied, 1_100);
        assert!(allocations[0].retires);

        // Interest before capital on the partially paid row
        assert_eq!(allocations[1].applied, 400);
        assert_eq!(allocations[1].interest, 100);
        assert_eq!(allocations[1].capital, 300);
        assert!(!allocations[1].retires);
    }

    #[test]
    fn test_allocation_respects_amount_paid() {
        let m1 = row(1, 1_000, 100, 1_050);
        let m2 = row(2, 1_000, 100, 0);

        let allocations = allocate_payment(&[m1.clone(), m2], 50).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].schedule_id, m1.id);
        assert_eq!(allocations[0].capital, 50);
        assert_eq!(allocations[0].interest, 0);
        assert!(allocations[0].retires);
    }

    #[test]
    fn test_overpayment_rejected() {
        let rows = vec![row(1, 1_000, 100, 0)];
        assert!(matches!(allocate_payment(&rows, 1_101), Err(CreditError::Validation(_))));
        assert!(allocate_payment(&rows, 0).is_err());
    }

    #[test]
    fn test_paid_rows_are_skipped() {
        let mut m1 = row(1, 1_000, 100, 1_100);
        m1.status = ScheduleStatus::Paid;
        let m2 = row(2, 1_000, 100, 0);

        let rows = vec![m1, m2.clone()];
        let allocations = allocate_payment(&rows, 200).unwrap();
        assert_eq!(allocations[0].schedule_id, m2.id);
        assert_eq!(next_collectable(&rows).unwrap().id, m2.id);
    }

    #[test]
    fn test_collection_in_flight_blocks_manual_allocation() {
        let mut m1 = row(1, 1_000, 100, 0);
        m1.status = ScheduleStatus::Processing;
        m1.collection_reference = Some("COL-1".to_string());
        let m2 = row(2, 1_000, 100, 0);

        // Retiring month 2 now would leave month 1 open if its debit fails
        let err = allocate_payment(&[m1, m2], 1_100).unwrap_err();
        assert!(matches!(err, CreditError::StateConflict(_)));
    }

    #[test]
    fn test_nothing_collectable() {
        let mut m1 = row(1, 10, 0, 10);
        m1.status = ScheduleStatus::Paid;
        assert!(next_collectable(&[m1]).is_none());
    }
}
