//! Credit lifecycle events and the fire-and-forget dispatcher
//!
//! Services publish after their transaction commits. Delivery to vendor
//! webhooks happens on a background task; nothing here can fail or roll back
//! the financial write that produced the event.

mod dispatcher;

pub use dispatcher::EventDispatcher;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CreditEvent {
    ApplicationCreated {
        business_id: Uuid,
        reference: String,
    },
    ApplicationReviewed {
        business_id: Uuid,
        reference: String,
        approved: bool,
    },
    OfferCreated {
        business_id: Uuid,
        reference: String,
        amount: i64,
    },
    OfferAccepted {
        business_id: Uuid,
        reference: String,
        loan_id: Uuid,
    },
    OfferRejected {
        business_id: Uuid,
        reference: String,
        reason: String,
    },
    MandateActivated {
        business_id: Uuid,
        reference: String,
    },
    LoanDisbursed {
        business_id: Uuid,
        loan_id: Uuid,
        voucher_number: String,
    },
    RepaymentPaid {
        business_id: Uuid,
        loan_id: Uuid,
        schedule_id: Uuid,
        amount: i64,
    },
    RepaymentFailed {
        business_id: Uuid,
        loan_id: Uuid,
        schedule_id: Uuid,
        reason: String,
    },
    LoanCompleted {
        business_id: Uuid,
        loan_id: Uuid,
    },
}

impl CreditEvent {
    /// Vendor the event belongs to
    pub fn business_id(&self) -> Uuid {
        match self {
            CreditEvent::ApplicationCreated { business_id, .. }
            | CreditEvent::ApplicationReviewed { business_id, .. }
            | CreditEvent::OfferCreated { business_id, .. }
            | CreditEvent::OfferAccepted { business_id, .. }
            | CreditEvent::OfferRejected { business_id, .. }
            | CreditEvent::MandateActivated { business_id, .. }
            | CreditEvent::LoanDisbursed { business_id, .. }
            | CreditEvent::RepaymentPaid { business_id, .. }
            | CreditEvent::RepaymentFailed { business_id, .. }
            | CreditEvent::LoanCompleted { business_id, .. } => *business_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CreditEvent::ApplicationCreated { .. } => "application.created",
            CreditEvent::ApplicationReviewed { .. } => "application.reviewed",
            CreditEvent::OfferCreated { .. } => "offer.created",
            CreditEvent::OfferAccepted { .. } => "offer.accepted",
            CreditEvent::OfferRejected { .. } => "offer.rejected",
            CreditEvent::MandateActivated { .. } => "mandate.activated",
            CreditEvent::LoanDisbursed { .. } => "loan.disbursed",
            CreditEvent::RepaymentPaid { .. } => "repayment.paid",
            CreditEvent::RepaymentFailed { .. } => "repayment.failed",
            CreditEvent::LoanCompleted { .. } => "loan.completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let business_id = Uuid::new_v4();
        let event = CreditEvent::OfferCreated {
            business_id,
            reference: "OFR-1".into(),
            amount: 5_000,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "offer_created");
        assert_eq!(json["data"]["amount"], 5_000);
        assert_eq!(event.business_id(), business_id);
        assert_eq!(event.name(), "offer.created");
    }
}
