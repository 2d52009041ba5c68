//! Loan application intake
//!
//! Contains the rate table, models and service for application management.

mod model;
mod rates;
mod service;

pub use model::*;
pub use rates::{interest_on, total_with_interest, RateQuote, RateTable, MAX_TENOR_MONTHS, MIN_TENOR_MONTHS};
pub use service::ApplicationService;
