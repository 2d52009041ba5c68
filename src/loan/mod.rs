//! Loans and the disbursement engine

mod model;
mod service;

pub use model::*;
pub use service::LoanService;
