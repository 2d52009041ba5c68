//! Lender matching for loan applications

mod model;
mod service;

pub use model::*;
pub use service::LenderService;
