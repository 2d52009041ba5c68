//! Mandate authority

mod model;
mod service;

pub use model::*;
pub use service::MandateService;
