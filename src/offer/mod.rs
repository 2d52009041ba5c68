//! Offer negotiation

mod model;
mod service;

pub use model::*;
pub use service::{AcceptanceOutcome, OfferService};
