//! Inbound provider webhooks: signature gate and idempotent reconciliation

mod model;
mod service;
mod signature;

pub use model::*;
pub use service::WebhookService;
pub use signature::{sign, verify, SignatureAlgorithm, WebhookIntegration, SIGNATURE_HEADER};
