//! External provider collaborators
//!
//! Mandate, credit scoring and identity providers are reached over HTTP with
//! bounded timeouts. Each is behind a trait so services can be driven by
//! stubs in tests.

pub mod client;
pub mod kyc;
pub mod mandate;
pub mod scoring;

pub use client::ProviderClient;
pub use kyc::{HttpIdentityVerifier, IdentityVerification, IdentityVerifier};
pub use mandate::{
    DebitRequest, DebitResult, DebitStatus, HttpMandateProvider, MandateProvider,
    MandateRequest, ProviderMandate, ProviderMandateStatus,
};
pub use scoring::{CreditEvaluation, CreditScorer, HttpCreditScorer, ScoreCategory};
