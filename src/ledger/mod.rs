//! Wallet ledger domain module
//!
//! The only authorized path for changing a wallet balance.

mod model;
mod service;

pub use model::*;
pub use service::LedgerService;
