//! API handlers for the credit lifecycle and wallet ledger

mod application;
mod health;
mod loan;
mod mandate;
mod offer;
mod wallet;
mod webhook;

pub use application::*;
pub use health::health_check;
pub use loan::*;
pub use mandate::*;
pub use offer::*;
pub use wallet::*;
pub use webhook::*;
