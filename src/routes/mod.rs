//! Route definitions for the VendCredit API

mod application;
mod loan;
mod mandate;
mod offer;
mod wallet;
mod webhook;

pub use application::application_routes;
pub use loan::loan_routes;
pub use mandate::mandate_routes;
pub use offer::offer_routes;
pub use wallet::wallet_routes;
pub use webhook::webhook_routes;
