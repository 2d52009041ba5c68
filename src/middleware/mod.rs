//! HTTP middleware: request tracing, rate limiting and security headers

mod rate_limiter;
mod security;
mod tracing;

pub use rate_limiter::{rate_limit_layer, spawn_cleanup, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
