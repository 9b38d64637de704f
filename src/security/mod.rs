//! Security and request limits.
//!
//! # Responsibilities
//! - Per-IP rate limiting (token bucket)
//! - Request body size enforcement lives in the HTTP handler, which can
//!   render the client-legible error page

pub mod rate_limit;

pub use rate_limit::RateLimiter;
