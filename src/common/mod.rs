//! Common utilities shared by the notification path
//!
//! - Rate limiter using token bucket algorithm

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
