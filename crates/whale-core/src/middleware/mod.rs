//! Request admission for the public API.
//!
//! This module holds the transport-agnostic half of the rate limiter. The `server`
//! crate wraps it in an axum middleware that derives the client identity from the
//! connection and renders rejections as `429 Too Many Requests`.
//!
//! # Sliding Log
//!
//! Every identity keeps the instants of its admitted requests that are younger than
//! the window:
//!
//! ```text
//! window = 60s, ceiling = 3
//!
//! t=0s   admit   log [0]
//! t=10s  admit   log [0, 10]
//! t=20s  admit   log [0, 10, 20]
//! t=30s  reject  retry_after = 30s   (oldest admission leaves at t=60s)
//! t=60s  admit   log [10, 20, 60]
//! ```
//!
//! Rejections never enter the log, so a client hammering the endpoint while limited
//! does not extend its own penalty.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use whale_core::middleware::{Admission, RateLimiter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = RateLimiter::new(60, Duration::from_secs(60));
//!
//! match limiter.admit("203.0.113.7") {
//!     Admission::Admitted { remaining } => println!("{remaining} left"),
//!     Admission::Rejected { retry_after } => println!("retry in {retry_after:?}"),
//! }
//! # }
//! ```

pub mod rate_limiting;

pub use rate_limiting::{Admission, RateLimitConfig, RateLimited, RateLimiter};
