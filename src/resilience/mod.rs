//! 弹性模块：批次限速与重试协调。
//!
//! # Resilience Primitives Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Minimum spacing between consecutive batch starts |
//! | [`retry`] | Iterative retry loop over the concurrent dispatcher |
//!
//! ## Rate Limiter
//!
//! ```rust
//! use reach_client::resilience::rate_limiter::wait_before_next;
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let now = Instant::now();
//! let wait = wait_before_next(Some(now), Duration::from_millis(1100), now);
//! assert_eq!(wait, Duration::from_millis(1100));
//! ```
//!
//! ## Retry
//!
//! Outcomes with HTTP 429, HTTP 500 or no response at all (status 0) are
//! resubmitted after a fixed backoff until they resolve or the attempt budget
//! (`max_retries + 1`) is spent. Everything else is terminal on first sight.

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterSnapshot};
pub use retry::{RetryCoordinator, RetryPolicy, RetryReport};
