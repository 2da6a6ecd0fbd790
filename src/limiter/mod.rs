// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client-side rate limiting.
//!
//! Limiting is advisory and client-local: each table gets a pair of token
//! buckets (read and write) sized from the server-reported
//! [`TableLimits`](crate::types::TableLimits). The execution engine probes
//! the bucket before dispatch and charges actual usage after the response.
//!
//! # Example
//!
//! ```
//! use nosql_driver::limiter::{RateLimiter, SimpleRateLimiter};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = SimpleRateLimiter::new(100.0, 30);
//! assert_eq!(limiter.limit_per_second(), 100.0);
//!
//! // A fresh bucket serves immediately.
//! let delayed = limiter
//!     .consume_units_with_timeout(10, Duration::from_millis(100), false)
//!     .await
//!     .unwrap();
//! assert!(delayed < Duration::from_millis(5));
//! # }
//! ```

pub mod map;
pub mod simple;

pub use map::RateLimiterMap;
pub use simple::SimpleRateLimiter;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::NoSQLError;

/// Token-bucket capability set.
///
/// The three-argument consume is required; the percent-scaled variant has a
/// default implementation that ignores the percentage, for limiters that do
/// not support slicing.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consume `units`, waiting up to `timeout` for the bucket to become
    /// serviceable. Returns the time spent waiting.
    ///
    /// A zero-unit call is the idiomatic probe: it blocks only while the
    /// bucket is exhausted. When the deadline passes first:
    /// `always_consume = true` charges the units anyway (the bucket may go
    /// negative) and returns `timeout`; `false` fails with
    /// [`NoSQLError::Timeout`] without charging.
    async fn consume_units_with_timeout(
        &self,
        units: u64,
        timeout: Duration,
        always_consume: bool,
    ) -> Result<Duration, NoSQLError>;

    /// Consume against a `percent` slice of the bucket's throughput.
    async fn consume_units_with_percent(
        &self,
        units: u64,
        timeout: Duration,
        always_consume: bool,
        percent: f64,
    ) -> Result<Duration, NoSQLError> {
        let _ = percent;
        self.consume_units_with_timeout(units, timeout, always_consume)
            .await
    }

    /// Configured throughput in units per second.
    fn limit_per_second(&self) -> f64;

    /// Recent utilization as a percentage of the limit. May exceed 100 when
    /// the bucket has been forced negative.
    fn current_rate(&self) -> f64;

    /// Force the utilization percentage, used for server throttle feedback.
    fn set_current_rate(&self, percent: f64);

    /// Restore the bucket to full capacity.
    fn reset(&self);
}
