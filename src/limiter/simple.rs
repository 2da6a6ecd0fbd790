// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Token-bucket rate limiter.
//!
//! Refill rate is the configured limit; capacity is `limit * duration`,
//! the burst horizon. The balance is allowed to go negative when units are
//! charged with `always_consume`, which is how actual post-response usage
//! is reconciled: later requests then wait until the bucket recovers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use super::RateLimiter;
use crate::error::NoSQLError;

#[derive(Debug)]
struct BucketState {
    limit_per_sec: f64,
    duration_secs: f64,
    /// Available units; negative means overcommitted.
    balance: f64,
    last_refill: Instant,
}

impl BucketState {
    fn capacity(&self) -> f64 {
        self.limit_per_sec * self.duration_secs
    }

    fn refill(&mut self, now: Instant) {
        let dt = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.balance = (self.balance + dt * self.limit_per_sec).min(self.capacity());
    }
}

/// Token-bucket [`RateLimiter`] with percent-scaled waits.
#[derive(Debug)]
pub struct SimpleRateLimiter {
    state: Mutex<BucketState>,
}

impl SimpleRateLimiter {
    /// A limiter allowing `limit_per_sec` units per second with a burst
    /// horizon of `duration_secs`. The bucket starts full.
    #[must_use]
    pub fn new(limit_per_sec: f64, duration_secs: u32) -> Self {
        let limit_per_sec = limit_per_sec.max(1.0);
        let duration_secs = f64::from(duration_secs.max(1));
        Self {
            state: Mutex::new(BucketState {
                limit_per_sec,
                duration_secs,
                balance: limit_per_sec * duration_secs,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Change the throughput limit in place, preserving the current
    /// utilization percentage so an in-flight workload keeps its position
    /// in the bucket.
    pub fn update_limit(&self, limit_per_sec: f64, duration_secs: u32) {
        let mut st = self.state.lock();
        st.refill(Instant::now());
        let used_pct = if st.capacity() > 0.0 {
            100.0 * (1.0 - st.balance / st.capacity())
        } else {
            0.0
        };
        st.limit_per_sec = limit_per_sec.max(1.0);
        st.duration_secs = f64::from(duration_secs.max(1));
        st.balance = st.capacity() * (1.0 - used_pct / 100.0);
    }

    /// Either a successful deduction (with the total time waited) or the
    /// wait until the bucket is serviceable at the scaled rate.
    fn try_consume(&self, units: u64, percent: f64, started: Instant) -> Result<Duration, Duration> {
        let mut st = self.state.lock();
        st.refill(Instant::now());
        if st.balance >= 0.0 {
            st.balance -= units as f64;
            return Ok(started.elapsed());
        }
        let rate = (st.limit_per_sec * percent / 100.0).max(f64::MIN_POSITIVE);
        Err(Duration::from_secs_f64(-st.balance / rate))
    }

    fn force_consume(&self, units: u64) {
        let mut st = self.state.lock();
        st.refill(Instant::now());
        st.balance -= units as f64;
    }

    async fn consume_scaled(
        &self,
        units: u64,
        timeout: Duration,
        always_consume: bool,
        percent: f64,
    ) -> Result<Duration, NoSQLError> {
        let started = Instant::now();
        loop {
            let wait = match self.try_consume(units, percent, started) {
                Ok(delayed) => return Ok(delayed),
                Err(wait) => wait,
            };
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                if always_consume {
                    self.force_consume(units);
                    return Ok(timeout);
                }
                return Err(NoSQLError::Timeout(timeout));
            }
            sleep(wait.min(remaining)).await;
        }
    }
}

#[async_trait]
impl RateLimiter for SimpleRateLimiter {
    async fn consume_units_with_timeout(
        &self,
        units: u64,
        timeout: Duration,
        always_consume: bool,
    ) -> Result<Duration, NoSQLError> {
        self.consume_scaled(units, timeout, always_consume, 100.0)
            .await
    }

    async fn consume_units_with_percent(
        &self,
        units: u64,
        timeout: Duration,
        always_consume: bool,
        percent: f64,
    ) -> Result<Duration, NoSQLError> {
        let percent = if percent > 0.0 && percent <= 100.0 {
            percent
        } else {
            100.0
        };
        self.consume_scaled(units, timeout, always_consume, percent)
            .await
    }

    fn limit_per_second(&self) -> f64 {
        self.state.lock().limit_per_sec
    }

    fn current_rate(&self) -> f64 {
        let mut st = self.state.lock();
        st.refill(Instant::now());
        if st.capacity() <= 0.0 {
            return 0.0;
        }
        100.0 * (1.0 - st.balance / st.capacity())
    }

    fn set_current_rate(&self, percent: f64) {
        let mut st = self.state.lock();
        st.refill(Instant::now());
        st.balance = st.capacity() * (1.0 - percent / 100.0);
    }

    fn reset(&self) {
        let mut st = self.state.lock();
        st.last_refill = Instant::now();
        st.balance = st.capacity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_bucket_serves_immediately() {
        let rl = SimpleRateLimiter::new(100.0, 30);
        let delayed = rl
            .consume_units_with_timeout(50, Duration::from_millis(100), false)
            .await
            .unwrap();
        assert!(delayed < Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_zero_unit_probe_blocks_on_empty_bucket() {
        let rl = SimpleRateLimiter::new(1000.0, 1);
        rl.set_current_rate(105.0); // slightly overcommitted
        let delayed = rl
            .consume_units_with_timeout(0, Duration::from_secs(2), false)
            .await
            .unwrap();
        // needs ~50ms to refill 5% of a 1000-unit bucket
        assert!(delayed >= Duration::from_millis(20), "delayed={delayed:?}");
    }

    #[tokio::test]
    async fn test_timeout_without_always_consume_fails() {
        let rl = SimpleRateLimiter::new(10.0, 1);
        rl.set_current_rate(500.0); // deep in debt, needs seconds to recover
        let rate_before = rl.current_rate();
        let err = rl
            .consume_units_with_timeout(1, Duration::from_millis(30), false)
            .await
            .unwrap_err();
        assert!(matches!(err, NoSQLError::Timeout(_)));
        // nothing was charged beyond refill drift
        assert!(rl.current_rate() <= rate_before);
    }

    #[tokio::test]
    async fn test_timeout_with_always_consume_charges() {
        let rl = SimpleRateLimiter::new(10.0, 1);
        rl.set_current_rate(500.0);
        let timeout = Duration::from_millis(30);
        let delayed = rl
            .consume_units_with_timeout(100, timeout, true)
            .await
            .unwrap();
        assert_eq!(delayed, timeout);
        assert!(rl.current_rate() > 500.0);
    }

    #[tokio::test]
    async fn test_forced_rate_reaches_limit() {
        let rl = SimpleRateLimiter::new(200.0, 30);
        assert!(rl.current_rate() < 1.0);
        rl.set_current_rate(100.0);
        assert!(rl.current_rate() >= 99.0);
    }

    #[tokio::test]
    async fn test_update_limit_preserves_utilization() {
        let rl = SimpleRateLimiter::new(100.0, 10);
        rl.set_current_rate(50.0);
        rl.update_limit(1000.0, 10);
        let rate = rl.current_rate();
        assert!((rate - 50.0).abs() < 2.0, "rate={rate}");
        assert_eq!(rl.limit_per_second(), 1000.0);
    }

    #[tokio::test]
    async fn test_reset_restores_full_capacity() {
        let rl = SimpleRateLimiter::new(100.0, 10);
        rl.set_current_rate(120.0);
        rl.reset();
        assert!(rl.current_rate() <= 0.0);
    }
}
